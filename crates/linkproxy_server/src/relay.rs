/*
 * SPDX-FileCopyrightText: 2026 The Linkproxy Authors
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! The streaming half of the pipeline: fetches the resolved direct URL
//! with the caller's method, scrubs upstream-identifying response
//! headers, and streams the body through without buffering it.

use axum::body::Body;
use axum::response::Response;
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use http::{header, HeaderMap, HeaderValue, Method};
use std::time::SystemTime;
use tracing::warn;

use crate::error::ProxyError;
use crate::resolver::Link;

/// Upstream response headers that either leak origin infrastructure
/// details or collide with the proxy's own CORS/caching policy. Matched
/// case-insensitively and removed with all their values.
pub const STRIPPED_HEADERS: &[&str] = &[
    "Access-Control-Allow-Origin",
    "Set-Cookie",
    "Cache-Control",
    "P3P",
    "X-NetworkStatistics",
    "X-SharePointHealthScore",
    "docID",
    "X-Download-Options",
    "CTag",
    "X-AspNet-Version",
    "X-DataBoundary",
    "X-1DSCollectorUrl",
    "X-AriaCollectorURL",
    "SPRequestGuid",
    "request-id",
    "MS-CV",
    "Alt-Svc",
    "Strict-Transport-Security",
    "X-FRAME-OPTIONS",
    "Content-Security-Policy",
    "X-Powered-By",
    "MicrosoftSharePointTeamServices",
    "X-MS-InvokeApp",
    "X-Cache",
    "X-MSEdge-Ref",
];

/// Fetches `link` with the original inbound method and hands back a
/// header-scrubbed streaming response. The inbound `Range` header is
/// the only request header forwarded; no body crosses the hop.
pub async fn relay(
    http: &reqwest::Client,
    method: Method,
    link: &Link,
    range: Option<HeaderValue>,
) -> Result<Response, ProxyError> {
    let mut req = http.request(method, &link.raw_url);
    if let Some(range) = range {
        req = req.header(header::RANGE, range);
    }
    let upstream = req
        .send()
        .await
        .map_err(|err| ProxyError::RelayTransport(err.to_string()))?;

    let status = upstream.status();
    let mut headers = upstream.headers().clone();
    strip_upstream_headers(&mut headers);
    apply_cors_meta(&mut headers, link.modified);

    // From here on the status line is committed; a failed chunk can only
    // be logged and the connection dropped mid-body.
    let stream = upstream
        .bytes_stream()
        .inspect_err(|err| warn!("relay body copy aborted: {err}"));

    let mut resp = Response::new(Body::from_stream(stream));
    *resp.status_mut() = status;
    *resp.headers_mut() = headers;
    Ok(resp)
}

pub fn strip_upstream_headers(headers: &mut HeaderMap) {
    for name in STRIPPED_HEADERS {
        headers.remove(*name);
    }
}

pub fn apply_cors_meta(headers: &mut HeaderMap, modified: DateTime<Utc>) {
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, OPTIONS"),
    );
    headers.append(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("range"),
    );
    let last_modified = httpdate::fmt_http_date(SystemTime::from(modified));
    if let Ok(value) = HeaderValue::from_str(&last_modified) {
        headers.append(header::LAST_MODIFIED, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use http::HeaderName;

    fn upstream_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("text/plain"));
        headers.insert("content-length", HeaderValue::from_static("6"));
        headers.append("x-custom", HeaderValue::from_static("one"));
        headers.append("x-custom", HeaderValue::from_static("two"));
        for name in STRIPPED_HEADERS {
            let name = HeaderName::from_bytes(name.as_bytes()).unwrap();
            headers.append(name.clone(), HeaderValue::from_static("a"));
            headers.append(name, HeaderValue::from_static("b"));
        }
        headers
    }

    #[test]
    fn denylist_removed_with_all_values() {
        let mut headers = upstream_headers();
        strip_upstream_headers(&mut headers);
        for name in STRIPPED_HEADERS {
            assert!(!headers.contains_key(*name), "{name} survived stripping");
        }
    }

    #[test]
    fn other_headers_survive_verbatim() {
        let mut headers = upstream_headers();
        strip_upstream_headers(&mut headers);
        assert_eq!(headers.get("content-type").unwrap(), "text/plain");
        assert_eq!(headers.get("content-length").unwrap(), "6");
        let custom: Vec<_> = headers.get_all("x-custom").iter().collect();
        assert_eq!(custom, vec!["one", "two"]);
    }

    #[test]
    fn cors_meta_headers_applied() {
        let mut headers = HeaderMap::new();
        let modified = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        apply_cors_meta(&mut headers, modified);
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "*"
        );
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_METHODS).unwrap(),
            "GET, OPTIONS"
        );
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_HEADERS).unwrap(),
            "range"
        );
        assert_eq!(
            headers.get(header::LAST_MODIFIED).unwrap(),
            "Mon, 01 Jan 2024 00:00:00 GMT"
        );
    }

    #[test]
    fn proxy_cors_values_overwrite_leftovers() {
        // Access-Control-Allow-Methods is not on the denylist, so
        // insert() must replace whatever a permissive upstream sent.
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("DELETE"),
        );
        let modified = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        apply_cors_meta(&mut headers, modified);
        let methods: Vec<_> = headers
            .get_all(header::ACCESS_CONTROL_ALLOW_METHODS)
            .iter()
            .collect();
        assert_eq!(methods, vec!["GET, OPTIONS"]);
    }
}
