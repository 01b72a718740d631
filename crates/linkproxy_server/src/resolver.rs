/*
 * SPDX-FileCopyrightText: 2026 The Linkproxy Authors
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Client for the upstream link-resolution API: trades a verified
//! virtual path for a time-limited direct download URL.

use chrono::{DateTime, Utc};
use http::header;
use serde::Deserialize;

use crate::error::ProxyError;
use crate::ProxyConfig;

/// A resolved direct link. `raw_url` always carries an explicit scheme
/// by the time it leaves this module.
#[derive(Debug, Clone, Deserialize)]
pub struct Link {
    pub raw_url: String,
    pub modified: DateTime<Utc>,
    pub created: DateTime<Utc>,
}

/// The JSON wrapper every resolution response arrives in. `data` is
/// only trusted when `code` equals 200.
#[derive(Debug, Deserialize)]
pub struct LinkEnvelope {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<Link>,
}

/// Exactly one resolution attempt per inbound request; transient
/// upstream failures surface to the client instead of being retried.
pub async fn resolve(
    http: &reqwest::Client,
    cfg: &ProxyConfig,
    path: &str,
) -> Result<Link, ProxyError> {
    let url = format!("{}/api/fs/link", cfg.upstream_url);
    let res = http
        .post(&url)
        .header(header::AUTHORIZATION, cfg.token.as_str())
        .json(&serde_json::json!({ "path": path }))
        .send()
        .await
        .map_err(|err| ProxyError::Upstream(err.to_string()))?;
    let body = res
        .bytes()
        .await
        .map_err(|err| ProxyError::Upstream(err.to_string()))?;
    let envelope: LinkEnvelope = serde_json::from_slice(&body)
        .map_err(|err| ProxyError::Upstream(err.to_string()))?;
    if envelope.code != 200 {
        return Err(ProxyError::UpstreamLogical {
            code: envelope.code,
            message: envelope.message,
        });
    }
    let mut link = envelope
        .data
        .ok_or_else(|| ProxyError::Upstream("link envelope missing data".to_string()))?;
    link.raw_url = normalize_raw_url(&link.raw_url);
    Ok(link)
}

/// Upstreams sometimes hand back protocol-relative URLs (`//host/...`);
/// those get an explicit `http:` scheme before the relay dereferences
/// them.
pub fn normalize_raw_url(raw_url: &str) -> String {
    if raw_url.starts_with("http") {
        raw_url.to_string()
    } else {
        format!("http:{raw_url}")
    }
}
