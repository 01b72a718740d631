/*
 * SPDX-FileCopyrightText: 2026 The Linkproxy Authors
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Signed-URL reverse proxy: verifies an HMAC signature attached to a
//! virtual file path, resolves the path to a direct download URL
//! through an upstream storage API, and streams the file back with
//! upstream-identifying headers stripped.

use axum::extract::{OriginalUri, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use linkproxy_sign::HmacSign;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{info, info_span};

pub mod error;
pub mod relay;
pub mod resolver;

use error::ProxyError;

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub bind: SocketAddr,
    /// Upstream resolution API base, no trailing slash.
    pub upstream_url: String,
    /// Shared secret: HMAC key for inbound signatures and the verbatim
    /// `Authorization` value sent to the resolution API.
    pub token: String,
    pub tls: Option<TlsConfig>,
    pub http_timeout_secs: u64,
    pub http_connect_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub cert: PathBuf,
    pub key: PathBuf,
}

#[derive(Debug)]
pub enum ConfigError {
    MissingEnv(&'static str),
    InvalidEnv(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingEnv(var) => write!(f, "missing required env var {var}"),
            Self::InvalidEnv(var) => write!(f, "invalid value for env var {var}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl ProxyConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind = std::env::var("LINKPROXY_BIND").unwrap_or_else(|_| "0.0.0.0:5243".to_string());
        let bind: SocketAddr = bind
            .parse()
            .map_err(|_| ConfigError::InvalidEnv("LINKPROXY_BIND"))?;
        let upstream_url = std::env::var("LINKPROXY_UPSTREAM_URL")
            .map_err(|_| ConfigError::MissingEnv("LINKPROXY_UPSTREAM_URL"))?
            .trim_end_matches('/')
            .to_string();
        let token = std::env::var("LINKPROXY_TOKEN")
            .map_err(|_| ConfigError::MissingEnv("LINKPROXY_TOKEN"))?;
        let https = std::env::var("LINKPROXY_HTTPS")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let tls = https.then(|| TlsConfig {
            cert: std::env::var("LINKPROXY_TLS_CERT")
                .unwrap_or_else(|_| "server.crt".to_string())
                .into(),
            key: std::env::var("LINKPROXY_TLS_KEY")
                .unwrap_or_else(|_| "server.key".to_string())
                .into(),
        });
        let http_timeout_secs = std::env::var("LINKPROXY_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);
        let http_connect_timeout_secs = std::env::var("LINKPROXY_HTTP_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);

        Ok(Self {
            bind,
            upstream_url,
            token,
            tls,
            http_timeout_secs,
            http_connect_timeout_secs,
        })
    }
}

#[derive(Clone)]
struct AppState {
    cfg: Arc<ProxyConfig>,
    sign: HmacSign,
    /// Resolution calls get a whole-request deadline; envelopes are
    /// small.
    resolve_http: reqwest::Client,
    /// Relay calls only get a connect timeout, so long downloads are
    /// never cut off mid-stream.
    relay_http: reqwest::Client,
}

pub fn app(cfg: ProxyConfig) -> anyhow::Result<Router> {
    use anyhow::Context as _;

    let resolve_http = reqwest::Client::builder()
        .timeout(Duration::from_secs(cfg.http_timeout_secs))
        .connect_timeout(Duration::from_secs(cfg.http_connect_timeout_secs))
        .build()
        .context("resolver http client init")?;
    let relay_http = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(cfg.http_connect_timeout_secs))
        .build()
        .context("relay http client init")?;
    let sign = HmacSign::new(&cfg.token);
    let state = AppState {
        cfg: Arc::new(cfg),
        sign,
        resolve_http,
        relay_http,
    };

    Ok(Router::new()
        .fallback(proxy_request)
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
                info_span!("http", method = %req.method(), uri = %req.uri())
            }),
        )
        .with_state(state))
}

/// Single entry point for every method and path.
async fn proxy_request(
    State(state): State<AppState>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
) -> Response {
    if method == Method::OPTIONS {
        return preflight_response(&headers);
    }
    let path = decode_component(uri.path());
    let token = sign_param(uri.query());
    let range = headers.get(header::RANGE).cloned();
    match handle_download(&state, method, &path, &token, range).await {
        Ok(resp) => resp,
        Err(err) => err.into_response(),
    }
}

/// verify -> resolve -> relay; the first failing stage short-circuits
/// into the JSON error envelope.
async fn handle_download(
    state: &AppState,
    method: Method,
    path: &str,
    token: &str,
    range: Option<HeaderValue>,
) -> Result<Response, ProxyError> {
    state
        .sign
        .verify(path, token)
        .map_err(|err| ProxyError::Auth(err.to_string()))?;
    let link = resolver::resolve(&state.resolve_http, &state.cfg, path).await?;
    info!("proxying {}", link.raw_url);
    relay::relay(&state.relay_http, method, &link, range).await
}

/// CORS preflight, answered before the signature pipeline: a preflight
/// never carries the `sign` parameter's semantics.
fn preflight_response(headers: &HeaderMap) -> Response {
    let is_preflight = headers.contains_key(header::ORIGIN)
        && headers.contains_key(header::ACCESS_CONTROL_REQUEST_METHOD);
    let mut resp = StatusCode::OK.into_response();
    if is_preflight {
        let h = resp.headers_mut();
        h.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        );
        h.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET,HEAD,POST,OPTIONS"),
        );
        h.insert(
            header::ACCESS_CONTROL_MAX_AGE,
            HeaderValue::from_static("86400"),
        );
        let allow_headers = headers
            .get(header::ACCESS_CONTROL_REQUEST_HEADERS)
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static(""));
        h.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, allow_headers);
    } else {
        resp.headers_mut().insert(
            header::ALLOW,
            HeaderValue::from_static("GET, HEAD, POST, OPTIONS"),
        );
    }
    resp
}

/// Percent-decodes a path or query component, falling back to the raw
/// text on invalid escapes.
fn decode_component(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|c| c.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

/// Pulls the `sign` parameter out of the raw query string. Absent means
/// empty, which the verifier rejects as `expire missing`.
fn sign_param(query: Option<&str>) -> String {
    let Some(query) = query else {
        return String::new();
    };
    for pair in query.split('&') {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if key == "sign" {
            return decode_component(value);
        }
    }
    String::new()
}
