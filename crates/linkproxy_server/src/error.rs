/*
 * SPDX-FileCopyrightText: 2026 The Linkproxy Authors
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

/// Everything that can go wrong before the relay starts writing the
/// upstream body. Once streaming has begun, failures are no longer
/// representable as an envelope and are only logged.
#[derive(Debug)]
pub enum ProxyError {
    /// Bad, expired, or malformed signature.
    Auth(String),
    /// Transport/read/parse failure talking to the resolution API.
    Upstream(String),
    /// The resolution API answered but signaled non-success; its code
    /// and message are forwarded to the client verbatim.
    UpstreamLogical { code: i64, message: String },
    /// Failure reaching the resolved direct URL.
    RelayTransport(String),
}

impl ProxyError {
    fn into_envelope(self) -> (i64, String) {
        match self {
            Self::Auth(msg) => (401, msg),
            Self::Upstream(msg) => (500, msg),
            Self::UpstreamLogical { code, message } => (code, message),
            Self::RelayTransport(msg) => (500, msg),
        }
    }
}

impl std::fmt::Display for ProxyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auth(msg) => write!(f, "authentication failed: {msg}"),
            Self::Upstream(msg) => write!(f, "upstream error: {msg}"),
            Self::UpstreamLogical { code, message } => {
                write!(f, "upstream responded {code}: {message}")
            }
            Self::RelayTransport(msg) => write!(f, "relay error: {msg}"),
        }
    }
}

impl std::error::Error for ProxyError {}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let (code, msg) = self.into_envelope();
        let body = serde_json::json!({ "code": code, "msg": msg }).to_string();
        // The outer transport status is always 200; the real code rides
        // in the JSON body. Existing clients depend on this contract.
        (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/json")],
            body,
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_maps_to_401_in_body() {
        let (code, msg) = ProxyError::Auth("sign mismatch".into()).into_envelope();
        assert_eq!(code, 401);
        assert_eq!(msg, "sign mismatch");
    }

    #[test]
    fn logical_error_forwarded_verbatim() {
        let err = ProxyError::UpstreamLogical {
            code: 404,
            message: "file not found".into(),
        };
        let (code, msg) = err.into_envelope();
        assert_eq!(code, 404);
        assert_eq!(msg, "file not found");
    }

    #[test]
    fn transport_errors_map_to_500() {
        let (code, _) = ProxyError::Upstream("connection refused".into()).into_envelope();
        assert_eq!(code, 500);
        let (code, _) = ProxyError::RelayTransport("dns failure".into()).into_envelope();
        assert_eq!(code, 500);
    }
}
