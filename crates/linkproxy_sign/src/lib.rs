/*
 * SPDX-FileCopyrightText: 2026 The Linkproxy Authors
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! HMAC path signing, wire-compatible with the scheme used by the
//! external issuer: `base64url(HMAC-SHA256("{path}:{expire}")):{expire}`
//! where `expire` is a unix timestamp and `0` means the token never
//! expires.

use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyError {
    ExpireMissing,
    ExpireInvalid,
    Expired,
    Mismatch,
}

impl std::fmt::Display for VerifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            Self::ExpireMissing => "expire missing",
            Self::ExpireInvalid => "expire invalid",
            Self::Expired => "expire expired",
            Self::Mismatch => "sign mismatch",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for VerifyError {}

/// Signs and verifies paths with a shared secret. Cheap to clone;
/// holds no state beyond the key bytes.
#[derive(Clone)]
pub struct HmacSign {
    secret: Vec<u8>,
}

impl HmacSign {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    /// Mints a token for `data` valid until `expire` (unix seconds,
    /// `0` = no expiry).
    pub fn sign(&self, data: &str, expire: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC can take key of any size");
        mac.update(data.as_bytes());
        mac.update(b":");
        mac.update(expire.to_string().as_bytes());
        let digest = mac.finalize().into_bytes();
        format!("{}:{expire}", URL_SAFE.encode(digest))
    }

    /// Checks `token` against `data`. The expiry rides in the token
    /// itself as the final `:`-separated segment.
    pub fn verify(&self, data: &str, token: &str) -> Result<(), VerifyError> {
        let expire_part = token.rsplit(':').next().unwrap_or("");
        if expire_part.is_empty() {
            return Err(VerifyError::ExpireMissing);
        }
        let expire: i64 = expire_part
            .parse()
            .map_err(|_| VerifyError::ExpireInvalid)?;
        if expire > 0 && expire < unix_now() {
            return Err(VerifyError::Expired);
        }
        if token != self.sign(data, expire) {
            return Err(VerifyError::Mismatch);
        }
        Ok(())
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
