//! Bearer Token Verification
//!
//! Verifies the signed bearer tokens the dashboard's auth service issues.
//! Token issuance lives with that service; this adapter only checks the
//! signature and expiry against the shared secret.
//!
//! # Token Format
//!
//! ```text
//! <user_id>.<expiry_unix_secs>.<base64url(hmac_sha256(secret, "<user_id>.<expiry>"))>
//! ```
//!
//! A hub configured without a token secret rejects every credential, so all
//! sessions stay anonymous.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::application::ports::{Identity, IdentityVerifier, VerifyError};

type HmacSha256 = Hmac<Sha256>;

/// Verifies HMAC-signed bearer tokens against a shared secret.
pub struct HmacTokenVerifier {
    secret: Option<Vec<u8>>,
}

impl HmacTokenVerifier {
    /// Create a verifier. `None` disables verification entirely.
    #[must_use]
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.map(String::into_bytes),
        }
    }

    /// Sign a token for a user. Used by the external issuer and by tests.
    #[must_use]
    pub fn sign(secret: &str, user_id: &str, expires_at: DateTime<Utc>) -> String {
        let expiry = expires_at.timestamp();
        let payload = format!("{user_id}.{expiry}");
        let signature = URL_SAFE_NO_PAD.encode(hmac_digest(secret.as_bytes(), &payload));
        format!("{payload}.{signature}")
    }
}

#[async_trait]
impl IdentityVerifier for HmacTokenVerifier {
    async fn verify(&self, credential: &str) -> Result<Identity, VerifyError> {
        let Some(secret) = &self.secret else {
            return Err(VerifyError::InvalidCredential);
        };

        // user ids may themselves contain dots, so split from the right.
        let mut parts = credential.rsplitn(3, '.');
        let signature = parts.next().ok_or(VerifyError::InvalidCredential)?;
        let expiry = parts.next().ok_or(VerifyError::InvalidCredential)?;
        let user_id = parts.next().ok_or(VerifyError::InvalidCredential)?;

        if user_id.is_empty() {
            return Err(VerifyError::InvalidCredential);
        }

        let provided = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| VerifyError::InvalidCredential)?;

        let payload = format!("{user_id}.{expiry}");
        let mut mac = HmacSha256::new_from_slice(secret)
            .map_err(|_| VerifyError::InvalidCredential)?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&provided)
            .map_err(|_| VerifyError::InvalidCredential)?;

        let expiry: i64 = expiry.parse().map_err(|_| VerifyError::InvalidCredential)?;
        if expiry < Utc::now().timestamp() {
            return Err(VerifyError::Expired);
        }

        Ok(Identity {
            user_id: user_id.to_string(),
        })
    }
}

fn hmac_digest(secret: &[u8], payload: &str) -> Vec<u8> {
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        // HMAC accepts keys of any length; unreachable in practice.
        Err(_) => return Vec::new(),
    };
    mac.update(payload.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

// =============================================================================
// Tests
// =============================================================================
