//! Webhook authenticity
//!
//! Providers sign `"{timestamp}.{body}"` with HMAC-SHA256 using the shared
//! webhook secret and send:
//!
//! ```text
//! webhook-timestamp: 1718000000
//! webhook-signature: v1=5d41402abc4b2a76b9719d911017c592,v1=...
//! ```
//!
//! Several signatures may be present while a secret is being rotated; any one
//! match is enough.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::AuthError;

pub const TIMESTAMP_HEADER: &str = "webhook-timestamp";
pub const SIGNATURE_HEADER: &str = "webhook-signature";
/// Optional provider event id, preferred over one found in the body.
pub const EVENT_ID_HEADER: &str = "webhook-id";

const SIGNATURE_VERSION: &str = "v1=";

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Vec<u8>,
    tolerance_secs: i64,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("secret", &"<redacted>")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish()
    }
}

impl SignatureVerifier {
    pub fn new(secret: impl Into<Vec<u8>>, tolerance_secs: u64) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs: i64::try_from(tolerance_secs).unwrap_or(i64::MAX),
        }
    }

    fn keyed(&self, timestamp: &str, body: &[u8]) -> Result<HmacSha256, AuthError> {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).map_err(|_| AuthError::InvalidKey)?;
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(body);
        Ok(mac)
    }

    /// The `webhook-signature` header value for `body` sent at `timestamp`.
    pub fn sign(&self, timestamp: i64, body: &[u8]) -> Result<String, AuthError> {
        let mac = self.keyed(&timestamp.to_string(), body)?;
        Ok(format!(
            "{SIGNATURE_VERSION}{}",
            hex::encode(mac.finalize().into_bytes())
        ))
    }

    /// Check the headers of one callback against its raw body.
    ///
    /// # Errors
    ///
    /// Any [`AuthError`]; the body must not be processed further.
    pub fn verify(
        &self,
        timestamp: Option<&str>,
        signature: Option<&str>,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let timestamp = timestamp
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingHeader(TIMESTAMP_HEADER))?;
        let signature = signature
            .filter(|s| !s.trim().is_empty())
            .ok_or(AuthError::MissingHeader(SIGNATURE_HEADER))?;

        let sent_at: i64 = timestamp
            .parse()
            .map_err(|_| AuthError::InvalidTimestamp(timestamp.to_string()))?;
        let skew_secs = now.timestamp().saturating_sub(sent_at);
        if skew_secs.saturating_abs() > self.tolerance_secs {
            return Err(AuthError::TimestampOutOfTolerance { skew_secs });
        }

        let mac = self.keyed(timestamp, body)?;

        let matched = signature
            .split([',', ' '])
            .filter_map(|candidate| candidate.trim().strip_prefix(SIGNATURE_VERSION))
            .filter_map(|candidate| hex::decode(candidate).ok())
            .any(|candidate| mac.clone().verify_slice(&candidate).is_ok());

        if matched {
            Ok(())
        } else {
            Err(AuthError::InvalidSignature)
        }
    }
}
