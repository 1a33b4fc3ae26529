//! Signed, time-boxed action tokens
//!
//! `base64url(claims) "." hex(hmac_sha256(secret, claims))`, where the claims
//! are the JSON object `{sub, act, exp}`. Issuing is a pure function of the
//! claims and the secret, so a re-run activity hands out the same token.

use std::fmt;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("Malformed token")]
    Malformed,

    #[error("Token signature does not match")]
    BadSignature,

    #[error("Token expired")]
    Expired,

    #[error("Token secret is unusable")]
    InvalidKey,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    act: String,
    exp: i64,
}

/// What a verified token grants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub subject: String,
    pub action: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
}

impl fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSigner")
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl TokenSigner {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        HmacSha256::new_from_slice(&self.secret).map_err(|_| TokenError::InvalidKey)
    }

    /// Issue a token for `action` on `subject`, valid until `expires_at`.
    ///
    /// # Errors
    ///
    /// [`TokenError::InvalidKey`] if the secret cannot key the MAC.
    pub fn issue(
        &self,
        subject: &str,
        action: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let claims = serde_json::to_vec(&Claims {
            sub: subject.to_string(),
            act: action.to_string(),
            exp: expires_at.timestamp(),
        })
        .map_err(|_| TokenError::Malformed)?;

        let mut mac = self.mac()?;
        mac.update(&claims);
        let signature = hex::encode(mac.finalize().into_bytes());

        Ok(format!("{}.{signature}", URL_SAFE_NO_PAD.encode(&claims)))
    }

    /// Check the signature, then the expiry.
    ///
    /// # Errors
    ///
    /// Any [`TokenError`]; the signature is checked in constant time before
    /// the claims are trusted.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims, TokenError> {
        let (payload, signature) = token.split_once('.').ok_or(TokenError::Malformed)?;
        let claims = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| TokenError::Malformed)?;
        let signature = hex::decode(signature).map_err(|_| TokenError::Malformed)?;

        let mut mac = self.mac()?;
        mac.update(&claims);
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;

        let claims: Claims = serde_json::from_slice(&claims).map_err(|_| TokenError::Malformed)?;
        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .ok_or(TokenError::Malformed)?;
        if expires_at <= now {
            return Err(TokenError::Expired);
        }

        Ok(TokenClaims {
            subject: claims.sub,
            action: claims.act,
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn signer() -> TokenSigner {
        TokenSigner::new("token-secret")
    }

    #[test]
    fn test_issue_is_deterministic() {
        let expires = Utc::now() + Duration::days(7);
        let first = signer().issue("contact-1", "accept-invite", expires).unwrap();
        let second = signer().issue("contact-1", "accept-invite", expires).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_verify_returns_claims() {
        let now = Utc::now();
        let expires = now + Duration::hours(1);
        let token = signer().issue("contact-1", "accept-invite", expires).unwrap();

        let claims = signer().verify(&token, now).unwrap();
        assert_eq!(claims.subject, "contact-1");
        assert_eq!(claims.action, "accept-invite");
        assert_eq!(claims.expires_at.timestamp(), expires.timestamp());
    }

    #[test]
    fn test_expired_token() {
        let now = Utc::now();
        let token = signer().issue("c", "a", now - Duration::seconds(1)).unwrap();
        assert_eq!(signer().verify(&token, now), Err(TokenError::Expired));
    }

    #[test]
    fn test_tampered_token() {
        let now = Utc::now();
        let token = signer().issue("c", "a", now + Duration::hours(1)).unwrap();

        let other = TokenSigner::new("another-secret");
        assert_eq!(other.verify(&token, now), Err(TokenError::BadSignature));

        let (_, signature) = token.split_once('.').unwrap();
        let forged = format!(
            "{}.{signature}",
            URL_SAFE_NO_PAD.encode(br#"{"sub":"c","act":"admin","exp":9999999999}"#)
        );
        assert_eq!(signer().verify(&forged, now), Err(TokenError::BadSignature));
    }

    #[test]
    fn test_malformed_token() {
        let now = Utc::now();
        assert_eq!(signer().verify("no-dot", now), Err(TokenError::Malformed));
        assert_eq!(signer().verify("abc.not-hex", now), Err(TokenError::Malformed));
    }

    #[test]
    fn test_debug_redacts_secret() {
        assert!(!format!("{:?}", signer()).contains("token-secret"));
    }
}
