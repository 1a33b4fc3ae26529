//! Basic email address grammar
//!
//! Outbound sends only need to reject obviously broken input before a
//! provider call is made, so this accepts the RFC 5321 Dot-string form of the
//! local part and a dotted hostname. Quoted local parts and address literals
//! are rejected: no transactional provider accepts them anyway.
//!
//! ```text
//! Mailbox     = Dot-string "@" Domain
//! Dot-string  = Atom *("." Atom)
//! Domain      = sub-domain 1*("." sub-domain)
//! sub-domain  = Let-dig [Ldh-str]
//! ```

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const MAX_LOCAL_PART: usize = 64;
const MAX_DOMAIN: usize = 255;
const MAX_ADDRESS: usize = 254;

/// Errors that can occur while validating an address
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("Empty address")]
    Empty,

    #[error("Address exceeds {MAX_ADDRESS} octets")]
    TooLong,

    #[error("Local-part exceeds {MAX_LOCAL_PART} octets")]
    LocalPartTooLong,

    #[error("Domain exceeds {MAX_DOMAIN} octets")]
    DomainTooLong,

    #[error("Missing '@' separator in {0:?}")]
    MissingAtSign(String),

    #[error("Invalid local-part: {0}")]
    InvalidLocalPart(String),

    #[error("Invalid domain: {0}")]
    InvalidDomain(String),
}

/// A validated, lower-cased email address.
///
/// Addresses are compared case-insensitively everywhere in the system
/// (suppression keys, unique-open sets), so normalisation happens once here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Validate and normalise an address.
    ///
    /// # Errors
    ///
    /// Returns an [`AddressError`] describing the first grammar violation.
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        validate(input)?;
        Ok(Self(normalize(input)))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn domain(&self) -> &str {
        self.0.rsplit_once('@').map_or("", |(_, domain)| domain)
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EmailAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Lower-case and trim an address without validating it.
///
/// Used for lookups where the input came from a provider and may not pass the
/// strict grammar, but must still hit the same key.
#[must_use]
pub fn normalize(input: &str) -> String {
    input.trim().to_lowercase()
}

/// Check an address against the basic grammar.
///
/// # Errors
///
/// Returns an [`AddressError`] describing the first grammar violation.
pub fn validate(input: &str) -> Result<(), AddressError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(AddressError::Empty);
    }

    if trimmed.len() > MAX_ADDRESS {
        return Err(AddressError::TooLong);
    }

    let (local, domain) = trimmed
        .rsplit_once('@')
        .ok_or_else(|| AddressError::MissingAtSign(trimmed.to_string()))?;

    if local.len() > MAX_LOCAL_PART {
        return Err(AddressError::LocalPartTooLong);
    }

    if domain.len() > MAX_DOMAIN {
        return Err(AddressError::DomainTooLong);
    }

    validate_dot_string(local)?;
    validate_domain(domain)
}

fn validate_dot_string(local: &str) -> Result<(), AddressError> {
    if local.is_empty() {
        return Err(AddressError::InvalidLocalPart("Empty local-part".to_string()));
    }

    if local.starts_with('.') || local.ends_with('.') {
        return Err(AddressError::InvalidLocalPart(
            "Dot-string cannot start or end with '.'".to_string(),
        ));
    }

    for atom in local.split('.') {
        if atom.is_empty() {
            return Err(AddressError::InvalidLocalPart(
                "Dot-string cannot contain consecutive dots".to_string(),
            ));
        }

        if let Some(ch) = atom.chars().find(|ch| !is_atext(*ch)) {
            return Err(AddressError::InvalidLocalPart(format!(
                "Invalid character '{ch}' in atom"
            )));
        }
    }

    Ok(())
}

fn validate_domain(domain: &str) -> Result<(), AddressError> {
    if domain.is_empty() {
        return Err(AddressError::InvalidDomain("Empty domain".to_string()));
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return Err(AddressError::InvalidDomain(format!(
            "{domain} is not a fully qualified hostname"
        )));
    }

    for label in labels {
        let valid = !label.is_empty()
            && label.len() <= 63
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
            && !label.starts_with('-')
            && !label.ends_with('-');

        if !valid {
            return Err(AddressError::InvalidDomain(format!(
                "Invalid label {label:?} in {domain}"
            )));
        }
    }

    Ok(())
}

/// RFC 5321 atext, restricted to ASCII
const fn is_atext(ch: char) -> bool {
    ch.is_ascii_alphanumeric()
        || matches!(
            ch,
            '!' | '#'
                | '$'
                | '%'
                | '&'
                | '\''
                | '*'
                | '+'
                | '-'
                | '/'
                | '='
                | '?'
                | '^'
                | '_'
                | '`'
                | '{'
                | '|'
                | '}'
                | '~'
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_addresses() {
        for address in [
            "user@example.com",
            "first.last@sub.example.co.uk",
            "user+tag@example.org",
            "o'brien@example.ie",
        ] {
            assert!(validate(address).is_ok(), "{address} should be valid");
        }
    }

    #[test]
    fn test_invalid_addresses() {
        assert_eq!(validate(""), Err(AddressError::Empty));
        assert_eq!(validate("   "), Err(AddressError::Empty));
        assert!(matches!(
            validate("no-at-sign"),
            Err(AddressError::MissingAtSign(_))
        ));
        assert!(matches!(
            validate(".user@example.com"),
            Err(AddressError::InvalidLocalPart(_))
        ));
        assert!(matches!(
            validate("us..er@example.com"),
            Err(AddressError::InvalidLocalPart(_))
        ));
        assert!(matches!(
            validate("us er@example.com"),
            Err(AddressError::InvalidLocalPart(_))
        ));
        assert!(matches!(
            validate("user@localhost"),
            Err(AddressError::InvalidDomain(_))
        ));
        assert!(matches!(
            validate("user@-bad.example.com"),
            Err(AddressError::InvalidDomain(_))
        ));
        assert!(matches!(
            validate("user@example..com"),
            Err(AddressError::InvalidDomain(_))
        ));
    }

    #[test]
    fn test_size_limits() {
        let local = "a".repeat(65);
        assert_eq!(
            validate(&format!("{local}@example.com")),
            Err(AddressError::LocalPartTooLong)
        );

        let long = format!("user@{}.com", "a".repeat(250));
        assert_eq!(validate(&long), Err(AddressError::TooLong));
    }

    #[test]
    fn test_parse_normalises_case() {
        let address = EmailAddress::parse("  User@Example.COM ").unwrap();
        assert_eq!(address.as_str(), "user@example.com");
        assert_eq!(address.domain(), "example.com");
    }
}
