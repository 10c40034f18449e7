//! Bearer token type and constant-time comparison.
//!
//! Grounded on the teacher's `crates/server/src/auth.rs::constant_time_compare`
//! — the same byte-length check plus XOR-accumulate loop, lifted here so it
//! is a property of the `AuthToken` type rather than free-floating in the
//! HTTP layer.

use crate::{Error, Result};

/// A validated bearer token: hex, at least 64 characters (>= 256 bits of
/// entropy). Construction is the only fallible path; once built, comparison
/// never fails.
#[derive(Clone)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if raw.len() < 64 {
            return Err(Error::InvalidAuthToken(
                "token must be at least 64 characters".into(),
            ));
        }
        if !raw.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::InvalidAuthToken(
                "token must be hexadecimal".into(),
            ));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Constant-time equality against a presented token string. Duration is
    /// independent of where the first differing byte occurs.
    pub fn matches(&self, presented: &str) -> bool {
        constant_time_compare(self.0.as_bytes(), presented.as_bytes())
    }
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AuthToken(***)")
    }
}

/// Bytewise equality whose running time does not depend on the position of
/// the first differing byte. Unequal-length inputs short-circuit on length
/// only (length is not secret).
pub fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_token() {
        assert!(AuthToken::parse("abc123").is_err());
    }

    #[test]
    fn rejects_non_hex_token() {
        let token = "z".repeat(64);
        assert!(AuthToken::parse(token).is_err());
    }

    #[test]
    fn accepts_valid_hex_token() {
        let token = "a".repeat(64);
        assert!(AuthToken::parse(token).is_ok());
    }

    #[test]
    fn constant_time_compare_matches_equal_inputs() {
        assert!(constant_time_compare(b"abcdef", b"abcdef"));
        assert!(!constant_time_compare(b"abcdef", b"abcxyz"));
        assert!(!constant_time_compare(b"short", b"longer-value"));
    }

    #[test]
    fn matches_uses_constant_time_compare() {
        let token = AuthToken::parse("a".repeat(64)).unwrap();
        assert!(token.matches(&"a".repeat(64)));
        assert!(!token.matches(&"b".repeat(64)));
    }
}
