//! User namespace keys.
//!
//! Every place a user identifier maps onto an index name goes through
//! [`Namespace::for_user`], so sanitization is applied consistently.

use sha2::{Digest, Sha256};

/// Maximum length of a sanitized namespace key.
pub const MAX_KEY_LEN: usize = 45;

/// Sanitize a user identifier into an index name.
///
/// Lowercases, replaces every character outside `[a-z0-9-]` with `-` and
/// truncates to [`MAX_KEY_LEN`] characters.
pub fn sanitize_namespace_key(user_id: &str) -> String {
    user_id
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .take(MAX_KEY_LEN)
        .collect()
}

/// A user's namespace: the sanitized key plus the identifier it came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    key: String,
    owner: String,
}

impl Namespace {
    pub fn for_user(user_id: &str) -> Self {
        Self {
            key: sanitize_namespace_key(user_id),
            owner: user_id.to_string(),
        }
    }

    /// Sanitized index name.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Hex SHA-256 of the original identifier, stored alongside the index so
    /// two identifiers sanitizing to the same key can be told apart.
    pub fn owner_digest(&self) -> String {
        hex::encode(Sha256::digest(self.owner.as_bytes()))
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("alice", "alice")]
    #[case("Alice@Example.com", "alice-example-com")]
    #[case("user_42", "user-42")]
    #[case("already-clean-9", "already-clean-9")]
    #[case("", "")]
    #[case("ÜNÏCODE", "-n-code")]
    fn test_sanitize(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(sanitize_namespace_key(input), expected);
    }

    #[rstest]
    #[case("Alice@Example.com")]
    #[case("a very long identifier that keeps going well past the limit of the index")]
    #[case("ÜNÏCODE  spaces\tand\ttabs")]
    #[case("")]
    fn test_sanitize_idempotent_and_charset(#[case] input: &str) {
        let once = sanitize_namespace_key(input);
        assert_eq!(sanitize_namespace_key(&once), once);
        assert!(once.chars().count() <= MAX_KEY_LEN);
        assert!(once
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
    }

    #[test]
    fn test_truncates_to_max_len() {
        let long = "x".repeat(100);
        assert_eq!(sanitize_namespace_key(&long).len(), MAX_KEY_LEN);
    }

    #[test]
    fn test_colliding_identifiers_have_distinct_digests() {
        let a = Namespace::for_user("Sam.Smith");
        let b = Namespace::for_user("sam_smith");
        assert_eq!(a.key(), b.key());
        assert_ne!(a.owner_digest(), b.owner_digest());
        assert_eq!(a.owner_digest().len(), 64);
    }
}
