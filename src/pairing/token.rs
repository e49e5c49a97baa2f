//! Bearer token generation and digesting.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

/// Version tag prefixed to every issued token.
pub const TOKEN_PREFIX: &str = "tk_v1_";

/// Generate a fresh bearer token: 256 bits from `OsRng`, URL-safe base64,
/// version-tagged. Returns `(plaintext, digest)`; only the digest may be
/// stored.
pub fn generate_token() -> (String, String) {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    let plaintext = format!("{}{}", TOKEN_PREFIX, URL_SAFE_NO_PAD.encode(bytes));
    let digest = digest_token(&plaintext);
    (plaintext, digest)
}

/// SHA-256 digest of a presented token, hex-encoded. Lookups compare
/// digests, never plaintext.
pub fn digest_token(plaintext: &str) -> String {
    hex::encode(Sha256::digest(plaintext.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_has_version_prefix() {
        let (plaintext, _) = generate_token();
        assert!(plaintext.starts_with(TOKEN_PREFIX));
    }

    #[test]
    fn test_token_is_url_safe() {
        let (plaintext, _) = generate_token();
        let body = plaintext.strip_prefix(TOKEN_PREFIX).unwrap();
        assert!(body
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        // 32 bytes base64url without padding = 43 chars.
        assert_eq!(body.len(), 43);
    }

    #[test]
    fn test_tokens_are_unique() {
        let (t1, _) = generate_token();
        let (t2, _) = generate_token();
        assert_ne!(t1, t2);
    }

    #[test]
    fn test_digest_matches_plaintext() {
        let (plaintext, digest) = generate_token();
        assert_eq!(digest_token(&plaintext), digest);
        assert_eq!(digest.len(), 64);
    }

    #[test]
    fn test_digest_differs_for_different_tokens() {
        assert_ne!(digest_token("tk_v1_a"), digest_token("tk_v1_b"));
    }
}
