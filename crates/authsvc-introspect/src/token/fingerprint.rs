//! Token fingerprints.

use std::fmt;

use sha2::{Digest, Sha256};

/// SHA-256 digest of a raw bearer token.
///
/// Used as the cache and single-flight key so the token itself is never
/// stored. Formatting shows only a short hex prefix, which is what ends up
/// in log fields.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Bytes shown by `Display`.
    const SHORT_LEN: usize = 8;

    /// Hashes a raw token.
    #[must_use]
    pub fn of(token: &str) -> Self {
        Self(Sha256::digest(token.as_bytes()).into())
    }

    /// Full digest bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Shard index for a cache with `shards` shards.
    pub(crate) fn shard(&self, shards: usize) -> usize {
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&self.0[..8]);
        (u64::from_le_bytes(prefix) % shards.max(1) as u64) as usize
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0[..Self::SHORT_LEN]))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(Fingerprint::of("abc"), Fingerprint::of("abc"));
        assert_ne!(Fingerprint::of("abc"), Fingerprint::of("abd"));
    }

    #[test]
    fn test_display_is_short_prefix() {
        // SHA-256("abc") = ba7816bf8f01cfea...
        let fp = Fingerprint::of("abc");
        assert_eq!(fp.to_string(), "ba7816bf8f01cfea");
        assert_eq!(format!("{fp:?}"), "Fingerprint(ba7816bf8f01cfea)");
    }

    #[test]
    fn test_display_never_contains_token() {
        let token = "eyJhbGciOiJIUzI1NiJ9.secret-payload.sig";
        let fp = Fingerprint::of(token);
        assert!(!format!("{fp} {fp:?}").contains("secret-payload"));
    }

    #[test]
    fn test_shard_in_range() {
        for i in 0..100 {
            let fp = Fingerprint::of(&format!("token-{i}"));
            assert!(fp.shard(16) < 16);
            assert_eq!(fp.shard(1), 0);
        }
    }
}
