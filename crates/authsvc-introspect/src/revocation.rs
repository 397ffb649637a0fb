//! Token revocation by `jti`.
//!
//! A revocation record only needs to live until the token would have expired
//! on its own; after that the expiry check rejects the token anyway.

use async_trait::async_trait;
use dashmap::DashMap;
use time::OffsetDateTime;
use tracing::debug;

/// Errors raised by a revocation backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RevocationError {
    /// The backend could not answer.
    #[error("Revocation store unavailable: {0}")]
    Unavailable(String),
}

/// Storage for revoked token ids.
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Marks `jti` as revoked until `expires_at`.
    ///
    /// Revoking an already revoked id succeeds.
    async fn revoke(&self, jti: &str, expires_at: OffsetDateTime) -> Result<(), RevocationError>;

    /// Returns `true` if `jti` has been revoked.
    ///
    /// Called for every token that is otherwise valid, so it should be fast.
    async fn is_revoked(&self, jti: &str) -> Result<bool, RevocationError>;

    /// Deletes records for tokens that have expired. Returns how many were deleted.
    async fn cleanup_expired(&self) -> Result<u64, RevocationError>;
}

/// Process-local revocation store.
#[derive(Debug, Default)]
pub struct InMemoryRevocationStore {
    revoked: DashMap<String, OffsetDateTime>,
}

impl InMemoryRevocationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.revoked.len()
    }

    /// Returns `true` if nothing is revoked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.revoked.is_empty()
    }
}

#[async_trait]
impl RevocationStore for InMemoryRevocationStore {
    async fn revoke(&self, jti: &str, expires_at: OffsetDateTime) -> Result<(), RevocationError> {
        self.revoked
            .entry(jti.to_string())
            .and_modify(|current| *current = (*current).max(expires_at))
            .or_insert(expires_at);
        Ok(())
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool, RevocationError> {
        Ok(self.revoked.contains_key(jti))
    }

    async fn cleanup_expired(&self) -> Result<u64, RevocationError> {
        let now = OffsetDateTime::now_utc();
        let before = self.revoked.len();
        self.revoked.retain(|_, expires_at| *expires_at > now);
        let deleted = before.saturating_sub(self.revoked.len()) as u64;
        if deleted > 0 {
            debug!(deleted, "Cleaned up expired revocation records");
        }
        Ok(deleted)
    }
}
