//! The introspection engine.
//!
//! Orchestrates codec, verifier, revocation store and cache to answer one
//! question: is this token active, and with what scopes and expiry?
//!
//! Decisions and how long they are cached:
//!
//! | Outcome        | Cached for                                         |
//! |----------------|----------------------------------------------------|
//! | valid          | `min(max_cache_ttl, time until exp)`               |
//! | malformed      | `negative_cache_ttl` (not at all if empty/oversized) |
//! | bad-signature  | `negative_cache_ttl`                               |
//! | expired        | `expired_cache_ttl`                                |
//! | revoked        | `min(max_cache_ttl, time until exp)`, at least `negative_cache_ttl` |
//! | timeout        | never                                              |

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tracing::{debug, error, info, instrument, warn};

use crate::cache::{FlightError, IntrospectionCache, SweeperHandle, spawn_sweeper};
use crate::config::IntrospectionConfig;
use crate::error::IntrospectError;
use crate::keys::{KeySet, KeyStore, SignatureVerifier};
use crate::result::{IntrospectionReason, IntrospectionResult};
use crate::revocation::{InMemoryRevocationStore, RevocationError, RevocationStore};
use crate::token::{ClaimSet, Fingerprint, TokenCodec};
use crate::AuthResult;

/// Answers introspection requests.
///
/// Cheap to clone; clones share keys, cache and counters.
#[derive(Clone)]
pub struct IntrospectionEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: IntrospectionConfig,
    codec: TokenCodec,
    keys: Arc<KeyStore>,
    verifier: SignatureVerifier,
    cache: Arc<IntrospectionCache>,
    revocations: Arc<dyn RevocationStore>,
}

impl std::fmt::Debug for IntrospectionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntrospectionEngine")
            .field("config", &self.inner.config)
            .field("key_generation", &self.inner.keys.generation())
            .field("verifications", &self.inner.verifier.attempts())
            .field("cache", &self.inner.cache)
            .finish_non_exhaustive()
    }
}

impl IntrospectionEngine {
    /// Creates an engine with an in-memory revocation store.
    #[must_use]
    pub fn new(config: IntrospectionConfig, keys: Arc<KeyStore>) -> Self {
        Self::with_revocation_store(config, keys, Arc::new(InMemoryRevocationStore::new()))
    }

    /// Creates an engine backed by `revocations`.
    #[must_use]
    pub fn with_revocation_store(
        config: IntrospectionConfig,
        keys: Arc<KeyStore>,
        revocations: Arc<dyn RevocationStore>,
    ) -> Self {
        let cache = Arc::new(IntrospectionCache::from_config(&config.cache));
        Self {
            inner: Arc::new(EngineInner {
                codec: TokenCodec::new(config.max_token_bytes),
                config,
                keys,
                verifier: SignatureVerifier::new(),
                cache,
                revocations,
            }),
        }
    }

    /// Introspects a bearer token.
    ///
    /// Every property of the token itself is reported as an inactive result;
    /// the only error is the absence of any key material.
    ///
    /// # Errors
    ///
    /// Returns [`IntrospectError::NoKeyMaterial`] if no keys are loaded.
    #[instrument(skip_all, fields(fingerprint = tracing::field::Empty))]
    pub async fn introspect(&self, token: &str) -> AuthResult<IntrospectionResult> {
        let keys = self.inner.keys.snapshot();
        if keys.is_empty() {
            warn!("Introspection requested with no key material loaded");
            return Err(IntrospectError::NoKeyMaterial);
        }

        if let Err(e) = self.inner.codec.check_size(token) {
            debug!(error = %e, "Rejected token before decoding");
            return Ok(IntrospectionResult::inactive(IntrospectionReason::Malformed));
        }

        let fingerprint = Fingerprint::of(token);
        tracing::Span::current().record("fingerprint", tracing::field::display(fingerprint));

        // Read before the lookup so a purge that lands during evaluation
        // keeps the result out of the cache.
        let epoch = self.inner.cache.epoch();
        if let Some(hit) = self.inner.cached(&fingerprint, &keys) {
            debug!(reason = %hit.reason, "Cache hit");
            return Ok(hit);
        }

        let inner = Arc::clone(&self.inner);
        let token = token.to_string();
        let generation = keys.generation();
        let outcome = self
            .inner
            .cache
            .coalesce(
                fingerprint,
                generation,
                epoch,
                self.inner.config.verification_timeout,
                move || async move { inner.evaluate_and_store(&token, fingerprint, keys, epoch).await },
            )
            .await;

        match outcome {
            Ok(result) => Ok(result),
            Err(FlightError::Timeout) => {
                warn!(
                    timeout_ms = self.inner.config.verification_timeout.as_millis() as u64,
                    "Introspection timed out"
                );
                Ok(IntrospectionResult::inactive(IntrospectionReason::Timeout))
            }
            Err(FlightError::Abandoned) => {
                error!("Introspection evaluation was abandoned");
                Ok(IntrospectionResult::inactive(IntrospectionReason::Timeout))
            }
        }
    }

    /// Returns `true` once at least one verification key is loaded.
    #[must_use]
    pub fn ready(&self) -> bool {
        self.inner.keys.is_loaded()
    }

    /// Revokes a token id until `expires_at` and drops every cached result
    /// carrying it. Returns the number of cache entries dropped.
    ///
    /// Evaluations still running when this returns do not cache their result,
    /// and later callers start a fresh evaluation instead of joining them.
    ///
    /// # Errors
    ///
    /// Returns an error if the revocation store fails.
    pub async fn revoke(
        &self,
        jti: &str,
        expires_at: OffsetDateTime,
    ) -> Result<usize, RevocationError> {
        self.inner.revocations.revoke(jti, expires_at).await?;
        let purged = self
            .inner
            .cache
            .purge_where(|entry| entry.result.jti.as_deref() == Some(jti));
        info!(jti = %jti, purged, "Token revoked");
        Ok(purged)
    }

    /// Number of signature verifications performed so far.
    #[must_use]
    pub fn verification_count(&self) -> u64 {
        self.inner.verifier.attempts()
    }

    /// The key store this engine verifies against.
    #[must_use]
    pub fn keys(&self) -> &Arc<KeyStore> {
        &self.inner.keys
    }

    /// The result cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<IntrospectionCache> {
        &self.inner.cache
    }

    /// The revocation store.
    #[must_use]
    pub fn revocations(&self) -> &Arc<dyn RevocationStore> {
        &self.inner.revocations
    }

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &IntrospectionConfig {
        &self.inner.config
    }

    /// Starts the background sweeper at the configured interval.
    ///
    /// Each pass drops expired cache entries and revocation records for
    /// tokens that have expired on their own.
    pub fn start_sweeper(&self) -> SweeperHandle {
        spawn_sweeper(
            Arc::downgrade(&self.inner),
            self.inner.config.cache.sweep_interval,
            |inner: Arc<EngineInner>| async move { inner.sweep().await },
        )
    }
}

impl EngineInner {
    async fn sweep(&self) {
        self.cache.sweep_expired();
        match self.revocations.cleanup_expired().await {
            Ok(0) => {}
            Ok(deleted) => debug!(deleted, "Dropped expired revocation records"),
            Err(e) => warn!(error = %e, "Revocation cleanup failed"),
        }
    }

    /// A cached result usable under `keys`, if any.
    fn cached(&self, fingerprint: &Fingerprint, keys: &KeySet) -> Option<IntrospectionResult> {
        let hit = self.cache.lookup(fingerprint, keys.generation())?;
        // The entry TTL is computed from a slightly earlier clock reading.
        if hit.active && hit.expires_at.is_some_and(|exp| exp <= OffsetDateTime::now_utc()) {
            self.cache.remove(fingerprint);
            return None;
        }
        Some(hit)
    }

    async fn evaluate_and_store(
        &self,
        token: &str,
        fingerprint: Fingerprint,
        keys: Arc<KeySet>,
        epoch: u64,
    ) -> IntrospectionResult {
        // A flight that finished just before this one started may have
        // stored the answer already.
        if let Some(hit) = self.cached(&fingerprint, &keys) {
            return hit;
        }

        let (result, ttl) = self.evaluate(token, &keys).await;
        debug!(
            fingerprint = %fingerprint,
            reason = %result.reason,
            ttl_ms = ttl.map(|t| t.as_millis() as u64),
            "Token evaluated"
        );
        if let Some(ttl) = ttl {
            let stored =
                self.cache
                    .put_if_current(fingerprint, result.clone(), ttl, keys.generation(), epoch);
            if !stored {
                debug!(fingerprint = %fingerprint, "Result superseded while evaluating; not cached");
            }
        }
        result
    }

    /// Decides a result and how long it may be cached.
    async fn evaluate(
        &self,
        token: &str,
        keys: &KeySet,
    ) -> (IntrospectionResult, Option<Duration>) {
        let negative = Some(self.config.negative_cache_ttl);

        let claims = match self.codec.parse(token) {
            Ok(claims) => claims,
            Err(e) => {
                debug!(error = %e, "Malformed token");
                return (inactive(&e), negative);
            }
        };

        if let Err(e) = self.verifier.verify(&claims, keys) {
            debug!(error = %e, kid = %claims.key_id, "Signature rejected");
            return (inactive(&e), negative);
        }

        let now = OffsetDateTime::now_utc();
        if claims.is_expired_at(now) {
            return (
                inactive(&IntrospectError::Expired),
                Some(self.config.expired_cache_ttl),
            );
        }

        let remaining = remaining_lifetime(&claims, now);
        if let Some(jti) = &claims.jti {
            match self.revocations.is_revoked(jti).await {
                Ok(false) => {}
                Ok(true) => {
                    let ttl = remaining
                        .min(self.config.max_cache_ttl)
                        .max(self.config.negative_cache_ttl);
                    return (
                        IntrospectionResult::inactive_with_jti(
                            IntrospectionReason::Revoked,
                            Some(jti.clone()),
                        ),
                        Some(ttl),
                    );
                }
                Err(e) => {
                    warn!(error = %e, "Revocation check failed");
                    return (inactive(&IntrospectError::Timeout), None);
                }
            }
        }

        // Re-read the clock: the revocation lookup may have taken a while.
        if claims.is_expired_at(OffsetDateTime::now_utc()) {
            return (
                inactive(&IntrospectError::Expired),
                Some(self.config.expired_cache_ttl),
            );
        }

        (
            IntrospectionResult::active(&claims),
            Some(remaining.min(self.config.max_cache_ttl)),
        )
    }
}

fn inactive(error: &IntrospectError) -> IntrospectionResult {
    IntrospectionResult::inactive(error.inactive_reason().unwrap_or(IntrospectionReason::Timeout))
}

fn remaining_lifetime(claims: &ClaimSet, now: OffsetDateTime) -> Duration {
    (claims.expires_at - now).try_into().unwrap_or(Duration::ZERO)
}
