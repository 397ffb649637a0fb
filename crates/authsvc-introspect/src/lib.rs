//! # authsvc-introspect
//!
//! Bearer token introspection core.
//!
//! This crate decides whether a bearer token is active and with which scopes
//! and expiry. It has no HTTP surface; the `authsvc-server` crate wraps it.
//!
//! ## Overview
//!
//! A request flows through the [`IntrospectionEngine`]:
//!
//! 1. the token is size-checked and fingerprinted (SHA-256, never stored raw)
//! 2. a cached decision for the fingerprint is served if one is live
//! 3. otherwise one evaluation per fingerprint runs: parse, verify the
//!    signature against the current key set, check expiry and revocation
//! 4. the decision is cached with a TTL that depends on the outcome
//!
//! ## Modules
//!
//! - [`token`] - Compact JWS parsing and fingerprints
//! - [`keys`] - Verification keys, rotation and signature checks
//! - [`cache`] - Sharded TTL/LRU result cache with single-flight coalescing
//! - [`engine`] - The introspection engine
//! - [`revocation`] - Revocation by token id
//! - [`config`] - Engine configuration
//! - [`error`] - Error types

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod keys;
pub mod result;
pub mod revocation;
pub mod token;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use cache::{CacheConfig, CacheEntry, CacheStatsSnapshot, IntrospectionCache, SweeperHandle};
pub use config::{ConfigError, IntrospectionConfig};
pub use engine::IntrospectionEngine;
pub use error::{IntrospectError, KeyError};
pub use keys::{KeySet, KeyStore, KeysConfig, SignatureVerifier, VerificationKey, load_key_set};
pub use result::{IntrospectionReason, IntrospectionResponse, IntrospectionResult};
pub use revocation::{InMemoryRevocationStore, RevocationError, RevocationStore};
pub use token::{Algorithm, ClaimSet, Fingerprint, TokenCodec};

/// Type alias for introspection results.
pub type AuthResult<T> = Result<T, IntrospectError>;
