//! Parsed token claims.

use std::collections::BTreeSet;
use std::fmt;

use serde::Deserialize;
use time::OffsetDateTime;

use super::algorithm::Algorithm;

/// Claims extracted from a structurally valid token.
///
/// Immutable once parsed. The signature and signed bytes are kept so the
/// verifier can check them, but they never appear in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct ClaimSet {
    /// Subject (`sub`).
    pub subject: String,

    /// Granted scopes, deduplicated.
    pub scopes: BTreeSet<String>,

    /// Issue time (`iat`).
    pub issued_at: OffsetDateTime,

    /// Expiry (`exp`).
    pub expires_at: OffsetDateTime,

    /// Issuer (`iss`).
    pub issuer: String,

    /// Key ID from the header (`kid`).
    pub key_id: String,

    /// Signature algorithm from the header (`alg`).
    pub algorithm: Algorithm,

    /// Token ID (`jti`), if present.
    pub jti: Option<String>,

    pub(crate) signature: String,
    pub(crate) signing_input: String,
}

impl ClaimSet {
    /// The base64url signature segment.
    #[must_use]
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// The `header.payload` bytes the signature covers.
    #[must_use]
    pub fn signing_input(&self) -> &[u8] {
        self.signing_input.as_bytes()
    }

    /// Returns `true` if the token has expired at `now`.
    ///
    /// A token expiring exactly at `now` is expired.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at <= now
    }
}

impl fmt::Debug for ClaimSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClaimSet")
            .field("subject", &self.subject)
            .field("scopes", &self.scopes)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field("issuer", &self.issuer)
            .field("key_id", &self.key_id)
            .field("algorithm", &self.algorithm)
            .field("jti", &self.jti)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Wire representation
// ============================================================================

/// Payload claims as they appear on the wire.
#[derive(Debug, Deserialize)]
pub(crate) struct RawClaims {
    pub sub: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(default)]
    pub jti: Option<String>,
    #[serde(default, alias = "scopes", alias = "scp")]
    pub scope: Option<ScopeClaim>,
}

/// Scopes either as a space-delimited string or as an array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ScopeClaim {
    Delimited(String),
    List(Vec<String>),
}

impl ScopeClaim {
    pub fn into_set(self) -> BTreeSet<String> {
        match self {
            Self::Delimited(s) => s.split_whitespace().map(str::to_string).collect(),
            Self::List(items) => items
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }
}
