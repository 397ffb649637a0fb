//! Introspection results and their wire representation.
//!
//! [`IntrospectionResult`] is what the engine decides; [`IntrospectionResponse`]
//! is the JSON body an HTTP collaborator returns for it. Inactive results
//! serialize to `{"active":false}` only, so callers never learn why a token
//! was rejected.

use std::collections::BTreeSet;

use serde::Serialize;
use time::OffsetDateTime;

use crate::token::ClaimSet;

/// Why a token is (or is not) active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntrospectionReason {
    /// Signed by a trusted key, unexpired, not revoked.
    Valid,
    /// Signature and structure are fine but `exp` has passed.
    Expired,
    /// The token could not be parsed.
    Malformed,
    /// Signature check failed or the key is not trusted.
    BadSignature,
    /// The token id has been revoked.
    Revoked,
    /// Evaluation did not finish in time.
    Timeout,
}

impl IntrospectionReason {
    /// Returns the reason as used in logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Expired => "expired",
            Self::Malformed => "malformed",
            Self::BadSignature => "bad-signature",
            Self::Revoked => "revoked",
            Self::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for IntrospectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of introspecting one token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntrospectionResult {
    /// Whether the token is currently active.
    pub active: bool,
    /// Granted scopes. Empty when inactive.
    pub scopes: BTreeSet<String>,
    /// Token expiry. Set only when active.
    pub expires_at: Option<OffsetDateTime>,
    /// Decision reason.
    pub reason: IntrospectionReason,
    /// Subject of an active token.
    pub subject: Option<String>,
    /// Issuer of an active token.
    pub issuer: Option<String>,
    /// Issue time of an active token.
    pub issued_at: Option<OffsetDateTime>,
    /// Token id, if the token carried one.
    pub jti: Option<String>,
}

impl IntrospectionResult {
    /// Creates an active result from verified claims.
    #[must_use]
    pub fn active(claims: &ClaimSet) -> Self {
        Self {
            active: true,
            scopes: claims.scopes.clone(),
            expires_at: Some(claims.expires_at),
            reason: IntrospectionReason::Valid,
            subject: Some(claims.subject.clone()),
            issuer: Some(claims.issuer.clone()),
            issued_at: Some(claims.issued_at),
            jti: claims.jti.clone(),
        }
    }

    /// Creates an inactive result.
    ///
    /// # Panics
    ///
    /// Debug builds assert that `reason` is not [`IntrospectionReason::Valid`].
    #[must_use]
    pub fn inactive(reason: IntrospectionReason) -> Self {
        debug_assert_ne!(reason, IntrospectionReason::Valid);
        Self {
            active: false,
            scopes: BTreeSet::new(),
            expires_at: None,
            reason,
            subject: None,
            issuer: None,
            issued_at: None,
            jti: None,
        }
    }

    /// Inactive result that still remembers the token id, so revocation can
    /// purge it from the cache.
    #[must_use]
    pub(crate) fn inactive_with_jti(reason: IntrospectionReason, jti: Option<String>) -> Self {
        Self {
            jti,
            ..Self::inactive(reason)
        }
    }
}

/// JSON body for an introspection response.
#[derive(Debug, Clone, Serialize, Default, PartialEq, Eq)]
pub struct IntrospectionResponse {
    /// Whether the token is currently active.
    pub active: bool,

    /// Granted scopes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,

    /// Expiration time (Unix timestamp).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    /// Subject identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Issuer of the token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Issued at time (Unix timestamp).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// JWT ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

impl IntrospectionResponse {
    /// Creates an inactive response.
    #[must_use]
    pub fn inactive() -> Self {
        Self::default()
    }
}

impl From<&IntrospectionResult> for IntrospectionResponse {
    fn from(result: &IntrospectionResult) -> Self {
        if !result.active {
            return Self::inactive();
        }

        Self {
            active: true,
            scopes: Some(result.scopes.iter().cloned().collect()),
            exp: result.expires_at.map(OffsetDateTime::unix_timestamp),
            sub: result.subject.clone(),
            iss: result.issuer.clone(),
            iat: result.issued_at.map(OffsetDateTime::unix_timestamp),
            jti: result.jti.clone(),
        }
    }
}
