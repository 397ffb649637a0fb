//! Introspection error types.
//!
//! Every failure the decision core can observe is an [`IntrospectError`].
//! All variants except [`IntrospectError::NoKeyMaterial`] are recovered by the
//! engine into an inactive [`IntrospectionResult`](crate::IntrospectionResult);
//! `NoKeyMaterial` means the service cannot evaluate tokens at all.

use crate::result::IntrospectionReason;

/// Errors produced while evaluating a token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntrospectError {
    /// The token is structurally invalid.
    #[error("Malformed token: {message}")]
    Malformed {
        /// Description of the structural problem.
        message: String,
    },

    /// The signature does not verify against the referenced key.
    #[error("Invalid signature")]
    BadSignature,

    /// The referenced key is not part of the trusted key set.
    #[error("Unknown key: {kid}")]
    UnknownKey {
        /// The key ID carried by the token.
        kid: String,
    },

    /// The token's expiry is not in the future.
    #[error("Token expired")]
    Expired,

    /// The token has been explicitly revoked.
    #[error("Token revoked")]
    Revoked,

    /// Evaluation did not complete within the verification timeout.
    #[error("Verification timed out")]
    Timeout,

    /// No verification keys are loaded.
    #[error("No key material loaded")]
    NoKeyMaterial,
}

impl IntrospectError {
    /// Creates a new `Malformed` error.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Creates a new `UnknownKey` error.
    #[must_use]
    pub fn unknown_key(kid: impl Into<String>) -> Self {
        Self::UnknownKey { kid: kid.into() }
    }

    /// Returns `true` for the one condition that is not a property of the token.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::NoKeyMaterial)
    }

    /// Maps the error to the inactive reason reported to callers.
    ///
    /// Returns `None` for [`IntrospectError::NoKeyMaterial`].
    #[must_use]
    pub fn inactive_reason(&self) -> Option<IntrospectionReason> {
        match self {
            Self::Malformed { .. } => Some(IntrospectionReason::Malformed),
            Self::BadSignature | Self::UnknownKey { .. } => Some(IntrospectionReason::BadSignature),
            Self::Expired => Some(IntrospectionReason::Expired),
            Self::Revoked => Some(IntrospectionReason::Revoked),
            Self::Timeout => Some(IntrospectionReason::Timeout),
            Self::NoKeyMaterial => None,
        }
    }
}

/// Errors raised while loading verification keys.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    /// The key entry is missing material or carries more than one kind.
    #[error("Invalid key '{kid}': {message}")]
    InvalidKey {
        /// Key ID of the offending entry.
        kid: String,
        /// What is wrong with it.
        message: String,
    },

    /// The algorithm name is not supported.
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Two entries share the same key ID.
    #[error("Duplicate key id: {0}")]
    DuplicateKid(String),

    /// A key file could not be read.
    #[error("Failed to read key file {path}: {message}")]
    Io {
        /// Path of the file.
        path: String,
        /// Underlying I/O error.
        message: String,
    },

    /// A JWKS document could not be parsed.
    #[error("Failed to parse JWKS: {0}")]
    Jwks(String),
}

impl KeyError {
    /// Creates a new `InvalidKey` error.
    #[must_use]
    pub fn invalid_key(kid: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidKey {
            kid: kid.into(),
            message: message.into(),
        }
    }
}
