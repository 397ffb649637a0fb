//! Signature verification against a key set snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

use jsonwebtoken::errors::ErrorKind;
use tracing::debug;

use super::set::KeySet;
use crate::error::IntrospectError;
use crate::token::ClaimSet;

/// Verifies token signatures.
///
/// Stateless apart from an attempt counter, which lets callers observe how
/// often the cryptographic path actually ran.
#[derive(Debug, Default)]
pub struct SignatureVerifier {
    attempts: AtomicU64,
}

impl SignatureVerifier {
    /// Creates a verifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Verifies the signature on `claims` using `keys`.
    ///
    /// # Errors
    ///
    /// - [`IntrospectError::UnknownKey`] if the `kid` is not in the set, or
    ///   the key is not trusted for the token's issuer.
    /// - [`IntrospectError::BadSignature`] if the token's algorithm differs
    ///   from the key's, or the signature does not verify.
    /// - [`IntrospectError::Malformed`] if the signature is not base64url.
    pub fn verify(&self, claims: &ClaimSet, keys: &KeySet) -> Result<(), IntrospectError> {
        self.attempts.fetch_add(1, Ordering::Relaxed);

        let Some(key) = keys.get(&claims.key_id) else {
            debug!(kid = %claims.key_id, generation = keys.generation(), "Unknown key id");
            return Err(IntrospectError::unknown_key(&claims.key_id));
        };

        if key.issuer() != claims.issuer {
            debug!(kid = %claims.key_id, "Key not trusted for token issuer");
            return Err(IntrospectError::unknown_key(&claims.key_id));
        }

        if key.algorithm() != claims.algorithm {
            debug!(
                kid = %claims.key_id,
                expected = %key.algorithm(),
                actual = %claims.algorithm,
                "Algorithm mismatch"
            );
            return Err(IntrospectError::BadSignature);
        }

        match key.verify(claims.signing_input(), claims.signature()) {
            Ok(true) => Ok(()),
            Ok(false) => Err(IntrospectError::BadSignature),
            Err(e) if matches!(e.kind(), ErrorKind::Base64(_)) => Err(IntrospectError::malformed(
                format!("invalid signature encoding: {e}"),
            )),
            Err(e) => {
                debug!(kid = %claims.key_id, error = %e, "Key cannot verify this signature");
                Err(IntrospectError::BadSignature)
            }
        }
    }

    /// Number of verification attempts so far.
    #[must_use]
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use jsonwebtoken::{EncodingKey, crypto};
    use time::OffsetDateTime;

    use super::*;
    use crate::keys::VerificationKey;
    use crate::token::Algorithm;

    const SECRET: [u8; 32] = [42u8; 32];

    fn claims(kid: &str, issuer: &str, algorithm: Algorithm, input: &str) -> ClaimSet {
        let signature = crypto::sign(
            input.as_bytes(),
            &EncodingKey::from_secret(&SECRET),
            jsonwebtoken::Algorithm::HS256,
        )
        .unwrap();
        ClaimSet {
            subject: "svc-a".to_string(),
            scopes: BTreeSet::new(),
            issued_at: OffsetDateTime::UNIX_EPOCH,
            expires_at: OffsetDateTime::UNIX_EPOCH,
            issuer: issuer.to_string(),
            key_id: kid.to_string(),
            algorithm,
            jti: None,
            signature,
            signing_input: input.to_string(),
        }
    }

    fn keys() -> KeySet {
        KeySet::new([VerificationKey::hmac("k1", "iss-a", Algorithm::HS256, SECRET).unwrap()])
            .unwrap()
    }

    #[test]
    fn test_valid_signature() {
        let verifier = SignatureVerifier::new();
        assert!(verifier.verify(&claims("k1", "iss-a", Algorithm::HS256, "h.p"), &keys()).is_ok());
        assert_eq!(verifier.attempts(), 1);
    }

    #[test]
    fn test_unknown_kid() {
        let verifier = SignatureVerifier::new();
        let err = verifier
            .verify(&claims("k9", "iss-a", Algorithm::HS256, "h.p"), &keys())
            .unwrap_err();
        assert_eq!(err, IntrospectError::unknown_key("k9"));
    }

    #[test]
    fn test_issuer_not_trusted_for_key() {
        let verifier = SignatureVerifier::new();
        let err = verifier
            .verify(&claims("k1", "iss-b", Algorithm::HS256, "h.p"), &keys())
            .unwrap_err();
        assert!(matches!(err, IntrospectError::UnknownKey { .. }));
    }

    #[test]
    fn test_algorithm_confusion_rejected() {
        let verifier = SignatureVerifier::new();
        let err = verifier
            .verify(&claims("k1", "iss-a", Algorithm::HS384, "h.p"), &keys())
            .unwrap_err();
        assert_eq!(err, IntrospectError::BadSignature);
    }

    #[test]
    fn test_tampered_input() {
        let verifier = SignatureVerifier::new();
        let mut tampered = claims("k1", "iss-a", Algorithm::HS256, "h.p");
        tampered.signing_input = "h.q".to_string();
        assert_eq!(
            verifier.verify(&tampered, &keys()).unwrap_err(),
            IntrospectError::BadSignature
        );
        assert_eq!(verifier.attempts(), 1);
    }

    #[test]
    fn test_undecodable_signature_is_malformed() {
        let verifier = SignatureVerifier::new();
        let mut garbled = claims("k1", "iss-a", Algorithm::HS256, "h.p");
        garbled.signature = "%%".to_string();
        assert!(matches!(
            verifier.verify(&garbled, &keys()),
            Err(IntrospectError::Malformed { .. })
        ));
    }
}
