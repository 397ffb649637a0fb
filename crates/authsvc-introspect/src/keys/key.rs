//! Verification keys.

use std::fmt;

use jsonwebtoken::{AlgorithmFamily, DecodingKey, crypto};

use crate::error::KeyError;
use crate::token::Algorithm;

/// Minimum length of a shared HMAC secret in bytes.
pub const MIN_HMAC_SECRET_BYTES: usize = 32;

/// A key trusted to verify tokens from one issuer with one algorithm.
pub struct VerificationKey {
    kid: String,
    issuer: String,
    algorithm: Algorithm,
    decoding: DecodingKey,
}

impl VerificationKey {
    /// Binds decoded key material to a key id, issuer and algorithm.
    ///
    /// # Errors
    ///
    /// Fails if the key belongs to another algorithm family than
    /// `algorithm`, or an HMAC secret is shorter than
    /// [`MIN_HMAC_SECRET_BYTES`].
    pub fn new(
        kid: impl Into<String>,
        issuer: impl Into<String>,
        algorithm: Algorithm,
        decoding: DecodingKey,
    ) -> Result<Self, KeyError> {
        let kid = kid.into();
        let family = jsonwebtoken::Algorithm::from(algorithm).family();
        if decoding.family() != family {
            return Err(KeyError::invalid_key(
                kid,
                format!("key material does not match algorithm {algorithm}"),
            ));
        }
        if family == AlgorithmFamily::Hmac {
            let long_enough = decoding
                .try_get_hmac_secret()
                .is_ok_and(|secret| secret.len() >= MIN_HMAC_SECRET_BYTES);
            if !long_enough {
                return Err(KeyError::invalid_key(
                    kid,
                    format!("secret must be at least {MIN_HMAC_SECRET_BYTES} bytes"),
                ));
            }
        }
        Ok(Self {
            kid,
            issuer: issuer.into(),
            algorithm,
            decoding,
        })
    }

    /// Creates an HMAC key from a shared secret.
    ///
    /// # Errors
    ///
    /// Fails if `algorithm` is not HMAC-based or the secret is shorter than
    /// [`MIN_HMAC_SECRET_BYTES`].
    pub fn hmac(
        kid: impl Into<String>,
        issuer: impl Into<String>,
        algorithm: Algorithm,
        secret: impl AsRef<[u8]>,
    ) -> Result<Self, KeyError> {
        Self::new(kid, issuer, algorithm, DecodingKey::from_secret(secret.as_ref()))
    }

    /// Creates an asymmetric key from a PEM-encoded public key.
    ///
    /// RSA keys may be SPKI (`PUBLIC KEY`) or PKCS#1 (`RSA PUBLIC KEY`);
    /// EC keys must be SPKI.
    ///
    /// # Errors
    ///
    /// Fails if the PEM does not decode to a key matching `algorithm`.
    pub fn from_public_pem(
        kid: impl Into<String>,
        issuer: impl Into<String>,
        algorithm: Algorithm,
        pem: &str,
    ) -> Result<Self, KeyError> {
        let kid = kid.into();
        let decoded = if algorithm.is_rsa() {
            DecodingKey::from_rsa_pem(pem.as_bytes())
        } else if algorithm.is_ec() {
            DecodingKey::from_ec_pem(pem.as_bytes())
        } else {
            return Err(KeyError::invalid_key(
                kid,
                format!("algorithm {algorithm} does not take a public key"),
            ));
        };
        let decoding = decoded.map_err(|e| {
            KeyError::invalid_key(&kid, format!("invalid {algorithm} public key: {e}"))
        })?;
        Self::new(kid, issuer, algorithm, decoding)
    }

    /// Key ID.
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Issuer this key is trusted for.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Algorithm this key verifies.
    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Checks the base64url `signature` over `message`.
    ///
    /// Returns `Ok(false)` for a well-formed signature that does not match.
    pub(crate) fn verify(
        &self,
        message: &[u8],
        signature: &str,
    ) -> jsonwebtoken::errors::Result<bool> {
        crypto::verify(signature, message, &self.decoding, self.algorithm.into())
    }
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationKey")
            .field("kid", &self.kid)
            .field("issuer", &self.issuer)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::EncodingKey;

    use super::*;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    #[test]
    fn test_hmac_roundtrip() {
        let key = VerificationKey::hmac("k1", "iss", Algorithm::HS256, SECRET).unwrap();
        let tag = crypto::sign(
            b"header.payload",
            &EncodingKey::from_secret(SECRET),
            jsonwebtoken::Algorithm::HS256,
        )
        .unwrap();

        assert_eq!(key.verify(b"header.payload", &tag), Ok(true));
        assert_eq!(key.verify(b"header.payload2", &tag), Ok(false));
        assert_eq!(key.verify(b"header.payload", &tag[..16]), Ok(false));
        assert!(key.verify(b"header.payload", "%%").is_err());
    }

    #[test]
    fn test_hmac_rejects_short_secret() {
        let err = VerificationKey::hmac("k1", "iss", Algorithm::HS256, b"short").unwrap_err();
        assert!(matches!(err, KeyError::InvalidKey { .. }));
    }

    #[test]
    fn test_hmac_rejects_asymmetric_algorithm() {
        assert!(VerificationKey::hmac("k1", "iss", Algorithm::RS256, SECRET).is_err());
    }

    #[test]
    fn test_family_must_match_algorithm() {
        let rsa = DecodingKey::from_rsa_components("AQAB", "AQAB").unwrap();
        assert!(VerificationKey::new("k1", "iss", Algorithm::ES384, rsa).is_err());
    }

    #[test]
    fn test_pem_rejects_hmac_algorithm() {
        assert!(VerificationKey::from_public_pem("k1", "iss", Algorithm::HS256, "").is_err());
    }

    #[test]
    fn test_pem_rejects_garbage() {
        let err =
            VerificationKey::from_public_pem("k1", "iss", Algorithm::RS256, "not a pem").unwrap_err();
        assert!(err.to_string().contains("k1"));
    }

    #[test]
    fn test_debug_hides_material() {
        let key = VerificationKey::hmac("k1", "iss", Algorithm::HS256, SECRET).unwrap();
        let debug = format!("{key:?}");
        assert!(debug.contains("k1"));
        assert!(!debug.contains("0123456789abcdef"));
    }
}
