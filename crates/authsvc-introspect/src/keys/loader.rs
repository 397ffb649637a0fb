//! Loading verification keys from configuration.
//!
//! Keys come from two places:
//!
//! - inline `[[keys.keys]]` entries, each naming exactly one source of key
//!   material (`secret`, `secret_env`, `public_key_pem` or `public_key_file`)
//! - an optional JWKS document on disk, whose keys are all bound to one
//!   configured issuer
//!
//! # Example
//!
//! ```toml
//! [[keys.keys]]
//! kid = "2024-10"
//! issuer = "https://auth.example.com"
//! algorithm = "HS256"
//! secret_env = "AUTHSVC_HS256_SECRET"
//!
//! [keys.jwks_file]
//! path = "/etc/authsvc/jwks.json"
//! issuer = "https://auth.example.com"
//! watch = true
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use base64::{
    Engine,
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
};
use jsonwebtoken::DecodingKey;
use jsonwebtoken::jwk::{AlgorithmParameters, EllipticCurve, Jwk, JwkSet, PublicKeyUse};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::key::VerificationKey;
use super::set::KeySet;
use crate::error::KeyError;
use crate::token::Algorithm;

// ============================================================================
// Configuration
// ============================================================================

/// Key configuration section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    /// Inline key entries.
    pub keys: Vec<KeyConfig>,

    /// Optional JWKS document on disk.
    pub jwks_file: Option<JwksFileConfig>,
}

/// One inline key entry.
#[derive(Clone, Serialize, Deserialize)]
pub struct KeyConfig {
    /// Key ID matched against the token's `kid` header.
    pub kid: String,

    /// Issuer the key is trusted for.
    pub issuer: String,

    /// Algorithm name, e.g. `HS256` or `ES384`.
    pub algorithm: String,

    /// Base64-encoded shared secret (HMAC only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,

    /// Environment variable holding a base64-encoded shared secret.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_env: Option<String>,

    /// PEM-encoded public key (RSA or EC).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_pem: Option<String>,

    /// Path to a PEM-encoded public key file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_file: Option<PathBuf>,
}

impl fmt::Debug for KeyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyConfig")
            .field("kid", &self.kid)
            .field("issuer", &self.issuer)
            .field("algorithm", &self.algorithm)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("secret_env", &self.secret_env)
            .field("public_key_pem", &self.public_key_pem.is_some())
            .field("public_key_file", &self.public_key_file)
            .finish()
    }
}

/// JWKS file source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwksFileConfig {
    /// Path to the JWKS JSON document.
    pub path: PathBuf,

    /// Issuer every key in the document is trusted for.
    pub issuer: String,

    /// Reload the document when it changes on disk.
    #[serde(default)]
    pub watch: bool,
}

impl KeysConfig {
    /// Checks the shape of every entry without reading any key material.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), KeyError> {
        let mut seen = std::collections::HashSet::new();
        for entry in &self.keys {
            entry.validate()?;
            if !seen.insert(entry.kid.as_str()) {
                return Err(KeyError::DuplicateKid(entry.kid.clone()));
            }
        }
        if let Some(jwks) = &self.jwks_file {
            if jwks.issuer.is_empty() {
                return Err(KeyError::Jwks("jwks_file.issuer must not be empty".into()));
            }
            if jwks.path.as_os_str().is_empty() {
                return Err(KeyError::Jwks("jwks_file.path must not be empty".into()));
            }
        }
        Ok(())
    }

    /// Returns `true` if no key source is configured at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.jwks_file.is_none()
    }
}

impl KeyConfig {
    /// Checks that the entry names a supported algorithm and exactly one
    /// compatible material source.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidKey`] or [`KeyError::UnsupportedAlgorithm`].
    pub fn validate(&self) -> Result<(), KeyError> {
        if self.kid.is_empty() {
            return Err(KeyError::invalid_key("", "kid must not be empty"));
        }
        if self.issuer.is_empty() {
            return Err(KeyError::invalid_key(&self.kid, "issuer must not be empty"));
        }
        let algorithm = self.algorithm()?;

        let sources = [
            self.secret.is_some(),
            self.secret_env.is_some(),
            self.public_key_pem.is_some(),
            self.public_key_file.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count();
        if sources != 1 {
            return Err(KeyError::invalid_key(
                &self.kid,
                "exactly one of secret, secret_env, public_key_pem, public_key_file is required",
            ));
        }

        let symmetric = self.secret.is_some() || self.secret_env.is_some();
        if algorithm.is_hmac() != symmetric {
            return Err(KeyError::invalid_key(
                &self.kid,
                format!("key material does not match algorithm {algorithm}"),
            ));
        }
        Ok(())
    }

    fn algorithm(&self) -> Result<Algorithm, KeyError> {
        self.algorithm
            .parse()
            .map_err(|_| KeyError::UnsupportedAlgorithm(self.algorithm.clone()))
    }

    /// Resolves the entry into a verification key, reading files and
    /// environment variables as needed.
    ///
    /// # Errors
    ///
    /// Fails if the entry is invalid or its material cannot be read or decoded.
    pub fn load(&self) -> Result<VerificationKey, KeyError> {
        self.validate()?;
        let algorithm = self.algorithm()?;

        if let Some(secret) = &self.secret {
            return VerificationKey::hmac(
                &self.kid,
                &self.issuer,
                algorithm,
                decode_secret(&self.kid, secret)?,
            );
        }
        if let Some(var) = &self.secret_env {
            let secret = std::env::var(var).map_err(|_| {
                KeyError::invalid_key(&self.kid, format!("environment variable {var} is not set"))
            })?;
            return VerificationKey::hmac(
                &self.kid,
                &self.issuer,
                algorithm,
                decode_secret(&self.kid, &secret)?,
            );
        }
        if let Some(pem) = &self.public_key_pem {
            return VerificationKey::from_public_pem(&self.kid, &self.issuer, algorithm, pem);
        }
        if let Some(path) = &self.public_key_file {
            let pem = read_file(path)?;
            return VerificationKey::from_public_pem(&self.kid, &self.issuer, algorithm, &pem);
        }
        Err(KeyError::invalid_key(&self.kid, "no key material"))
    }
}

fn decode_secret(kid: &str, encoded: &str) -> Result<Vec<u8>, KeyError> {
    let trimmed = encoded.trim();
    STANDARD
        .decode(trimmed)
        .or_else(|_| URL_SAFE_NO_PAD.decode(trimmed))
        .map_err(|e| KeyError::invalid_key(kid, format!("secret is not valid base64: {e}")))
}

fn read_file(path: &Path) -> Result<String, KeyError> {
    std::fs::read_to_string(path).map_err(|e| KeyError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

// ============================================================================
// JWKS
// ============================================================================

/// Converts a JWK into a verification key bound to `issuer`.
///
/// Returns `Ok(None)` for keys that cannot be used here: encryption keys,
/// unsupported key types, curves and algorithms. A JWK without `alg` gets
/// the default algorithm for its key type.
///
/// # Errors
///
/// Fails if a supported key has no `kid` or carries invalid members.
pub fn jwk_to_key(jwk: &Jwk, issuer: &str) -> Result<Option<VerificationKey>, KeyError> {
    if matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)) {
        debug!(kid = ?jwk.common.key_id, "Skipping encryption key");
        return Ok(None);
    }
    let Some(kid) = jwk.common.key_id.as_deref().filter(|k| !k.is_empty()) else {
        return Err(KeyError::Jwks("key without kid".into()));
    };

    let algorithm = match (&jwk.algorithm, jwk.common.key_algorithm) {
        (_, Some(alg)) => match alg.to_string().parse::<Algorithm>() {
            Ok(algorithm) => algorithm,
            Err(_) => {
                warn!(kid, %alg, "Skipping key with unsupported algorithm");
                return Ok(None);
            }
        },
        (AlgorithmParameters::OctetKey(_), None) => Algorithm::HS256,
        (AlgorithmParameters::RSA(_), None) => Algorithm::RS256,
        (AlgorithmParameters::EllipticCurve(_), None) => Algorithm::ES384,
        (AlgorithmParameters::OctetKeyPair(_), None) => {
            warn!(kid, "Skipping key with unsupported type");
            return Ok(None);
        }
    };

    if let AlgorithmParameters::EllipticCurve(params) = &jwk.algorithm
        && params.curve != EllipticCurve::P384
    {
        warn!(kid, crv = ?params.curve, "Skipping EC key on unsupported curve");
        return Ok(None);
    }

    let decoding = DecodingKey::from_jwk(jwk)
        .map_err(|e| KeyError::invalid_key(kid, format!("invalid key members: {e}")))?;
    VerificationKey::new(kid, issuer, algorithm, decoding).map(Some)
}

/// Parses a JWKS document, binding every usable key to `issuer`.
///
/// # Errors
///
/// Fails if the document is not valid JSON or a usable key is invalid.
pub fn parse_jwks(json: &str, issuer: &str) -> Result<Vec<VerificationKey>, KeyError> {
    let jwks: JwkSet = serde_json::from_str(json).map_err(|e| KeyError::Jwks(e.to_string()))?;
    let mut keys = Vec::with_capacity(jwks.keys.len());
    for jwk in &jwks.keys {
        if let Some(key) = jwk_to_key(jwk, issuer)? {
            keys.push(key);
        }
    }
    Ok(keys)
}

/// Reads and parses the configured JWKS file.
///
/// # Errors
///
/// Fails if the file cannot be read or parsed.
pub fn read_jwks_file(config: &JwksFileConfig) -> Result<Vec<VerificationKey>, KeyError> {
    let json = read_file(&config.path)?;
    let keys = parse_jwks(&json, &config.issuer)?;
    debug!(path = %config.path.display(), keys = keys.len(), "Parsed JWKS file");
    Ok(keys)
}

/// Builds a key set from every configured source.
///
/// An empty result is not an error here; the engine reports it as missing
/// key material.
///
/// # Errors
///
/// Fails on the first invalid entry, unreadable file or duplicate key id.
pub fn load_key_set(config: &KeysConfig) -> Result<KeySet, KeyError> {
    config.validate()?;

    let mut keys = Vec::new();
    for entry in &config.keys {
        keys.push(entry.load()?);
    }
    if let Some(jwks) = &config.jwks_file {
        keys.extend(read_jwks_file(jwks)?);
    }

    let set = KeySet::new(keys)?;
    info!(keys = set.len(), kids = ?set.kids(), "Loaded verification keys");
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET_B64: &str = "MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWY=";

    fn hmac_entry(kid: &str) -> KeyConfig {
        KeyConfig {
            kid: kid.to_string(),
            issuer: "https://auth.example.com".to_string(),
            algorithm: "HS256".to_string(),
            secret: Some(SECRET_B64.to_string()),
            secret_env: None,
            public_key_pem: None,
            public_key_file: None,
        }
    }

    #[test]
    fn test_load_inline_hmac() {
        let config = KeysConfig {
            keys: vec![hmac_entry("k1"), hmac_entry("k2")],
            jwks_file: None,
        };
        let set = load_key_set(&config).unwrap();
        assert_eq!(set.kids(), vec!["k1", "k2"]);
        assert_eq!(set.get("k1").unwrap().algorithm(), Algorithm::HS256);
    }

    #[test]
    fn test_duplicate_inline_kid() {
        let config = KeysConfig {
            keys: vec![hmac_entry("k1"), hmac_entry("k1")],
            jwks_file: None,
        };
        assert!(matches!(config.validate(), Err(KeyError::DuplicateKid(_))));
    }

    #[test]
    fn test_entry_requires_one_source() {
        let mut entry = hmac_entry("k1");
        entry.secret_env = Some("X".to_string());
        assert!(entry.validate().is_err());

        entry.secret = None;
        entry.secret_env = None;
        assert!(entry.validate().is_err());
    }

    #[test]
    fn test_entry_material_must_match_algorithm() {
        let mut entry = hmac_entry("k1");
        entry.algorithm = "RS256".to_string();
        assert!(matches!(entry.validate(), Err(KeyError::InvalidKey { .. })));

        entry.algorithm = "none".to_string();
        assert!(matches!(entry.validate(), Err(KeyError::UnsupportedAlgorithm(_))));
    }

    #[test]
    fn test_missing_secret_env() {
        let mut entry = hmac_entry("k1");
        entry.secret = None;
        entry.secret_env = Some("AUTHSVC_TEST_SECRET_THAT_IS_NOT_SET".to_string());
        let err = entry.load().unwrap_err();
        assert!(err.to_string().contains("AUTHSVC_TEST_SECRET_THAT_IS_NOT_SET"));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let debug = format!("{:?}", hmac_entry("k1"));
        assert!(!debug.contains(SECRET_B64));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_parse_jwks_oct_and_skips() {
        let json = r#"{
            "keys": [
                {"kty":"oct","kid":"h1","alg":"HS384","k":"MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWYwMTIzNDU2Nzg5YWJjZGVm"},
                {"kty":"oct","kid":"enc1","use":"enc","k":"AA"},
                {"kty":"OKP","kid":"ed1","crv":"Ed25519","x":"AA"},
                {"kty":"EC","kid":"p256","alg":"ES256","crv":"P-256","x":"AA","y":"AA"}
            ]
        }"#;
        let keys = parse_jwks(json, "iss").unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].kid(), "h1");
        assert_eq!(keys[0].algorithm(), Algorithm::HS384);
        assert_eq!(keys[0].issuer(), "iss");
    }

    #[test]
    fn test_parse_jwks_defaults_algorithm_by_key_type() {
        let json = r#"{"keys":[{"kty":"oct","kid":"h1","k":"MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWY"}]}"#;
        let keys = parse_jwks(json, "iss").unwrap();
        assert_eq!(keys[0].algorithm(), Algorithm::HS256);
    }

    #[test]
    fn test_parse_jwks_rejects_broken_key() {
        let json = r#"{"keys":[{"kty":"RSA","kid":"r1","alg":"RS256","n":"AQAB"}]}"#;
        assert!(parse_jwks(json, "iss").is_err());

        let json = r#"{"keys":[{"kty":"RSA","alg":"RS256","n":"AQAB","e":"AQAB"}]}"#;
        assert!(matches!(parse_jwks(json, "iss"), Err(KeyError::Jwks(_))));

        // Too short for HS256.
        let json = r#"{"keys":[{"kty":"oct","kid":"h1","k":"c2hvcnQ"}]}"#;
        assert!(matches!(parse_jwks(json, "iss"), Err(KeyError::InvalidKey { .. })));

        // An RSA key may not be declared for an EC algorithm.
        let json = r#"{"keys":[{"kty":"RSA","kid":"r1","alg":"ES384","n":"AQAB","e":"AQAB"}]}"#;
        assert!(matches!(parse_jwks(json, "iss"), Err(KeyError::InvalidKey { .. })));
    }

    #[test]
    fn test_parse_jwks_rejects_invalid_json() {
        assert!(matches!(parse_jwks("nope", "iss"), Err(KeyError::Jwks(_))));
    }

    #[test]
    fn test_missing_jwks_file() {
        let config = JwksFileConfig {
            path: PathBuf::from("/nonexistent/authsvc/jwks.json"),
            issuer: "iss".to_string(),
            watch: false,
        };
        assert!(matches!(read_jwks_file(&config), Err(KeyError::Io { .. })));
    }
}
