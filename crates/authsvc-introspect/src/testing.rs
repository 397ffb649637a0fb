//! Token minting helpers for tests.
//!
//! Enabled for this crate's unit tests and, through the `testing` feature,
//! for dependent crates' tests.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{EncodingKey, crypto};
use serde_json::{Map, Value, json};
use time::OffsetDateTime;

use crate::keys::VerificationKey;
use crate::token::Algorithm;

/// Issuer used by [`TokenBuilder`] helpers and [`hmac_key`].
pub const TEST_ISSUER: &str = "https://auth.example.com";

/// 32-byte shared secret for HMAC test keys.
#[must_use]
pub fn test_secret() -> Vec<u8> {
    b"authsvc-test-secret-0123456789ab".to_vec()
}

/// HS256 key bound to [`TEST_ISSUER`] using [`test_secret`].
///
/// # Panics
///
/// Never in practice; the secret meets the minimum length.
#[must_use]
pub fn hmac_key(kid: &str) -> VerificationKey {
    VerificationKey::hmac(kid, TEST_ISSUER, Algorithm::HS256, test_secret())
        .expect("test secret is long enough")
}

/// Builds signed compact tokens.
///
/// Defaults: subject `svc-a`, issued now, expiring in 15 minutes, no scopes.
#[derive(Debug, Clone)]
pub struct TokenBuilder {
    header: Map<String, Value>,
    claims: Map<String, Value>,
}

impl TokenBuilder {
    /// Starts a token with the given key id and issuer.
    #[must_use]
    pub fn new(kid: &str, issuer: &str) -> Self {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let mut header = Map::new();
        header.insert("kid".into(), json!(kid));
        header.insert("typ".into(), json!("JWT"));

        let mut claims = Map::new();
        claims.insert("sub".into(), json!("svc-a"));
        claims.insert("iss".into(), json!(issuer));
        claims.insert("iat".into(), json!(now));
        claims.insert("exp".into(), json!(now + 900));

        Self { header, claims }
    }

    #[must_use]
    pub fn subject(self, subject: &str) -> Self {
        self.claim("sub", json!(subject))
    }

    /// Sets scopes as a space-delimited `scope` claim.
    #[must_use]
    pub fn scopes<'a>(self, scopes: impl IntoIterator<Item = &'a str>) -> Self {
        let joined = scopes.into_iter().collect::<Vec<_>>().join(" ");
        self.claim("scope", json!(joined))
    }

    /// Sets scopes as a `scopes` array claim.
    #[must_use]
    pub fn scope_array<'a>(self, scopes: impl IntoIterator<Item = &'a str>) -> Self {
        let list: Vec<&str> = scopes.into_iter().collect();
        self.claim("scopes", json!(list))
    }

    #[must_use]
    pub fn issued_at(self, unix: i64) -> Self {
        self.claim("iat", json!(unix))
    }

    #[must_use]
    pub fn expires_at(self, unix: i64) -> Self {
        self.claim("exp", json!(unix))
    }

    #[must_use]
    pub fn jti(self, jti: &str) -> Self {
        self.claim("jti", json!(jti))
    }

    /// Sets an arbitrary payload claim.
    #[must_use]
    pub fn claim(mut self, name: &str, value: Value) -> Self {
        self.claims.insert(name.to_string(), value);
        self
    }

    /// Removes a payload claim.
    #[must_use]
    pub fn without_claim(mut self, name: &str) -> Self {
        self.claims.remove(name);
        self
    }

    /// Sets an arbitrary header member.
    #[must_use]
    pub fn header(mut self, name: &str, value: Value) -> Self {
        self.header.insert(name.to_string(), value);
        self
    }

    fn signing_input(&mut self, alg: &str) -> String {
        self.header.insert("alg".into(), json!(alg));
        let header = Value::Object(self.header.clone()).to_string();
        let claims = Value::Object(self.claims.clone()).to_string();
        format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header),
            URL_SAFE_NO_PAD.encode(claims)
        )
    }

    /// Signs with `key`, which must belong to `algorithm`'s family.
    ///
    /// # Panics
    ///
    /// Panics if the key cannot sign with `algorithm`.
    #[must_use]
    pub fn sign(mut self, algorithm: Algorithm, key: &EncodingKey) -> String {
        let input = self.signing_input(algorithm.as_str());
        let signature =
            crypto::sign(input.as_bytes(), key, algorithm.into()).expect("key matches algorithm");
        format!("{input}.{signature}")
    }

    /// Signs with a shared secret.
    ///
    /// # Panics
    ///
    /// Panics if `algorithm` is not HS256 or HS384.
    #[must_use]
    pub fn sign_hmac(self, algorithm: Algorithm, secret: &[u8]) -> String {
        assert!(algorithm.is_hmac(), "{algorithm} is not an HMAC algorithm");
        self.sign(algorithm, &EncodingKey::from_secret(secret))
    }

    /// Emits the token with a literal `alg` and a garbage signature.
    #[must_use]
    pub fn with_fake_signature(mut self, alg: &str) -> String {
        let input = self.signing_input(alg);
        format!("{input}.{}", URL_SAFE_NO_PAD.encode(b"not-a-signature"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenCodec;

    #[test]
    fn test_builder_output_parses() {
        let raw = TokenBuilder::new("k1", TEST_ISSUER)
            .subject("svc-b")
            .scope_array(["a", "b"])
            .jti("t-1")
            .sign_hmac(Algorithm::HS384, &test_secret());

        let claims = TokenCodec::default().parse(&raw).unwrap();
        assert_eq!(claims.subject, "svc-b");
        assert_eq!(claims.algorithm, Algorithm::HS384);
        assert_eq!(claims.scopes.len(), 2);
        assert_eq!(claims.jti.as_deref(), Some("t-1"));
    }

    #[test]
    fn test_test_secret_length() {
        assert_eq!(test_secret().len(), 32);
    }
}
