//! Structural parsing of compact JWS bearer tokens.
//!
//! The codec only checks that a token is well formed and extracts its
//! claims. It performs no I/O and does not look at keys; signature checks
//! belong to [`SignatureVerifier`](crate::keys::SignatureVerifier).
//!
//! Header and payload are decoded with `jsonwebtoken` without verification.
//! The signature segment is kept as-is for the verifier.

use jsonwebtoken::TokenData;
use jsonwebtoken::dangerous::insecure_decode;
use time::OffsetDateTime;

use super::algorithm::Algorithm;
use super::claims::{ClaimSet, RawClaims};
use crate::error::IntrospectError;

/// Default upper bound on token size in bytes.
pub const DEFAULT_MAX_TOKEN_BYTES: usize = 8192;

/// Parses bearer tokens into [`ClaimSet`]s.
#[derive(Debug, Clone, Copy)]
pub struct TokenCodec {
    max_token_bytes: usize,
}

impl Default for TokenCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TOKEN_BYTES)
    }
}

impl TokenCodec {
    /// Creates a codec rejecting tokens longer than `max_token_bytes`.
    #[must_use]
    pub fn new(max_token_bytes: usize) -> Self {
        Self { max_token_bytes }
    }

    /// Maximum accepted token size in bytes.
    #[must_use]
    pub fn max_token_bytes(&self) -> usize {
        self.max_token_bytes
    }

    /// Checks the size bound without decoding anything.
    ///
    /// # Errors
    ///
    /// Returns [`IntrospectError::Malformed`] for empty or oversized input.
    pub fn check_size(&self, token: &str) -> Result<(), IntrospectError> {
        if token.is_empty() {
            return Err(IntrospectError::malformed("empty token"));
        }
        if token.len() > self.max_token_bytes {
            return Err(IntrospectError::malformed(format!(
                "token exceeds {} bytes",
                self.max_token_bytes
            )));
        }
        Ok(())
    }

    /// Parses a token into its claims.
    ///
    /// # Errors
    ///
    /// Returns [`IntrospectError::Malformed`] when the token is not a
    /// three-segment compact JWS with a supported algorithm, a key id and
    /// all required claims.
    pub fn parse(&self, token: &str) -> Result<ClaimSet, IntrospectError> {
        self.check_size(token)?;

        let mut segments = token.split('.');
        let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(IntrospectError::malformed("expected three segments"));
        };

        if header_b64.is_empty() || payload_b64.is_empty() || signature_b64.is_empty() {
            return Err(IntrospectError::malformed("empty segment"));
        }

        let TokenData { header, claims } = insecure_decode::<RawClaims>(token)
            .map_err(|e| IntrospectError::malformed(format!("undecodable token: {e}")))?;
        let algorithm = Algorithm::try_from(header.alg).map_err(IntrospectError::malformed)?;
        let key_id = match header.kid {
            Some(kid) if !kid.is_empty() => kid,
            _ => return Err(IntrospectError::malformed("missing kid")),
        };

        let issued_at = timestamp(claims.iat, "iat")?;
        let expires_at = timestamp(claims.exp, "exp")?;

        let signing_input_len = header_b64.len() + 1 + payload_b64.len();

        Ok(ClaimSet {
            subject: claims.sub,
            scopes: claims.scope.map(|s| s.into_set()).unwrap_or_default(),
            issued_at,
            expires_at,
            issuer: claims.iss,
            key_id,
            algorithm,
            jti: claims.jti.filter(|j| !j.is_empty()),
            signature: signature_b64.to_string(),
            signing_input: token[..signing_input_len].to_string(),
        })
    }
}

fn timestamp(value: i64, claim: &str) -> Result<OffsetDateTime, IntrospectError> {
    OffsetDateTime::from_unix_timestamp(value)
        .map_err(|_| IntrospectError::malformed(format!("{claim} out of range")))
}

#[cfg(test)]
mod tests {
    use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};

    use super::*;

    fn b64(json: &str) -> String {
        URL_SAFE_NO_PAD.encode(json)
    }

    fn token(header: &str, payload: &str) -> String {
        format!("{}.{}.{}", b64(header), b64(payload), b64("sig"))
    }

    const HEADER: &str = r#"{"alg":"HS256","kid":"k1","typ":"JWT"}"#;
    const PAYLOAD: &str = r#"{"sub":"svc-a","iss":"https://auth.example.com","iat":1700000000,"exp":1700000900,"scope":"payment:write phi:read","jti":"t-1"}"#;

    fn assert_malformed(result: Result<ClaimSet, IntrospectError>) {
        assert!(
            matches!(result, Err(IntrospectError::Malformed { .. })),
            "expected malformed, got {result:?}"
        );
    }

    #[test]
    fn test_parse_valid_token() {
        let codec = TokenCodec::default();
        let raw = token(HEADER, PAYLOAD);
        let claims = codec.parse(&raw).unwrap();

        assert_eq!(claims.subject, "svc-a");
        assert_eq!(claims.issuer, "https://auth.example.com");
        assert_eq!(claims.key_id, "k1");
        assert_eq!(claims.algorithm, Algorithm::HS256);
        assert_eq!(claims.jti.as_deref(), Some("t-1"));
        assert_eq!(claims.scopes.len(), 2);
        assert_eq!(claims.expires_at.unix_timestamp(), 1_700_000_900);
        assert_eq!(claims.signature(), b64("sig"));

        let dot = raw.rfind('.').unwrap();
        assert_eq!(claims.signing_input(), raw[..dot].as_bytes());
    }

    #[test]
    fn test_missing_scope_is_empty_set() {
        let payload = r#"{"sub":"a","iss":"b","iat":1,"exp":2}"#;
        let claims = TokenCodec::default().parse(&token(HEADER, payload)).unwrap();
        assert!(claims.scopes.is_empty());
        assert!(claims.jti.is_none());
    }

    #[test]
    fn test_rejects_empty_and_oversized() {
        let codec = TokenCodec::new(64);
        assert_malformed(codec.parse(""));
        assert_malformed(codec.parse(&"a".repeat(65)));
    }

    #[test]
    fn test_rejects_wrong_segment_count() {
        let codec = TokenCodec::default();
        assert_malformed(codec.parse("abc"));
        assert_malformed(codec.parse("a.b"));
        assert_malformed(codec.parse("a.b.c.d"));

        let raw = token(HEADER, PAYLOAD);
        assert_malformed(codec.parse(&raw[..raw.rfind('.').unwrap()]));
    }

    #[test]
    fn test_rejects_empty_segments() {
        let codec = TokenCodec::default();
        assert_malformed(codec.parse(&format!("{}.{}.", b64(HEADER), b64(PAYLOAD))));
        assert_malformed(codec.parse(&format!(".{}.{}", b64(PAYLOAD), b64("sig"))));
    }

    #[test]
    fn test_rejects_bad_encoding() {
        let codec = TokenCodec::default();
        assert_malformed(codec.parse(&format!("!!!.{}.{}", b64(PAYLOAD), b64("sig"))));
        assert_malformed(codec.parse(&format!("{}.{}.{}", b64("not json"), b64(PAYLOAD), b64("sig"))));
        assert_malformed(codec.parse(&format!("{}.!!!.{}", b64(HEADER), b64("sig"))));

        // The signature segment is only decoded by the verifier.
        let claims = codec.parse(&format!("{}.{}.%%", b64(HEADER), b64(PAYLOAD))).unwrap();
        assert_eq!(claims.signature(), "%%");
    }

    #[test]
    fn test_rejects_unsupported_algorithm() {
        let codec = TokenCodec::default();
        assert_malformed(codec.parse(&token(r#"{"alg":"none","kid":"k1"}"#, PAYLOAD)));
        assert_malformed(codec.parse(&token(r#"{"alg":"ES256","kid":"k1"}"#, PAYLOAD)));
    }

    #[test]
    fn test_rejects_missing_kid() {
        let codec = TokenCodec::default();
        assert_malformed(codec.parse(&token(r#"{"alg":"HS256"}"#, PAYLOAD)));
        assert_malformed(codec.parse(&token(r#"{"alg":"HS256","kid":""}"#, PAYLOAD)));
    }

    #[test]
    fn test_rejects_bad_claims() {
        let codec = TokenCodec::default();
        // missing exp
        assert_malformed(codec.parse(&token(HEADER, r#"{"sub":"a","iss":"b","iat":1}"#)));
        // mistyped exp
        assert_malformed(codec.parse(&token(
            HEADER,
            r#"{"sub":"a","iss":"b","iat":1,"exp":"soon"}"#,
        )));
        // out of range
        assert_malformed(codec.parse(&token(
            HEADER,
            r#"{"sub":"a","iss":"b","iat":1,"exp":9223372036854775807}"#,
        )));
        // scope of the wrong type
        assert_malformed(codec.parse(&token(
            HEADER,
            r#"{"sub":"a","iss":"b","iat":1,"exp":2,"scope":42}"#,
        )));
    }
}
