//! Verification keys, key rotation and signature checks.

pub mod key;
pub mod loader;
pub mod set;
pub mod verifier;

pub use key::{MIN_HMAC_SECRET_BYTES, VerificationKey};
pub use loader::{
    JwksFileConfig, KeyConfig, KeysConfig, jwk_to_key, load_key_set, parse_jwks, read_jwks_file,
};
pub use set::{KeySet, KeyStore};
pub use verifier::SignatureVerifier;
