//! Bearer token format.
//!
//! Tokens are compact JWS strings: `header.payload.signature`, each segment
//! unpadded base64url.

pub mod algorithm;
pub mod claims;
pub mod codec;
pub mod fingerprint;

pub use algorithm::Algorithm;
pub use claims::ClaimSet;
pub use codec::{DEFAULT_MAX_TOKEN_BYTES, TokenCodec};
pub use fingerprint::Fingerprint;
