//! Token handling: structural codec, key-set retrieval and claim validation.

pub mod codec;
pub mod jwks;
pub mod validator;

pub use codec::{Claims, DecodeError, DecodedToken, decode, encode, parse_expiry};
pub use jwks::{CachingKeySetFetcher, HttpKeySetFetcher, KeySetError, KeySetFetcher};
pub use validator::{TokenValidator, ValidationFailure, ValidatorConfig};
