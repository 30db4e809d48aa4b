//! Sign in with Apple notification handling
//!
//! Key set caching, notification token verification and the nested event model.

pub mod events;
pub mod jwks;
pub mod verifier;

pub use events::{AppleEvent, AppleEventKind};
pub use jwks::{
    HttpJwksSource, JsonWebKey, JsonWebKeySet, JwksSource, KeyProvider, KeyProviderError,
    SigningKey, APPLE_JWKS_URI,
};
pub use verifier::{TokenVerifier, Unauthorized, VerifiedClaims, APPLE_ISSUER, EXPIRY_LEEWAY_SECONDS};
