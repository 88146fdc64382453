//! Key material for anonymous-token issuance and session-token signing.
//!
//! # Purpose
//! Derives the rotating EC keys that sign anonymous tokens, publishes the
//! matching validation keys, and rolls the service's own JWT-signing
//! certificates over without manual cut-over.
//!
//! # How it fits
//! The verification service builds an [`AnonymousTokenKeyStore`] and a
//! [`SigningCredentialRollover`] at startup and consults them on every
//! issuance, verification, and key-set request.
//!
//! # Key invariants
//! - Derivation is a pure function of `(master secret, interval, curve)`.
//! - Private scalars and master secrets never appear in logs, `Debug` output,
//!   or published documents.
//! - Failed credential loads are never cached.
//!
//! # Examples
//! ```rust
//! use anontoken_keys::{CurveName, MasterSecret, RollingKeyDerivation};
//!
//! let derivation = RollingKeyDerivation::default();
//! let secret = MasterSecret::new(vec![0u8; 32]);
//! let key = derivation.derive(&secret, 42, CurveName::P256).unwrap();
//! assert_eq!(key.public_point.x.len(), 32);
//! ```
//!
//! # Common pitfalls
//! - Verifiers and issuers must agree on rotation interval, rollover, and
//!   curve; otherwise the published `kid`s will not line up.
//! - RSA master keys work but are a legacy input to key derivation.

mod cache;
mod certificate;
mod curve;
mod derivation;
mod errors;
mod jwks;
mod keystore;
mod master_key;
mod pem_store;
mod rollover;
mod session_token;
mod time;

pub use cache::{CredentialCache, DEFAULT_CACHE_TTL};
pub use certificate::{
    Certificate, CertificateKey, CertificateLocator, CertificateVersion, EcKeyMaterial,
    InMemoryCertificateLocator, RsaKeyMaterial,
};
pub use curve::{CurveName, EcPoint};
pub use derivation::{
    DerivedKey, HkdfSha256Expander, KeyMaterialExpander, MAX_DERIVATION_ATTEMPTS,
    RollingKeyDerivation,
};
pub use errors::{KeyError, KeyResult};
pub use jwks::{Jwk, Jwks, KeyUse};
pub use keystore::{
    AnonymousTokenKeyConfig, AnonymousTokenKeyStore, STATIC_INTERVAL, SigningKeypair,
    ValidationKey,
};
pub use master_key::{MasterKeyLoader, MasterSecret};
pub use pem_store::{PemDirectoryLocator, parse_pem_key};
pub use rollover::{
    CredentialPublicKey, CredentialSnapshot, CredentialValidationKey, SigningCredential,
    SigningCredentialConfig, SigningCredentialRollover,
};
pub use session_token::{
    DEFAULT_SESSION_TOKEN_LEEWAY_SECS, IssuedSessionToken, SessionClaims, SessionTokenIssuer,
    SessionTokenVerifier,
};
pub use time::{ManualTimeProvider, SystemTimeProvider, TimeProvider};
