//! Certificate model and the credential-store contract.
//!
//! # Purpose
//! Describes the key material a certificate carries and the
//! [`CertificateLocator`] seam through which both the master-key loader and
//! the signing-credential rollover read it.
//!
//! # Key invariants
//! - Private material is held in [`zeroize::Zeroizing`] buffers (EC) or the
//!   `rsa` crate's zeroizing key type and is never serialized.
//! - A certificate's thumbprint is derived from its public key only, so the
//!   same value is published as `kid` without exposing secrets.
//!
//! # Concurrency model
//! Locators are shared behind `Arc<dyn CertificateLocator>` and must be safe
//! for concurrent lookups. Lookups are the only suspension points on the
//! key-derivation path.
use crate::curve::{CurveName, EcPoint, require_public_point};
use crate::{KeyError, KeyResult};
use async_trait::async_trait;
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use zeroize::Zeroizing;

/// EC key pair (or public key only) on a supported curve.
#[derive(Clone)]
pub struct EcKeyMaterial {
    pub curve: CurveName,
    pub private_scalar: Option<Zeroizing<Vec<u8>>>,
    pub public_point: EcPoint,
}

impl EcKeyMaterial {
    /// Build from a raw big-endian private scalar, deriving the public point.
    pub fn from_private_scalar(curve: CurveName, scalar: &[u8]) -> KeyResult<Self> {
        let public_point = require_public_point(curve, scalar)?;
        Ok(Self {
            curve,
            private_scalar: Some(Zeroizing::new(scalar.to_vec())),
            public_point,
        })
    }

    pub fn from_public_point(curve: CurveName, public_point: EcPoint) -> Self {
        Self {
            curve,
            private_scalar: None,
            public_point,
        }
    }
}

impl std::fmt::Debug for EcKeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcKeyMaterial")
            .field("curve", &self.curve)
            .field("has_private", &self.private_scalar.is_some())
            .finish()
    }
}

/// RSA key pair (or public key only).
#[derive(Clone)]
pub struct RsaKeyMaterial {
    pub private_key: Option<RsaPrivateKey>,
    pub public_key: RsaPublicKey,
}

impl RsaKeyMaterial {
    pub fn from_private_key(private_key: RsaPrivateKey) -> Self {
        let public_key = private_key.to_public_key();
        Self {
            private_key: Some(private_key),
            public_key,
        }
    }

    pub fn from_public_key(public_key: RsaPublicKey) -> Self {
        Self {
            private_key: None,
            public_key,
        }
    }
}

impl std::fmt::Debug for RsaKeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsaKeyMaterial")
            .field("bits", &(self.public_key.size() * 8))
            .field("has_private", &self.private_key.is_some())
            .finish()
    }
}

/// Key material attached to a certificate.
#[derive(Debug, Clone)]
pub enum CertificateKey {
    Ec(EcKeyMaterial),
    Rsa(RsaKeyMaterial),
    /// Any other algorithm; carried so callers can report it precisely.
    Unsupported { algorithm: String },
}

impl CertificateKey {
    pub fn has_private_key(&self) -> bool {
        match self {
            CertificateKey::Ec(key) => key.private_scalar.is_some(),
            CertificateKey::Rsa(key) => key.private_key.is_some(),
            CertificateKey::Unsupported { .. } => false,
        }
    }

    /// Hex SHA-256 over the public key encoding.
    ///
    /// EC keys hash the SEC1 uncompressed point; RSA keys hash `n || e`.
    pub fn thumbprint(&self) -> KeyResult<String> {
        let mut hasher = Sha256::new();
        match self {
            CertificateKey::Ec(key) => hasher.update(key.public_point.to_sec1_uncompressed()),
            CertificateKey::Rsa(key) => {
                hasher.update(key.public_key.n().to_bytes_be());
                hasher.update(key.public_key.e().to_bytes_be());
            }
            CertificateKey::Unsupported { algorithm } => {
                return Err(KeyError::UnsupportedKeyFormat(algorithm.clone()));
            }
        }
        Ok(hex::encode(hasher.finalize()))
    }
}

/// A certificate as returned by a [`CertificateLocator`].
#[derive(Debug, Clone)]
pub struct Certificate {
    pub id: String,
    pub version: String,
    pub key: CertificateKey,
}

/// One version of a certificate with its creation time (Unix seconds).
#[derive(Debug, Clone)]
pub struct CertificateVersion {
    pub certificate: Certificate,
    pub created_at: i64,
}

/// External credential store holding certificates and their versions.
///
/// Implementations may front a local key directory or a remote vault.
#[async_trait]
pub trait CertificateLocator: Send + Sync {
    /// Most recently created enabled version of `id`, if any.
    async fn get_certificate(&self, id: &str) -> KeyResult<Option<Certificate>>;

    /// Every enabled version of `id`, in no particular order.
    async fn get_all_enabled_versions(&self, id: &str) -> KeyResult<Vec<CertificateVersion>>;
}

/// In-process certificate store.
///
/// Disabled versions are kept so tests can model retirement at the source.
#[derive(Clone, Default)]
pub struct InMemoryCertificateLocator {
    versions: Arc<RwLock<HashMap<String, Vec<(CertificateVersion, bool)>>>>,
}

impl InMemoryCertificateLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, version: CertificateVersion) {
        self.insert_with_state(version, true).await;
    }

    pub async fn insert_disabled(&self, version: CertificateVersion) {
        self.insert_with_state(version, false).await;
    }

    async fn insert_with_state(&self, version: CertificateVersion, enabled: bool) {
        let mut map = self.versions.write().await;
        let entries = map.entry(version.certificate.id.clone()).or_default();
        entries.retain(|(existing, _)| existing.certificate.version != version.certificate.version);
        entries.push((version, enabled));
    }

    /// Disable a version in place; returns whether it was found.
    pub async fn disable(&self, id: &str, version: &str) -> bool {
        let mut map = self.versions.write().await;
        let Some(entries) = map.get_mut(id) else {
            return false;
        };
        let mut found = false;
        for (entry, enabled) in entries.iter_mut() {
            if entry.certificate.version == version {
                *enabled = false;
                found = true;
            }
        }
        found
    }
}

#[async_trait]
impl CertificateLocator for InMemoryCertificateLocator {
    async fn get_certificate(&self, id: &str) -> KeyResult<Option<Certificate>> {
        Ok(newest(self.get_all_enabled_versions(id).await?))
    }

    async fn get_all_enabled_versions(&self, id: &str) -> KeyResult<Vec<CertificateVersion>> {
        let map = self.versions.read().await;
        Ok(map
            .get(id)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|(_, enabled)| *enabled)
                    .map(|(version, _)| version.clone())
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Pick the most recently created version.
pub(crate) fn newest(versions: Vec<CertificateVersion>) -> Option<Certificate> {
    versions
        .into_iter()
        .max_by_key(|version| version.created_at)
        .map(|version| version.certificate)
}
