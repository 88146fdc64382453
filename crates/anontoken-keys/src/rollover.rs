//! Certificate-based rollover for the service's own token-signing keys.
//!
//! # Purpose
//! Chooses which certificate version signs session tokens and which versions
//! verifiers accept, without any manual cut-over step.
//!
//! # Key invariants
//! - The active version is the newest enabled version older than the key
//!   rollover duration, so a freshly provisioned certificate is published for
//!   validation before it starts signing. When every version is younger, the
//!   newest is used.
//! - Validation keys cover every enabled version of the primary certificate
//!   and of each additional validation-only certificate.
//! - A key's `kid` is the certificate thumbprint.
//!
//! # Concurrency model
//! One cache entry per primary certificate holds both the active credential
//! and the validation set, so the credential store is queried once per TTL.
use crate::cache::{CredentialCache, DEFAULT_CACHE_TTL};
use crate::certificate::{CertificateKey, CertificateLocator, CertificateVersion};
use crate::curve::{CurveName, EcPoint};
use crate::jwks::{Jwk, Jwks};
use crate::time::TimeProvider;
use crate::{KeyError, KeyResult};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::traits::PublicKeyParts;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SigningCredentialConfig {
    pub certificate_id: String,
    pub additional_validation_certificate_ids: Vec<String>,
    pub key_rollover: Duration,
    pub cache_ttl: Duration,
}

impl SigningCredentialConfig {
    pub fn new(certificate_id: impl Into<String>) -> Self {
        Self {
            certificate_id: certificate_id.into(),
            additional_validation_certificate_ids: Vec::new(),
            key_rollover: Duration::from_secs(2 * 24 * 60 * 60),
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }
}

/// Private signing key of the active certificate version.
#[derive(Clone)]
pub struct SigningCredential {
    pub certificate_id: String,
    pub version: String,
    pub kid: String,
    pub algorithm: Algorithm,
    encoding_key: EncodingKey,
}

impl SigningCredential {
    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }
}

impl std::fmt::Debug for SigningCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningCredential")
            .field("certificate_id", &self.certificate_id)
            .field("version", &self.version)
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialPublicKey {
    Ec { curve: CurveName, point: EcPoint },
    Rsa { n: Vec<u8>, e: Vec<u8> },
}

/// Public key of one enabled certificate version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialValidationKey {
    pub certificate_id: String,
    pub version: String,
    pub kid: String,
    pub algorithm: Algorithm,
    pub public_key: CredentialPublicKey,
}

impl CredentialValidationKey {
    pub fn decoding_key(&self) -> KeyResult<DecodingKey> {
        let key = match &self.public_key {
            CredentialPublicKey::Ec { point, .. } => DecodingKey::from_ec_components(
                &URL_SAFE_NO_PAD.encode(&point.x),
                &URL_SAFE_NO_PAD.encode(&point.y),
            )?,
            CredentialPublicKey::Rsa { n, e } => DecodingKey::from_rsa_components(
                &URL_SAFE_NO_PAD.encode(n),
                &URL_SAFE_NO_PAD.encode(e),
            )?,
        };
        Ok(key)
    }

    /// JWKS record with base64url parameters.
    pub fn to_jwk(&self) -> Jwk {
        let jwk = match &self.public_key {
            CredentialPublicKey::Ec { curve, point } => Jwk::ec(
                self.kid.clone(),
                curve.as_str(),
                URL_SAFE_NO_PAD.encode(&point.x),
                URL_SAFE_NO_PAD.encode(&point.y),
            ),
            CredentialPublicKey::Rsa { n, e } => Jwk::rsa(
                self.kid.clone(),
                URL_SAFE_NO_PAD.encode(n),
                URL_SAFE_NO_PAD.encode(e),
            ),
        };
        jwk.for_signatures(self.algorithm)
    }
}

/// Result of one credential-store fetch.
#[derive(Debug, Clone)]
pub struct CredentialSnapshot {
    pub active: SigningCredential,
    pub validation_keys: Vec<CredentialValidationKey>,
}

pub struct SigningCredentialRollover {
    config: SigningCredentialConfig,
    locator: Arc<dyn CertificateLocator>,
    cache: CredentialCache<Arc<CredentialSnapshot>>,
    time: Arc<dyn TimeProvider>,
}

impl SigningCredentialRollover {
    pub fn new(
        config: SigningCredentialConfig,
        locator: Arc<dyn CertificateLocator>,
        time: Arc<dyn TimeProvider>,
    ) -> Self {
        let cache = CredentialCache::new("signing_credential", config.cache_ttl);
        Self {
            config,
            locator,
            cache,
            time,
        }
    }

    pub async fn active_credential(&self) -> KeyResult<SigningCredential> {
        Ok(self.snapshot().await?.active.clone())
    }

    pub async fn validation_keys(&self) -> KeyResult<Vec<CredentialValidationKey>> {
        Ok(self.snapshot().await?.validation_keys.clone())
    }

    pub async fn jwks(&self) -> KeyResult<Jwks> {
        let snapshot = self.snapshot().await?;
        Ok(Jwks {
            keys: snapshot
                .validation_keys
                .iter()
                .map(CredentialValidationKey::to_jwk)
                .collect(),
        })
    }

    pub async fn snapshot(&self) -> KeyResult<Arc<CredentialSnapshot>> {
        let key = format!("credentials:{}", self.config.certificate_id);
        self.cache
            .get_or_compute(&key, || async {
                self.load_snapshot().await.map(Arc::new)
            })
            .await
    }

    async fn load_snapshot(&self) -> KeyResult<CredentialSnapshot> {
        let primary_id = &self.config.certificate_id;
        let mut primary = self.locator.get_all_enabled_versions(primary_id).await?;
        if primary.is_empty() {
            return Err(KeyError::CertificateNotFound(primary_id.clone()));
        }
        primary.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let active_version = select_active(
            &primary,
            self.time.now_unix_secs(),
            self.config.key_rollover,
        )
        .ok_or_else(|| {
            KeyError::UnsupportedKeyFormat(format!(
                "certificate {primary_id} has no enabled version with a private key"
            ))
        })?;
        let active = signing_credential(active_version)?;

        let mut seen = HashSet::new();
        let mut validation_keys = Vec::new();
        collect_validation_keys(&primary, &mut seen, &mut validation_keys);
        for id in &self.config.additional_validation_certificate_ids {
            let versions = self.locator.get_all_enabled_versions(id).await?;
            collect_validation_keys(&versions, &mut seen, &mut validation_keys);
        }

        tracing::info!(
            certificate_id = %primary_id,
            version = %active.version,
            kid = %active.kid,
            validation_keys = validation_keys.len(),
            "loaded signing credentials"
        );
        Ok(CredentialSnapshot {
            active,
            validation_keys,
        })
    }
}

/// `versions` must be sorted newest first.
fn select_active(
    versions: &[CertificateVersion],
    now: i64,
    rollover: Duration,
) -> Option<&CertificateVersion> {
    let rollover = i64::try_from(rollover.as_secs()).unwrap_or(i64::MAX);
    let signable = || {
        versions
            .iter()
            .filter(|version| version.certificate.key.has_private_key())
    };
    signable()
        .find(|version| now.saturating_sub(version.created_at) > rollover)
        .or_else(|| signable().next())
}

fn signing_credential(version: &CertificateVersion) -> KeyResult<SigningCredential> {
    let certificate = &version.certificate;
    let (algorithm, encoding_key) = match &certificate.key {
        CertificateKey::Ec(key) => {
            let scalar = key.private_scalar.as_ref().ok_or_else(|| missing_private(version))?;
            let der = ec_pkcs8_der(key.curve, scalar)?;
            (key.curve.jwt_algorithm(), EncodingKey::from_ec_der(&der))
        }
        CertificateKey::Rsa(key) => {
            let private_key = key.private_key.as_ref().ok_or_else(|| missing_private(version))?;
            let der = private_key
                .to_pkcs1_der()
                .map_err(|err| KeyError::InvalidKeyMaterial(format!("encode RSA key: {err}")))?;
            (Algorithm::RS256, EncodingKey::from_rsa_der(der.as_bytes()))
        }
        CertificateKey::Unsupported { algorithm } => {
            return Err(KeyError::UnsupportedKeyFormat(algorithm.clone()));
        }
    };
    Ok(SigningCredential {
        certificate_id: certificate.id.clone(),
        version: certificate.version.clone(),
        kid: certificate.key.thumbprint()?,
        algorithm,
        encoding_key,
    })
}

fn ec_pkcs8_der(curve: CurveName, scalar: &[u8]) -> KeyResult<Vec<u8>> {
    use p256::pkcs8::EncodePrivateKey;

    let invalid = |err: String| KeyError::InvalidKeyMaterial(format!("encode {curve} key: {err}"));
    let document = match curve {
        CurveName::P256 => p256::SecretKey::from_slice(scalar)
            .map_err(|err| invalid(err.to_string()))?
            .to_pkcs8_der(),
        CurveName::P384 => p384::SecretKey::from_slice(scalar)
            .map_err(|err| invalid(err.to_string()))?
            .to_pkcs8_der(),
    }
    .map_err(|err| invalid(err.to_string()))?;
    Ok(document.as_bytes().to_vec())
}

fn missing_private(version: &CertificateVersion) -> KeyError {
    KeyError::UnsupportedKeyFormat(format!(
        "certificate {} version {} has no private key",
        version.certificate.id, version.certificate.version
    ))
}

fn collect_validation_keys(
    versions: &[CertificateVersion],
    seen: &mut HashSet<String>,
    out: &mut Vec<CredentialValidationKey>,
) {
    for version in versions {
        let certificate = &version.certificate;
        let (algorithm, public_key) = match &certificate.key {
            CertificateKey::Ec(key) => (
                key.curve.jwt_algorithm(),
                CredentialPublicKey::Ec {
                    curve: key.curve,
                    point: key.public_point.clone(),
                },
            ),
            CertificateKey::Rsa(key) => (
                Algorithm::RS256,
                CredentialPublicKey::Rsa {
                    n: key.public_key.n().to_bytes_be(),
                    e: key.public_key.e().to_bytes_be(),
                },
            ),
            CertificateKey::Unsupported { algorithm } => {
                tracing::warn!(
                    certificate_id = %certificate.id,
                    version = %certificate.version,
                    %algorithm,
                    "skipping validation key with unsupported algorithm"
                );
                continue;
            }
        };
        let Ok(kid) = certificate.key.thumbprint() else {
            continue;
        };
        if !seen.insert(kid.clone()) {
            continue;
        }
        out.push(CredentialValidationKey {
            certificate_id: certificate.id.clone(),
            version: certificate.version.clone(),
            kid,
            algorithm,
            public_key,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::{Certificate, EcKeyMaterial, InMemoryCertificateLocator};
    use crate::time::ManualTimeProvider;

    const DAY: i64 = 24 * 60 * 60;
    const NOW: i64 = 1_700_000_000;

    fn ec_version(id: &str, version: &str, seed: u8, created_at: i64) -> CertificateVersion {
        CertificateVersion {
            certificate: Certificate {
                id: id.to_string(),
                version: version.to_string(),
                key: CertificateKey::Ec(
                    EcKeyMaterial::from_private_scalar(CurveName::P256, &[seed; 32])
                        .expect("scalar"),
                ),
            },
            created_at,
        }
    }

    fn rollover_with(
        locator: Arc<InMemoryCertificateLocator>,
        additional: Vec<String>,
    ) -> SigningCredentialRollover {
        let config = SigningCredentialConfig {
            additional_validation_certificate_ids: additional,
            key_rollover: Duration::from_secs(2 * DAY as u64),
            ..SigningCredentialConfig::new("signing")
        };
        SigningCredentialRollover::new(config, locator, Arc::new(ManualTimeProvider::new(NOW)))
    }

    #[tokio::test]
    async fn picks_newest_version_past_rollover() {
        let locator = Arc::new(InMemoryCertificateLocator::new());
        locator.insert(ec_version("signing", "old", 1, NOW - 10 * DAY)).await;
        locator.insert(ec_version("signing", "settled", 2, NOW - 3 * DAY)).await;
        locator.insert(ec_version("signing", "fresh", 3, NOW - DAY)).await;

        let rollover = rollover_with(locator, Vec::new());
        let active = rollover.active_credential().await.expect("active");
        assert_eq!(active.version, "settled");
        assert_eq!(active.algorithm, Algorithm::ES256);

        let keys = rollover.validation_keys().await.expect("keys");
        assert_eq!(keys.len(), 3);
        assert!(keys.iter().any(|key| key.kid == active.kid));
    }

    #[tokio::test]
    async fn falls_back_to_newest_when_all_are_fresh() {
        let locator = Arc::new(InMemoryCertificateLocator::new());
        locator.insert(ec_version("signing", "a", 1, NOW - DAY)).await;
        locator.insert(ec_version("signing", "b", 2, NOW - 60)).await;
        let rollover = rollover_with(locator, Vec::new());
        let active = rollover.active_credential().await.expect("active");
        assert_eq!(active.version, "b");
    }

    #[tokio::test]
    async fn validation_includes_additional_certificates() {
        let locator = Arc::new(InMemoryCertificateLocator::new());
        locator.insert(ec_version("signing", "v1", 1, NOW - 5 * DAY)).await;
        locator.insert(ec_version("retiring", "v1", 9, NOW - 90 * DAY)).await;
        locator.insert_disabled(ec_version("retiring", "v0", 8, NOW - 200 * DAY)).await;

        let rollover = rollover_with(locator, vec!["retiring".to_string()]);
        let keys = rollover.validation_keys().await.expect("keys");
        let ids: Vec<_> = keys
            .iter()
            .map(|key| (key.certificate_id.as_str(), key.version.as_str()))
            .collect();
        assert_eq!(ids, vec![("signing", "v1"), ("retiring", "v1")]);

        let jwks = rollover.jwks().await.expect("jwks");
        assert_eq!(jwks.keys.len(), 2);
        assert_eq!(jwks.keys[0].alg.as_deref(), Some("ES256"));
    }

    #[tokio::test]
    async fn no_enabled_version_is_not_found() {
        let locator = Arc::new(InMemoryCertificateLocator::new());
        locator.insert_disabled(ec_version("signing", "v1", 1, NOW - 5 * DAY)).await;
        let rollover = rollover_with(locator, Vec::new());
        let err = rollover.active_credential().await.expect_err("missing");
        assert!(matches!(err, KeyError::CertificateNotFound(id) if id == "signing"));
    }

    #[tokio::test]
    async fn snapshot_is_cached_until_ttl() {
        let locator = Arc::new(InMemoryCertificateLocator::new());
        locator.insert(ec_version("signing", "v1", 1, NOW - 5 * DAY)).await;
        let rollover = rollover_with(locator.clone(), Vec::new());
        let first = rollover.active_credential().await.expect("first");

        locator.disable("signing", "v1").await;
        let cached = rollover.active_credential().await.expect("cached");
        assert_eq!(first.kid, cached.kid);
    }

    #[tokio::test]
    async fn rsa_credentials_sign_with_rs256() {
        let private_key =
            rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 2048).expect("generate rsa key");
        let locator = Arc::new(InMemoryCertificateLocator::new());
        locator
            .insert(CertificateVersion {
                certificate: Certificate {
                    id: "signing".to_string(),
                    version: "rsa".to_string(),
                    key: CertificateKey::Rsa(crate::certificate::RsaKeyMaterial::from_private_key(
                        private_key,
                    )),
                },
                created_at: NOW - 5 * DAY,
            })
            .await;
        let rollover = rollover_with(locator, Vec::new());
        let active = rollover.active_credential().await.expect("active");
        assert_eq!(active.algorithm, Algorithm::RS256);
        let jwks = rollover.jwks().await.expect("jwks");
        assert_eq!(jwks.keys[0].kty, "RSA");
        assert_eq!(jwks.keys[0].e.as_deref(), Some("AQAB"));
    }
}
