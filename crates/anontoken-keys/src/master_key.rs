//! Master secret extraction for anonymous-token key derivation.
//!
//! The master secret is the root of trust for every rotating key. It is
//! read from a certificate's private key on demand, held in a zeroizing
//! buffer, and never persisted.
//!
//! EC certificates contribute their raw private scalar. RSA certificates are
//! accepted only for compatibility with older deployments: their secret is a
//! canonical JSON rendering of the private key parameters, which is not a
//! uniformly distributed HKDF input. Every use of that path is logged.
use crate::certificate::{CertificateKey, CertificateLocator};
use crate::{KeyError, KeyResult};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rsa::RsaPrivateKey;
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use serde::Serialize;
use std::sync::Arc;
use zeroize::Zeroizing;

/// Opaque secret bytes; zeroized on drop and redacted in `Debug`.
#[derive(Clone)]
pub struct MasterSecret(Zeroizing<Vec<u8>>);

impl MasterSecret {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(Zeroizing::new(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MasterSecret([REDACTED; {}])", self.0.len())
    }
}

pub struct MasterKeyLoader {
    locator: Arc<dyn CertificateLocator>,
    certificate_id: String,
}

impl MasterKeyLoader {
    pub fn new(locator: Arc<dyn CertificateLocator>, certificate_id: impl Into<String>) -> Self {
        Self {
            locator,
            certificate_id: certificate_id.into(),
        }
    }

    pub fn certificate_id(&self) -> &str {
        &self.certificate_id
    }

    /// Load the master secret from the configured certificate.
    ///
    /// # Errors
    /// - [`KeyError::CertificateNotFound`] when no enabled version exists.
    /// - [`KeyError::UnsupportedKeyFormat`] when the key is neither EC nor RSA,
    ///   or carries no private component.
    pub async fn load(&self) -> KeyResult<MasterSecret> {
        let certificate = self
            .locator
            .get_certificate(&self.certificate_id)
            .await?
            .ok_or_else(|| KeyError::CertificateNotFound(self.certificate_id.clone()))?;

        match &certificate.key {
            CertificateKey::Ec(key) => {
                let scalar = key.private_scalar.as_ref().ok_or_else(|| {
                    KeyError::UnsupportedKeyFormat(format!(
                        "certificate {} has no EC private key",
                        self.certificate_id
                    ))
                })?;
                Ok(MasterSecret::new(scalar.to_vec()))
            }
            CertificateKey::Rsa(key) => {
                let private_key = key.private_key.as_ref().ok_or_else(|| {
                    KeyError::UnsupportedKeyFormat(format!(
                        "certificate {} has no RSA private key",
                        self.certificate_id
                    ))
                })?;
                tracing::warn!(
                    certificate_id = %self.certificate_id,
                    "deriving anonymous-token keys from a legacy RSA master key; migrate to an EC certificate"
                );
                metrics::counter!("anontoken_legacy_rsa_master_key_total").increment(1);
                rsa_parameter_export(private_key)
            }
            CertificateKey::Unsupported { algorithm } => Err(KeyError::UnsupportedKeyFormat(
                format!("certificate {} uses {algorithm}", self.certificate_id),
            )),
        }
    }
}

#[derive(Serialize)]
struct RsaParameterExport {
    kty: &'static str,
    n: String,
    e: String,
    d: String,
    p: String,
    q: String,
}

/// Canonical textual export of the RSA private parameters.
fn rsa_parameter_export(key: &RsaPrivateKey) -> KeyResult<MasterSecret> {
    let primes = key.primes();
    if primes.len() < 2 {
        return Err(KeyError::InvalidKeyMaterial(
            "RSA key is missing prime factors".to_string(),
        ));
    }
    let encode = |value: &rsa::BigUint| URL_SAFE_NO_PAD.encode(value.to_bytes_be());
    let export = RsaParameterExport {
        kty: "RSA",
        n: encode(key.n()),
        e: encode(key.e()),
        d: encode(key.d()),
        p: encode(&primes[0]),
        q: encode(&primes[1]),
    };
    let text = Zeroizing::new(
        serde_json::to_string(&export)
            .map_err(|err| KeyError::InvalidKeyMaterial(format!("export RSA key: {err}")))?,
    );
    Ok(MasterSecret::new(text.as_bytes().to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::{
        Certificate, CertificateVersion, EcKeyMaterial, InMemoryCertificateLocator,
        RsaKeyMaterial,
    };
    use crate::curve::CurveName;

    async fn locator_with(key: CertificateKey) -> Arc<InMemoryCertificateLocator> {
        let locator = Arc::new(InMemoryCertificateLocator::new());
        locator
            .insert(CertificateVersion {
                certificate: Certificate {
                    id: "master".to_string(),
                    version: "v1".to_string(),
                    key,
                },
                created_at: 1,
            })
            .await;
        locator
    }

    #[tokio::test]
    async fn ec_master_secret_is_raw_scalar() {
        let key = EcKeyMaterial::from_private_scalar(CurveName::P256, &[3u8; 32]).expect("key");
        let loader = MasterKeyLoader::new(locator_with(CertificateKey::Ec(key)).await, "master");
        let secret = loader.load().await.expect("secret");
        assert_eq!(secret.as_bytes(), &[3u8; 32]);
        assert_eq!(format!("{secret:?}"), "MasterSecret([REDACTED; 32])");
    }

    #[tokio::test]
    async fn missing_certificate_is_not_found() {
        let locator = Arc::new(InMemoryCertificateLocator::new());
        let loader = MasterKeyLoader::new(locator, "absent");
        let err = loader.load().await.expect_err("missing");
        assert!(matches!(err, KeyError::CertificateNotFound(id) if id == "absent"));
    }

    #[tokio::test]
    async fn unsupported_key_is_rejected() {
        let key = CertificateKey::Unsupported {
            algorithm: "Ed25519".to_string(),
        };
        let loader = MasterKeyLoader::new(locator_with(key).await, "master");
        let err = loader.load().await.expect_err("unsupported");
        assert!(matches!(err, KeyError::UnsupportedKeyFormat(_)));
    }

    #[tokio::test]
    async fn public_only_key_is_rejected() {
        let point = CurveName::P256.public_point(&[3u8; 32]).expect("point");
        let key = CertificateKey::Ec(EcKeyMaterial::from_public_point(CurveName::P256, point));
        let loader = MasterKeyLoader::new(locator_with(key).await, "master");
        let err = loader.load().await.expect_err("no private key");
        assert!(matches!(err, KeyError::UnsupportedKeyFormat(_)));
    }

    #[tokio::test]
    async fn rsa_export_is_deterministic() {
        let private_key =
            RsaPrivateKey::new(&mut rand::thread_rng(), 1024).expect("generate rsa key");
        let key = CertificateKey::Rsa(RsaKeyMaterial::from_private_key(private_key));
        let loader = MasterKeyLoader::new(locator_with(key).await, "master");
        let first = loader.load().await.expect("secret");
        let second = loader.load().await.expect("secret");
        assert_eq!(first.as_bytes(), second.as_bytes());
        let text = std::str::from_utf8(first.as_bytes()).expect("utf8");
        assert!(text.starts_with(r#"{"kty":"RSA","n":""#));
    }
}
