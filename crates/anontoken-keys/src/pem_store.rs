//! Directory-backed certificate store.
//!
//! # Layout
//! ```text
//! <root>/<certificate_id>/<version>.pem            enabled version
//! <root>/<certificate_id>/<version>.pem.disabled   retired version
//! ```
//! The file's modification time is the version's creation timestamp.
//!
//! # Accepted encodings
//! PKCS#8 EC (P-256, P-384) and RSA private keys, PKCS#1 RSA private keys, and
//! SPKI public keys for validation-only certificates. Anything else loads as
//! [`CertificateKey::Unsupported`] so the caller decides whether that is fatal.
use crate::certificate::{
    Certificate, CertificateKey, CertificateLocator, CertificateVersion, EcKeyMaterial,
    RsaKeyMaterial, newest,
};
use crate::curve::{CurveName, encoded_to_point};
use crate::{KeyError, KeyResult};
use async_trait::async_trait;
use elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::pkcs1::DecodeRsaPrivateKey;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

const ENABLED_SUFFIX: &str = ".pem";

#[derive(Debug, Clone)]
pub struct PemDirectoryLocator {
    root: PathBuf,
}

impl PemDirectoryLocator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn certificate_dir(&self, id: &str) -> KeyResult<PathBuf> {
        // Certificate ids come from configuration, but keep them from walking
        // out of the store root anyway.
        if id.is_empty() || id.contains(['/', '\\']) || id == "." || id == ".." {
            return Err(KeyError::CertificateStore(format!(
                "invalid certificate id {id:?}"
            )));
        }
        Ok(self.root.join(id))
    }
}

#[async_trait]
impl CertificateLocator for PemDirectoryLocator {
    async fn get_certificate(&self, id: &str) -> KeyResult<Option<Certificate>> {
        Ok(newest(self.get_all_enabled_versions(id).await?))
    }

    async fn get_all_enabled_versions(&self, id: &str) -> KeyResult<Vec<CertificateVersion>> {
        let dir = self.certificate_dir(id)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(KeyError::CertificateStore(format!(
                    "read {}: {err}",
                    dir.display()
                )));
            }
        };

        let mut versions = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| KeyError::CertificateStore(format!("list {}: {err}", dir.display())))?
        {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            let Some(version) = name.strip_suffix(ENABLED_SUFFIX) else {
                continue;
            };
            versions.push(load_version(id, version, &entry.path()).await?);
        }
        tracing::debug!(
            certificate_id = %id,
            count = versions.len(),
            "loaded certificate versions"
        );
        Ok(versions)
    }
}

async fn load_version(id: &str, version: &str, path: &Path) -> KeyResult<CertificateVersion> {
    let io_err =
        |err: std::io::Error| KeyError::CertificateStore(format!("{}: {err}", path.display()));
    let pem = tokio::fs::read_to_string(path).await.map_err(io_err)?;
    let modified = tokio::fs::metadata(path)
        .await
        .and_then(|meta| meta.modified())
        .map_err(io_err)?;
    let created_at = modified
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0);
    Ok(CertificateVersion {
        certificate: Certificate {
            id: id.to_string(),
            version: version.to_string(),
            key: parse_pem_key(&pem)?,
        },
        created_at,
    })
}

/// Decode a PEM document into certificate key material.
pub fn parse_pem_key(pem: &str) -> KeyResult<CertificateKey> {
    if let Ok(secret) = p256::SecretKey::from_pkcs8_pem(pem) {
        return Ok(CertificateKey::Ec(EcKeyMaterial::from_private_scalar(
            CurveName::P256,
            &secret.to_bytes(),
        )?));
    }
    if let Ok(secret) = p384::SecretKey::from_pkcs8_pem(pem) {
        return Ok(CertificateKey::Ec(EcKeyMaterial::from_private_scalar(
            CurveName::P384,
            &secret.to_bytes(),
        )?));
    }
    if let Ok(key) = rsa::RsaPrivateKey::from_pkcs8_pem(pem) {
        return Ok(CertificateKey::Rsa(RsaKeyMaterial::from_private_key(key)));
    }
    if let Ok(key) = rsa::RsaPrivateKey::from_pkcs1_pem(pem) {
        return Ok(CertificateKey::Rsa(RsaKeyMaterial::from_private_key(key)));
    }
    if let Ok(public) = p256::PublicKey::from_public_key_pem(pem) {
        let point = encoded_to_point::<p256::NistP256>(&public.to_encoded_point(false));
        return ec_public(CurveName::P256, point);
    }
    if let Ok(public) = p384::PublicKey::from_public_key_pem(pem) {
        let point = encoded_to_point::<p384::NistP384>(&public.to_encoded_point(false));
        return ec_public(CurveName::P384, point);
    }
    if let Ok(public) = rsa::RsaPublicKey::from_public_key_pem(pem) {
        return Ok(CertificateKey::Rsa(RsaKeyMaterial::from_public_key(public)));
    }
    let label = pem
        .lines()
        .find_map(|line| line.strip_prefix("-----BEGIN "))
        .and_then(|rest| rest.strip_suffix("-----"))
        .unwrap_or("unrecognized PEM")
        .to_string();
    Ok(CertificateKey::Unsupported { algorithm: label })
}

fn ec_public(curve: CurveName, point: Option<crate::curve::EcPoint>) -> KeyResult<CertificateKey> {
    let point = point.ok_or_else(|| {
        KeyError::InvalidKeyMaterial(format!("{curve} public key is the identity"))
    })?;
    Ok(CertificateKey::Ec(EcKeyMaterial::from_public_point(curve, point)))
}
