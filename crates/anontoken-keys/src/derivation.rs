//! Deterministic per-interval key derivation.
//!
//! # Purpose
//! Maps `(master secret, interval, curve)` to an EC key pair without any
//! hidden randomness, so every process sharing the master secret derives the
//! same key for the same rotation interval.
//!
//! # Algorithm
//! For `counter = 0, 1, ...`:
//! 1. `salt = interval (u64 BE) || counter (u32 BE)`
//! 2. `candidate = HKDF-SHA256(ikm = secret, salt, info = "", len = key_byte_size)`
//! 3. accept when `candidate` is a valid non-zero scalar below the curve order.
//!
//! Rejection sampling gives up after [`MAX_DERIVATION_ATTEMPTS`] candidates.
use crate::curve::{CurveName, EcPoint};
use crate::master_key::MasterSecret;
use crate::{KeyError, KeyResult};
use hkdf::Hkdf;
use sha2::Sha256;
use std::sync::Arc;
use zeroize::Zeroizing;

pub const MAX_DERIVATION_ATTEMPTS: u32 = 1000;

/// The extract-and-expand step of the derivation.
pub trait KeyMaterialExpander: Send + Sync {
    fn expand(&self, ikm: &[u8], salt: &[u8], out: &mut [u8]) -> KeyResult<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HkdfSha256Expander;

impl KeyMaterialExpander for HkdfSha256Expander {
    fn expand(&self, ikm: &[u8], salt: &[u8], out: &mut [u8]) -> KeyResult<()> {
        Hkdf::<Sha256>::new(Some(salt), ikm)
            .expand(&[], out)
            .map_err(|_| {
                KeyError::InvalidKeyMaterial(format!(
                    "HKDF output length {} is too long",
                    out.len()
                ))
            })
    }
}

/// Private scalar and public point derived for one interval.
#[derive(Clone)]
pub struct DerivedKey {
    pub private_scalar: Zeroizing<Vec<u8>>,
    pub public_point: EcPoint,
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("public_point", &self.public_point)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct RollingKeyDerivation {
    expander: Arc<dyn KeyMaterialExpander>,
    max_attempts: u32,
}

impl Default for RollingKeyDerivation {
    fn default() -> Self {
        Self::new(Arc::new(HkdfSha256Expander))
    }
}

impl RollingKeyDerivation {
    pub fn new(expander: Arc<dyn KeyMaterialExpander>) -> Self {
        Self {
            expander,
            max_attempts: MAX_DERIVATION_ATTEMPTS,
        }
    }

    pub fn derive(
        &self,
        secret: &MasterSecret,
        interval: u64,
        curve: CurveName,
    ) -> KeyResult<DerivedKey> {
        let mut candidate = Zeroizing::new(vec![0u8; curve.key_byte_size()]);
        for counter in 0..self.max_attempts {
            let salt = derivation_salt(interval, counter);
            self.expander
                .expand(secret.as_bytes(), &salt, candidate.as_mut_slice())?;
            if let Some(public_point) = curve.public_point(&candidate) {
                if counter > 0 {
                    tracing::debug!(interval, counter, %curve, "rejected out-of-range candidates");
                }
                return Ok(DerivedKey {
                    private_scalar: candidate,
                    public_point,
                });
            }
        }
        Err(KeyError::KeyGenerationExhausted {
            interval,
            attempts: self.max_attempts,
        })
    }
}

fn derivation_salt(interval: u64, counter: u32) -> [u8; 12] {
    let mut salt = [0u8; 12];
    salt[..8].copy_from_slice(&interval.to_be_bytes());
    salt[8..].copy_from_slice(&counter.to_be_bytes());
    salt
}
