//! Rotating anonymous-token key store.
//!
//! # Purpose
//! Selects the rotation interval for "now", derives (and caches) the signing
//! key pair for it, and publishes the validation keys that verifiers accept
//! across the rollover tolerance window.
//!
//! # Key invariants
//! - `interval = floor(now / rotation_interval)`; with rotation disabled the
//!   interval is pinned to [`STATIC_INTERVAL`].
//! - A key's `kid` is its interval rendered in decimal.
//! - Validation keys always include the active signing key.
//!
//! # Concurrency model
//! All derived key pairs live in one [`CredentialCache`]; concurrent misses for
//! the same interval load the master secret and derive exactly once.
//!
//! # Common pitfalls
//! - A rollover larger than the interval publishes keys from intervals that
//!   are two or more steps away; this is allowed but widens the set.
use crate::cache::{CredentialCache, DEFAULT_CACHE_TTL};
use crate::curve::{CurveName, EcPoint};
use crate::derivation::RollingKeyDerivation;
use crate::jwks::{Jwk, Jwks};
use crate::master_key::MasterKeyLoader;
use crate::time::TimeProvider;
use crate::KeyResult;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use zeroize::Zeroizing;

/// Interval used for every key when rotation is disabled.
pub const STATIC_INTERVAL: u64 = 1;

#[derive(Debug, Clone)]
pub struct AnonymousTokenKeyConfig {
    pub rotation_enabled: bool,
    pub rotation_interval: Duration,
    pub rollover: Duration,
    pub curve: CurveName,
    pub cache_ttl: Duration,
}

impl Default for AnonymousTokenKeyConfig {
    fn default() -> Self {
        Self {
            rotation_enabled: true,
            rotation_interval: Duration::from_secs(3 * 24 * 60 * 60),
            rollover: Duration::from_secs(24 * 60 * 60),
            curve: CurveName::P256,
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }
}

#[derive(Clone)]
pub struct SigningKeypair {
    pub kid: String,
    pub interval: u64,
    pub curve: CurveName,
    pub private_scalar: Zeroizing<Vec<u8>>,
    pub public_point: EcPoint,
}

impl SigningKeypair {
    pub fn validation_key(&self) -> ValidationKey {
        ValidationKey {
            kid: self.kid.clone(),
            curve: self.curve,
            public_point: self.public_point.clone(),
        }
    }
}

impl std::fmt::Debug for SigningKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeypair")
            .field("kid", &self.kid)
            .field("curve", &self.curve)
            .finish_non_exhaustive()
    }
}

/// Public projection of a [`SigningKeypair`]; safe to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationKey {
    pub kid: String,
    pub curve: CurveName,
    pub public_point: EcPoint,
}

impl ValidationKey {
    /// Key-set record with standard base64 big-endian coordinates.
    pub fn to_jwk(&self) -> Jwk {
        Jwk::ec(
            self.kid.clone(),
            self.curve.as_str(),
            STANDARD.encode(&self.public_point.x),
            STANDARD.encode(&self.public_point.y),
        )
    }
}

pub struct AnonymousTokenKeyStore {
    config: AnonymousTokenKeyConfig,
    loader: MasterKeyLoader,
    derivation: RollingKeyDerivation,
    cache: CredentialCache<Arc<SigningKeypair>>,
    time: Arc<dyn TimeProvider>,
}

impl AnonymousTokenKeyStore {
    pub fn new(
        config: AnonymousTokenKeyConfig,
        loader: MasterKeyLoader,
        derivation: RollingKeyDerivation,
        time: Arc<dyn TimeProvider>,
    ) -> Self {
        let cache = CredentialCache::new("anonymous_token_key", config.cache_ttl);
        Self {
            config,
            loader,
            derivation,
            cache,
            time,
        }
    }

    /// Rotation interval containing `unix_secs`. Pre-epoch instants clamp to 0.
    pub fn interval_at(&self, unix_secs: i64) -> u64 {
        if !self.config.rotation_enabled {
            return STATIC_INTERVAL;
        }
        let period = self.config.rotation_interval.as_secs().max(1);
        unix_secs.max(0) as u64 / period
    }

    pub fn current_interval(&self) -> u64 {
        self.interval_at(self.time.now_unix_secs())
    }

    pub async fn active_signing_keypair(&self) -> KeyResult<Arc<SigningKeypair>> {
        self.keypair_for_interval(self.current_interval()).await
    }

    /// Validation keys for `now - rollover`, `now` and `now + rollover`,
    /// deduplicated and ordered by interval.
    pub async fn active_validation_keys(&self) -> KeyResult<Vec<ValidationKey>> {
        let intervals: BTreeSet<u64> = if self.config.rotation_enabled {
            let now = self.time.now_unix_secs();
            let rollover = i64::try_from(self.config.rollover.as_secs()).unwrap_or(i64::MAX);
            [
                now.saturating_sub(rollover),
                now,
                now.saturating_add(rollover),
            ]
            .into_iter()
            .map(|instant| self.interval_at(instant))
            .collect()
        } else {
            BTreeSet::from([STATIC_INTERVAL])
        };

        let mut keys = Vec::with_capacity(intervals.len());
        for interval in intervals {
            keys.push(self.keypair_for_interval(interval).await?.validation_key());
        }
        Ok(keys)
    }

    /// Published key-set document for the active validation keys.
    pub async fn validation_key_set(&self) -> KeyResult<Jwks> {
        let keys = self.active_validation_keys().await?;
        Ok(Jwks {
            keys: keys.iter().map(ValidationKey::to_jwk).collect(),
        })
    }

    async fn keypair_for_interval(&self, interval: u64) -> KeyResult<Arc<SigningKeypair>> {
        let curve = self.config.curve;
        self.cache
            .get_or_compute(&format!("signing:{interval}"), || async move {
                let secret = self.loader.load().await?;
                let derived = self.derivation.derive(&secret, interval, curve)?;
                tracing::info!(
                    kid = interval,
                    %curve,
                    certificate_id = %self.loader.certificate_id(),
                    "derived anonymous-token key pair"
                );
                Ok(Arc::new(SigningKeypair {
                    kid: interval.to_string(),
                    interval,
                    curve,
                    private_scalar: derived.private_scalar,
                    public_point: derived.public_point,
                }))
            })
            .await
    }
}
