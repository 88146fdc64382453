//! Rate-limited identity verification.
//!
//! Order is fixed: limit check, identity check, record. Every attempt that
//! passes the limit check is recorded whether or not the identity check
//! succeeds, so repeated failures consume the same budget as successes.
use crate::rate_limit::{LimitDecision, VerificationRateLimiter};
use crate::store::StoreError;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// External identity check (e.g. a health-authority lookup).
#[async_trait]
pub trait IdentityCheck: Send + Sync {
    async fn check(&self, pseudonym: &str) -> anyhow::Result<bool>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationOutcome {
    Verified,
    NotVerified,
    LimitReached,
}

impl VerificationOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            VerificationOutcome::Verified => "verified",
            VerificationOutcome::NotVerified => "not_verified",
            VerificationOutcome::LimitReached => "limit_reached",
        }
    }
}

#[derive(Debug, Error)]
pub enum VerificationError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("identity check failed: {0}")]
    IdentityCheck(anyhow::Error),
}

pub struct VerificationService {
    limiter: VerificationRateLimiter,
    checker: Arc<dyn IdentityCheck>,
}

impl VerificationService {
    pub fn new(limiter: VerificationRateLimiter, checker: Arc<dyn IdentityCheck>) -> Self {
        Self { limiter, checker }
    }

    pub async fn verify(&self, pseudonym: &str) -> Result<VerificationOutcome, VerificationError> {
        let outcome = self.verify_inner(pseudonym).await?;
        metrics::counter!("anontoken_verifications_total", "outcome" => outcome.as_str())
            .increment(1);
        Ok(outcome)
    }

    async fn verify_inner(&self, pseudonym: &str) -> Result<VerificationOutcome, VerificationError> {
        if self.limiter.check(pseudonym).await? == LimitDecision::LimitReached {
            tracing::info!("verification limit reached");
            return Ok(VerificationOutcome::LimitReached);
        }
        let verified = self
            .checker
            .check(pseudonym)
            .await
            .map_err(VerificationError::IdentityCheck)?;
        self.limiter.record(pseudonym).await?;
        Ok(if verified {
            VerificationOutcome::Verified
        } else {
            VerificationOutcome::NotVerified
        })
    }
}
