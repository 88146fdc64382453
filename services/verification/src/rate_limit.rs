//! Trailing-window verification limits per pseudonym.
//!
//! # Boundary policy
//! The limit is reached when the number of in-window records, counting the
//! attempt about to be recorded, is strictly greater than
//! `max_verifications_allowed`. With a maximum of 3, two prior records allow
//! the third attempt and three prior records reject the fourth.
use crate::store::{StoreResult, VerificationRecord, VerificationRecordRepository};
use anontoken_keys::TimeProvider;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationLimit {
    pub max_verifications_allowed: u32,
    pub max_limit_duration: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitDecision {
    Allowed,
    LimitReached,
}

#[derive(Clone)]
pub struct VerificationRateLimiter {
    limit: VerificationLimit,
    records: Arc<dyn VerificationRecordRepository>,
    time: Arc<dyn TimeProvider>,
}

impl VerificationRateLimiter {
    pub fn new(
        limit: VerificationLimit,
        records: Arc<dyn VerificationRecordRepository>,
        time: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            limit,
            records,
            time,
        }
    }

    /// `now - max_limit_duration`; records before this no longer count.
    pub fn cutoff(&self) -> i64 {
        let window = i64::try_from(self.limit.max_limit_duration.as_secs()).unwrap_or(i64::MAX);
        self.time.now_unix_secs().saturating_sub(window)
    }

    pub fn has_reached_limit(&self, records: &[VerificationRecord]) -> bool {
        let cutoff = self.cutoff();
        let in_window = records
            .iter()
            .filter(|record| record.verified_at >= cutoff)
            .count();
        in_window > self.limit.max_verifications_allowed as usize
    }

    /// Decide whether one more verification for `pseudonym` is allowed.
    pub async fn check(&self, pseudonym: &str) -> StoreResult<LimitDecision> {
        let mut records = self
            .records
            .find_for_identity(pseudonym, self.cutoff())
            .await?;
        records.push(self.prospective(pseudonym));
        if self.has_reached_limit(&records) {
            Ok(LimitDecision::LimitReached)
        } else {
            Ok(LimitDecision::Allowed)
        }
    }

    pub async fn record(&self, pseudonym: &str) -> StoreResult<()> {
        self.records.save(self.prospective(pseudonym)).await
    }

    /// Delete every record older than the cutoff, for all pseudonyms.
    pub async fn purge_expired(&self) -> StoreResult<u64> {
        self.records.delete_expired(self.cutoff()).await
    }

    fn prospective(&self, pseudonym: &str) -> VerificationRecord {
        VerificationRecord {
            pseudonym: pseudonym.to_string(),
            verified_at: self.time.now_unix_secs(),
        }
    }
}
