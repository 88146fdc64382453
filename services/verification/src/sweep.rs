//! Periodic deletion of expired issuance and verification records.
//!
//! Best-effort: a failed pass is logged and retried on the next tick; it never
//! stops the task or the service.
use crate::ledger::IssuanceLedger;
use crate::rate_limit::VerificationRateLimiter;
use anontoken_keys::TimeProvider;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub issue_records: u64,
    pub verification_records: u64,
}

pub struct ExpirySweeper {
    ledger: IssuanceLedger,
    limiter: VerificationRateLimiter,
    time: Arc<dyn TimeProvider>,
}

impl ExpirySweeper {
    pub fn new(
        ledger: IssuanceLedger,
        limiter: VerificationRateLimiter,
        time: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            ledger,
            limiter,
            time,
        }
    }

    /// Run one pass. Each table is swept even if the other fails.
    pub async fn run_once(&self) -> SweepReport {
        let mut report = SweepReport::default();
        match self.ledger.purge_expired(self.time.now_unix_secs()).await {
            Ok(deleted) => {
                report.issue_records = deleted;
                metrics::counter!("anontoken_sweep_deleted_total", "table" => "issue_records")
                    .increment(deleted);
            }
            Err(err) => tracing::warn!(error = %err, "issue record sweep failed"),
        }
        match self.limiter.purge_expired().await {
            Ok(deleted) => {
                report.verification_records = deleted;
                metrics::counter!(
                    "anontoken_sweep_deleted_total",
                    "table" => "verification_records"
                )
                .increment(deleted);
            }
            Err(err) => tracing::warn!(error = %err, "verification record sweep failed"),
        }
        if report != SweepReport::default() {
            tracing::info!(
                issue_records = report.issue_records,
                verification_records = report.verification_records,
                "expired records deleted"
            );
        }
        report
    }

    pub fn spawn(self, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                self.run_once().await;
            }
        })
    }
}
