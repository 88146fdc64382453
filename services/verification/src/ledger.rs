//! At-most-once anonymous-token issuance per session.
//!
//! The lookup-then-save sequence is not atomic here. The repository's
//! uniqueness guarantee closes the race: a concurrent winner makes our `save`
//! fail with `Conflict`, which is reported as a duplicate like any other.
use crate::store::{AnonymousTokenIssueRecord, IssueRecordRepository, StoreError, StoreResult};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssuanceOutcome {
    Accepted,
    DuplicateIssuance,
}

impl IssuanceOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            IssuanceOutcome::Accepted => "accepted",
            IssuanceOutcome::DuplicateIssuance => "duplicate",
        }
    }
}

#[derive(Clone)]
pub struct IssuanceLedger {
    records: Arc<dyn IssueRecordRepository>,
}

impl IssuanceLedger {
    pub fn new(records: Arc<dyn IssueRecordRepository>) -> Self {
        Self { records }
    }

    pub async fn try_issue(
        &self,
        session_token_id: &str,
        expires_at: i64,
    ) -> StoreResult<IssuanceOutcome> {
        let existing = self
            .records
            .find_by_session_token_id(session_token_id)
            .await?;
        if !existing.is_empty() {
            return Ok(IssuanceOutcome::DuplicateIssuance);
        }
        let record = AnonymousTokenIssueRecord {
            session_token_id: session_token_id.to_string(),
            expires_at,
        };
        match self.records.save(record).await {
            Ok(()) => Ok(IssuanceOutcome::Accepted),
            Err(StoreError::Conflict(_)) => Ok(IssuanceOutcome::DuplicateIssuance),
            Err(err) => Err(err),
        }
    }

    /// Remove records whose expiry is at or before `now`.
    pub async fn purge_expired(&self, now: i64) -> StoreResult<u64> {
        self.records.delete_expired(now).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts saves and can hide existing rows from lookups to simulate a race.
    struct CountingRepository {
        inner: InMemoryStore,
        saves: AtomicUsize,
        blind_lookups: bool,
    }

    impl CountingRepository {
        fn new(blind_lookups: bool) -> Self {
            Self {
                inner: InMemoryStore::new(),
                saves: AtomicUsize::new(0),
                blind_lookups,
            }
        }
    }

    #[async_trait]
    impl IssueRecordRepository for CountingRepository {
        async fn save(&self, record: AnonymousTokenIssueRecord) -> StoreResult<()> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            IssueRecordRepository::save(&self.inner, record).await
        }

        async fn find_by_session_token_id(
            &self,
            session_token_id: &str,
        ) -> StoreResult<Vec<AnonymousTokenIssueRecord>> {
            if self.blind_lookups {
                return Ok(Vec::new());
            }
            self.inner.find_by_session_token_id(session_token_id).await
        }

        async fn delete_expired(&self, now: i64) -> StoreResult<u64> {
            IssueRecordRepository::delete_expired(&self.inner, now).await
        }
    }

    #[tokio::test]
    async fn second_issue_for_same_session_is_duplicate() {
        let repo = Arc::new(CountingRepository::new(false));
        let ledger = IssuanceLedger::new(repo.clone());
        assert_eq!(
            ledger.try_issue("token-A", 100).await.expect("first"),
            IssuanceOutcome::Accepted
        );
        assert_eq!(
            ledger.try_issue("token-A", 100).await.expect("second"),
            IssuanceOutcome::DuplicateIssuance
        );
        assert_eq!(repo.saves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn storage_conflict_is_a_duplicate() {
        let repo = Arc::new(CountingRepository::new(true));
        let ledger = IssuanceLedger::new(repo.clone());
        ledger.try_issue("token-B", 100).await.expect("first");
        let outcome = ledger.try_issue("token-B", 100).await.expect("second");
        assert_eq!(outcome, IssuanceOutcome::DuplicateIssuance);
    }

    #[tokio::test]
    async fn distinct_sessions_are_independent() {
        let ledger = IssuanceLedger::new(Arc::new(InMemoryStore::new()));
        assert_eq!(
            ledger.try_issue("a", 100).await.expect("a"),
            IssuanceOutcome::Accepted
        );
        assert_eq!(
            ledger.try_issue("b", 100).await.expect("b"),
            IssuanceOutcome::Accepted
        );
    }

    #[tokio::test]
    async fn purge_allows_reissue_after_expiry() {
        let ledger = IssuanceLedger::new(Arc::new(InMemoryStore::new()));
        ledger.try_issue("token-C", 100).await.expect("issue");
        assert_eq!(ledger.purge_expired(100).await.expect("purge"), 1);
        assert_eq!(
            ledger.try_issue("token-C", 200).await.expect("reissue"),
            IssuanceOutcome::Accepted
        );
    }
}
