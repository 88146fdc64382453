//! In-memory implementation of the issuance and verification repositories.
//!
//! # Purpose
//! Backs local development and tests. All state is lost on restart, so the
//! at-most-once issuance guarantee only holds for the life of the process.
//!
//! # Concurrency
//! Each table sits behind its own `tokio::sync::RwLock`. `save` on issue
//! records checks and inserts under one write lock, which gives the same
//! uniqueness guarantee the Postgres constraint does.
use super::{
    AnonymousTokenIssueRecord, IssueRecordRepository, StoreError, StoreHealth, StoreResult,
    VerificationRecord, VerificationRecordRepository,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone, Default)]
pub struct InMemoryStore {
    issue_records: Arc<RwLock<HashMap<String, AnonymousTokenIssueRecord>>>,
    verification_records: Arc<RwLock<HashMap<String, Vec<i64>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IssueRecordRepository for InMemoryStore {
    async fn save(&self, record: AnonymousTokenIssueRecord) -> StoreResult<()> {
        let mut records = self.issue_records.write().await;
        match records.entry(record.session_token_id.clone()) {
            Entry::Occupied(_) => Err(StoreError::Conflict(
                "issue record exists for session token".into(),
            )),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }

    async fn find_by_session_token_id(
        &self,
        session_token_id: &str,
    ) -> StoreResult<Vec<AnonymousTokenIssueRecord>> {
        let records = self.issue_records.read().await;
        Ok(records.get(session_token_id).cloned().into_iter().collect())
    }

    async fn delete_expired(&self, now: i64) -> StoreResult<u64> {
        let mut records = self.issue_records.write().await;
        let before = records.len();
        records.retain(|_, record| record.expires_at > now);
        Ok((before - records.len()) as u64)
    }
}

#[async_trait]
impl VerificationRecordRepository for InMemoryStore {
    async fn save(&self, record: VerificationRecord) -> StoreResult<()> {
        let mut records = self.verification_records.write().await;
        records
            .entry(record.pseudonym)
            .or_default()
            .push(record.verified_at);
        Ok(())
    }

    async fn find_for_identity(
        &self,
        pseudonym: &str,
        cutoff: i64,
    ) -> StoreResult<Vec<VerificationRecord>> {
        let records = self.verification_records.read().await;
        Ok(records
            .get(pseudonym)
            .map(|times| {
                times
                    .iter()
                    .filter(|verified_at| **verified_at >= cutoff)
                    .map(|verified_at| VerificationRecord {
                        pseudonym: pseudonym.to_string(),
                        verified_at: *verified_at,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete_expired(&self, cutoff: i64) -> StoreResult<u64> {
        let mut records = self.verification_records.write().await;
        let mut deleted = 0u64;
        records.retain(|_, times| {
            let before = times.len();
            times.retain(|verified_at| *verified_at >= cutoff);
            deleted += (before - times.len()) as u64;
            !times.is_empty()
        });
        Ok(deleted)
    }
}

#[async_trait]
impl StoreHealth for InMemoryStore {
    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn is_durable(&self) -> bool {
        false
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
