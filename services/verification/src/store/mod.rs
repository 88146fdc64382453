//! Repository contracts for issuance and verification bookkeeping.
//!
//! # Key invariants
//! - At most one issue record exists per `session_token_id`; a second `save`
//!   fails with [`StoreError::Conflict`].
//! - Verification records are append-only and removed only by expiry.
//! - Timestamps are Unix seconds.
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub mod memory;
pub mod postgres;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnonymousTokenIssueRecord {
    pub session_token_id: String,
    pub expires_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationRecord {
    pub pseudonym: String,
    pub verified_at: i64,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound("row not found".to_string()),
            other => StoreError::Unexpected(other.into()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StoreError::Unexpected(err.into())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait IssueRecordRepository: Send + Sync {
    /// Persist a record; `Conflict` when the session id already has one.
    async fn save(&self, record: AnonymousTokenIssueRecord) -> StoreResult<()>;
    async fn find_by_session_token_id(
        &self,
        session_token_id: &str,
    ) -> StoreResult<Vec<AnonymousTokenIssueRecord>>;
    /// Delete records whose expiry is at or before `now`.
    async fn delete_expired(&self, now: i64) -> StoreResult<u64>;
}

#[async_trait]
pub trait VerificationRecordRepository: Send + Sync {
    async fn save(&self, record: VerificationRecord) -> StoreResult<()>;
    /// Records for `pseudonym` verified at or after `cutoff`.
    async fn find_for_identity(
        &self,
        pseudonym: &str,
        cutoff: i64,
    ) -> StoreResult<Vec<VerificationRecord>>;
    /// Delete every record verified before `cutoff`, for all pseudonyms.
    async fn delete_expired(&self, cutoff: i64) -> StoreResult<u64>;
}

#[async_trait]
pub trait StoreHealth: Send + Sync {
    async fn health_check(&self) -> StoreResult<()>;
    fn is_durable(&self) -> bool;
    fn backend_name(&self) -> &'static str;
}

/// Both repositories plus health, usually backed by one store.
#[derive(Clone)]
pub struct Repositories {
    pub issue_records: Arc<dyn IssueRecordRepository>,
    pub verification_records: Arc<dyn VerificationRecordRepository>,
    pub health: Arc<dyn StoreHealth>,
}

impl Repositories {
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: IssueRecordRepository + VerificationRecordRepository + StoreHealth + 'static,
    {
        Self {
            issue_records: store.clone(),
            verification_records: store.clone(),
            health: store,
        }
    }
}
