//! Anonymous-token issuance orchestration.
//!
//! # Purpose
//! Ties a verified session to exactly one blind-signed token: the ledger
//! rejects repeat sessions, the key store supplies the current interval's
//! key pair, and the external VOPRF primitive signs the client's masked point.
//!
//! # Key invariants
//! - The ledger is consulted before any key material is touched.
//! - A duplicate is a normal outcome, not an error.
//! - A ledger record outlives every instant at which its session token still
//!   verifies: it expires at `exp + session_leeway + 1`, the first second
//!   at which the verifier rejects the token.
//! - Private scalars are handed to the primitive and never logged.
use crate::ledger::{IssuanceLedger, IssuanceOutcome};
use crate::store::StoreError;
use anontoken_keys::{AnonymousTokenKeyStore, CurveName, EcPoint, KeyError, SessionClaims};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Inputs for one blind signature.
pub struct PrimitiveRequest<'a> {
    pub curve: CurveName,
    pub private_scalar: &'a [u8],
    pub public_point: &'a EcPoint,
    pub masked_point: &'a [u8],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimitiveResponse {
    pub signed_point: Vec<u8>,
    pub proof_challenge: Vec<u8>,
    pub proof_response: Vec<u8>,
}

/// The VOPRF issuer: evaluates the key on a masked point and proves it.
pub trait TokenIssuancePrimitive: Send + Sync {
    fn issue(&self, request: PrimitiveRequest<'_>) -> Result<PrimitiveResponse, PrimitiveError>;
}

#[derive(Debug, Error)]
pub enum PrimitiveError {
    #[error("masked point rejected: {0}")]
    InvalidMaskedPoint(String),
    #[error("token primitive failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub kid: String,
    pub response: PrimitiveResponse,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssuanceResult {
    Issued(IssuedToken),
    DuplicateIssuance,
}

#[derive(Debug, Error)]
pub enum IssuanceError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Keys(#[from] KeyError),
    #[error(transparent)]
    Primitive(#[from] PrimitiveError),
}

pub struct AnonymousTokenService {
    ledger: IssuanceLedger,
    keys: Arc<AnonymousTokenKeyStore>,
    primitive: Arc<dyn TokenIssuancePrimitive>,
    session_leeway: Duration,
}

impl AnonymousTokenService {
    /// `session_leeway` must be at least the session verifier's leeway.
    pub fn new(
        ledger: IssuanceLedger,
        keys: Arc<AnonymousTokenKeyStore>,
        primitive: Arc<dyn TokenIssuancePrimitive>,
        session_leeway: Duration,
    ) -> Self {
        Self {
            ledger,
            keys,
            primitive,
            session_leeway,
        }
    }

    fn record_expiry(&self, session: &SessionClaims) -> i64 {
        let leeway = i64::try_from(self.session_leeway.as_secs()).unwrap_or(i64::MAX);
        session.exp.saturating_add(leeway).saturating_add(1)
    }

    pub async fn issue(
        &self,
        session: &SessionClaims,
        masked_point: &[u8],
    ) -> Result<IssuanceResult, IssuanceError> {
        let outcome = self
            .ledger
            .try_issue(&session.jti, self.record_expiry(session))
            .await?;
        metrics::counter!("anontoken_issuance_total", "outcome" => outcome.as_str()).increment(1);
        if outcome == IssuanceOutcome::DuplicateIssuance {
            tracing::info!(jti = %session.jti, "anonymous token already issued for session");
            return Ok(IssuanceResult::DuplicateIssuance);
        }

        let keypair = self.keys.active_signing_keypair().await?;
        let response = self.primitive.issue(PrimitiveRequest {
            curve: keypair.curve,
            private_scalar: &keypair.private_scalar,
            public_point: &keypair.public_point,
            masked_point,
        })?;
        tracing::info!(jti = %session.jti, kid = %keypair.kid, "anonymous token issued");
        Ok(IssuanceResult::Issued(IssuedToken {
            kid: keypair.kid.clone(),
            response,
        }))
    }
}
