#![allow(dead_code)]

use anontoken_keys::{
    AnonymousTokenKeyConfig, AnonymousTokenKeyStore, Certificate, CertificateKey,
    CertificateLocator, CertificateVersion, CurveName, EcKeyMaterial, InMemoryCertificateLocator,
    ManualTimeProvider, MasterKeyLoader, RollingKeyDerivation, SessionTokenIssuer,
    SessionTokenVerifier, SigningCredentialConfig, SigningCredentialRollover, TimeProvider,
};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use std::sync::Arc;
use std::time::Duration;
use verification::app::{AppState, build_router};
use verification::issuance::{
    AnonymousTokenService, PrimitiveError, PrimitiveRequest, PrimitiveResponse,
    TokenIssuancePrimitive,
};
use verification::ledger::IssuanceLedger;
use verification::rate_limit::{VerificationLimit, VerificationRateLimiter};
use verification::store::Repositories;
use verification::store::memory::InMemoryStore;
use verification::sweep::ExpirySweeper;
use verification::verification::{IdentityCheck, VerificationService};

pub const NOW: i64 = 1_700_000_000;
pub const DAY: i64 = 86_400;
pub const ISSUER: &str = "anontoken";
pub const AUDIENCE: &str = "anontoken-clients";

pub async fn read_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

/// Signs by reversing the masked point; enough to observe the round trip.
pub struct ReversingPrimitive;

impl TokenIssuancePrimitive for ReversingPrimitive {
    fn issue(&self, request: PrimitiveRequest<'_>) -> Result<PrimitiveResponse, PrimitiveError> {
        if request.masked_point.is_empty() {
            return Err(PrimitiveError::InvalidMaskedPoint("empty".to_string()));
        }
        let mut signed = request.masked_point.to_vec();
        signed.reverse();
        Ok(PrimitiveResponse {
            signed_point: signed,
            proof_challenge: vec![1, 2, 3],
            proof_response: vec![4, 5, 6],
        })
    }
}

/// Accepts pseudonyms starting with `ok-`.
pub struct PrefixIdentityCheck;

#[async_trait]
impl IdentityCheck for PrefixIdentityCheck {
    async fn check(&self, pseudonym: &str) -> anyhow::Result<bool> {
        Ok(pseudonym.starts_with("ok-"))
    }
}

pub fn ec_version(id: &str, version: &str, seed: u8, created_at: i64) -> CertificateVersion {
    CertificateVersion {
        certificate: Certificate {
            id: id.to_string(),
            version: version.to_string(),
            key: CertificateKey::Ec(
                EcKeyMaterial::from_private_scalar(CurveName::P256, &[seed; 32]).expect("scalar"),
            ),
        },
        created_at,
    }
}

pub struct TestApp {
    pub state: AppState,
    pub time: Arc<ManualTimeProvider>,
    pub session_issuer: SessionTokenIssuer,
    pub repositories: Repositories,
    pub verification_limit: VerificationLimit,
}

impl TestApp {
    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone())
    }

    /// Sweeper over the same repositories and clock as the router.
    pub fn sweeper(&self) -> ExpirySweeper {
        let time: Arc<dyn TimeProvider> = self.time.clone();
        ExpirySweeper::new(
            IssuanceLedger::new(self.repositories.issue_records.clone()),
            VerificationRateLimiter::new(
                self.verification_limit,
                self.repositories.verification_records.clone(),
                time.clone(),
            ),
            time,
        )
    }
}

pub async fn test_app(enable_services: bool) -> TestApp {
    let locator = Arc::new(InMemoryCertificateLocator::new());
    locator.insert(ec_version("master", "v1", 7, NOW - 30 * DAY)).await;
    locator.insert(ec_version("signing", "v1", 9, NOW - 3 * DAY)).await;
    let locator: Arc<dyn CertificateLocator> = locator;

    let time = Arc::new(ManualTimeProvider::new(NOW));
    let time_dyn: Arc<dyn TimeProvider> = time.clone();

    let keys = Arc::new(AnonymousTokenKeyStore::new(
        AnonymousTokenKeyConfig::default(),
        MasterKeyLoader::new(locator.clone(), "master"),
        RollingKeyDerivation::default(),
        time_dyn.clone(),
    ));
    let credentials = Arc::new(SigningCredentialRollover::new(
        SigningCredentialConfig::new("signing"),
        locator,
        time_dyn.clone(),
    ));
    let session_verifier = Arc::new(SessionTokenVerifier::new(
        ISSUER,
        AUDIENCE,
        60,
        credentials.clone(),
        time_dyn.clone(),
    ));
    let session_issuer = SessionTokenIssuer::new(
        ISSUER,
        AUDIENCE,
        Duration::from_secs(3600),
        credentials.clone(),
        time_dyn.clone(),
    );

    let repositories = Repositories::from_store(Arc::new(InMemoryStore::new()));
    let verification_limit = VerificationLimit {
        max_verifications_allowed: 2,
        max_limit_duration: Duration::from_secs(DAY as u64),
    };
    let (anonymous_tokens, verification) = if enable_services {
        let service = AnonymousTokenService::new(
            IssuanceLedger::new(repositories.issue_records.clone()),
            keys.clone(),
            Arc::new(ReversingPrimitive),
            Duration::from_secs(session_verifier.leeway()),
        );
        let limiter = VerificationRateLimiter::new(
            verification_limit,
            repositories.verification_records.clone(),
            time_dyn.clone(),
        );
        (
            Some(Arc::new(service)),
            Some(Arc::new(VerificationService::new(
                limiter,
                Arc::new(PrefixIdentityCheck),
            ))),
        )
    } else {
        (None, None)
    };

    TestApp {
        state: AppState {
            api_version: "v1".to_string(),
            store_health: repositories.health.clone(),
            anonymous_token_keys: keys,
            credentials,
            session_verifier,
            anonymous_tokens,
            verification,
        },
        time,
        session_issuer,
        repositories,
        verification_limit,
    }
}
