//! Anonymous-token verification HTTP service entry point.
//!
//! # Purpose
//! Wires configuration, storage, key material, and the HTTP router, then
//! starts the API server, the metrics listener, and the expiry sweeper.
//!
//! # Notes
//! The `build_state` helper keeps wiring testable and minimizes main setup logic.
//! The token primitive and identity check are supplied by embedding
//! deployments through the library; this binary serves key sets and health.
use anontoken_keys::{
    AnonymousTokenKeyStore, CertificateLocator, DEFAULT_SESSION_TOKEN_LEEWAY_SECS, MasterKeyLoader,
    PemDirectoryLocator, RollingKeyDerivation, SessionTokenVerifier, SigningCredentialRollover,
    SystemTimeProvider, TimeProvider,
};
use anyhow::Context;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use verification::app::{AppState, build_router};
use verification::config::{self, ServiceConfig};
use verification::ledger::IssuanceLedger;
use verification::observability;
use verification::rate_limit::{VerificationLimit, VerificationRateLimiter};
use verification::store::{Repositories, memory::InMemoryStore, postgres::PostgresStore};
use verification::sweep::ExpirySweeper;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::from_env_or_yaml().context("load verification config")?;
    run_with_shutdown(config, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
}

async fn run_with_shutdown<F>(config: ServiceConfig, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let metrics_handle = observability::init_observability("anontoken-verification")?;
    let (state, sweeper) = build_state(config.clone()).await?;
    tracing::info!(
        backend = state.store_health.backend_name(),
        durable = state.store_health.is_durable(),
        "storage ready"
    );
    let metrics_task = tokio::spawn(observability::serve_metrics(
        metrics_handle,
        config.metrics_bind,
    ));
    let sweep_task = sweeper.spawn(Duration::from_secs(config.sweep_interval_secs));

    let app = build_router(state);
    let addr = config.bind_addr;
    tracing::info!(%addr, "verification service listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tokio::pin!(shutdown);
    tokio::select! {
        result = axum::serve(listener, app.into_make_service()) => {
            result?;
        }
        _ = &mut shutdown => {}
    }

    metrics_task.abort();
    sweep_task.abort();
    let _ = metrics_task.await;
    let _ = sweep_task.await;
    Ok(())
}

async fn build_state(config: ServiceConfig) -> anyhow::Result<(AppState, ExpirySweeper)> {
    config.validate()?;
    let repositories = match config.storage {
        config::StorageBackend::Memory => Repositories::from_store(Arc::new(InMemoryStore::new())),
        config::StorageBackend::Postgres => {
            let pg = config
                .postgres
                .as_ref()
                .context("postgres configuration missing")?;
            let store = PostgresStore::connect(pg)
                .await
                .context("connect postgres store")?;
            Repositories::from_store(Arc::new(store))
        }
    };

    let time: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let locator: Arc<dyn CertificateLocator> =
        Arc::new(PemDirectoryLocator::new(config.certificate_dir.clone()));

    let anonymous_token_keys = Arc::new(AnonymousTokenKeyStore::new(
        config.anonymous_tokens.key_config(),
        MasterKeyLoader::new(
            locator.clone(),
            config.anonymous_tokens.master_key_certificate_id.clone(),
        ),
        RollingKeyDerivation::default(),
        time.clone(),
    ));
    let credentials = Arc::new(SigningCredentialRollover::new(
        config.signing.credential_config(),
        locator,
        time.clone(),
    ));
    let session_verifier = Arc::new(SessionTokenVerifier::new(
        config.signing.issuer.clone(),
        config.signing.audience.clone(),
        DEFAULT_SESSION_TOKEN_LEEWAY_SECS,
        credentials.clone(),
        time.clone(),
    ));

    let limiter = VerificationRateLimiter::new(
        VerificationLimit {
            max_verifications_allowed: config.verification_limit.max_verifications_allowed,
            max_limit_duration: Duration::from_secs(
                config.verification_limit.max_limit_duration_secs,
            ),
        },
        repositories.verification_records.clone(),
        time.clone(),
    );
    let sweeper = ExpirySweeper::new(
        IssuanceLedger::new(repositories.issue_records.clone()),
        limiter,
        time,
    );

    let state = AppState {
        api_version: "v1".to_string(),
        store_health: repositories.health,
        anonymous_token_keys,
        credentials,
        session_verifier,
        anonymous_tokens: None,
        verification: None,
    };
    Ok((state, sweeper))
}
