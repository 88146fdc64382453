//! Verification service HTTP application wiring.
//!
//! # Purpose
//! Builds the Axum router, configures middleware, and defines the shared
//! application state injected into handlers.
//!
//! # Notes
//! Issuance and verification are optional: a deployment without a token
//! primitive or identity check still serves key sets and health.
use crate::api;
use crate::issuance::AnonymousTokenService;
use crate::store::StoreHealth;
use crate::verification::VerificationService;
use anontoken_keys::{AnonymousTokenKeyStore, SessionTokenVerifier, SigningCredentialRollover};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub api_version: String,
    pub store_health: Arc<dyn StoreHealth>,
    pub anonymous_token_keys: Arc<AnonymousTokenKeyStore>,
    pub credentials: Arc<SigningCredentialRollover>,
    pub session_verifier: Arc<SessionTokenVerifier>,
    pub anonymous_tokens: Option<Arc<AnonymousTokenService>>,
    pub verification: Option<Arc<VerificationService>>,
}

pub fn build_router(state: AppState) -> Router {
    let trace_layer =
        TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
            tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri(),
                version = ?request.version()
            )
        });

    Router::new()
        .route("/v1/health", axum::routing::get(api::system::health))
        .route(
            "/.well-known/jwks.json",
            axum::routing::get(api::keys::session_jwks),
        )
        .route(
            "/v1/anonymous-tokens/keys",
            axum::routing::get(api::keys::anonymous_token_keys),
        )
        .route(
            "/v1/anonymous-tokens",
            axum::routing::post(api::tokens::issue_token),
        )
        .route(
            "/v1/verifications",
            axum::routing::post(api::tokens::verify),
        )
        .layer(trace_layer)
        .with_state(state)
}
