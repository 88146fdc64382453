//! Public key-set endpoints.
//!
//! # Key invariants
//! - Only public material leaves through here: EC points and RSA `n`/`e`.
//! - Session-token keys use base64url (JWKS); anonymous-token keys use
//!   standard base64 coordinates.
//!
//! # Security model
//! Anyone may call these endpoints; the keys are public by design. Failures
//! to load key material surface as `500 internal` without details.
use crate::api::error::{ApiError, api_key_error};
use crate::app::AppState;
use anontoken_keys::Jwks;
use axum::Json;
use axum::extract::State;

/// `GET /.well-known/jwks.json`: every enabled session-token validation key.
pub(crate) async fn session_jwks(State(state): State<AppState>) -> Result<Json<Jwks>, ApiError> {
    state
        .credentials
        .jwks()
        .await
        .map(Json)
        .map_err(|err| api_key_error("signing credentials unavailable", &err))
}

/// `GET /v1/anonymous-tokens/keys`: validation keys across the rollover window.
pub(crate) async fn anonymous_token_keys(
    State(state): State<AppState>,
) -> Result<Json<Jwks>, ApiError> {
    state
        .anonymous_token_keys
        .validation_key_set()
        .await
        .map(Json)
        .map_err(|err| api_key_error("anonymous-token keys unavailable", &err))
}
