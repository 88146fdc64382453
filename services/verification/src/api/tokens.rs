//! Anonymous-token issuance and verification endpoints.
//!
//! # Key invariants
//! - Issuance requires a valid session token; its `jti` is the ledger key.
//! - A repeat issuance is `409 duplicate_issuance` and must not be retried.
//! - A reached verification limit is `429 verification_limit_reached`.
use crate::api::error::{
    ApiError, api_conflict, api_internal, api_internal_message, api_key_error, api_not_enabled,
    api_too_many_requests, api_unauthorized, api_validation_error,
};
use crate::api::types::{IssueTokenRequest, IssueTokenResponse, VerifyRequest, VerifyResponse};
use crate::app::AppState;
use crate::issuance::{IssuanceError, IssuanceResult, PrimitiveError};
use crate::verification::{VerificationError, VerificationOutcome};
use anontoken_keys::KeyError;
use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

pub(crate) async fn issue_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<IssueTokenRequest>,
) -> Result<Json<IssueTokenResponse>, ApiError> {
    let service = state
        .anonymous_tokens
        .as_ref()
        .ok_or_else(|| api_not_enabled("anonymous token issuance not enabled"))?;
    let bearer =
        extract_bearer(&headers).ok_or_else(|| api_unauthorized("missing bearer token"))?;
    let session = match state.session_verifier.verify(bearer).await {
        Ok(claims) => claims,
        Err(err @ (KeyError::Jwt(_) | KeyError::TokenRejected(_))) => {
            tracing::debug!(error = %err, "session token rejected");
            return Err(api_unauthorized("invalid session token"));
        }
        Err(err) => return Err(api_key_error("signing credentials unavailable", &err)),
    };
    let masked_point = STANDARD
        .decode(body.masked_point.as_bytes())
        .map_err(|_| api_validation_error("masked_point must be base64"))?;

    match service.issue(&session, &masked_point).await {
        Ok(IssuanceResult::Issued(token)) => Ok(Json(IssueTokenResponse {
            kid: token.kid,
            signed_point: STANDARD.encode(&token.response.signed_point),
            proof_challenge: STANDARD.encode(&token.response.proof_challenge),
            proof_response: STANDARD.encode(&token.response.proof_response),
        })),
        Ok(IssuanceResult::DuplicateIssuance) => Err(api_conflict(
            "duplicate_issuance",
            "an anonymous token was already issued for this session",
        )),
        Err(IssuanceError::Primitive(PrimitiveError::InvalidMaskedPoint(reason))) => {
            Err(api_validation_error(&format!("invalid masked_point: {reason}")))
        }
        Err(IssuanceError::Primitive(err)) => {
            tracing::error!(error = %err, "token primitive failed");
            Err(api_internal_message("token issuance failed"))
        }
        Err(IssuanceError::Keys(err)) => Err(api_key_error("signing keys unavailable", &err)),
        Err(IssuanceError::Store(err)) => Err(api_internal("issuance ledger unavailable", &err)),
    }
}

pub(crate) async fn verify(
    State(state): State<AppState>,
    Json(body): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let service = state
        .verification
        .as_ref()
        .ok_or_else(|| api_not_enabled("verification not enabled"))?;
    if body.pseudonym.trim().is_empty() {
        return Err(api_validation_error("pseudonym must not be empty"));
    }
    match service.verify(&body.pseudonym).await {
        Ok(VerificationOutcome::LimitReached) => Err(api_too_many_requests(
            "verification_limit_reached",
            "verification limit reached; try again later",
        )),
        Ok(outcome) => Ok(Json(VerifyResponse {
            outcome: outcome.as_str().to_string(),
        })),
        Err(VerificationError::Store(err)) => {
            Err(api_internal("verification records unavailable", &err))
        }
        Err(VerificationError::IdentityCheck(err)) => {
            tracing::error!(error = %err, "identity check failed");
            Err(api_internal_message("identity check unavailable"))
        }
    }
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(axum::http::header::AUTHORIZATION)?;
    let value = value.to_str().ok()?;
    value.strip_prefix("Bearer ")
}
