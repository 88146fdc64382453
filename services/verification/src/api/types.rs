use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub request_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub backend: String,
}

/// Body of `POST /v1/anonymous-tokens`; `masked_point` is standard base64.
#[derive(Debug, Serialize, Deserialize)]
pub struct IssueTokenRequest {
    pub masked_point: String,
}

/// Signed point and DLEQ proof, all standard base64.
#[derive(Debug, Serialize, Deserialize)]
pub struct IssueTokenResponse {
    pub kid: String,
    pub signed_point: String,
    pub proof_challenge: String,
    pub proof_response: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyRequest {
    pub pseudonym: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub outcome: String,
}
