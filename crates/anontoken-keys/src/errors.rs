use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("certificate not found: {0}")]
    CertificateNotFound(String),
    #[error("unsupported key format: {0}")]
    UnsupportedKeyFormat(String),
    #[error("no private scalar in range after {attempts} attempts for interval {interval}")]
    KeyGenerationExhausted { interval: u64, attempts: u32 },
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),
    #[error("certificate store error: {0}")]
    CertificateStore(String),
    #[error("jwt error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("session token rejected: {0}")]
    TokenRejected(String),
}

pub type KeyResult<T> = Result<T, KeyError>;
