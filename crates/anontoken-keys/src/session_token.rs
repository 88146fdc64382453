use crate::rollover::SigningCredentialRollover;
use crate::time::TimeProvider;
use crate::{KeyError, KeyResult};
use jsonwebtoken::{Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Seconds past `exp` a session token is still accepted.
pub const DEFAULT_SESSION_TOKEN_LEEWAY_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub iss: String,
    pub aud: String,
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
    /// Session identifier; at most one anonymous token is issued per value.
    pub jti: String,
}

#[derive(Debug, Clone)]
pub struct IssuedSessionToken {
    pub token: String,
    pub jti: String,
    pub expires_at: i64,
}

pub struct SessionTokenIssuer {
    issuer: String,
    audience: String,
    ttl: Duration,
    credentials: Arc<SigningCredentialRollover>,
    time: Arc<dyn TimeProvider>,
}

impl SessionTokenIssuer {
    pub fn new(
        issuer: impl Into<String>,
        audience: impl Into<String>,
        ttl: Duration,
        credentials: Arc<SigningCredentialRollover>,
        time: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            audience: audience.into(),
            ttl,
            credentials,
            time,
        }
    }

    pub async fn mint(&self, subject: &str) -> KeyResult<IssuedSessionToken> {
        let now = self.time.now_unix_secs();
        let exp = now.saturating_add(self.ttl.as_secs() as i64);
        let claims = SessionClaims {
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            sub: subject.to_string(),
            exp,
            iat: now,
            jti: new_jti(),
        };
        let credential = self.credentials.active_credential().await?;
        let mut header = Header::new(credential.algorithm);
        header.kid = Some(credential.kid.clone());
        let token = jsonwebtoken::encode(&header, &claims, credential.encoding_key())?;
        Ok(IssuedSessionToken {
            token,
            jti: claims.jti,
            expires_at: exp,
        })
    }
}

pub struct SessionTokenVerifier {
    issuer: String,
    audience: String,
    leeway: u64,
    credentials: Arc<SigningCredentialRollover>,
    time: Arc<dyn TimeProvider>,
}

impl SessionTokenVerifier {
    pub fn new(
        issuer: impl Into<String>,
        audience: impl Into<String>,
        leeway: u64,
        credentials: Arc<SigningCredentialRollover>,
        time: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            audience: audience.into(),
            leeway,
            credentials,
            time,
        }
    }

    /// Seconds past `exp` during which a token still verifies.
    pub fn leeway(&self) -> u64 {
        self.leeway
    }

    /// Validate signature, issuer, audience, and expiry.
    ///
    /// A token with a `kid` is checked against that key only; without one,
    /// every published key for the header's algorithm is tried.
    pub async fn verify(&self, token: &str) -> KeyResult<SessionClaims> {
        let header = jsonwebtoken::decode_header(token)?;
        let keys = self.credentials.validation_keys().await?;
        let candidates: Vec<_> = match header.kid.as_deref() {
            Some(kid) => keys.into_iter().filter(|key| key.kid == kid).collect(),
            None => keys
                .into_iter()
                .filter(|key| key.algorithm == header.alg)
                .collect(),
        };
        if candidates.is_empty() {
            return Err(KeyError::TokenRejected(format!(
                "no validation key for kid {:?}",
                header.kid
            )));
        }

        let mut last_err = None;
        for key in candidates {
            let mut validation = Validation::new(key.algorithm);
            validation.set_audience(&[self.audience.as_str()]);
            validation.set_issuer(&[self.issuer.as_str()]);
            // Expiry is checked against the injected clock below.
            validation.validate_exp = false;
            match jsonwebtoken::decode::<SessionClaims>(token, &key.decoding_key()?, &validation) {
                Ok(data) => {
                    let now = self.time.now_unix_secs();
                    if data.claims.exp.saturating_add(self.leeway as i64) < now {
                        return Err(KeyError::TokenRejected("session token expired".to_string()));
                    }
                    return Ok(data.claims);
                }
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err
            .map(KeyError::Jwt)
            .unwrap_or_else(|| KeyError::TokenRejected("no validation key matched".to_string())))
    }
}

fn new_jti() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::{
        Certificate, CertificateKey, CertificateVersion, EcKeyMaterial,
        InMemoryCertificateLocator,
    };
    use crate::curve::CurveName;
    use crate::rollover::SigningCredentialConfig;
    use crate::time::ManualTimeProvider;

    const NOW: i64 = 1_700_000_000;
    const DAY: i64 = 24 * 60 * 60;

    fn version(id: &str, version: &str, seed: u8, curve: CurveName) -> CertificateVersion {
        let scalar = vec![seed; curve.key_byte_size()];
        CertificateVersion {
            certificate: Certificate {
                id: id.to_string(),
                version: version.to_string(),
                key: CertificateKey::Ec(
                    EcKeyMaterial::from_private_scalar(curve, &scalar).expect("scalar"),
                ),
            },
            created_at: NOW - 10 * DAY,
        }
    }

    async fn fixture(
        curve: CurveName,
    ) -> (SessionTokenIssuer, SessionTokenVerifier, ManualTimeProvider) {
        let locator = Arc::new(InMemoryCertificateLocator::new());
        locator.insert(version("signing", "v1", 3, curve)).await;
        let time = ManualTimeProvider::new(NOW);
        let credentials = Arc::new(SigningCredentialRollover::new(
            SigningCredentialConfig::new("signing"),
            locator,
            Arc::new(time.clone()),
        ));
        let issuer = SessionTokenIssuer::new(
            "anontoken",
            "anontoken-clients",
            Duration::from_secs(600),
            credentials.clone(),
            Arc::new(time.clone()),
        );
        let verifier = SessionTokenVerifier::new(
            "anontoken",
            "anontoken-clients",
            5,
            credentials,
            Arc::new(time.clone()),
        );
        (issuer, verifier, time)
    }

    #[tokio::test]
    async fn mint_and_verify_roundtrip() {
        let (issuer, verifier, _) = fixture(CurveName::P256).await;
        let issued = issuer.mint("user-1").await.expect("mint");
        assert_eq!(issued.jti.len(), 32);
        assert_eq!(issued.expires_at, NOW + 600);

        let claims = verifier.verify(&issued.token).await.expect("verify");
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.jti, issued.jti);
    }

    #[tokio::test]
    async fn p384_credentials_use_es384() {
        let (issuer, verifier, _) = fixture(CurveName::P384).await;
        let issued = issuer.mint("user-2").await.expect("mint");
        let header = jsonwebtoken::decode_header(&issued.token).expect("header");
        assert_eq!(header.alg, jsonwebtoken::Algorithm::ES384);
        verifier.verify(&issued.token).await.expect("verify");
    }

    #[tokio::test]
    async fn each_mint_gets_a_fresh_jti() {
        let (issuer, _, _) = fixture(CurveName::P256).await;
        let a = issuer.mint("user").await.expect("a");
        let b = issuer.mint("user").await.expect("b");
        assert_ne!(a.jti, b.jti);
    }

    #[tokio::test]
    async fn expired_tokens_are_rejected() {
        let (issuer, verifier, time) = fixture(CurveName::P256).await;
        let issued = issuer.mint("user").await.expect("mint");
        time.advance_secs(601 + 5);
        let err = verifier.verify(&issued.token).await.expect_err("expired");
        assert!(matches!(err, KeyError::TokenRejected(_)));
    }

    #[tokio::test]
    async fn wrong_audience_is_rejected() {
        let (issuer, _, time) = fixture(CurveName::P256).await;
        let issued = issuer.mint("user").await.expect("mint");
        let locator = Arc::new(InMemoryCertificateLocator::new());
        locator.insert(version("signing", "v1", 3, CurveName::P256)).await;
        let verifier = SessionTokenVerifier::new(
            "anontoken",
            "someone-else",
            5,
            Arc::new(SigningCredentialRollover::new(
                SigningCredentialConfig::new("signing"),
                locator,
                Arc::new(time.clone()),
            )),
            Arc::new(time),
        );
        let err = verifier.verify(&issued.token).await.expect_err("audience");
        assert!(matches!(err, KeyError::Jwt(_)));
    }

    #[tokio::test]
    async fn unknown_kid_is_rejected() {
        let (issuer, _, time) = fixture(CurveName::P256).await;
        let issued = issuer.mint("user").await.expect("mint");
        let locator = Arc::new(InMemoryCertificateLocator::new());
        locator.insert(version("signing", "other", 4, CurveName::P256)).await;
        let verifier = SessionTokenVerifier::new(
            "anontoken",
            "anontoken-clients",
            5,
            Arc::new(SigningCredentialRollover::new(
                SigningCredentialConfig::new("signing"),
                locator,
                Arc::new(time.clone()),
            )),
            Arc::new(time),
        );
        let err = verifier.verify(&issued.token).await.expect_err("kid");
        assert!(matches!(err, KeyError::TokenRejected(_)));
    }
}
