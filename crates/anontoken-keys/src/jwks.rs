use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyUse {
    Sig,
}

/// Public key record. EC keys carry `crv`/`x`/`y`, RSA keys `n`/`e`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    pub kid: String,
    pub kty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub use_field: Option<KeyUse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
}

impl Jwk {
    pub fn ec(kid: impl Into<String>, crv: &str, x: String, y: String) -> Self {
        Self {
            kid: kid.into(),
            kty: "EC".to_string(),
            alg: None,
            use_field: None,
            crv: Some(crv.to_string()),
            x: Some(x),
            y: Some(y),
            n: None,
            e: None,
        }
    }

    pub fn rsa(kid: impl Into<String>, n: String, e: String) -> Self {
        Self {
            kid: kid.into(),
            kty: "RSA".to_string(),
            alg: None,
            use_field: None,
            crv: None,
            x: None,
            y: None,
            n: Some(n),
            e: Some(e),
        }
    }

    pub fn for_signatures(mut self, alg: jsonwebtoken::Algorithm) -> Self {
        self.alg = Some(format!("{alg:?}"));
        self.use_field = Some(KeyUse::Sig);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}
