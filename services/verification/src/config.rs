use anontoken_keys::{AnonymousTokenKeyConfig, CurveName, SigningCredentialConfig};
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

const DAY_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Postgres,
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "postgres" => Ok(Self::Postgres),
            other => bail!("unknown storage backend {other}"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostgresConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub acquire_timeout_ms: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_timeout_ms() -> u64 {
    5_000
}

#[derive(Debug, Clone)]
pub struct AnonymousTokensConfig {
    pub rotation_enabled: bool,
    pub rotation_interval_secs: u64,
    pub rotation_rollover_secs: u64,
    pub curve: CurveName,
    pub master_key_certificate_id: String,
    pub cache_ttl_secs: u64,
}

impl AnonymousTokensConfig {
    pub fn key_config(&self) -> AnonymousTokenKeyConfig {
        AnonymousTokenKeyConfig {
            rotation_enabled: self.rotation_enabled,
            rotation_interval: Duration::from_secs(self.rotation_interval_secs),
            rollover: Duration::from_secs(self.rotation_rollover_secs),
            curve: self.curve,
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SigningConfig {
    pub certificate_id: String,
    pub additional_validation_certificate_ids: Vec<String>,
    pub key_rollover_secs: u64,
    pub issuer: String,
    pub audience: String,
    pub cache_ttl_secs: u64,
}

impl SigningConfig {
    pub fn credential_config(&self) -> SigningCredentialConfig {
        SigningCredentialConfig {
            certificate_id: self.certificate_id.clone(),
            additional_validation_certificate_ids: self.additional_validation_certificate_ids.clone(),
            key_rollover: Duration::from_secs(self.key_rollover_secs),
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VerificationLimitConfig {
    pub max_verifications_allowed: u32,
    pub max_limit_duration_secs: u64,
}

// Service configuration sourced from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_addr: SocketAddr,
    pub metrics_bind: SocketAddr,
    pub storage: StorageBackend,
    pub postgres: Option<PostgresConfig>,
    pub certificate_dir: PathBuf,
    pub anonymous_tokens: AnonymousTokensConfig,
    pub signing: SigningConfig,
    pub verification_limit: VerificationLimitConfig,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ServiceConfigOverride {
    bind_addr: Option<String>,
    metrics_bind: Option<String>,
    storage: Option<StorageBackend>,
    postgres: Option<PostgresConfig>,
    certificate_dir: Option<PathBuf>,
    anonymous_tokens: Option<AnonymousTokensOverride>,
    signing: Option<SigningOverride>,
    verification_limit: Option<VerificationLimitOverride>,
    sweep_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct AnonymousTokensOverride {
    rotation_enabled: Option<bool>,
    rotation_interval_secs: Option<u64>,
    rotation_rollover_secs: Option<u64>,
    curve: Option<String>,
    master_key_certificate_id: Option<String>,
    cache_ttl_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SigningOverride {
    certificate_id: Option<String>,
    additional_validation_certificate_ids: Option<Vec<String>>,
    key_rollover_secs: Option<u64>,
    issuer: Option<String>,
    audience: Option<String>,
    cache_ttl_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct VerificationLimitOverride {
    max_verifications_allowed: Option<u32>,
    max_limit_duration_secs: Option<u64>,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &str, default: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = env_or(key, default);
    raw.parse::<T>()
        .map_err(|err| anyhow::anyhow!("{err}"))
        .with_context(|| format!("parse {key}"))
}

fn parse_id_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        let config = Self::load_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Environment values overlaid with the YAML file named by `ANONTOKEN_CONFIG`.
    /// Validation runs once, after the overlay.
    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::load_env()?;
        if let Ok(path) = std::env::var("ANONTOKEN_CONFIG") {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("read ANONTOKEN_CONFIG: {path}"))?;
            config.apply_yaml(&contents)?;
        }
        config.validate()?;
        Ok(config)
    }

    fn load_env() -> Result<Self> {
        let bind_addr = env_parse("ANONTOKEN_BIND", "0.0.0.0:8443")?;
        let metrics_bind = env_parse("ANONTOKEN_METRICS_BIND", "0.0.0.0:8080")?;
        let storage = env_parse("ANONTOKEN_STORAGE", "memory")?;
        let postgres = match std::env::var("ANONTOKEN_POSTGRES_URL") {
            Ok(url) => Some(PostgresConfig {
                url,
                max_connections: env_parse("ANONTOKEN_POSTGRES_MAX_CONNECTIONS", "10")?,
                connect_timeout_ms: env_parse("ANONTOKEN_POSTGRES_CONNECT_TIMEOUT_MS", "5000")?,
                acquire_timeout_ms: env_parse("ANONTOKEN_POSTGRES_ACQUIRE_TIMEOUT_MS", "5000")?,
            }),
            Err(_) => None,
        };
        let certificate_dir = PathBuf::from(env_or("ANONTOKEN_CERTIFICATE_DIR", "./certificates"));

        let anonymous_tokens = AnonymousTokensConfig {
            rotation_enabled: env_parse("ANONTOKEN_ROTATION_ENABLED", "true")?,
            rotation_interval_secs: env_parse(
                "ANONTOKEN_ROTATION_INTERVAL_SECS",
                &(3 * DAY_SECS).to_string(),
            )?,
            rotation_rollover_secs: env_parse(
                "ANONTOKEN_ROTATION_ROLLOVER_SECS",
                &DAY_SECS.to_string(),
            )?,
            curve: env_parse("ANONTOKEN_CURVE", "P-256")?,
            master_key_certificate_id: env_or("ANONTOKEN_MASTER_KEY_CERTIFICATE_ID", "master"),
            cache_ttl_secs: env_parse("ANONTOKEN_KEY_CACHE_TTL_SECS", &DAY_SECS.to_string())?,
        };

        let signing = SigningConfig {
            certificate_id: env_or("ANONTOKEN_SIGNING_CERTIFICATE_ID", "signing"),
            additional_validation_certificate_ids: parse_id_list(&env_or(
                "ANONTOKEN_ADDITIONAL_VALIDATION_CERTIFICATE_IDS",
                "",
            )),
            key_rollover_secs: env_parse(
                "ANONTOKEN_KEY_ROLLOVER_SECS",
                &(2 * DAY_SECS).to_string(),
            )?,
            issuer: env_or("ANONTOKEN_ISSUER", "anontoken"),
            audience: env_or("ANONTOKEN_AUDIENCE", "anontoken-clients"),
            cache_ttl_secs: env_parse(
                "ANONTOKEN_CREDENTIAL_CACHE_TTL_SECS",
                &DAY_SECS.to_string(),
            )?,
        };

        let verification_limit = VerificationLimitConfig {
            max_verifications_allowed: env_parse("ANONTOKEN_MAX_VERIFICATIONS", "3")?,
            max_limit_duration_secs: env_parse(
                "ANONTOKEN_MAX_LIMIT_DURATION_SECS",
                &DAY_SECS.to_string(),
            )?,
        };

        Ok(Self {
            bind_addr,
            metrics_bind,
            storage,
            postgres,
            certificate_dir,
            anonymous_tokens,
            signing,
            verification_limit,
            sweep_interval_secs: env_parse("ANONTOKEN_SWEEP_INTERVAL_SECS", "300")?,
        })
    }

    fn apply_yaml(&mut self, contents: &str) -> Result<()> {
        let override_cfg: ServiceConfigOverride =
            serde_yaml::from_str(contents).with_context(|| "parse service config yaml")?;
        if let Some(value) = override_cfg.bind_addr {
            self.bind_addr = value.parse().with_context(|| "parse bind_addr")?;
        }
        if let Some(value) = override_cfg.metrics_bind {
            self.metrics_bind = value.parse().with_context(|| "parse metrics_bind")?;
        }
        if let Some(value) = override_cfg.storage {
            self.storage = value;
        }
        if let Some(value) = override_cfg.postgres {
            self.postgres = Some(value);
        }
        if let Some(value) = override_cfg.certificate_dir {
            self.certificate_dir = value;
        }
        if let Some(value) = override_cfg.sweep_interval_secs {
            self.sweep_interval_secs = value;
        }
        if let Some(tokens) = override_cfg.anonymous_tokens {
            let target = &mut self.anonymous_tokens;
            if let Some(value) = tokens.rotation_enabled {
                target.rotation_enabled = value;
            }
            if let Some(value) = tokens.rotation_interval_secs {
                target.rotation_interval_secs = value;
            }
            if let Some(value) = tokens.rotation_rollover_secs {
                target.rotation_rollover_secs = value;
            }
            if let Some(value) = tokens.curve {
                target.curve = value.parse().with_context(|| "parse anonymous_tokens.curve")?;
            }
            if let Some(value) = tokens.master_key_certificate_id {
                target.master_key_certificate_id = value;
            }
            if let Some(value) = tokens.cache_ttl_secs {
                target.cache_ttl_secs = value;
            }
        }
        if let Some(signing) = override_cfg.signing {
            let target = &mut self.signing;
            if let Some(value) = signing.certificate_id {
                target.certificate_id = value;
            }
            if let Some(value) = signing.additional_validation_certificate_ids {
                target.additional_validation_certificate_ids = value;
            }
            if let Some(value) = signing.key_rollover_secs {
                target.key_rollover_secs = value;
            }
            if let Some(value) = signing.issuer {
                target.issuer = value;
            }
            if let Some(value) = signing.audience {
                target.audience = value;
            }
            if let Some(value) = signing.cache_ttl_secs {
                target.cache_ttl_secs = value;
            }
        }
        if let Some(limit) = override_cfg.verification_limit {
            if let Some(value) = limit.max_verifications_allowed {
                self.verification_limit.max_verifications_allowed = value;
            }
            if let Some(value) = limit.max_limit_duration_secs {
                self.verification_limit.max_limit_duration_secs = value;
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.anonymous_tokens.rotation_interval_secs == 0 {
            bail!("anonymous_tokens.rotation_interval_secs must be greater than zero");
        }
        if self.anonymous_tokens.master_key_certificate_id.is_empty() {
            bail!("anonymous_tokens.master_key_certificate_id must be set");
        }
        if self.signing.certificate_id.is_empty() {
            bail!("signing.certificate_id must be set");
        }
        if self.verification_limit.max_limit_duration_secs == 0 {
            bail!("verification_limit.max_limit_duration_secs must be greater than zero");
        }
        if self.sweep_interval_secs == 0 {
            bail!("sweep_interval_secs must be greater than zero");
        }
        if self.storage == StorageBackend::Postgres && self.postgres.is_none() {
            bail!("postgres storage requires a postgres section");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "ANONTOKEN_BIND",
        "ANONTOKEN_STORAGE",
        "ANONTOKEN_POSTGRES_URL",
        "ANONTOKEN_CURVE",
        "ANONTOKEN_ROTATION_INTERVAL_SECS",
        "ANONTOKEN_ADDITIONAL_VALIDATION_CERTIFICATE_IDS",
        "ANONTOKEN_CONFIG",
    ];

    struct EnvGuard {
        saved: Vec<(&'static str, Option<String>)>,
    }

    impl EnvGuard {
        fn clean() -> Self {
            let saved = VARS
                .iter()
                .map(|key| (*key, std::env::var(key).ok()))
                .collect();
            for key in VARS {
                unsafe {
                    std::env::remove_var(key);
                }
            }
            Self { saved }
        }

        fn set(&self, key: &'static str, value: &str) {
            unsafe {
                std::env::set_var(key, value);
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in &self.saved {
                match value {
                    Some(value) => unsafe {
                        std::env::set_var(key, value);
                    },
                    None => unsafe {
                        std::env::remove_var(key);
                    },
                }
            }
        }
    }

    #[test]
    #[serial]
    fn defaults_are_valid() {
        let _env = EnvGuard::clean();
        let config = ServiceConfig::from_env().expect("config");
        assert_eq!(config.storage, StorageBackend::Memory);
        assert_eq!(config.anonymous_tokens.curve, CurveName::P256);
        assert_eq!(config.anonymous_tokens.rotation_interval_secs, 3 * DAY_SECS);
        assert_eq!(config.verification_limit.max_verifications_allowed, 3);
        assert!(config.signing.additional_validation_certificate_ids.is_empty());
    }

    #[test]
    #[serial]
    fn env_overrides_are_parsed() {
        let env = EnvGuard::clean();
        env.set("ANONTOKEN_BIND", "127.0.0.1:9000");
        env.set("ANONTOKEN_CURVE", "secp384r1");
        env.set("ANONTOKEN_ADDITIONAL_VALIDATION_CERTIFICATE_IDS", "old, older ,");
        let config = ServiceConfig::from_env().expect("config");
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.anonymous_tokens.curve, CurveName::P384);
        assert_eq!(
            config.signing.additional_validation_certificate_ids,
            vec!["old".to_string(), "older".to_string()]
        );
    }

    #[test]
    #[serial]
    fn rejects_unknown_curve_and_zero_interval() {
        let env = EnvGuard::clean();
        env.set("ANONTOKEN_CURVE", "curve25519");
        assert!(ServiceConfig::from_env().is_err());

        env.set("ANONTOKEN_CURVE", "P-256");
        env.set("ANONTOKEN_ROTATION_INTERVAL_SECS", "0");
        let err = ServiceConfig::from_env().expect_err("zero interval");
        assert!(err.to_string().contains("rotation_interval_secs"));
    }

    #[test]
    #[serial]
    fn postgres_storage_requires_section() {
        let env = EnvGuard::clean();
        env.set("ANONTOKEN_STORAGE", "postgres");
        let err = ServiceConfig::from_env().expect_err("missing postgres");
        assert!(err.to_string().contains("postgres"));

        env.set("ANONTOKEN_POSTGRES_URL", "postgres://localhost/anontoken");
        let config = ServiceConfig::from_env().expect("config");
        assert_eq!(config.postgres.expect("postgres").max_connections, 10);
    }

    #[test]
    #[serial]
    fn yaml_file_overrides_env() {
        let env = EnvGuard::clean();
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            r#"
storage: postgres
postgres:
  url: postgres://db/anontoken
  max_connections: 4
anonymous_tokens:
  rotation_enabled: false
  curve: P-384
signing:
  additional_validation_certificate_ids: [retiring]
verification_limit:
  max_verifications_allowed: 5
"#,
        )
        .expect("write");
        env.set("ANONTOKEN_CONFIG", path.to_str().expect("path"));

        let config = ServiceConfig::from_env_or_yaml().expect("config");
        assert_eq!(config.storage, StorageBackend::Postgres);
        assert_eq!(config.postgres.as_ref().expect("pg").max_connections, 4);
        assert_eq!(config.postgres.as_ref().expect("pg").acquire_timeout_ms, 5_000);
        assert!(!config.anonymous_tokens.rotation_enabled);
        assert_eq!(config.anonymous_tokens.curve, CurveName::P384);
        assert_eq!(
            config.signing.additional_validation_certificate_ids,
            vec!["retiring".to_string()]
        );
        assert_eq!(config.verification_limit.max_verifications_allowed, 5);
    }

    #[test]
    #[serial]
    fn env_postgres_storage_accepts_yaml_postgres_section() {
        let env = EnvGuard::clean();
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "postgres:\n  url: postgres://db/anontoken\n").expect("write");
        env.set("ANONTOKEN_STORAGE", "postgres");
        env.set("ANONTOKEN_CONFIG", path.to_str().expect("path"));

        let config = ServiceConfig::from_env_or_yaml().expect("config");
        assert_eq!(config.storage, StorageBackend::Postgres);
        assert_eq!(
            config.postgres.as_ref().expect("pg").url,
            "postgres://db/anontoken"
        );
    }

    #[test]
    #[serial]
    fn yaml_overlay_is_validated() {
        let env = EnvGuard::clean();
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "storage: postgres\n").expect("write");
        env.set("ANONTOKEN_CONFIG", path.to_str().expect("path"));

        let err = ServiceConfig::from_env_or_yaml().expect_err("missing postgres");
        assert!(err.to_string().contains("postgres"));
    }

    #[test]
    #[serial]
    fn yaml_rejects_unknown_fields() {
        let _env = EnvGuard::clean();
        let mut config = ServiceConfig::from_env().expect("config");
        assert!(config.apply_yaml("unknown_field: 1\n").is_err());
    }
}
