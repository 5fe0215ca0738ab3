//! Verifier configuration
//!
//! Loaded once at startup from the environment (a `.env` file is honoured
//! via `dotenvy`).
//!
//! | Variable | Default |
//! |----------|---------|
//! | `QR_ALLOWED_DOMAINS` | `verify.jh.gov.in,example.edu,university.example` |
//! | `URL_PROBE_TIMEOUT_MS` | `5000` |
//! | `SIGNATURE_SECRET` | `dev-secret-change-me` |
//! | `SIGNATURE_PUBLIC_KEY_PEM` | unset (path; overrides the secret) |
//! | `REGISTRY_PATH` | unset |

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::verification::anomaly::AnomalyThresholds;
use crate::verification::signature::VerificationKey;
use crate::verification::url_trust::{DEFAULT_ALLOWED_DOMAINS, DEFAULT_PROBE_TIMEOUT};

pub const ENV_ALLOWED_DOMAINS: &str = "QR_ALLOWED_DOMAINS";
pub const ENV_PROBE_TIMEOUT_MS: &str = "URL_PROBE_TIMEOUT_MS";
pub const ENV_SIGNATURE_SECRET: &str = "SIGNATURE_SECRET";
pub const ENV_SIGNATURE_PUBLIC_KEY_PEM: &str = "SIGNATURE_PUBLIC_KEY_PEM";
pub const ENV_REGISTRY_PATH: &str = "REGISTRY_PATH";

const DEFAULT_SIGNATURE_SECRET: &str = "dev-secret-change-me";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// Hosts trusted for embedded verification URLs (lowercase)
    pub allowed_domains: Vec<String>,
    pub probe_timeout_ms: u64,
    pub signature_secret: String,
    pub signature_public_key_pem: Option<PathBuf>,
    pub registry_path: Option<PathBuf>,
    pub anomaly: AnomalyThresholds,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            allowed_domains: DEFAULT_ALLOWED_DOMAINS.iter().map(|d| d.to_string()).collect(),
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT.as_millis() as u64,
            signature_secret: DEFAULT_SIGNATURE_SECRET.to_string(),
            signature_public_key_pem: None,
            registry_path: None,
            anomaly: AnomalyThresholds::default(),
        }
    }
}

impl VerifierConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable source; unset or blank variables keep
    /// their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(raw) = get(ENV_ALLOWED_DOMAINS) {
            config.allowed_domains = parse_domain_list(&raw);
        }
        if let Some(raw) = get(ENV_PROBE_TIMEOUT_MS) {
            config.probe_timeout_ms = raw
                .trim()
                .parse()
                .ok()
                .filter(|ms| *ms > 0)
                .ok_or_else(|| ConfigError::InvalidValue {
                    key: ENV_PROBE_TIMEOUT_MS.to_string(),
                    value: raw.clone(),
                })?;
        }
        if let Some(secret) = get(ENV_SIGNATURE_SECRET) {
            config.signature_secret = secret;
        }
        config.signature_public_key_pem = get(ENV_SIGNATURE_PUBLIC_KEY_PEM).map(PathBuf::from);
        config.registry_path = get(ENV_REGISTRY_PATH).map(PathBuf::from);

        config.validate()?;
        debug!(
            domains = config.allowed_domains.len(),
            timeout_ms = config.probe_timeout_ms,
            rsa_key = config.signature_public_key_pem.is_some(),
            "verifier configuration loaded"
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.allowed_domains.iter().all(|d| d.trim().is_empty()) {
            return Err(ConfigError::EmptyAllowlist);
        }
        if self.probe_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: ENV_PROBE_TIMEOUT_MS.to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Key for the signature verifier. An RSA public key file, when
    /// configured, takes precedence over the shared secret.
    pub fn verification_key(&self) -> Result<VerificationKey, ConfigError> {
        match &self.signature_public_key_pem {
            Some(path) => {
                let pem = std::fs::read(path).map_err(|e| ConfigError::KeyUnreadable {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
                Ok(VerificationKey::rsa_public_pem(pem))
            }
            None => Ok(VerificationKey::secret(&self.signature_secret)),
        }
    }
}

fn parse_domain_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|d| d.trim().to_lowercase())
        .filter(|d| !d.is_empty())
        .collect()
}
