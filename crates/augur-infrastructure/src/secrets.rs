//! Secret loading.
//!
//! API keys are resolved from the environment first, then from the TOML
//! secret file under the user config directory. Error messages never contain
//! key material.

use async_trait::async_trait;
use augur_core::config::{SecretConfig, secret_file_path};
use augur_core::error::{AugurError, Result};

/// Service for loading secret configuration.
#[async_trait]
pub trait SecretService: Send + Sync {
    /// Loads the secret configuration.
    async fn load_secrets(&self) -> Result<SecretConfig>;

    /// Checks if the secret file exists.
    async fn secret_file_exists(&self) -> bool;
}

/// Default implementation: `GEMINI_API_KEY` env var, falling back to
/// `secret.toml` in the Augur config directory.
#[derive(Debug, Clone, Default)]
pub struct EnvSecretService;

impl EnvSecretService {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SecretService for EnvSecretService {
    async fn load_secrets(&self) -> Result<SecretConfig> {
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            if !key.trim().is_empty() {
                return Ok(SecretConfig {
                    gemini_api_key: key,
                });
            }
        }

        let path = secret_file_path()
            .ok_or_else(|| AugurError::config("no user config directory available"))?;
        if !path.exists() {
            return Err(AugurError::config(
                "GEMINI_API_KEY is not set and no secret file exists",
            ));
        }
        let contents = tokio::fs::read_to_string(&path).await?;
        let secrets: SecretConfig = toml::from_str(&contents)?;
        Ok(secrets)
    }

    async fn secret_file_exists(&self) -> bool {
        secret_file_path().map(|p| p.exists()).unwrap_or(false)
    }
}
