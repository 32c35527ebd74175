//! Pipeline and secret configuration.
//!
//! Configuration is resolved in three layers: built-in defaults, then an
//! optional TOML file under the user config directory, then environment
//! overrides.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Directory name under the user config directory.
const CONFIG_DIR_NAME: &str = "augur";
const CONFIG_FILE_NAME: &str = "config.toml";
const SECRET_FILE_NAME: &str = "secret.toml";

/// Policy for choosing the question file when no upload field names one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Pick the upload whose name is most similar to `question.txt`.
    #[default]
    ClosestName,
    /// Pick the first upload in index order.
    FirstFile,
}

/// Tunable settings for a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Model identifier passed to the hosted model client.
    pub model: String,
    /// Root directory under which per-run working directories are created.
    pub uploads_root: PathBuf,
    /// Maximum generate-execute cycles per stage before declaring failure.
    pub attempt_budget: u32,
    /// Word bound applied to diagnostic tails fed back as retry hints.
    pub retry_tail_words: usize,
    /// Base delay for the linear backoff between generation-fault retries.
    pub backoff_base_ms: u64,
    /// Python interpreter used for dependency installation and execution.
    pub python_bin: String,
    /// Question-file selection policy when no upload is named like one.
    pub fallback_policy: FallbackPolicy,
    /// Library names that are always built in and must never be installed.
    pub builtin_denylist: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            uploads_root: PathBuf::from("uploads"),
            attempt_budget: 3,
            retry_tail_words: crate::text::RETRY_TAIL_WORDS,
            backoff_base_ms: 500,
            python_bin: "python3".to_string(),
            fallback_policy: FallbackPolicy::default(),
            builtin_denylist: [
                "sqlite3", "base64", "csv", "json", "io", "os", "sys", "datetime", "re",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl PipelineConfig {
    /// Loads configuration: defaults, then the optional config file, then
    /// environment overrides.
    ///
    /// Recognized environment variables: `AUGUR_MODEL`, `AUGUR_UPLOADS_ROOT`,
    /// `AUGUR_PYTHON_BIN`.
    pub fn load() -> Result<Self> {
        let mut config = match config_file_path() {
            Some(path) if path.exists() => {
                let contents = std::fs::read_to_string(&path)?;
                toml::from_str(&contents)?
            }
            _ => Self::default(),
        };

        if let Ok(model) = std::env::var("AUGUR_MODEL") {
            config.model = model;
        }
        if let Ok(root) = std::env::var("AUGUR_UPLOADS_ROOT") {
            config.uploads_root = PathBuf::from(root);
        }
        if let Ok(python) = std::env::var("AUGUR_PYTHON_BIN") {
            config.python_bin = python;
        }

        Ok(config)
    }

    /// True if the library name is on the built-in denylist.
    pub fn is_builtin(&self, library: &str) -> bool {
        let lowered = library.trim().to_ascii_lowercase();
        self.builtin_denylist.iter().any(|b| *b == lowered)
    }
}

/// API keys and other sensitive configuration.
///
/// Secrets are never logged; error messages must not contain key material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretConfig {
    /// API key for the Gemini REST endpoint.
    pub gemini_api_key: String,
}

/// Path of the optional pipeline config file, if a config directory exists.
pub fn config_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Path of the optional secret file, if a config directory exists.
pub fn secret_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(SECRET_FILE_NAME))
}
