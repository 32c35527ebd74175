//! Error types for the Augur pipeline.

use thiserror::Error;

use crate::stage::StageKind;

/// A shared error type for the entire Augur pipeline.
///
/// This provides typed, structured error variants with automatic conversion
/// from common error types via the `From` trait.
#[derive(Error, Debug, Clone)]
pub enum AugurError {
    /// The model reply was not parseable as the required structured document,
    /// or omitted required fields.
    #[error("Malformed {stage} reply: {message}")]
    MalformedReply { stage: StageKind, message: String },

    /// The metadata artifact was required but absent or unreadable.
    #[error("Metadata artifact missing: {path}")]
    MissingMetadata { path: String },

    /// The final result artifact was absent or empty after a successful run.
    #[error("Result artifact missing or empty: {path}")]
    MissingArtifact { path: String },

    /// The final result artifact exists but is not valid structured data.
    #[error("Result artifact unparseable: {path} - {message}")]
    MalformedArtifact { path: String, message: String },

    /// A declared dependency failed to install.
    #[error("Failed to install library '{library}': {message}")]
    DependencyInstall { library: String, message: String },

    /// The model client itself faulted (transport error, service fault).
    #[error("Model client error: {message}")]
    UpstreamModel { message: String, retryable: bool },

    /// A stage exhausted its attempt budget without a successful execution.
    #[error("{stage} stage failed after {attempts} attempts: {last_output}")]
    StageExhausted {
        stage: StageKind,
        attempts: u32,
        last_output: String,
    },

    /// IO error (file system operations)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization { format: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The inbound request was unusable (e.g. no question text found).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl AugurError {
    /// Creates a MalformedReply error for the given stage.
    pub fn malformed_reply(stage: StageKind, message: impl Into<String>) -> Self {
        Self::MalformedReply {
            stage,
            message: message.into(),
        }
    }

    /// Creates a MissingMetadata error.
    pub fn missing_metadata(path: impl Into<String>) -> Self {
        Self::MissingMetadata { path: path.into() }
    }

    /// Creates a MissingArtifact error.
    pub fn missing_artifact(path: impl Into<String>) -> Self {
        Self::MissingArtifact { path: path.into() }
    }

    /// Creates an UpstreamModel error.
    pub fn upstream(message: impl Into<String>, retryable: bool) -> Self {
        Self::UpstreamModel {
            message: message.into(),
            retryable,
        }
    }

    /// Creates an IO error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Check if this is a MalformedReply error
    pub fn is_malformed_reply(&self) -> bool {
        matches!(self, Self::MalformedReply { .. })
    }

    /// Check if this is an UpstreamModel error
    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::UpstreamModel { .. })
    }

    /// Check if this error is worth retrying against the model client.
    ///
    /// Generation-stage faults are always recovered locally by the retry
    /// loop; this only distinguishes transient upstream faults from the rest.
    pub fn is_retryable_upstream(&self) -> bool {
        matches!(
            self,
            Self::UpstreamModel {
                retryable: true,
                ..
            }
        )
    }
}

impl From<std::io::Error> for AugurError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for AugurError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for AugurError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

/// A type alias for `Result<T, AugurError>`.
pub type Result<T> = std::result::Result<T, AugurError>;
