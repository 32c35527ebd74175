//! Stage-level domain types.
//!
//! A pipeline run drives two code-generation stages in sequence: the
//! collection stage produces data-gathering code, the analysis stage
//! produces answer-computing code. Both share the request/result shapes
//! defined here.

use serde::{Deserialize, Serialize};

use crate::error::{AugurError, Result};
use crate::upload::{FileIndex, SchemaHints};

/// Identifies one of the two code-generation stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageKind {
    /// Data-gathering stage: produces scraping/ingestion code plus the
    /// restated sub-questions.
    Collection,
    /// Answer-computing stage: produces analysis code consuming the
    /// metadata artifact written by the collection stage.
    Analysis,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Collection => "collection",
            StageKind::Analysis => "analysis",
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A task description handed to a code-generation stage.
///
/// Exactly one of the two shapes is valid per call: a fresh task carries the
/// question and its context, a retry task carries only the bounded error
/// excerpt from the previous failed attempt.
#[derive(Debug, Clone)]
pub enum GenerationRequest {
    /// First attempt for a stage: the full task description.
    Fresh {
        question: String,
        files: FileIndex,
        schema_hints: SchemaHints,
    },
    /// Subsequent attempt: only the tail of the previous failure's output.
    Retry { error_excerpt: String },
}

impl GenerationRequest {
    pub fn is_retry(&self) -> bool {
        matches!(self, GenerationRequest::Retry { .. })
    }
}

/// The structured document a code-generation stage extracts from a model
/// reply.
///
/// `code` is expected to be complete and runnable without further edits;
/// that is a contract asked of the model, not mechanically verified here
/// beyond being well-formed structured data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResult {
    /// Generated source text.
    pub code: String,
    /// Declared external dependencies, in install order, deduplicated.
    pub libraries: Vec<String>,
    /// Sub-questions restated from the original question. Present for the
    /// collection stage only; forwarded verbatim to the analysis stage.
    pub questions: Option<Vec<String>>,
}

/// Raw wire shape of a model reply, before required-field validation.
#[derive(Deserialize)]
struct RawReply {
    code: Option<String>,
    libraries: Option<Vec<String>>,
    questions: Option<Vec<String>>,
}

impl GenerationResult {
    /// Parses a model reply as the closed-field JSON document for `stage`.
    ///
    /// Replies wrapped in markdown code fences are unwrapped first. A reply
    /// that is not valid JSON, lacks `code`, or (collection stage) lacks
    /// `questions` is rejected with [`AugurError::MalformedReply`].
    pub fn parse_reply(stage: StageKind, reply: &str) -> Result<Self> {
        let body = strip_code_fences(reply);

        let raw: RawReply = serde_json::from_str(body)
            .map_err(|e| AugurError::malformed_reply(stage, format!("invalid JSON: {e}")))?;

        let code = match raw.code {
            Some(code) if !code.trim().is_empty() => code,
            _ => {
                return Err(AugurError::malformed_reply(
                    stage,
                    "missing required field 'code'",
                ));
            }
        };

        let libraries = dedupe_preserving_order(raw.libraries.unwrap_or_default());

        let questions = match (stage, raw.questions) {
            (StageKind::Collection, Some(questions)) => Some(questions),
            (StageKind::Collection, None) => {
                return Err(AugurError::malformed_reply(
                    stage,
                    "missing required field 'questions'",
                ));
            }
            (StageKind::Analysis, questions) => questions,
        };

        Ok(Self {
            code,
            libraries,
            questions,
        })
    }
}

/// Outcome of one execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Success,
    Failure,
}

/// Pass/fail outcome plus captured diagnostic output.
///
/// `output` holds the success banner or the failure trace; the orchestrator
/// tail-truncates it before feeding it back as a retry hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub status: ExecutionStatus,
    pub output: String,
}

impl ExecutionOutcome {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Success,
            output: output.into(),
        }
    }

    pub fn failure(output: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Failure,
            output: output.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }
}

/// Unwraps a reply from ```-fenced markdown, if present.
fn strip_code_fences(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag line, then the closing fence.
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

fn dedupe_preserving_order(libraries: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    libraries
        .into_iter()
        .filter(|lib| seen.insert(lib.to_ascii_lowercase()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_collection_reply() {
        let reply = r#"{"code": "print('hi')", "libraries": ["pandas"], "questions": ["q1"]}"#;
        let result = GenerationResult::parse_reply(StageKind::Collection, reply).unwrap();

        assert_eq!(result.code, "print('hi')");
        assert_eq!(result.libraries, vec!["pandas"]);
        assert_eq!(result.questions, Some(vec!["q1".to_string()]));
    }

    #[test]
    fn test_parse_analysis_reply_without_questions() {
        let reply = r#"{"code": "x = 1", "libraries": []}"#;
        let result = GenerationResult::parse_reply(StageKind::Analysis, reply).unwrap();

        assert_eq!(result.code, "x = 1");
        assert!(result.questions.is_none());
    }

    #[test]
    fn test_parse_reply_strips_code_fences() {
        let reply = "```json\n{\"code\": \"x = 1\", \"libraries\": [], \"questions\": []}\n```";
        let result = GenerationResult::parse_reply(StageKind::Collection, reply).unwrap();

        assert_eq!(result.code, "x = 1");
    }

    #[test]
    fn test_parse_reply_rejects_missing_code() {
        let reply = r#"{"libraries": ["pandas"], "questions": []}"#;
        let err = GenerationResult::parse_reply(StageKind::Collection, reply).unwrap_err();

        assert!(err.is_malformed_reply());
    }

    #[test]
    fn test_parse_reply_rejects_missing_questions_for_collection() {
        let reply = r#"{"code": "x = 1", "libraries": []}"#;
        let err = GenerationResult::parse_reply(StageKind::Collection, reply).unwrap_err();

        assert!(err.is_malformed_reply());
    }

    #[test]
    fn test_parse_reply_rejects_non_json() {
        let err = GenerationResult::parse_reply(StageKind::Analysis, "not json").unwrap_err();

        assert!(err.is_malformed_reply());
    }

    #[test]
    fn test_libraries_deduplicated_preserving_order() {
        let reply =
            r#"{"code": "x", "libraries": ["pandas", "requests", "Pandas"], "questions": []}"#;
        let result = GenerationResult::parse_reply(StageKind::Collection, reply).unwrap();

        assert_eq!(result.libraries, vec!["pandas", "requests"]);
    }
}
