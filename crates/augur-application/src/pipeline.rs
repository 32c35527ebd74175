//! Pipeline orchestrator.
//!
//! Drives the two code-generation stages in sequence, applying bounded retry
//! with error-feedback on failure of either generation or execution, and
//! extracts the final artifact once both stages succeed. The caller gets
//! either the parsed final artifact or a structured failure description,
//! never a raw fault.

use std::sync::Arc;
use std::time::Duration;

use augur_core::config::PipelineConfig;
use augur_core::error::AugurError;
use augur_core::stage::{GenerationRequest, GenerationResult, StageKind};
use augur_core::text::last_n_words;
use augur_core::upload::UploadedFile;
use augur_core::workdir::WorkingDirectory;
use augur_execution::Sandbox;
use augur_infrastructure::{collect_schema_hints, resolve_question, save_uploads};
use augur_interaction::{GenerationStage, ModelClient, SessionStore, render_questions};
use serde::Serialize;
use uuid::Uuid;

/// States of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    Ingesting,
    Ingested,
    Analyzing,
    Analyzed,
    Done,
    Failed,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Init => "init",
            PipelineState::Ingesting => "ingesting",
            PipelineState::Ingested => "ingested",
            PipelineState::Analyzing => "analyzing",
            PipelineState::Analyzed => "analyzed",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        }
    }
}

/// One inbound request: the named upload payloads for a single run.
#[derive(Debug, Clone, Default)]
pub struct PipelineRequest {
    pub uploads: Vec<UploadedFile>,
}

/// Caller-visible failure categories. "The model is unavailable" and "the
/// generated code was wrong" are deliberately distinguishable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    InvalidRequest,
    Setup,
    CollectionFailed,
    AnalysisFailed,
    ModelUnavailable,
    MissingArtifact,
    MalformedArtifact,
}

/// Structured failure returned to the caller.
///
/// `detail` carries a bounded diagnostic tail, enough to reproduce the
/// failure without leaking the full internal log.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineFailure {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<StageKind>,
    pub category: FailureCategory,
    pub detail: String,
}

impl std::fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.stage {
            Some(stage) => write!(f, "{:?} ({} stage): {}", self.category, stage, self.detail),
            None => write!(f, "{:?}: {}", self.category, self.detail),
        }
    }
}

impl std::error::Error for PipelineFailure {}

/// The request-scoped pipeline: collection, then analysis, then artifact
/// extraction.
pub struct Pipeline {
    config: PipelineConfig,
    collector: GenerationStage,
    analyst: GenerationStage,
    sandbox: Sandbox,
    store: Arc<SessionStore>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, client: Arc<dyn ModelClient>) -> Self {
        let store = Arc::new(SessionStore::new());
        let sandbox = Sandbox::from_config(&config);
        Self {
            collector: GenerationStage::collector(client.clone(), store.clone()),
            analyst: GenerationStage::analyst(client, store.clone()),
            sandbox,
            store,
            config,
        }
    }

    /// Runs one pipeline request to completion.
    ///
    /// Returns the parsed final artifact, or a structured failure naming the
    /// stage and category. The run's sessions are evicted either way.
    pub async fn run(
        &self,
        request: PipelineRequest,
    ) -> Result<serde_json::Value, PipelineFailure> {
        let run_id = Uuid::new_v4().to_string();
        tracing::info!(%run_id, "pipeline started");

        let result = self.run_inner(&run_id, request).await;

        // Terminal state: the run's conversational contexts are no longer
        // needed, whatever the outcome.
        self.store.remove(StageKind::Collection, &run_id).await;
        self.store.remove(StageKind::Analysis, &run_id).await;

        match &result {
            Ok(_) => {
                tracing::info!(%run_id, state = PipelineState::Done.as_str(), "pipeline finished")
            }
            Err(failure) => tracing::error!(
                %run_id,
                state = PipelineState::Failed.as_str(),
                category = ?failure.category,
                "pipeline failed"
            ),
        }
        result
    }

    async fn run_inner(
        &self,
        run_id: &str,
        request: PipelineRequest,
    ) -> Result<serde_json::Value, PipelineFailure> {
        let mut state = PipelineState::Init;

        // Init -> Ingesting: working directory, uploads, question, hints.
        let workdir = WorkingDirectory::create(&self.config.uploads_root, run_id)
            .map_err(|e| failure_from(None, e))?;
        let index = save_uploads(&workdir, &request.uploads)
            .await
            .map_err(|e| failure_from(None, e))?;
        let question = resolve_question(&index, self.config.fallback_policy)
            .await
            .map_err(|e| failure_from(None, e))?;
        let schema_hints = collect_schema_hints(&index);
        advance(&mut state, PipelineState::Ingesting, run_id);

        let fresh = GenerationRequest::Fresh {
            question,
            files: index,
            schema_hints,
        };
        let collected = self
            .run_stage(&self.collector, fresh, &workdir, run_id)
            .await
            .map_err(|e| failure_from(Some(StageKind::Collection), e))?;
        advance(&mut state, PipelineState::Ingested, run_id);

        // The sub-questions from the final successful collection result seed
        // the analysis stage.
        let questions = collected.questions.unwrap_or_default();
        let fresh = GenerationRequest::Fresh {
            question: render_questions(&questions),
            files: Default::default(),
            schema_hints: Default::default(),
        };
        advance(&mut state, PipelineState::Analyzing, run_id);
        self.run_stage(&self.analyst, fresh, &workdir, run_id)
            .await
            .map_err(|e| failure_from(Some(StageKind::Analysis), e))?;
        advance(&mut state, PipelineState::Analyzed, run_id);

        let artifact = workdir
            .read_result_artifact()
            .map_err(|e| failure_from(Some(StageKind::Analysis), e))?;
        advance(&mut state, PipelineState::Done, run_id);
        Ok(artifact)
    }

    /// One stage's bounded generate-execute retry loop.
    ///
    /// Generation faults (malformed replies, missing metadata, upstream
    /// model errors) consume one attempt each, exactly like execution
    /// failures; nothing resets or extends the budget. A linearly increasing
    /// backoff is applied before re-invoking the model after a generation
    /// fault.
    async fn run_stage(
        &self,
        stage: &GenerationStage,
        fresh: GenerationRequest,
        workdir: &WorkingDirectory,
        run_id: &str,
    ) -> Result<GenerationResult, AugurError> {
        let budget = self.config.attempt_budget;
        let mut last_output = String::new();
        let mut last_was_upstream = false;

        for attempt in 1..=budget {
            let request = if attempt == 1 {
                fresh.clone()
            } else {
                GenerationRequest::Retry {
                    error_excerpt: last_n_words(&last_output, self.config.retry_tail_words),
                }
            };
            tracing::info!(stage = %stage.kind(), attempt, budget, "stage attempt");

            match stage.generate(&request, workdir, run_id).await {
                Ok(result) => {
                    let outcome = self
                        .sandbox
                        .execute(&result.code, &result.libraries, workdir)
                        .await;
                    if outcome.is_success() {
                        tracing::info!(stage = %stage.kind(), attempt, "execution succeeded");
                        return Ok(result);
                    }
                    tracing::warn!(stage = %stage.kind(), attempt, "execution failed");
                    last_output = outcome.output;
                    last_was_upstream = false;
                }
                Err(e) => {
                    tracing::warn!(stage = %stage.kind(), attempt, error = %e, "generation fault");
                    last_was_upstream = e.is_upstream();
                    last_output = e.to_string();
                    if attempt < budget {
                        let delay =
                            Duration::from_millis(self.config.backoff_base_ms * u64::from(attempt));
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        let tail = last_n_words(&last_output, self.config.retry_tail_words);
        if last_was_upstream {
            Err(AugurError::upstream(tail, false))
        } else {
            Err(AugurError::StageExhausted {
                stage: stage.kind(),
                attempts: budget,
                last_output: tail,
            })
        }
    }
}

fn advance(state: &mut PipelineState, next: PipelineState, run_id: &str) {
    tracing::info!(run_id, from = state.as_str(), to = next.as_str(), "state transition");
    *state = next;
}

fn failure_from(stage: Option<StageKind>, err: AugurError) -> PipelineFailure {
    let (category, detail) = match &err {
        AugurError::InvalidRequest(msg) => (FailureCategory::InvalidRequest, msg.clone()),
        AugurError::UpstreamModel { message, .. } => {
            (FailureCategory::ModelUnavailable, message.clone())
        }
        AugurError::MissingArtifact { path } => (FailureCategory::MissingArtifact, path.clone()),
        AugurError::MalformedArtifact { message, .. } => {
            (FailureCategory::MalformedArtifact, message.clone())
        }
        AugurError::StageExhausted {
            stage: failed_stage,
            last_output,
            ..
        } => {
            let category = match failed_stage {
                StageKind::Collection => FailureCategory::CollectionFailed,
                StageKind::Analysis => FailureCategory::AnalysisFailed,
            };
            (category, last_output.clone())
        }
        other => (FailureCategory::Setup, other.to_string()),
    };
    PipelineFailure {
        stage,
        category,
        detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use augur_core::error::Result;
    use augur_core::session::ConversationTurn;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Scripted model client: pops one canned reply per call and records
    /// every turn it was asked to send.
    struct ScriptedClient {
        replies: Mutex<VecDeque<Result<String>>>,
        turns: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        fn new(replies: Vec<Result<String>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                turns: Mutex::new(Vec::new()),
            })
        }

        fn call_count(&self) -> usize {
            self.turns.lock().unwrap().len()
        }

        fn sent_turns(&self) -> Vec<String> {
            self.turns.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ModelClient for ScriptedClient {
        async fn generate(
            &self,
            _system_instruction: &str,
            _history: &[ConversationTurn],
            turn: &str,
        ) -> Result<String> {
            self.turns.lock().unwrap().push(turn.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AugurError::upstream("script exhausted", false)))
        }
    }

    fn test_config(uploads_root: &std::path::Path) -> PipelineConfig {
        PipelineConfig {
            uploads_root: uploads_root.to_path_buf(),
            backoff_base_ms: 1,
            ..PipelineConfig::default()
        }
    }

    fn python_available() -> bool {
        std::process::Command::new("python3")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn request_with_csv() -> PipelineRequest {
        PipelineRequest {
            uploads: vec![
                UploadedFile::new(
                    "question.txt",
                    "What is the average of column X in the attached CSV?".as_bytes(),
                ),
                UploadedFile::new("data.csv", "x\n3\n4\n6\n".as_bytes()),
            ],
        }
    }

    fn collection_reply(code: &str, libraries: &[&str]) -> String {
        serde_json::json!({
            "code": code,
            "libraries": libraries,
            "questions": ["What is the average of column X?"],
        })
        .to_string()
    }

    fn analysis_reply(code: &str) -> String {
        serde_json::json!({ "code": code, "libraries": [] }).to_string()
    }

    const COLLECT_CODE: &str =
        "open('metadata.txt', 'w').write('ANSWER_FORMAT: JSON\\ncolumns: x')";
    const ANALYZE_CODE: &str = "open('result.json', 'w').write('{\"answer\": 4.5}')";

    #[tokio::test]
    async fn test_scenario_a_happy_path() {
        if !python_available() {
            return;
        }
        let uploads_root = TempDir::new().unwrap();
        let client = ScriptedClient::new(vec![
            Ok(collection_reply(COLLECT_CODE, &[])),
            Ok(analysis_reply(ANALYZE_CODE)),
        ]);
        let pipeline = Pipeline::new(test_config(uploads_root.path()), client.clone());

        let artifact = pipeline.run(request_with_csv()).await.unwrap();

        assert_eq!(artifact, serde_json::json!({"answer": 4.5}));
        assert_eq!(client.call_count(), 2);
        // The analysis turn was seeded with the collector's sub-questions.
        assert!(client.sent_turns()[1].contains("What is the average of column X?"));
    }

    #[tokio::test]
    async fn test_scenario_b_install_failure_then_recovery() {
        if !python_available() {
            return;
        }
        let uploads_root = TempDir::new().unwrap();
        let client = ScriptedClient::new(vec![
            Ok(collection_reply(
                COLLECT_CODE,
                &["definitely-not-a-real-package-augur-xyz"],
            )),
            Ok(collection_reply(COLLECT_CODE, &[])),
            Ok(analysis_reply(ANALYZE_CODE)),
        ]);
        let pipeline = Pipeline::new(test_config(uploads_root.path()), client.clone());

        let artifact = pipeline.run(request_with_csv()).await.unwrap();

        assert_eq!(artifact, serde_json::json!({"answer": 4.5}));
        let turns = client.sent_turns();
        assert_eq!(turns.len(), 3);
        // The second collection attempt was a retry carrying the install
        // failure's diagnostic tail.
        assert!(turns[1].contains("<error>"));
        assert!(turns[1].contains("corrected JSON"));
    }

    #[tokio::test]
    async fn test_scenario_c_missing_artifact_is_distinct() {
        if !python_available() {
            return;
        }
        let uploads_root = TempDir::new().unwrap();
        // Analysis succeeds but writes nothing to result.json.
        let client = ScriptedClient::new(vec![
            Ok(collection_reply(COLLECT_CODE, &[])),
            Ok(analysis_reply("x = 1")),
        ]);
        let pipeline = Pipeline::new(test_config(uploads_root.path()), client);

        let failure = pipeline.run(request_with_csv()).await.unwrap_err();

        assert_eq!(failure.category, FailureCategory::MissingArtifact);
        assert_eq!(failure.stage, Some(StageKind::Analysis));
    }

    #[tokio::test]
    async fn test_scenario_d_budget_exhaustion_reports_last_tail() {
        if !python_available() {
            return;
        }
        let uploads_root = TempDir::new().unwrap();
        let failing = collection_reply("raise RuntimeError('kaboom')", &[]);
        let client = ScriptedClient::new(vec![
            Ok(failing.clone()),
            Ok(failing.clone()),
            Ok(failing),
        ]);
        let pipeline = Pipeline::new(test_config(uploads_root.path()), client.clone());

        let failure = pipeline.run(request_with_csv()).await.unwrap_err();

        assert_eq!(client.call_count(), 3);
        assert_eq!(failure.category, FailureCategory::CollectionFailed);
        assert_eq!(failure.stage, Some(StageKind::Collection));
        assert!(failure.detail.contains("kaboom"));
    }

    #[tokio::test]
    async fn test_malformed_replies_consume_budget_without_extending_it() {
        let uploads_root = TempDir::new().unwrap();
        let client = ScriptedClient::new(vec![
            Ok("nonsense".to_string()),
            Ok("still nonsense".to_string()),
            Ok("nonsense again".to_string()),
        ]);
        let pipeline = Pipeline::new(test_config(uploads_root.path()), client.clone());

        let failure = pipeline.run(request_with_csv()).await.unwrap_err();

        // Never a 4th attempt.
        assert_eq!(client.call_count(), 3);
        assert_eq!(failure.category, FailureCategory::CollectionFailed);
    }

    #[tokio::test]
    async fn test_upstream_exhaustion_is_model_unavailable() {
        let uploads_root = TempDir::new().unwrap();
        let client = ScriptedClient::new(vec![
            Err(AugurError::upstream("503: overloaded", true)),
            Err(AugurError::upstream("503: overloaded", true)),
            Err(AugurError::upstream("503: overloaded", true)),
        ]);
        let pipeline = Pipeline::new(test_config(uploads_root.path()), client.clone());

        let failure = pipeline.run(request_with_csv()).await.unwrap_err();

        assert_eq!(client.call_count(), 3);
        assert_eq!(failure.category, FailureCategory::ModelUnavailable);
        assert!(failure.detail.contains("overloaded"));
    }

    #[tokio::test]
    async fn test_missing_question_is_invalid_request() {
        let uploads_root = TempDir::new().unwrap();
        let client = ScriptedClient::new(vec![]);
        let pipeline = Pipeline::new(test_config(uploads_root.path()), client.clone());

        let failure = pipeline
            .run(PipelineRequest { uploads: vec![] })
            .await
            .unwrap_err();

        assert_eq!(failure.category, FailureCategory::InvalidRequest);
        assert_eq!(client.call_count(), 0);
    }
}
