//! Code-generation stages.
//!
//! Two variants share one contract shape: the collector produces
//! scraping/ingestion code plus restated sub-questions, the analyst produces
//! analysis code consuming the metadata artifact the collection code wrote.
//! Each stage builds a single constrained conversational turn, sends it
//! through the session for its (stage, session-id) pair, and parses the
//! reply as a closed-field JSON document.

use std::sync::Arc;

use augur_core::error::Result;
use augur_core::stage::{GenerationRequest, GenerationResult, StageKind};
use augur_core::workdir::{METADATA_FILE, RESULT_FILE, WorkingDirectory};

use crate::client::ModelClient;
use crate::store::SessionStore;

/// One code-generation stage bound to a model client and session store.
pub struct GenerationStage {
    kind: StageKind,
    client: Arc<dyn ModelClient>,
    store: Arc<SessionStore>,
}

impl GenerationStage {
    /// Creates the collection-stage variant.
    pub fn collector(client: Arc<dyn ModelClient>, store: Arc<SessionStore>) -> Self {
        Self {
            kind: StageKind::Collection,
            client,
            store,
        }
    }

    /// Creates the analysis-stage variant.
    pub fn analyst(client: Arc<dyn ModelClient>, store: Arc<SessionStore>) -> Self {
        Self {
            kind: StageKind::Analysis,
            client,
            store,
        }
    }

    pub fn kind(&self) -> StageKind {
        self.kind
    }

    /// Runs one generation attempt.
    ///
    /// Resolves the session for (stage, session-id), guarantees the artifact
    /// placeholder contract, sends the turn, and parses the reply. The
    /// session accumulates all turns across attempts, so on retries the
    /// model has its own previous (failing) code in context.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
        workdir: &WorkingDirectory,
        session_id: &str,
    ) -> Result<GenerationResult> {
        let turn = match self.kind {
            StageKind::Collection => {
                workdir.ensure_metadata_placeholder()?;
                self.build_collection_turn(request)
            }
            StageKind::Analysis => {
                // The metadata artifact is this stage's input contract; it
                // must exist before any analysis prompt is sent.
                let metadata = match request {
                    GenerationRequest::Fresh { .. } => Some(workdir.read_metadata()?),
                    GenerationRequest::Retry { .. } => None,
                };
                workdir.ensure_result_placeholder()?;
                self.build_analysis_turn(request, metadata.as_deref())
            }
        };

        let system_instruction = match self.kind {
            StageKind::Collection => collection_instruction(workdir),
            StageKind::Analysis => analysis_instruction(workdir),
        };

        let session = self
            .store
            .get_or_create(self.kind, session_id, &system_instruction)
            .await;
        let mut session = session.lock().await;

        tracing::debug!(
            stage = %self.kind,
            session_id,
            retry = request.is_retry(),
            "sending generation turn"
        );

        let reply = self
            .client
            .generate(session.system_instruction(), session.history(), &turn)
            .await?;

        // Record both turns before parsing: a malformed reply still happened
        // in the conversation, and the correction request refers to it.
        session.record_user_turn(&turn);
        session.record_model_turn(&reply);

        GenerationResult::parse_reply(self.kind, &reply)
    }

    fn build_collection_turn(&self, request: &GenerationRequest) -> String {
        match request {
            GenerationRequest::Retry { error_excerpt } => format!(
                "The previous code failed with this error: <error>{error_excerpt}</error>. \
                 Please generate a corrected JSON response. Pay close attention to the \
                 provided database schema if the error is SQL-related."
            ),
            GenerationRequest::Fresh {
                question,
                files,
                schema_hints,
            } => {
                let mut turn = format!(
                    "User Question:\n{question}\n\nUploaded Files:\n{}\n",
                    files.to_prompt_lines()
                );
                if !schema_hints.is_empty() {
                    turn.push_str(&format!("\nSchemas:\n{}", schema_hints.to_prompt_text()));
                }
                turn.push_str("\nGenerate the JSON response as instructed.");
                turn
            }
        }
    }

    fn build_analysis_turn(
        &self,
        request: &GenerationRequest,
        metadata: Option<&str>,
    ) -> String {
        match request {
            GenerationRequest::Retry { error_excerpt } => format!(
                "The previous code failed with this error: <error>{error_excerpt}</error>. \
                 Please generate a corrected JSON response."
            ),
            GenerationRequest::Fresh { question, .. } => format!(
                "User Questions:\n{question}\n\nData Metadata:\n{}\n\n\
                 Generate the JSON response as instructed.",
                metadata.unwrap_or_default()
            ),
        }
    }
}

/// Renders the sub-questions forwarded from the collection stage as the
/// analysis stage's question text.
pub fn render_questions(questions: &[String]) -> String {
    questions.join("\n")
}

fn collection_instruction(workdir: &WorkingDirectory) -> String {
    let folder = workdir.path().display();
    format!(
        "You are a Python code generation assistant. Your task is to generate a JSON object \
         containing Python code to scrape data, a list of required libraries, and the user's \
         questions.\n\
         \n\
         RULES:\n\
         - If a database schema is provided, you MUST use it to write correct SQL queries. \
         Do not invent table or column names.\n\
         - The generated code must save data to the '{folder}' directory.\n\
         - The code must also generate a '{folder}/{METADATA_FILE}' file containing dataframe \
         info, column names, and the first few rows.\n\
         - If the user provides an ANSWER_FORMAT, copy it verbatim into the metadata file. \
         Otherwise, use \"ANSWER_FORMAT: JSON\".\n\
         - Do NOT include built-in Python modules (such as sqlite3, csv, or json) in the \
         libraries list.\n\
         - Respond ONLY with a valid JSON object matching this schema: \
         {{\"code\": \"...\", \"libraries\": [...], \"questions\": [...]}}\n\
         - Do NOT include explanations or any text outside the JSON response."
    )
}

fn analysis_instruction(workdir: &WorkingDirectory) -> String {
    let folder = workdir.path().display();
    format!(
        "You are a Python code generation assistant. Your task is to generate a JSON object \
         containing Python code to analyze data and a list of required libraries.\n\
         \n\
         RULES:\n\
         - The generated code must answer the user's questions based on the provided metadata.\n\
         - The code MUST save the final answer as a JSON file to '{folder}/{RESULT_FILE}'.\n\
         - The code must adhere to the 'ANSWER_FORMAT' specified in the metadata.\n\
         - If visualizations are created, they must be saved as base64-encoded PNGs within the \
         result JSON.\n\
         - Do NOT include built-in Python modules (such as sqlite3, csv, or json) in the \
         libraries list.\n\
         - Respond ONLY with a valid JSON object matching this schema: \
         {{\"code\": \"...\", \"libraries\": [...]}}\n\
         - Do NOT include explanations or any text outside the JSON response."
    )
}
