//! GeminiClient - Direct REST API implementation for Gemini.
//!
//! This client calls the Gemini REST API directly without CLI dependency.
//! The API key is resolved from the environment or the secret file.

use async_trait::async_trait;
use augur_core::error::{AugurError, Result};
use augur_core::session::{ConversationRole, ConversationTurn};
use augur_infrastructure::{EnvSecretService, SecretService};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::client::ModelClient;

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Model client that talks to the Gemini HTTP API.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    /// Creates a new client with the provided API key and model.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// Loads the API key via the default secret service.
    pub async fn try_from_env(model: impl Into<String>) -> Result<Self> {
        let secrets = EnvSecretService::new().load_secrets().await?;
        Ok(Self::new(secrets.gemini_api_key, model))
    }

    /// Overrides the model after construction.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn build_contents(history: &[ConversationTurn], turn: &str) -> Vec<Content> {
        let mut contents: Vec<Content> = history
            .iter()
            .map(|t| Content {
                role: match t.role {
                    ConversationRole::User => "user".to_string(),
                    ConversationRole::Model => "model".to_string(),
                },
                parts: vec![Part {
                    text: t.content.clone(),
                }],
            })
            .collect();
        contents.push(Content {
            role: "user".to_string(),
            parts: vec![Part {
                text: turn.to_string(),
            }],
        });
        contents
    }

    async fn send_request(&self, body: &GenerateContentRequest) -> Result<String> {
        let url = format!(
            "{}/{model}:generateContent?key={api_key}",
            BASE_URL,
            model = self.model,
            api_key = self.api_key
        );

        let response = self.client.post(url).json(body).send().await.map_err(|err| {
            AugurError::upstream(
                format!("Gemini API request failed: {err}"),
                err.is_connect() || err.is_timeout(),
            )
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read Gemini error body".to_string());
            return Err(map_http_error(status, body_text));
        }

        let parsed: GenerateContentResponse = response.json().await.map_err(|err| {
            AugurError::upstream(format!("Failed to parse Gemini response: {err}"), false)
        })?;

        extract_text_response(parsed)
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    async fn generate(
        &self,
        system_instruction: &str,
        history: &[ConversationTurn],
        turn: &str,
    ) -> Result<String> {
        let request = GenerateContentRequest {
            contents: Self::build_contents(history, turn),
            system_instruction: Some(Content {
                role: "system".to_string(),
                parts: vec![Part {
                    text: system_instruction.to_string(),
                }],
            }),
            generation_config: Some(GenerationConfig {
                response_mime_type: "application/json".to_string(),
            }),
        };
        self.send_request(&request).await
    }
}

#[derive(Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<ContentResponse>,
}

#[derive(Deserialize)]
struct ContentResponse {
    parts: Vec<PartResponse>,
}

#[derive(Deserialize)]
struct PartResponse {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}

fn extract_text_response(response: GenerateContentResponse) -> Result<String> {
    response
        .candidates
        .and_then(|mut candidates| candidates.pop())
        .and_then(|candidate| candidate.content)
        .and_then(|content| content.parts.into_iter().find_map(|part| part.text))
        .ok_or_else(|| {
            AugurError::upstream(
                "Gemini API returned no text in the response candidates",
                false,
            )
        })
}

fn map_http_error(status: StatusCode, body: String) -> AugurError {
    let message = serde_json::from_str::<ErrorWrapper>(&body)
        .map(|wrapper| {
            let status_text = wrapper.error.status.unwrap_or_default();
            let msg = wrapper.error.message.unwrap_or_else(|| body.clone());
            if status_text.is_empty() {
                msg
            } else {
                format!("{status_text}: {msg}")
            }
        })
        .unwrap_or_else(|_| body.clone());

    let is_retryable = matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    );

    AugurError::upstream(format!("{}: {}", status.as_u16(), message), is_retryable)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_contents_appends_new_turn() {
        let history = vec![
            ConversationTurn::user("hello"),
            ConversationTurn::model("hi"),
        ];
        let contents = GeminiClient::build_contents(&history, "next");

        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0].role, "user");
        assert_eq!(contents[1].role, "model");
        assert_eq!(contents[2].role, "user");
        assert_eq!(contents[2].parts[0].text, "next");
    }

    #[test]
    fn test_map_http_error_retryable_statuses() {
        let err = map_http_error(StatusCode::TOO_MANY_REQUESTS, "{}".to_string());
        assert!(err.is_retryable_upstream());

        let err = map_http_error(StatusCode::BAD_REQUEST, "{}".to_string());
        assert!(!err.is_retryable_upstream());
    }

    #[test]
    fn test_map_http_error_extracts_structured_message() {
        let body = r#"{"error": {"message": "quota exceeded", "status": "RESOURCE_EXHAUSTED"}}"#;
        let err = map_http_error(StatusCode::TOO_MANY_REQUESTS, body.to_string());

        assert!(err.to_string().contains("RESOURCE_EXHAUSTED: quota exceeded"));
    }
}
