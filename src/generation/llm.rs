//! Hosted language model access.
//!
//! `LanguageModel` is the seam the generators depend on; `GeminiClient` implements it
//! against the Gemini `generateContent` REST endpoint.
//!
//! ## Two call shapes:
//! - **generate_text**: free text (used for the question list)
//! - **generate_object**: JSON constrained by a response schema (used for feedback)

use crate::config::LlmConfig;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};

/// A prompt plus optional system instruction.
#[derive(Debug, Clone, Default)]
pub struct Prompt {
    pub system: Option<String>,
    pub text: String,
}

impl Prompt {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            system: None,
            text: text.into(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Errors from the language model boundary.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("language model API key is not configured")]
    MissingApiKey,

    #[error("network error: {0}")]
    Network(String),

    #[error("language model API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("unexpected response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Free-text generation.
    async fn generate_text(&self, prompt: &Prompt) -> Result<String, LlmError>;

    /// Structured generation: the returned value conforms to `schema` as far as the
    /// provider enforces it. Callers still validate.
    async fn generate_object(&self, prompt: &Prompt, schema: &Value) -> Result<Value, LlmError>;
}

/// Gemini REST client.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Network(e.to_string()))?;

        Ok(Self {
            client,
            api_key: config.api_key.trim().to_string(),
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn build_request(prompt: &Prompt, schema: Option<&Value>) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part {
                    text: prompt.text.clone(),
                }],
            }],
            system_instruction: prompt.system.as_ref().map(|text| Content {
                role: "system".to_string(),
                parts: vec![Part { text: text.clone() }],
            }),
            generation_config: schema.map(|schema| GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema: schema.clone(),
            }),
        }
    }

    async fn send(&self, body: &GenerateContentRequest) -> Result<String, LlmError> {
        if self.api_key.is_empty() {
            return Err(LlmError::MissingApiKey);
        }

        let url = format!("{}/{}:generateContent", self.base_url, self.model);
        debug!(model = %self.model, "Sending generateContent request");

        let response = self
            .client
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            let message = map_error_body(status, &body_text);
            error!(status = status.as_u16(), %message, "Gemini API error");
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        extract_text(parsed)
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn generate_text(&self, prompt: &Prompt) -> Result<String, LlmError> {
        let request = Self::build_request(prompt, None);
        self.send(&request).await
    }

    async fn generate_object(&self, prompt: &Prompt, schema: &Value) -> Result<Value, LlmError> {
        let request = Self::build_request(prompt, Some(schema));
        let text = self.send(&request).await?;
        serde_json::from_str(&text).map_err(|e| LlmError::InvalidResponse(format!("not JSON: {}", e)))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
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
    response_schema: Value,
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
    #[serde(default)]
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

fn extract_text(response: GenerateContentResponse) -> Result<String, LlmError> {
    let text: String = response
        .candidates
        .and_then(|candidates| candidates.into_iter().next())
        .and_then(|candidate| candidate.content)
        .map(|content| content.parts.into_iter().filter_map(|part| part.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        Err(LlmError::InvalidResponse("no text in response candidates".to_string()))
    } else {
        Ok(text)
    }
}

fn map_error_body(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<ErrorWrapper>(body)
        .ok()
        .and_then(|wrapper| {
            let message = wrapper.error.message?;
            Some(match wrapper.error.status {
                Some(status_text) if !status_text.is_empty() => format!("{}: {}", status_text, message),
                _ => message,
            })
        })
        .unwrap_or_else(|| {
            if body.is_empty() {
                status.canonical_reason().unwrap_or("unknown error").to_string()
            } else {
                body.to_string()
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_shape_for_objects() {
        let prompt = Prompt::new("Score this").with_system("You are an interviewer");
        let schema = json!({"type": "object"});
        let request = GeminiClient::build_request(&prompt, Some(&schema));

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["contents"][0]["parts"][0]["text"], "Score this");
        assert_eq!(value["systemInstruction"]["parts"][0]["text"], "You are an interviewer");
        assert_eq!(value["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(value["generationConfig"]["responseSchema"]["type"], "object");
    }

    #[test]
    fn test_text_request_has_no_generation_config() {
        let request = GeminiClient::build_request(&Prompt::new("hi"), None);
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("generationConfig").is_none());
        assert!(value.get("systemInstruction").is_none());
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{"content": {"parts": [{"text": "[\"Q1\","}, {"text": " \"Q2\"]"}]}}]
        }))
        .unwrap();
        assert_eq!(extract_text(response).unwrap(), "[\"Q1\", \"Q2\"]");
    }

    #[test]
    fn test_extract_text_empty_is_error() {
        let response: GenerateContentResponse = serde_json::from_value(json!({"candidates": []})).unwrap();
        assert!(matches!(extract_text(response), Err(LlmError::InvalidResponse(_))));
    }

    #[test]
    fn test_error_body_mapping() {
        let body = r#"{"error": {"code": 429, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED"}}"#;
        let message = map_error_body(StatusCode::TOO_MANY_REQUESTS, body);
        assert_eq!(message, "RESOURCE_EXHAUSTED: Quota exceeded");
        assert_eq!(map_error_body(StatusCode::BAD_GATEWAY, ""), "Bad Gateway");
    }

    #[tokio::test]
    async fn test_missing_key_fails_without_network() {
        let config = crate::config::AppConfig::default().llm;
        let client = GeminiClient::new(&config).unwrap();
        let err = client.generate_text(&Prompt::new("hello")).await.unwrap_err();
        assert!(matches!(err, LlmError::MissingApiKey));
    }
}
