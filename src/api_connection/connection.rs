//! The opaque structured-output generation capability.
//!
//! `GenerativeModel` is the seam the orchestrator depends on; the production
//! implementation talks to OpenRouter over HTTPS. A missing API key makes the
//! provider report itself unavailable rather than failing requests.

use async_trait::async_trait;
use dotenv::dotenv;
use reqwest::Client;
use serde_json::Value;
use std::env;
use std::error::Error;
use std::fmt;

use super::endpoints::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, JsonSchemaDefinition,
    ResponseFormat,
};

const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

#[derive(Debug)]
pub enum ApiConnectionError {
    MissingApiKey(String),
    NetworkError(reqwest::Error),
    SerializationError(serde_json::Error),
    ApiError {
        status: reqwest::StatusCode,
        error_body: String,
    },
    EmptyResponse,
}

impl fmt::Display for ApiConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiConnectionError::MissingApiKey(key_name) => {
                write!(f, "API key not found in environment: {}", key_name)
            }
            ApiConnectionError::NetworkError(err) => write!(f, "Network error: {}", err),
            ApiConnectionError::SerializationError(err) => {
                write!(f, "Serialization error: {}", err)
            }
            ApiConnectionError::ApiError { status, error_body } => {
                write!(f, "API error {}: {}", status, error_body)
            }
            ApiConnectionError::EmptyResponse => {
                write!(f, "API returned no usable response content")
            }
        }
    }
}

impl Error for ApiConnectionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ApiConnectionError::NetworkError(err) => Some(err),
            ApiConnectionError::SerializationError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiConnectionError {
    fn from(err: reqwest::Error) -> Self {
        ApiConnectionError::NetworkError(err)
    }
}

impl From<serde_json::Error> for ApiConnectionError {
    fn from(err: serde_json::Error) -> Self {
        ApiConnectionError::SerializationError(err)
    }
}

/// One structured-output generation call: prompt pair, optional enforced
/// schema, model and budget from the policy tables.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub schema: Option<JsonSchemaDefinition>,
    pub model: String,
    pub max_output_tokens: u32,
    pub temperature: f32,
}

/// The generation capability as the orchestrator sees it: fallible, latent,
/// rate-limited. `Ok(None)` means the model produced nothing usable, which
/// callers treat as a dropped unit rather than an error.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    fn is_available(&self) -> bool;
    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<Option<Value>, ApiConnectionError>;
}

pub struct OpenRouterProvider {
    http: Client,
    api_key_env_var: String,
}

impl OpenRouterProvider {
    pub fn new(api_key_env_var: &str) -> Self {
        dotenv().ok();
        Self {
            http: Client::new(),
            api_key_env_var: api_key_env_var.to_string(),
        }
    }
}

/// Models still wrap JSON in markdown fences despite instructions; strip them
/// before parsing.
pub(crate) fn strip_markdown_fences(content: &str) -> &str {
    let trimmed = content.trim();
    for fence in ["```json", "```"] {
        if trimmed.starts_with(fence) && trimmed.ends_with("```") && trimmed.len() > fence.len() + 3
        {
            return trimmed
                .trim_start_matches(fence)
                .trim_end_matches("```")
                .trim();
        }
    }
    trimmed
}

#[async_trait]
impl GenerativeModel for OpenRouterProvider {
    fn is_available(&self) -> bool {
        env::var(&self.api_key_env_var).is_ok()
    }

    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<Option<Value>, ApiConnectionError> {
        let api_key = env::var(&self.api_key_env_var)
            .map_err(|_| ApiConnectionError::MissingApiKey(self.api_key_env_var.clone()))?;

        let response_format = request.schema.map(|schema| ResponseFormat {
            format_type: "json_schema".to_string(),
            json_schema: Some(schema),
        });
        let payload = ChatCompletionRequest {
            model: request.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: request.system_prompt,
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: request.user_prompt,
                },
            ],
            response_format,
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_output_tokens),
        };

        let site_url = env::var("SITE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
        let app_name = env::var("APP_NAME").unwrap_or_else(|_| "MealGen".to_string());

        let response = self
            .http
            .post(OPENROUTER_URL)
            .bearer_auth(api_key)
            .header("Content-Type", "application/json")
            .header("HTTP-Referer", site_url)
            .header("X-Title", app_name)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(ApiConnectionError::ApiError { status, error_body });
        }

        let chat_response = response.json::<ChatCompletionResponse>().await?;
        let Some(choice) = chat_response.choices.first() else {
            return Ok(None);
        };

        let content = strip_markdown_fences(&choice.message.content);
        if content.is_empty() {
            return Ok(None);
        }
        let parsed: Value = serde_json::from_str(content)?;
        Ok(Some(parsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_json_fences() {
        assert_eq!(
            strip_markdown_fences("```json\n{\"a\": 1}\n```"),
            "{\"a\": 1}"
        );
        assert_eq!(strip_markdown_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_markdown_fences("  {\"a\": 1} "), "{\"a\": 1}");
        assert_eq!(strip_markdown_fences("plain text"), "plain text");
    }

    #[tokio::test]
    async fn missing_api_key_errors_and_reports_unavailable() {
        let provider = OpenRouterProvider::new("THIS_KEY_SHOULD_NOT_EXIST_IN_ENV_ABXYZ");
        assert!(!provider.is_available());
        let request = GenerationRequest {
            system_prompt: "hi".to_string(),
            user_prompt: "hi".to_string(),
            schema: None,
            model: "qwen/qwen3-32b".to_string(),
            max_output_tokens: 16,
            temperature: 0.0,
        };
        let result = provider.generate(request).await;
        assert!(matches!(result, Err(ApiConnectionError::MissingApiKey(_))));
    }
}
