//! Google Gemini provider implementation
//!
//! This module implements the LLMProvider trait for the Gemini
//! `generateContent` endpoint.
//! See: https://ai.google.dev/api/generate-content

use crate::{
    CompletionRequest, CompletionResponse, LLMError, LLMProvider, Message, Result, Role,
    StopReason, TokenUsage,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_GEMINI_MODEL: &str = "gemini-pro";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Configuration for the Gemini provider
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API key sent as `x-goog-api-key`
    pub api_key: String,
    /// Base URL of the generative language API
    pub api_base: String,
    /// Model used when the caller does not pick one
    pub model: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl GeminiConfig {
    /// Create a config with the given API key and default settings
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_base: GEMINI_API_BASE.to_string(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Create config from `GEMINI_API_KEY` and optional `GEMINI_MODEL`
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("GEMINI_API_KEY").ok_or_else(|| {
            LLMError::ConfigurationError("GEMINI_API_KEY environment variable not set".to_string())
        })?;

        let mut config = Self::new(api_key);
        if let Some(model) = lookup("GEMINI_MODEL") {
            config.model = model;
        }
        Ok(config)
    }
}

/// Gemini provider
pub struct GeminiProvider {
    client: Client,
    config: GeminiConfig,
}

impl GeminiProvider {
    /// Create a new Gemini provider
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl LLMProvider for GeminiProvider {
    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        debug!("Sending request to Gemini API");

        let model = request.model.clone();
        let body = GeminiRequest::from(request);

        let response = self
            .client
            .post(format!(
                "{}/models/{}:generateContent",
                self.config.api_base, model
            ))
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await?;
            return Err(LLMError::from_status(status, error_text, &model));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            LLMError::UnexpectedResponse(format!("Failed to parse response: {e}"))
        })?;

        gemini_response.into_completion()
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

// Gemini-specific request/response types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

impl From<CompletionRequest> for GeminiRequest {
    fn from(request: CompletionRequest) -> Self {
        let contents = request
            .messages
            .into_iter()
            .map(|m| GeminiContent {
                // Gemini names the assistant side "model"
                role: Some(
                    match m.role {
                        Role::Assistant => "model",
                        Role::User | Role::System => "user",
                    }
                    .to_string(),
                ),
                parts: vec![GeminiPart { text: m.content }],
            })
            .collect();

        Self {
            contents,
            system_instruction: request.system.map(|text| GeminiContent {
                role: None,
                parts: vec![GeminiPart { text }],
            }),
            generation_config: GenerationConfig {
                max_output_tokens: request.max_tokens,
                temperature: request.temperature,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: usize,
    #[serde(default)]
    candidates_token_count: usize,
}

impl GeminiResponse {
    fn into_completion(self) -> Result<CompletionResponse> {
        let usage = self.usage_metadata.unwrap_or_default();
        let candidate = self
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| LLMError::UnexpectedResponse("No candidates in response".to_string()))?;

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        let stop_reason = match candidate.finish_reason.as_deref() {
            Some("MAX_TOKENS") => StopReason::MaxTokens,
            Some("SAFETY" | "RECITATION" | "BLOCKLIST") => StopReason::ContentFilter,
            _ => StopReason::EndTurn,
        };

        let message = Message::assistant(text);
        if message.text().is_none() {
            return Err(LLMError::EmptyResponse);
        }

        Ok(CompletionResponse {
            message,
            stop_reason,
            usage: TokenUsage {
                input_tokens: usage.prompt_token_count,
                output_tokens: usage.candidates_token_count,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_creation() {
        let provider = GeminiProvider::new(GeminiConfig::new("test-key"));
        assert!(provider.is_ok());
        assert_eq!(provider.unwrap().name(), "gemini");
    }

    #[test]
    fn test_from_lookup_without_key() {
        let result = GeminiConfig::from_lookup(|_| None);
        assert!(result.is_err());
    }

    #[test]
    fn test_request_shape() {
        let request = CompletionRequest::builder("gemini-pro")
            .system("Be concise")
            .add_message(Message::user("Analyze GOOGL"))
            .max_tokens(400)
            .build();

        let body = serde_json::to_value(GeminiRequest::from(request)).unwrap();
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Analyze GOOGL");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Be concise");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 400);
        assert!(body["generationConfig"].get("temperature").is_none());
    }

    #[test]
    fn test_response_parsing() {
        let raw = serde_json::json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Technical "}, {"text": "view."}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 40, "candidatesTokenCount": 2}
        });

        let response: GeminiResponse = serde_json::from_value(raw).unwrap();
        let completion = response.into_completion().unwrap();
        assert_eq!(completion.message.content, "Technical view.");
        assert_eq!(completion.stop_reason, StopReason::EndTurn);
        assert_eq!(completion.usage.input_tokens, 40);
    }

    #[test]
    fn test_blocked_response_is_empty() {
        let raw = serde_json::json!({
            "candidates": [{"finishReason": "SAFETY"}]
        });
        let response: GeminiResponse = serde_json::from_value(raw).unwrap();
        assert!(matches!(
            response.into_completion(),
            Err(LLMError::EmptyResponse)
        ));
    }
}
