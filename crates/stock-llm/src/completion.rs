//! One-shot completion exchange

use crate::Message;
use serde::{Deserialize, Serialize};

const DEFAULT_MAX_TOKENS: usize = 1024;

/// Prompt sent to a narrative provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Provider-specific model name
    pub model: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    pub messages: Vec<Message>,

    /// Upper bound on generated tokens
    pub max_tokens: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    pub fn builder(model: impl Into<String>) -> CompletionRequestBuilder {
        CompletionRequestBuilder {
            request: CompletionRequest {
                model: model.into(),
                system: None,
                messages: Vec::new(),
                max_tokens: DEFAULT_MAX_TOKENS,
                temperature: None,
            },
        }
    }
}

/// Generated text plus bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub message: Message,
    pub stop_reason: StopReason,
    pub usage: TokenUsage,
}

/// Why generation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    /// Output withheld by the provider's safety filter
    ContentFilter,
}

impl StopReason {
    /// Whether the text was cut short
    pub fn is_truncated(self) -> bool {
        matches!(self, StopReason::MaxTokens | StopReason::ContentFilter)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl TokenUsage {
    pub fn total(&self) -> usize {
        self.input_tokens + self.output_tokens
    }
}

/// Builder for [`CompletionRequest`]
pub struct CompletionRequestBuilder {
    request: CompletionRequest,
}

impl CompletionRequestBuilder {
    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.request.system = Some(system.into());
        self
    }

    pub fn add_message(mut self, message: Message) -> Self {
        self.request.messages.push(message);
        self
    }

    pub fn max_tokens(mut self, max_tokens: usize) -> Self {
        self.request.max_tokens = max_tokens;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.request.temperature = Some(temperature);
        self
    }

    pub fn build(self) -> CompletionRequest {
        self.request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let request = CompletionRequest::builder("gemini-pro")
            .add_message(Message::user("Analyze AAPL"))
            .build();

        assert_eq!(request.model, "gemini-pro");
        assert_eq!(request.max_tokens, DEFAULT_MAX_TOKENS);
        assert!(request.system.is_none());
        assert!(request.temperature.is_none());
    }

    #[test]
    fn test_builder_overrides() {
        let request = CompletionRequest::builder("gpt-4o-mini")
            .system("You are a market analyst")
            .add_message(Message::user("Analyze MSFT"))
            .max_tokens(600)
            .temperature(0.4)
            .build();

        assert_eq!(request.system.as_deref(), Some("You are a market analyst"));
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.max_tokens, 600);
        assert_eq!(request.temperature, Some(0.4));
    }

    #[test]
    fn test_truncation() {
        assert!(StopReason::MaxTokens.is_truncated());
        assert!(StopReason::ContentFilter.is_truncated());
        assert!(!StopReason::EndTurn.is_truncated());
    }

    #[test]
    fn test_token_usage() {
        let usage = TokenUsage {
            input_tokens: 100,
            output_tokens: 50,
        };
        assert_eq!(usage.total(), 150);
    }
}
