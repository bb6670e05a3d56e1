//! Narrative provider abstraction for the stock analyzer
//!
//! This crate provides provider-agnostic abstractions for asking a
//! generative text endpoint to write free-form analysis. It includes:
//!
//! - Message types for prompt/response exchange
//! - Completion request/response types
//! - Provider trait for LLM implementations
//! - Concrete provider implementations (behind feature flags)

pub mod completion;
pub mod error;
pub mod messages;
pub mod provider;

// Re-export main types
pub use completion::{CompletionRequest, CompletionResponse, StopReason, TokenUsage};
pub use error::{LLMError, Result};
pub use messages::{Message, Role};
pub use provider::LLMProvider;

// Provider implementations (feature-gated)
#[cfg(any(feature = "gemini", feature = "openai"))]
pub mod providers;
