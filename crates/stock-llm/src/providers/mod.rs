//! Concrete LLM provider implementations

#[cfg(feature = "gemini")]
pub mod gemini;
#[cfg(feature = "openai")]
pub mod openai;

#[cfg(feature = "gemini")]
pub use gemini::{GeminiConfig, GeminiProvider};
#[cfg(feature = "openai")]
pub use openai::{OpenAIConfig, OpenAIProvider};
