//! Shared utilities for the stock analyzer
//!
//! This crate provides common functionality used across the workspace,
//! including logging setup and process-level configuration.

pub mod config;
pub mod logging;

pub use config::{AppConfig, ConfigError, LogFormat};
pub use logging::init_tracing_with;
