//! Prompt and canned-narrative templates
//!
//! - `analysis`: the request sent to the narrative provider
//! - `canned`: technical summaries used when no narrative is available

mod analysis;
mod canned;

pub use analysis::{ANALYSIS_SYSTEM_PROMPT, analysis_prompt};
pub use canned::{Outlook, canned_analysis};

use minijinja::Environment;
use serde::Serialize;

use crate::error::Result;

/// Price levels embedded in every prompt, pre-formatted to cents
#[derive(Debug, Clone, Serialize)]
pub struct PromptVars<'a> {
    pub ticker: &'a str,
    pub name: &'a str,
    pub price: String,
    pub ma50: String,
    pub ma200: String,
}

impl<'a> PromptVars<'a> {
    pub fn new(ticker: &'a str, name: &'a str, price: f64, ma50: f64, ma200: f64) -> Self {
        Self {
            ticker,
            name,
            price: format!("{price:.2}"),
            ma50: format!("{ma50:.2}"),
            ma200: format!("{ma200:.2}"),
        }
    }
}

fn render(template: &str, vars: &PromptVars<'_>) -> Result<String> {
    let env = Environment::new();
    let rendered = env.render_str(template, minijinja::Value::from_serialize(vars))?;
    Ok(rendered.trim().to_string())
}
