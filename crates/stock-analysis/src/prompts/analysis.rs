use super::{PromptVars, render};
use crate::error::Result;

/// System prompt for the narrative provider
pub const ANALYSIS_SYSTEM_PROMPT: &str =
    "You are an equity analyst. Answer in plain prose, without tables or markdown headings.";

const ANALYSIS_TEMPLATE: &str = "
Analyze the stock {{ ticker }} ({{ name }}) with the following information:
- Current Price: ${{ price }}
- 50-Day Moving Average: ${{ ma50 }}
- 200-Day Moving Average: ${{ ma200 }}

Provide a concise analysis including:
1. Technical analysis based on moving averages
2. Investment recommendation (Buy, Hold, Sell) with a brief justification
3. Key risks and opportunities
Limit your response to 250 words or less.
";

/// Render the analysis request for one ticker
pub fn analysis_prompt(vars: &PromptVars<'_>) -> Result<String> {
    render(ANALYSIS_TEMPLATE, vars)
}
