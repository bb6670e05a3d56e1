use super::{PromptVars, render};
use crate::error::Result;

/// Trend classification from price against its moving averages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outlook {
    Bullish,
    Neutral,
    Bearish,
}

impl Outlook {
    /// `price > ma50 > ma200` is bullish, `ma50 > price > ma200` neutral,
    /// everything else bearish
    pub fn classify(price: f64, ma50: f64, ma200: f64) -> Self {
        if price > ma50 && ma50 > ma200 {
            Outlook::Bullish
        } else if ma50 > price && price > ma200 {
            Outlook::Neutral
        } else {
            Outlook::Bearish
        }
    }

    pub fn recommendation(self) -> &'static str {
        match self {
            Outlook::Bullish => "Buy",
            Outlook::Neutral => "Hold",
            Outlook::Bearish => "Sell/Avoid",
        }
    }

    fn template(self) -> &'static str {
        match self {
            Outlook::Bullish => BULLISH,
            Outlook::Neutral => NEUTRAL,
            Outlook::Bearish => BEARISH,
        }
    }
}

const BULLISH: &str = "
Technical Analysis: {{ ticker }} is showing a bullish trend with the current price (${{ price }}) above both the 50-day moving average (${{ ma50 }}) and 200-day moving average (${{ ma200 }}). This indicates strong upward momentum.

Recommendation: Buy - The stock shows strong technical signals with price above key moving averages.

Risks: Market volatility could impact short-term performance. The stock may be overbought at current levels.

Opportunities: Continued market strength could lead to further price appreciation. Consider dollar-cost averaging for entry points.

Note: This is a generic analysis because the AI analysis service is currently unavailable. Please try again later for a more detailed assessment.
";

const NEUTRAL: &str = "
Technical Analysis: {{ ticker }} is in a neutral trend. The price (${{ price }}) is below the 50-day moving average (${{ ma50 }}) but above the 200-day moving average (${{ ma200 }}), suggesting a possible consolidation phase.

Recommendation: Hold - The stock is showing mixed signals. Wait for clearer direction before adding to position.

Risks: Potential for further decline if support at the 200-day moving average doesn't hold.

Opportunities: A bounce back above the 50-day moving average could signal renewed strength.

Note: This is a generic analysis because the AI analysis service is currently unavailable. Please try again later for a more detailed assessment.
";

const BEARISH: &str = "
Technical Analysis: {{ ticker }} shows bearish signals with the current price (${{ price }}) below both the 50-day moving average (${{ ma50 }}) and 200-day moving average (${{ ma200 }}).

Recommendation: Sell/Avoid - The stock is displaying weakness from a technical perspective.

Risks: Continued downward pressure could lead to further price declines.

Opportunities: Watch for a potential reversal if price moves back above the 50-day moving average.

Note: This is a generic analysis because the AI analysis service is currently unavailable. Please try again later for a more detailed assessment.
";

/// Render the canned summary matching the price levels
pub fn canned_analysis(outlook: Outlook, vars: &PromptVars<'_>) -> Result<String> {
    render(outlook.template(), vars)
}
