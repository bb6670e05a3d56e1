//! Narrative provider selection from the environment

use std::str::FromStr;
use std::sync::Arc;
use stock_llm::LLMProvider;
use stock_llm::providers::{GeminiConfig, GeminiProvider, OpenAIConfig, OpenAIProvider};
use tracing::{info, warn};

/// Which narrative backend `NARRATIVE_PROVIDER` asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NarrativeBackend {
    #[default]
    Gemini,
    OpenAI,
    Disabled,
}

impl FromStr for NarrativeBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "openai" => Ok(Self::OpenAI),
            "none" | "off" | "" => Ok(Self::Disabled),
            other => anyhow::bail!("unknown NARRATIVE_PROVIDER: {other}"),
        }
    }
}

/// Configured narrative provider and the model to ask for
pub struct Narrator {
    pub provider: Option<Arc<dyn LLMProvider>>,
    pub model: String,
}

impl Narrator {
    pub fn disabled() -> Self {
        Self {
            provider: None,
            model: String::new(),
        }
    }
}

/// Build the narrator from an arbitrary key lookup
///
/// A selected backend without its API key is disabled with a warning
/// rather than failing start-up; analyses then use canned summaries.
pub fn narrator_from_lookup<F>(lookup: F) -> anyhow::Result<Narrator>
where
    F: Fn(&str) -> Option<String>,
{
    let backend = lookup("NARRATIVE_PROVIDER")
        .map(|value| value.parse::<NarrativeBackend>())
        .transpose()?
        .unwrap_or_default();

    let narrator = match backend {
        NarrativeBackend::Disabled => Narrator::disabled(),
        NarrativeBackend::Gemini => match GeminiConfig::from_lookup(&lookup) {
            Ok(config) => {
                let model = config.model.clone();
                Narrator {
                    provider: Some(Arc::new(GeminiProvider::new(config)?)),
                    model,
                }
            }
            Err(err) => {
                warn!(error = %err, "Gemini narrative disabled");
                Narrator::disabled()
            }
        },
        NarrativeBackend::OpenAI => match OpenAIConfig::from_lookup(&lookup) {
            Ok(config) => {
                let model = config.model.clone();
                Narrator {
                    provider: Some(Arc::new(OpenAIProvider::with_config(config)?)),
                    model,
                }
            }
            Err(err) => {
                warn!(error = %err, "OpenAI narrative disabled");
                Narrator::disabled()
            }
        },
    };

    match &narrator.provider {
        Some(provider) => info!(provider = provider.name(), model = %narrator.model, "Narrative provider ready"),
        None => info!("No narrative provider, analyses will use canned summaries"),
    }

    Ok(narrator)
}
