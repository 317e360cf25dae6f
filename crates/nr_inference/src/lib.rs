use nr_core::{Error, Result};
use std::str::FromStr;
use std::time::Duration;

pub mod models;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    /// OpenAI when an API key is configured, keyword rules otherwise
    Auto,
    Keyword,
    OpenAi,
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Provider::Auto),
            "keyword" => Ok(Provider::Keyword),
            "openai" => Ok(Provider::OpenAi),
            other => Err(Error::Inference(format!("unknown model provider: {}", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub provider: Provider,
    pub api_key: Option<String>,
    pub model_name: Option<String>,
    pub base_url: Option<String>,
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: Provider::Auto,
            api_key: None,
            model_name: None,
            base_url: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

pub mod prelude {
    pub use super::models::{create_model, KeywordModel, Models, OpenAiModel};
    pub use super::{Config, Provider};
    pub use nr_core::{Error, Extraction, IntentClassifier, Result, Summarizer};
}

pub use models::{create_model, Models};
