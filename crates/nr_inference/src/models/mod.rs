pub mod keyword;
pub mod openai;

pub use keyword::KeywordModel;
pub use openai::OpenAiModel;

use nr_core::{Error, IntentClassifier, Result, Summarizer};
use std::sync::Arc;
use tracing::info;

use crate::{Config, Provider};

/// Classifier and summarizer handles. Both usually point at the same model.
#[derive(Clone)]
pub struct Models {
    pub classifier: Arc<dyn IntentClassifier>,
    pub summarizer: Arc<dyn Summarizer>,
}

impl Models {
    pub fn from_model<T>(model: T) -> Self
    where
        T: IntentClassifier + Summarizer + 'static,
    {
        let model = Arc::new(model);
        Self {
            classifier: model.clone(),
            summarizer: model,
        }
    }
}

pub fn create_model(config: &Config) -> Result<Models> {
    let has_key = config
        .api_key
        .as_deref()
        .map(|key| !key.trim().is_empty())
        .unwrap_or(false);

    let provider = match config.provider {
        Provider::Auto if has_key => Provider::OpenAi,
        Provider::Auto => Provider::Keyword,
        other => other,
    };

    match provider {
        Provider::OpenAi => {
            let model = OpenAiModel::new(
                config.api_key.clone(),
                config.model_name.clone(),
                config.base_url.clone(),
                config.request_timeout,
            )?;
            info!(model = ?model, "Using OpenAI-compatible model");
            Ok(Models::from_model(model))
        }
        Provider::Keyword => {
            info!("Using keyword model");
            Ok(Models::from_model(KeywordModel::new()))
        }
        Provider::Auto => Err(Error::Inference("unresolved model provider".to_string())),
    }
}
