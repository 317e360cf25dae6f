use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nr_core::{Error, Extraction, IntentClassifier, Result, Summarizer};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

const EXTRACTION_PROMPT: &str = r#"You extract search intent from news queries.
Reply with a single JSON object and nothing else, using this shape:
{"entities": {"people": [], "orgs": [], "locations": []},
 "concepts": [],
 "intent": [{"type": "category|source|score|search|nearby", "confidence": 0.0}],
 "categories": [],
 "source_names": [],
 "radius_km": null}
List intents from most to least likely."#;

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    content: Option<String>,
}

/// Client for any OpenAI-compatible chat-completions endpoint.
pub struct OpenAiModel {
    client: Arc<Client>,
    api_key: String,
    model: String,
    base_url: String,
}

impl fmt::Debug for OpenAiModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiModel")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl OpenAiModel {
    pub fn new(
        api_key: Option<String>,
        model: Option<String>,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let api_key = api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| Error::Inference("OpenAI API key is required".to_string()))?;
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client: Arc::new(client),
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }

    async fn complete(&self, system: &str, user: String, json: bool) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user,
                },
            ],
            temperature: 0.0,
            response_format: json.then(|| ResponseFormat {
                kind: "json_object".to_string(),
            }),
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json::<ChatResponse>()
            .await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| Error::Inference("model returned no choices".to_string()))
    }
}

/// Parse a model reply into an extraction. Replies that are not a JSON
/// object, or that carry no intent, degrade to the default search intent.
pub fn parse_extraction(reply: &str) -> Extraction {
    let body = reply
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    match serde_json::from_str::<Extraction>(body) {
        Ok(mut extraction) => {
            if extraction.intents.is_empty() {
                extraction.intents = Extraction::default_search().intents;
            }
            extraction
        }
        Err(e) => {
            warn!(error = %e, "Unparseable extraction reply, falling back to search");
            Extraction::default_search()
        }
    }
}

#[async_trait]
impl IntentClassifier for OpenAiModel {
    fn name(&self) -> &str {
        "OpenAI"
    }

    async fn extract(&self, query: &str) -> Result<Extraction> {
        let reply = self
            .complete(EXTRACTION_PROMPT, query.to_string(), true)
            .await?;
        let extraction = parse_extraction(&reply);
        debug!(query, intent = extraction.intent_label(), "Model extraction");
        Ok(extraction)
    }
}

#[async_trait]
impl Summarizer for OpenAiModel {
    async fn summarize(
        &self,
        title: &str,
        description: Option<&str>,
        source_name: &str,
        published_at: DateTime<Utc>,
    ) -> Result<String> {
        let prompt = format!(
            "Title: {}\nSource: {}\nPublished: {}\nDescription: {}",
            title,
            source_name,
            published_at.format("%Y-%m-%d"),
            description.unwrap_or("(none)")
        );
        let summary = self
            .complete(
                "Summarize the news article in two or three plain sentences.",
                prompt,
                false,
            )
            .await?;
        Ok(summary.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_requires_api_key() {
        let result = OpenAiModel::new(None, None, None, Duration::from_secs(5));
        assert_eq!(
            result.unwrap_err().to_string(),
            "Inference error: OpenAI API key is required"
        );
        assert!(OpenAiModel::new(Some("  ".into()), None, None, Duration::from_secs(5)).is_err());

        let model = OpenAiModel::new(
            Some("sk-test".into()),
            None,
            Some("http://localhost:8080/v1/".into()),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(model.base_url, "http://localhost:8080/v1");
        assert_eq!(model.model, DEFAULT_MODEL);
        assert!(!format!("{:?}", model).contains("sk-test"));
    }

    #[test]
    fn test_parse_fenced_reply() {
        let reply = "```json\n{\"intent\": [{\"type\": \"source\", \"confidence\": 0.95}], \"source_names\": [\"BBC\"]}\n```";
        let extraction = parse_extraction(reply);
        assert_eq!(extraction.intent_label(), "source");
        assert_eq!(extraction.sources, vec!["BBC"]);
    }

    #[test]
    fn test_parse_degrades_to_search() {
        assert_eq!(parse_extraction("I cannot help with that"), Extraction::default_search());

        let extraction = parse_extraction(r#"{"concepts": ["Quantum Computing"]}"#);
        assert_eq!(extraction.intent_label(), "search");
        assert_eq!(extraction.concepts, vec!["Quantum Computing"]);
    }
}
