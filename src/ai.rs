//! Boundary to the natural-language categorization service. The service
//! receives one product guess per line and must answer with a JSON array of
//! `{article, quantity, category}` objects. Anything else (transport
//! failure, non-array JSON, a missing required field) is a single
//! `ParsingFailed` for the whole call; no partial results are assumed.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::CATEGORIES;

/// One parsed entry as returned by the service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AiItem {
    pub article: String,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
    pub category: String,
}

fn default_quantity() -> i64 {
    1
}

#[async_trait]
pub trait AiParser: Send + Sync {
    /// Parse free text (one product guess per line) into entries. The
    /// result is expected to be index-aligned with the input lines, but
    /// callers must not rely on the counts matching.
    async fn parse_items(&self, text: &str) -> Result<Vec<AiItem>>;
}

/// Client for an OpenAI-compatible chat-completions endpoint.
#[derive(Clone)]
pub struct OpenAiClient {
    http: Client,
    base_url: Url,
    api_key: String,
    model: String,
}

impl fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl OpenAiClient {
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let base_url = Url::parse(&cfg.ai.endpoint).context("invalid ai.endpoint")?;
        Ok(Self::with_base_url(
            cfg.ai.api_key.clone(),
            cfg.ai.model.clone(),
            base_url,
        ))
    }

    pub fn with_base_url(api_key: String, model: String, base_url: Url) -> Self {
        let http = Client::builder()
            .user_agent("tg-groceries/0.1")
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            api_key,
            model,
        }
    }

    fn prompt() -> String {
        let categories = CATEGORIES
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "Tu es un assistant de courses. Pour chaque ligne reçue, corrige \
             l'orthographe du produit et choisis une catégorie parmi: {categories}. \
             Réponds uniquement avec un tableau JSON d'objets \
             {{\"article\", \"quantity\", \"category\"}}, un objet par ligne, \
             dans le même ordre que les lignes."
        )
    }
}

#[async_trait]
impl AiParser for OpenAiClient {
    async fn parse_items(&self, text: &str) -> Result<Vec<AiItem>> {
        let endpoint = self
            .base_url
            .join("v1/chat/completions")
            .map_err(|e| Error::ParsingFailed(format!("invalid AI endpoint: {e}")))?;
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": Self::prompt() },
                { "role": "user", "content": text },
            ],
            "temperature": 0,
        });

        let res = self
            .http
            .post(endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::ParsingFailed(format!("failed to reach AI service: {e}")))?;

        if res.status() == StatusCode::TOO_MANY_REQUESTS {
            warn!("rate limited by AI service");
            return Err(Error::ParsingFailed("received 429 from AI service".into()));
        }
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            warn!(%status, "AI service error: {body}");
            return Err(Error::ParsingFailed(format!("AI service error {status}")));
        }

        let payload: ChatResponse = res
            .json()
            .await
            .map_err(|e| Error::ParsingFailed(format!("invalid AI response JSON: {e}")))?;
        let content = payload
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::ParsingFailed("AI response has no choices".into()))?;

        let items = parse_items_json(&content)?;
        info!(count = items.len(), "AI categorized items");
        Ok(items)
    }
}

/// Parse the model's reply into entries. Tolerates a fenced ```json block
/// around the array, nothing else.
pub fn parse_items_json(content: &str) -> Result<Vec<AiItem>> {
    let trimmed = strip_code_fence(content.trim());
    let items: Vec<AiItem> = serde_json::from_str(trimmed)
        .map_err(|e| Error::ParsingFailed(format!("AI returned malformed items: {e}")))?;
    if items.iter().any(|i| i.article.trim().is_empty()) {
        return Err(Error::ParsingFailed("AI returned an entry without a name".into()));
    }
    Ok(items)
}

fn strip_code_fence(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.trim_start_matches(['\r', '\n'])
        .strip_suffix("```")
        .map(str::trim_end)
        .unwrap_or(s)
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}
