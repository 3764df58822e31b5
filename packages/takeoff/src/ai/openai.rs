//! OpenAI implementation of the AI and Extractor traits.
//!
//! Chat completions for paraphrasing and clustering, the embeddings endpoint
//! for semantic retrieval, and vision chat for reading drawing pages.
//!
//! # Example
//!
//! ```rust,ignore
//! use takeoff::ai::OpenAI;
//!
//! let ai = OpenAI::new("sk-...").with_model("gpt-4o");
//! let embedding = ai.embed("RCP specifications").await?;
//! ```

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, TakeoffError};
use crate::pipeline::{
    dedup::{parse_cluster_response, strip_code_fence},
    extract::parse_extraction_response,
    prompts::{format_cluster_prompt, format_expand_query_prompt, EXTRACT_SYSTEM_PROMPT},
};
use crate::security::{ApiKeys, SecretString};
use crate::traits::{
    ai::{ItemCluster, AI},
    extractor::Extractor,
};
use crate::types::{
    item::CandidateItem,
    page::{PageExtraction, PageImage},
};

const PARAPHRASE_SYSTEM_PROMPT: &str =
    "You rewrite search queries over construction standards. Answer with JSON only.";

const CLUSTER_SYSTEM_PROMPT: &str =
    "You reconcile duplicate detections in utility takeoffs. Answer with JSON only.";

/// OpenAI-based AI implementation.
///
/// Uses gpt-4o for chat and vision and text-embedding-3-small for embeddings.
#[derive(Clone)]
pub struct OpenAI {
    client: Client,
    api_key: SecretString,
    model: String,
    embedding_model: String,
    base_url: String,
}

impl OpenAI {
    pub fn new(api_key: impl Into<SecretString>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: "gpt-4o".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }

    /// Create from `OPENAI_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let keys = ApiKeys::from_env();
        Ok(Self::new(keys.require_openai()?.clone()))
    }

    /// Set the chat and vision model (default: gpt-4o).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the embedding model (default: text-embedding-3-small).
    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    /// Set a custom base URL (for Azure, proxies, etc.).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Chat completion with a system prompt and one user message.
    async fn chat(&self, system: &str, user: MessageContent) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: MessageContent::Text(system.to_string()),
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: 0.0,
            max_tokens: 4096,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", self.api_key.bearer())
            .json(&request)
            .send()
            .await
            .map_err(ai_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(TakeoffError::AI(
                format!("OpenAI API error {status}: {error_text}").into(),
            ));
        }

        let chat_response: ChatResponse = response.json().await.map_err(ai_error)?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| TakeoffError::AI("No response from OpenAI".into()))
    }

    /// Embeddings for a batch of inputs, in input order.
    async fn embed_inputs(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: &self.embedding_model,
            input: inputs,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", self.api_key.bearer())
            .json(&request)
            .send()
            .await
            .map_err(ai_error)?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(TakeoffError::AI(
                format!("OpenAI embedding error: {error_text}").into(),
            ));
        }

        let mut parsed: EmbeddingResponse = response.json().await.map_err(ai_error)?;
        if parsed.data.len() != inputs.len() {
            return Err(TakeoffError::AI(
                format!(
                    "OpenAI returned {} embeddings for {} inputs",
                    parsed.data.len(),
                    inputs.len()
                )
                .into(),
            ));
        }
        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

fn ai_error(e: reqwest::Error) -> TakeoffError {
    TakeoffError::AI(Box::new(e))
}

/// Parse a paraphrase answer: a JSON array of strings, optionally fenced.
fn parse_paraphrases(text: &str, n: usize) -> Result<Vec<String>> {
    let mut paraphrases: Vec<String> = serde_json::from_str(strip_code_fence(text))?;
    paraphrases.retain(|p| !p.trim().is_empty());
    paraphrases.truncate(n);
    Ok(paraphrases)
}

/// `data:` URL for an image payload.
fn data_url(page: &PageImage) -> String {
    format!("data:{};base64,{}", page.media_type, STANDARD.encode(&page.bytes))
}

#[async_trait]
impl AI for OpenAI {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_inputs(&[text])
            .await?
            .pop()
            .ok_or_else(|| TakeoffError::AI("No embedding from OpenAI".into()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.embed_inputs(texts).await
    }

    async fn expand_query(&self, query: &str, n: usize) -> Result<Vec<String>> {
        let prompt = format_expand_query_prompt(query, n);
        let response = self
            .chat(PARAPHRASE_SYSTEM_PROMPT, MessageContent::Text(prompt))
            .await?;
        parse_paraphrases(&response, n)
    }

    async fn cluster_items(&self, items: &[CandidateItem]) -> Result<Vec<ItemCluster>> {
        let prompt = format_cluster_prompt(items);
        let response = self
            .chat(CLUSTER_SYSTEM_PROMPT, MessageContent::Text(prompt))
            .await?;
        Ok(parse_cluster_response(&response)?)
    }
}

#[async_trait]
impl Extractor for OpenAI {
    async fn extract(&self, page: &PageImage, instruction: &str) -> Result<PageExtraction> {
        let content = MessageContent::Parts(vec![
            ContentPart::Text {
                text: instruction.to_string(),
            },
            ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: data_url(page),
                    detail: "high",
                },
            },
        ]);

        let response = self.chat(EXTRACT_SYSTEM_PROMPT, content).await?;
        let extraction = parse_extraction_response(&response)?;
        debug!(page = page.page_number, items = extraction.len(), "Vision extraction parsed");
        Ok(extraction)
    }
}

// Request/Response types

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: MessageContent,
}

#[derive(Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
    detail: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_builder() {
        let ai = OpenAI::new("sk-test")
            .with_model("gpt-4o-mini")
            .with_embedding_model("text-embedding-3-large")
            .with_base_url("https://custom.api.com/");

        assert_eq!(ai.model, "gpt-4o-mini");
        assert_eq!(ai.embedding_model, "text-embedding-3-large");
        assert_eq!(ai.base_url, "https://custom.api.com");
    }

    #[test]
    fn test_vision_message_shape() {
        let page = PageImage::new(3, vec![1, 2, 3]);
        let content = MessageContent::Parts(vec![
            ContentPart::Text {
                text: "read it".into(),
            },
            ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: data_url(&page),
                    detail: "high",
                },
            },
        ]);
        let json = serde_json::to_value(&content).unwrap();
        assert_eq!(json[0]["type"], "text");
        assert_eq!(json[1]["type"], "image_url");
        assert_eq!(json[1]["image_url"]["url"], "data:image/png;base64,AQID");
    }

    #[test]
    fn test_parse_paraphrases() {
        let text = "```json\n[\"reinforced concrete pipe standard\", \"\", \"RCP class\", \"x\"]\n```";
        let parsed = parse_paraphrases(text, 2).unwrap();
        assert_eq!(parsed, vec!["reinforced concrete pipe standard", "RCP class"]);
        assert!(parse_paraphrases("no json here", 3).is_err());
    }
}
