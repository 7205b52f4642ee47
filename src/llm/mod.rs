//! Completion and embedding clients.
//!
//! The reviewer and the test generator only see the [`CompletionModel`] and
//! [`Embedder`] traits; [`OpenAiClient`] speaks any OpenAI-compatible API:
//! - POST {endpoint}/v1/chat/completions
//! - POST {endpoint}/v1/embeddings

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

use crate::config::LlmConfig;

const SNIPPET_LEN: usize = 300;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("LLM endpoint {url} returned {status}: {snippet}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
        snippet: String,
    },

    #[error("LLM API key not found in config or OPENAI_API_KEY")]
    MissingApiKey,

    #[error("Invalid LLM endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Completion response contained no choices")]
    EmptyChoices,

    #[error("Expected {expected} embeddings, got {got}")]
    EmbeddingCount { expected: usize, got: usize },
}

/// A model that turns a prompt into free text.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, LlmError>;
}

/// A model that maps texts to vectors, one per input, in order.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError>;
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// Client for an OpenAI-compatible REST API.
#[derive(Debug)]
pub struct OpenAiClient {
    client: reqwest::Client,
    cfg: LlmConfig,
    url_chat: String,
    url_embeddings: String,
}

impl OpenAiClient {
    pub fn new(cfg: LlmConfig) -> Result<Self, LlmError> {
        let api_key = cfg.api_key.clone().ok_or(LlmError::MissingApiKey)?;

        let endpoint = cfg.endpoint.trim();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(LlmError::InvalidEndpoint(cfg.endpoint.clone()));
        }

        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|_| LlmError::MissingApiKey)?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .default_headers(headers)
            .build()?;

        let base = endpoint.trim_end_matches('/');
        let url_chat = format!("{base}/v1/chat/completions");
        let url_embeddings = format!("{base}/v1/embeddings");

        debug!(model = %cfg.model, endpoint = %base, "LLM client initialized");

        Ok(Self {
            client,
            cfg,
            url_chat,
            url_embeddings,
        })
    }

    async fn post<B: Serialize + ?Sized, R: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<R, LlmError> {
        let started = Instant::now();
        let resp = self.client.post(url).json(body).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            let snippet = make_snippet(&text);
            error!(%status, %url, %snippet, latency_ms = started.elapsed().as_millis(), "LLM request returned non-success status");
            return Err(LlmError::Status {
                status,
                url: url.to_string(),
                snippet,
            });
        }

        let out = resp.json::<R>().await?;
        debug!(%url, latency_ms = started.elapsed().as_millis(), "LLM request complete");
        Ok(out)
    }
}

#[async_trait]
impl CompletionModel for OpenAiClient {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        let body = ChatRequest {
            model: &self.cfg.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.cfg.temperature,
            max_tokens: self.cfg.max_tokens,
        };
        debug!(prompt_len = prompt.len(), "requesting completion");

        let out: ChatResponse = self.post(&self.url_chat, &body).await?;
        out.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(LlmError::EmptyChoices)
    }
}

#[async_trait]
impl Embedder for OpenAiClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = EmbeddingRequest {
            model: &self.cfg.embedding_model,
            input: texts,
        };
        let mut out: EmbeddingResponse = self.post(&self.url_embeddings, &body).await?;
        if out.data.len() != texts.len() {
            return Err(LlmError::EmbeddingCount {
                expected: texts.len(),
                got: out.data.len(),
            });
        }
        out.data.sort_by_key(|d| d.index);
        Ok(out.data.into_iter().map(|d| d.embedding).collect())
    }
}

/// First few hundred characters of an error body, on one line.
fn make_snippet(text: &str) -> String {
    let one_line = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match one_line.char_indices().nth(SNIPPET_LEN) {
        Some((idx, _)) => format!("{}…", &one_line[..idx]),
        None => one_line,
    }
}
