//! Answer generation through an external generative model.
//!
//! Defines the [`Generator`] trait and its implementations:
//! - **[`DisabledGenerator`]** — always fails; used when no provider is configured.
//! - **[`GeminiGenerator`]** — calls the Gemini `generateContent` REST endpoint.
//! - **[`OpenAiGenerator`]** — calls an OpenAI-compatible `/chat/completions` endpoint.
//!
//! Use [`create_generator`] to build the configured one. Calls are never
//! retried. A failed call does not abort a chat turn: [`answer`] turns the
//! error into the reply text so the conversation keeps a record of it.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{LlmConfig, LlmProvider};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Reply used by the prompt when the context has no answer.
pub const NO_ANSWER_SENTENCE: &str =
    "Based on the provided documents, I cannot find information about this.";

/// A text-completion backend: one prompt in, one reply out.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Model identifier (e.g. `"gemini-2.5-flash"`).
    fn model_name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Builds the generator selected by `[llm]`.
///
/// # Errors
///
/// Fails when the provider needs an API key and its environment variable
/// is not set, or when the HTTP client cannot be built.
pub fn create_generator(config: &LlmConfig) -> Result<Arc<dyn Generator>> {
    match config.provider {
        LlmProvider::Disabled => Ok(Arc::new(DisabledGenerator)),
        LlmProvider::Gemini => Ok(Arc::new(GeminiGenerator::new(config)?)),
        LlmProvider::OpenAi => Ok(Arc::new(OpenAiGenerator::new(config)?)),
    }
}

/// Composes the fixed question-answering prompt.
pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        r#"You are a helpful assistant analyzing documents. Use ONLY the following context to answer.
If the answer cannot be found in the context, say "{no_answer}"

Format your answer professionally using markdown with:
- Clear headings (## for main sections, ### for subsections)
- Bullet points for lists
- Bold for important terms
- Tables when comparing information
- Code blocks with language specification for technical content

Context:
{context}

Question: {question}

Provide a comprehensive, well-formatted answer:"#,
        no_answer = NO_ANSWER_SENTENCE,
        context = context,
        question = question,
    )
}

/// A generated reply, or the error message that replaced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub text: String,
    pub failed: bool,
}

/// Runs the generator, converting a failure into a readable reply.
pub async fn answer(generator: &dyn Generator, prompt: &str) -> Answer {
    match generator.generate(prompt).await {
        Ok(text) => {
            debug!(model = generator.model_name(), chars = text.len(), "generated reply");
            Answer {
                text,
                failed: false,
            }
        }
        Err(e) => {
            warn!(model = generator.model_name(), error = %e, "generation failed");
            Answer {
                text: format!("Error generating response: {}", e),
                failed: true,
            }
        }
    }
}

fn build_client(config: &LlmConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if let Some(secs) = config.timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    Ok(builder.build()?)
}

fn read_api_key(config: &LlmConfig) -> Result<String> {
    let var = config.key_env();
    match std::env::var(var) {
        Ok(key) if !key.is_empty() => Ok(key),
        _ => bail!("{} environment variable not set", var),
    }
}

fn required_model(config: &LlmConfig) -> Result<String> {
    config
        .model
        .clone()
        .filter(|m| !m.is_empty())
        .ok_or_else(|| anyhow::anyhow!("llm.model required for {:?} provider", config.provider))
}

// ============ Disabled ============

/// Generator used when `llm.provider = "disabled"`.
pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _prompt: &str) -> Result<String> {
        bail!("no generation provider is configured")
    }
}

// ============ Gemini ============

/// Calls `POST {base}/v1beta/models/{model}:generateContent`.
pub struct GeminiGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiGenerator {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config)?,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
            api_key: read_api_key(config)?,
            model: required_model(config)?,
        })
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let body = serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        });

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Gemini API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        parse_gemini_response(&json)
    }
}

/// Joins the text parts of the first candidate.
fn parse_gemini_response(json: &serde_json::Value) -> Result<String> {
    let parts = json
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array());

    let Some(parts) = parts else {
        if let Some(reason) = json
            .pointer("/promptFeedback/blockReason")
            .and_then(|r| r.as_str())
        {
            bail!("prompt was blocked: {}", reason);
        }
        bail!("Invalid Gemini response: missing candidate content");
    };

    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
        .collect();

    if text.is_empty() {
        bail!("Invalid Gemini response: candidate has no text");
    }
    Ok(text)
}

// ============ OpenAI-compatible ============

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatTurn<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatTurn<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

/// Calls `POST {base}/chat/completions` with a single user message.
pub struct OpenAiGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiGenerator {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config)?,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            api_key: read_api_key(config)?,
            model: required_model(config)?,
        })
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = if self.base_url.contains("/chat/completions") {
            self.base_url.clone()
        } else {
            format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
        };
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![ChatTurn {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("OpenAI API error {}: {}", status, body_text);
        }

        let completion: ChatCompletionResponse = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: no message content"))
    }
}
