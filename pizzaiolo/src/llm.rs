//! LLM providers for question rewriting and answer generation
//!
//! Two backends: a local Ollama server and the Together AI cloud endpoint
//! (OpenAI-compatible chat completions). Both sit behind [`ModelProvider`]
//! so the pipeline can toggle per request.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Default Ollama base URL
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Default local model served by Ollama
pub const DEFAULT_LOCAL_MODEL: &str = "llama3.2";

/// Together AI OpenAI-compatible API base
pub const TOGETHER_BASE_URL: &str = "https://api.together.xyz/v1";

/// Default Together AI model when `TOGETHER_MODEL` is unset
pub const DEFAULT_CLOUD_MODEL: &str = "meta-llama/Llama-3.3-70B-Instruct-Turbo-Free";

const TEMPERATURE: f32 = 0.7;
const MAX_TOKENS: u32 = 256;

/// Errors from LLM providers
#[derive(Debug, Error)]
pub enum LlmError {
    /// The HTTP request never produced a response
    #[error("Could not reach {provider} at {url}. Make sure the endpoint is up and the model is available")]
    Connection {
        provider: &'static str,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The provider answered with a non-success status
    #[error("{provider} returned status {status}")]
    Status { provider: &'static str, status: u16 },

    /// The response body did not contain the expected fields
    #[error("Malformed response from {provider}")]
    MalformedResponse { provider: &'static str },

    /// Cloud generation requested without credentials
    #[error("TOGETHER_API_KEY is not set")]
    MissingApiKey,
}

/// A text-generation backend
pub trait ModelProvider: Send + Sync {
    /// Short provider name for logs
    fn name(&self) -> &'static str;

    /// Generate a completion for the prompt
    fn generate<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String, LlmError>>;
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    options: OllamaOptions,
    stream: bool,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

/// Local model served by an Ollama instance
pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaProvider {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
        }
    }
}

impl Default for OllamaProvider {
    fn default() -> Self {
        Self::new(DEFAULT_OLLAMA_URL, DEFAULT_LOCAL_MODEL)
    }
}

impl ModelProvider for OllamaProvider {
    fn name(&self) -> &'static str {
        "ollama"
    }

    fn generate<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String, LlmError>> {
        Box::pin(async move {
            let url = format!("{}/api/generate", self.base_url);
            debug!(model = %self.model, url = %url, "requesting completion from local model");

            let response = self
                .client
                .post(&url)
                .json(&OllamaRequest {
                    model: &self.model,
                    prompt,
                    options: OllamaOptions {
                        temperature: TEMPERATURE,
                        num_predict: MAX_TOKENS,
                    },
                    stream: false,
                })
                .send()
                .await
                .map_err(|source| LlmError::Connection {
                    provider: "ollama",
                    url,
                    source,
                })?;

            if !response.status().is_success() {
                return Err(LlmError::Status {
                    provider: "ollama",
                    status: response.status().as_u16(),
                });
            }

            let body: OllamaResponse = response
                .json()
                .await
                .map_err(|_| LlmError::MalformedResponse { provider: "ollama" })?;

            Ok(body.response.trim().to_string())
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// Together AI cloud model over the OpenAI-compatible chat API
pub struct TogetherProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl TogetherProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// Build from `TOGETHER_API_KEY` and `TOGETHER_MODEL`
    pub fn from_env() -> Result<Self, LlmError> {
        let api_key = std::env::var("TOGETHER_API_KEY").map_err(|_| LlmError::MissingApiKey)?;
        let model =
            std::env::var("TOGETHER_MODEL").unwrap_or_else(|_| DEFAULT_CLOUD_MODEL.to_string());
        Ok(Self::new(TOGETHER_BASE_URL, api_key, model))
    }
}

impl ModelProvider for TogetherProvider {
    fn name(&self) -> &'static str {
        "together"
    }

    fn generate<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String, LlmError>> {
        Box::pin(async move {
            let url = format!("{}/chat/completions", self.base_url);
            debug!(model = %self.model, "requesting completion from cloud model");

            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&ChatRequest {
                    model: &self.model,
                    messages: vec![ChatMessage {
                        role: "user",
                        content: prompt,
                    }],
                    temperature: TEMPERATURE,
                    max_tokens: MAX_TOKENS,
                })
                .send()
                .await
                .map_err(|source| LlmError::Connection {
                    provider: "together",
                    url,
                    source,
                })?;

            if !response.status().is_success() {
                return Err(LlmError::Status {
                    provider: "together",
                    status: response.status().as_u16(),
                });
            }

            let body: ChatResponse = response
                .json()
                .await
                .map_err(|_| LlmError::MalformedResponse { provider: "together" })?;

            let choice = body
                .choices
                .into_iter()
                .next()
                .ok_or(LlmError::MalformedResponse { provider: "together" })?;

            Ok(choice.message.content.trim().to_string())
        })
    }
}
