//! Chat completion client
//!
//! Provides:
//! - A provider-agnostic [`ChatModel`] trait used for summaries, routing,
//!   answers and grading
//! - An OpenAI-compatible HTTP client with exponential backoff on
//!   transient failures
//! - A scripted mock for tests and offline runs

use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use crate::metrics::record_llm;
use crate::retry::{default_policy, retry_transient};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// A single-turn chat request
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub system: Option<String>,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Ask the provider for a JSON object reply
    pub json_mode: bool,
}

impl ChatRequest {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            system: None,
            user: user.into(),
            temperature: 0.0,
            max_tokens: 500,
            json_mode: false,
        }
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }
}

/// Trait for chat completion providers
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Return the trimmed text of the first choice
    async fn complete(&self, request: &ChatRequest) -> Result<String>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Deserialize)]
struct WireChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireChoiceMessage,
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

/// OpenAI-compatible chat client
pub struct OpenAIChat {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    max_retries: u32,
}

impl OpenAIChat {
    pub fn new(config: &LlmConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        let base = config
            .api_base
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            endpoint: format!("{}/chat/completions", base.trim_end_matches('/')),
            max_retries: config.max_retries.max(1),
        })
    }

    async fn send(&self, request: &ChatRequest) -> Result<String> {
        let mut messages = Vec::with_capacity(2);
        if let Some(ref system) = request.system {
            messages.push(WireMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(WireMessage {
            role: "user",
            content: &request.user,
        });

        let body = WireRequest {
            model: &self.model,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: request.json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::LlmError {
                message: format!("API error {}: {}", status, text),
                status: Some(status.as_u16()),
            });
        }

        let parsed: WireResponse = response
            .json()
            .await
            .map_err(|e| AppError::llm(format!("Failed to parse response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| AppError::llm("Empty response from language model"))
    }
}

#[async_trait]
impl ChatModel for OpenAIChat {
    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        let started = Instant::now();
        let result = retry_transient("chat", default_policy(), self.max_retries, || self.send(request)).await;
        record_llm(started.elapsed().as_secs_f64(), &self.model, result.is_ok());
        result
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

type Responder = dyn Fn(&ChatRequest) -> Result<String> + Send + Sync;

/// Mock chat model for testing
///
/// Replies are served from a queue first; when the queue is empty the
/// responder is used. Every request is recorded.
pub struct MockChatModel {
    queue: Mutex<VecDeque<Result<String>>>,
    responder: Box<Responder>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockChatModel {
    /// Mock that answers every request with the same text
    pub fn constant(reply: impl Into<String>) -> Self {
        let reply = reply.into();
        Self::from_fn(move |_| Ok(reply.clone()))
    }

    /// Mock that computes its reply from the request
    pub fn from_fn<F>(responder: F) -> Self
    where
        F: Fn(&ChatRequest) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            queue: Mutex::new(VecDeque::new()),
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Mock that fails every request
    pub fn failing(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::from_fn(move |_| Err(AppError::llm(message.clone())))
    }

    /// Queue a reply served before the responder
    pub fn push_reply(&self, reply: impl Into<String>) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_back(Ok(reply.into()));
        }
    }

    /// Queue a failure served before the responder
    pub fn push_error(&self, message: impl Into<String>) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_back(Err(AppError::llm(message.into())));
        }
    }

    /// Requests seen so far
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }
}

#[async_trait]
impl ChatModel for MockChatModel {
    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        let queued = self.queue.lock().ok().and_then(|mut q| q.pop_front());
        match queued {
            Some(reply) => reply,
            None => (self.responder)(request),
        }
    }

    fn model_name(&self) -> &str {
        "mock-chat"
    }
}

/// Offline reply: echoes the start of the prompt so output stays traceable
fn offline_reply(request: &ChatRequest) -> Result<String> {
    let preview: String = request.user.chars().take(200).collect();
    Ok(format!(
        "[Mock response - language model not configured] {}",
        preview.trim()
    ))
}

/// Create a chat model based on configuration
pub fn create_chat_model(config: &LlmConfig) -> Result<Arc<dyn ChatModel>> {
    match config.provider.as_str() {
        "openai" => {
            let key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
                message: "OpenAI API key required for the chat model".to_string(),
            })?;
            Ok(Arc::new(OpenAIChat::new(config, key)?))
        }
        "mock" => Ok(Arc::new(MockChatModel::from_fn(offline_reply))),
        other => Err(AppError::Configuration {
            message: format!("Unknown chat provider: {}", other),
        }),
    }
}
