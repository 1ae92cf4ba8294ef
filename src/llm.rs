//! Language model implementations and abstractions.
//!
//! A provider is constructed from a [`ModelProfile`], invoked with a single
//! [`Envelope`], and returns plain text. The profile owns the conversation
//! history; the orchestrator appends exactly one outgoing and one reply
//! entry per call. Providers are looked up by platform name so persisted
//! agents can rehydrate their binding.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{HiveError, Result};
use crate::message::{Envelope, Payload};

/// Provider-independent model settings plus the conversation history the
/// bound instance owns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelProfile {
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_supports_system_prompt")]
    pub supports_system_prompt: bool,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub chat_history: Vec<Envelope>,
}

fn default_temperature() -> f32 {
    0.1
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_supports_system_prompt() -> bool {
    true
}

impl Default for ModelProfile {
    fn default() -> Self {
        Self {
            model: String::new(),
            temperature: default_temperature(),
            api_key: String::new(),
            base_url: String::new(),
            max_tokens: default_max_tokens(),
            supports_system_prompt: default_supports_system_prompt(),
            system_prompt: String::new(),
            chat_history: Vec::new(),
        }
    }
}

/// Persisted form of a bound provider: the profile keyed by platform name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderRecord {
    pub platform: String,
    #[serde(flatten)]
    pub profile: ModelProfile,
}

/// Minimal abstraction around a chat provider.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn platform(&self) -> &'static str;
    fn profile(&self) -> &ModelProfile;
    fn profile_mut(&mut self) -> &mut ModelProfile;
    /// One completion call: the turn envelope on top of the owned history.
    async fn complete(&self, turn: &Envelope) -> Result<String>;
}

/// Platforms [`load_provider`] can rehydrate, in listing order.
pub fn list_providers() -> Vec<&'static str> {
    vec!["openai", "anthropic", "ollama"]
}

/// Resolve a provider by case-insensitive platform name.
pub fn load_provider(platform: &str, profile: ModelProfile) -> Result<Box<dyn LanguageModel>> {
    match platform.to_ascii_lowercase().as_str() {
        "openai" => Ok(Box::new(OpenAIClient::from_profile(profile)?)),
        "anthropic" => Ok(Box::new(AnthropicClient::from_profile(profile)?)),
        "ollama" => Ok(Box::new(OllamaClient::from_profile(profile))),
        "stub" => Ok(Box::new(StubModel::with_profile(Vec::new(), profile))),
        other => Err(HiveError::UnknownProvider(other.to_string())),
    }
}

/// A profile pre-filled with a platform's default model and endpoint.
pub fn default_profile(platform: &str) -> ModelProfile {
    let mut profile = ModelProfile::default();
    match platform.to_ascii_lowercase().as_str() {
        "openai" => {
            profile.model = "gpt-4o-mini".into();
            profile.base_url = "https://api.openai.com/v1".into();
        }
        "anthropic" => {
            profile.model = "claude-3-5-sonnet-latest".into();
            profile.base_url = "https://api.anthropic.com/v1".into();
        }
        "ollama" => {
            profile.model = "llama3.1".into();
            profile.base_url = "http://localhost:11434".into();
        }
        _ => {}
    }
    profile
}

fn coalesce_error(status: reqwest::StatusCode, body: &str, provider: &str) -> HiveError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return HiveError::LanguageModel(format!("{provider} rate limit exceeded: {body}"));
    }
    HiveError::LanguageModel(format!("{provider} request failed with {status}: {body}"))
}

fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|err| HiveError::LanguageModel(format!("http client error: {err}")))
}

/// Conversation roles are free-form (agent names address multi-agent
/// prompts); the wire only understands user/assistant/system.
fn wire_role(role: &str) -> &'static str {
    if role.eq_ignore_ascii_case("user") {
        "user"
    } else if role.eq_ignore_ascii_case("system") {
        "system"
    } else {
        "assistant"
    }
}

/// Read an image reference and inline it as (media type, base64 data).
async fn encode_image(reference: &str) -> Result<(String, String)> {
    let bytes = tokio::fs::read(reference).await.map_err(|err| {
        HiveError::LanguageModel(format!("failed to read image `{reference}`: {err}"))
    })?;
    let media_type = if reference.to_ascii_lowercase().ends_with(".jpg")
        || reference.to_ascii_lowercase().ends_with(".jpeg")
    {
        "image/jpeg"
    } else {
        "image/png"
    };
    let data = base64::engine::general_purpose::STANDARD.encode(bytes);
    Ok((media_type.to_string(), data))
}

// ─────────────────────────────────────────────────────────────────────────────
// OpenAI-compatible client
// ─────────────────────────────────────────────────────────────────────────────

/// Chat-completions client for the OpenAI API and compatible servers.
#[derive(Clone)]
pub struct OpenAIClient {
    http: reqwest::Client,
    profile: ModelProfile,
}

impl OpenAIClient {
    pub fn from_profile(mut profile: ModelProfile) -> Result<Self> {
        if profile.api_key.is_empty() {
            return Err(HiveError::LanguageModel(
                "missing OpenAI API key in model profile".into(),
            ));
        }
        if profile.model.is_empty() {
            profile.model = default_profile("openai").model;
        }
        if profile.base_url.is_empty() {
            profile.base_url = default_profile("openai").base_url;
        }
        Ok(Self {
            http: http_client(Duration::from_secs(120))?,
            profile,
        })
    }

    async fn to_messages(&self, turn: &Envelope) -> Result<Vec<Value>> {
        let mut messages = Vec::new();
        if !self.profile.system_prompt.is_empty() {
            let role = if self.profile.supports_system_prompt {
                "system"
            } else {
                "user"
            };
            messages.push(json!({"role": role, "content": self.profile.system_prompt}));
        }
        for envelope in self.profile.chat_history.iter().chain(std::iter::once(turn)) {
            let role = wire_role(&envelope.role);
            match &envelope.payload {
                Payload::Text { message } => {
                    messages.push(json!({"role": role, "content": message}));
                }
                Payload::Image { image } => {
                    let (media_type, data) = encode_image(image).await?;
                    messages.push(json!({
                        "role": role,
                        "content": [
                            {"type": "text", "text": "This is the result of the latest screenshot"},
                            {"type": "image_url", "image_url": {"url": format!("data:{media_type};base64,{data}")}}
                        ]
                    }));
                }
            }
        }
        Ok(messages)
    }
}

#[async_trait]
impl LanguageModel for OpenAIClient {
    fn platform(&self) -> &'static str {
        "openai"
    }

    fn profile(&self) -> &ModelProfile {
        &self.profile
    }

    fn profile_mut(&mut self) -> &mut ModelProfile {
        &mut self.profile
    }

    async fn complete(&self, turn: &Envelope) -> Result<String> {
        let payload = json!({
            "model": self.profile.model,
            "messages": self.to_messages(turn).await?,
            "temperature": self.profile.temperature,
            "max_tokens": self.profile.max_tokens,
        });

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.profile.base_url))
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {}", self.profile.api_key),
            )
            .json(&payload)
            .send()
            .await
            .map_err(|err| HiveError::LanguageModel(format!("OpenAI request error: {err}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(coalesce_error(status, &body, "openai"));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|err| HiveError::LanguageModel(format!("OpenAI response parse error: {err}")))?;

        body["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| HiveError::LanguageModel("OpenAI returned no message content".into()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Anthropic client
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    profile: ModelProfile,
}

impl AnthropicClient {
    pub fn from_profile(mut profile: ModelProfile) -> Result<Self> {
        if profile.api_key.is_empty() {
            return Err(HiveError::LanguageModel(
                "missing Anthropic API key in model profile".into(),
            ));
        }
        if profile.model.is_empty() {
            profile.model = default_profile("anthropic").model;
        }
        if profile.base_url.is_empty() {
            profile.base_url = default_profile("anthropic").base_url;
        }
        Ok(Self {
            http: http_client(Duration::from_secs(120))?,
            profile,
        })
    }

    async fn to_messages(&self, turn: &Envelope) -> Result<Vec<Value>> {
        let mut messages = Vec::new();
        if !self.profile.supports_system_prompt && !self.profile.system_prompt.is_empty() {
            messages.push(json!({
                "role": "user",
                "content": [{"type": "text", "text": self.profile.system_prompt}]
            }));
        }
        for envelope in self.profile.chat_history.iter().chain(std::iter::once(turn)) {
            let role = match wire_role(&envelope.role) {
                "user" => "user",
                _ => "assistant",
            };
            let content = match &envelope.payload {
                Payload::Text { message } => json!([{"type": "text", "text": message}]),
                Payload::Image { image } => {
                    let (media_type, data) = encode_image(image).await?;
                    json!([{
                        "type": "image",
                        "source": {"type": "base64", "media_type": media_type, "data": data}
                    }])
                }
            };
            messages.push(json!({"role": role, "content": content}));
        }
        Ok(messages)
    }
}

#[async_trait]
impl LanguageModel for AnthropicClient {
    fn platform(&self) -> &'static str {
        "anthropic"
    }

    fn profile(&self) -> &ModelProfile {
        &self.profile
    }

    fn profile_mut(&mut self) -> &mut ModelProfile {
        &mut self.profile
    }

    async fn complete(&self, turn: &Envelope) -> Result<String> {
        let system = if self.profile.supports_system_prompt && !self.profile.system_prompt.is_empty()
        {
            Some(self.profile.system_prompt.clone())
        } else {
            None
        };
        let payload = json!({
            "model": self.profile.model,
            "system": system,
            "messages": self.to_messages(turn).await?,
            "temperature": self.profile.temperature,
            "max_tokens": self.profile.max_tokens,
        });

        let resp = self
            .http
            .post(format!("{}/messages", self.profile.base_url))
            .header("x-api-key", &self.profile.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&payload)
            .send()
            .await
            .map_err(|err| HiveError::LanguageModel(format!("Anthropic request error: {err}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(coalesce_error(status, &body, "anthropic"));
        }

        let body: Value = resp.json().await.map_err(|err| {
            HiveError::LanguageModel(format!("Anthropic response parse error: {err}"))
        })?;

        let content = body["content"]
            .as_array()
            .map(|blocks| {
                blocks
                    .iter()
                    .filter_map(|block| block["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if content.is_empty() {
            return Err(HiveError::LanguageModel(
                "Anthropic returned no text content".into(),
            ));
        }
        Ok(content)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Ollama client (local inference)
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    profile: ModelProfile,
}

impl OllamaClient {
    pub fn from_profile(mut profile: ModelProfile) -> Self {
        if profile.model.is_empty() {
            profile.model = default_profile("ollama").model;
        }
        if profile.base_url.is_empty() {
            profile.base_url = default_profile("ollama").base_url;
        }
        Self {
            // Local models can be slow.
            http: http_client(Duration::from_secs(300)).expect("default http client"),
            profile,
        }
    }

    async fn to_messages(&self, turn: &Envelope) -> Result<Vec<Value>> {
        let mut messages = Vec::new();
        if !self.profile.system_prompt.is_empty() {
            let role = if self.profile.supports_system_prompt {
                "system"
            } else {
                "user"
            };
            messages.push(json!({"role": role, "content": self.profile.system_prompt}));
        }
        for envelope in self.profile.chat_history.iter().chain(std::iter::once(turn)) {
            let role = wire_role(&envelope.role);
            match &envelope.payload {
                Payload::Text { message } => {
                    messages.push(json!({"role": role, "content": message}));
                }
                Payload::Image { image } => {
                    let (_, data) = encode_image(image).await?;
                    messages.push(json!({
                        "role": role,
                        "content": "This is the result of the latest screenshot",
                        "images": [data]
                    }));
                }
            }
        }
        Ok(messages)
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    fn platform(&self) -> &'static str {
        "ollama"
    }

    fn profile(&self) -> &ModelProfile {
        &self.profile
    }

    fn profile_mut(&mut self) -> &mut ModelProfile {
        &mut self.profile
    }

    async fn complete(&self, turn: &Envelope) -> Result<String> {
        let payload = json!({
            "model": self.profile.model,
            "messages": self.to_messages(turn).await?,
            "options": {"temperature": self.profile.temperature, "num_predict": self.profile.max_tokens},
            "stream": false,
        });

        let resp = self
            .http
            .post(format!("{}/api/chat", self.profile.base_url))
            .json(&payload)
            .send()
            .await
            .map_err(|err| HiveError::LanguageModel(format!("Ollama request error: {err}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(coalesce_error(status, &body, "ollama"));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|err| HiveError::LanguageModel(format!("Ollama response parse error: {err}")))?;

        body["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| HiveError::LanguageModel("Ollama returned no message content".into()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stub model
// ─────────────────────────────────────────────────────────────────────────────

/// A deterministic model used for tests and demos: replies are scripted and
/// popped in order.
pub struct StubModel {
    profile: ModelProfile,
    responses: Mutex<VecDeque<String>>,
}

impl StubModel {
    pub fn new(responses: Vec<String>) -> Self {
        Self::with_profile(responses, ModelProfile::default())
    }

    pub fn with_profile(responses: Vec<String>, profile: ModelProfile) -> Self {
        Self {
            profile,
            responses: Mutex::new(responses.into()),
        }
    }

    pub fn scripted(responses: &[&str]) -> Box<dyn LanguageModel> {
        Box::new(Self::new(responses.iter().map(|s| s.to_string()).collect()))
    }
}

#[async_trait]
impl LanguageModel for StubModel {
    fn platform(&self) -> &'static str {
        "stub"
    }

    fn profile(&self) -> &ModelProfile {
        &self.profile
    }

    fn profile_mut(&mut self) -> &mut ModelProfile {
        &mut self.profile
    }

    async fn complete(&self, _turn: &Envelope) -> Result<String> {
        let mut locked = self.responses.lock().expect("stub model poisoned");
        locked.pop_front().ok_or_else(|| {
            HiveError::LanguageModel("StubModel ran out of scripted responses".into())
        })
    }
}
