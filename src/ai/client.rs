//! Multi-provider AI client that voices the simulated student.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::{AiConfig, ProviderKind};
use crate::knowledge::Emotion;
use crate::store::Message;

use super::{
    format_student_system_prompt, format_teaching_turn, StudentContext, StudentGenerator,
    StudentReply, TranscriptCompressor,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Retries after the first attempt for throttled or failing upstreams.
const MAX_RETRIES: u32 = 3;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Errors from AI client operations.
#[derive(Error, Debug)]
pub enum AiError {
    #[error("API key not configured (env: {0})")]
    MissingApiKey(String),
    #[error("API request failed: {0}")]
    RequestFailed(String),
    #[error("Failed to parse response: {0}")]
    ParseError(String),
    #[error("Student reply request timed out")]
    Timeout,
}

impl From<reqwest::Error> for AiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::RequestFailed(e.to_string())
        }
    }
}

fn build_http_client() -> Client {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Falling back to default HTTP client");
            Client::new()
        })
}

/// Throttling, request timeouts and server errors are worth another try.
fn should_retry(status: StatusCode, attempt: u32) -> bool {
    attempt < MAX_RETRIES
        && (status == StatusCode::TOO_MANY_REQUESTS
            || status == StatusCode::REQUEST_TIMEOUT
            || status.is_server_error())
}

/// 1s, 2s, 4s.
fn calculate_backoff(attempt: u32) -> Duration {
    Duration::from_secs(1 << attempt)
}

/// JSON schema for a student reply, in the OpenAPI subset Gemini accepts.
fn student_reply_schema() -> Value {
    let emotions: Vec<&str> = [
        Emotion::Excited,
        Emotion::Understanding,
        Emotion::Neutral,
        Emotion::Confused,
    ]
    .iter()
    .map(Emotion::as_str)
    .collect();

    json!({
        "type": "OBJECT",
        "properties": {
            "message": { "type": "STRING" },
            "emotion": { "type": "STRING", "enum": emotions },
            "understanding_delta": { "type": "NUMBER" }
        },
        "required": ["message", "emotion", "understanding_delta"]
    })
}

/// HTTP transport to the model behind the student.
///
/// One endpoint per provider; the request shape and reply location differ, the
/// retry policy does not.
#[derive(Debug, Clone)]
pub struct ProviderTransport {
    client: Client,
    kind: ProviderKind,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl ProviderTransport {
    #[must_use]
    pub fn new(config: &AiConfig, api_key: String) -> Self {
        Self {
            client: build_http_client(),
            kind: config.provider.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &ProviderKind {
        &self.kind
    }

    fn endpoint(&self) -> String {
        match self.kind {
            ProviderKind::Gemini => {
                format!("{}/models/{}:generateContent", self.base_url, self.model)
            }
            ProviderKind::Claude => format!("{}/v1/messages", self.base_url),
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.kind {
            ProviderKind::Gemini => request.header("x-goog-api-key", &self.api_key),
            ProviderKind::Claude => request
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION),
        }
    }

    /// Request body for one student turn. Gemini is constrained to the reply schema.
    fn request_body(&self, system: &str, user: &str) -> Value {
        match self.kind {
            ProviderKind::Gemini => json!({
                "contents": [{ "role": "user", "parts": [{ "text": user }] }],
                "systemInstruction": { "parts": [{ "text": system }] },
                "generationConfig": {
                    "maxOutputTokens": self.max_tokens,
                    "responseMimeType": "application/json",
                    "responseSchema": student_reply_schema()
                }
            }),
            ProviderKind::Claude => json!({
                "model": self.model,
                "max_tokens": self.max_tokens,
                "system": system,
                "messages": [{ "role": "user", "content": user }]
            }),
        }
    }

    /// Concatenated text parts of the first candidate.
    fn reply_text(&self, body: &Value) -> Option<String> {
        let parts = match self.kind {
            ProviderKind::Gemini => body["candidates"][0]["content"]["parts"].as_array()?,
            ProviderKind::Claude => body["content"].as_array()?,
        };
        let text: String = parts.iter().filter_map(|p| p["text"].as_str()).collect();
        (!text.is_empty()).then_some(text)
    }

    async fn post_with_retry(&self, body: &Value) -> Result<Value, AiError> {
        let url = self.endpoint();
        let mut attempt = 0;
        loop {
            let response = self.authorize(self.client.post(&url)).json(body).send().await?;

            let status = response.status();
            if status.is_success() {
                return response
                    .json()
                    .await
                    .map_err(|e| AiError::ParseError(e.to_string()));
            }

            if should_retry(status, attempt) {
                let backoff = calculate_backoff(attempt);
                tracing::warn!(
                    %status,
                    attempt,
                    ?backoff,
                    "Student reply request failed, retrying"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
                continue;
            }

            let text = response.text().await.unwrap_or_default();
            return Err(AiError::RequestFailed(format!("HTTP {status}: {text}")));
        }
    }

    /// Send one system/user exchange and return the model's raw text.
    ///
    /// # Errors
    ///
    /// Returns `AiError` on transport failure, a non-retryable status, or a
    /// response without text.
    pub async fn complete(&self, system: &str, user: &str) -> Result<String, AiError> {
        let body = self.post_with_retry(&self.request_body(system, user)).await?;
        self.reply_text(&body).ok_or_else(|| {
            AiError::ParseError(format!("No text in {:?} response", self.kind))
        })
    }
}

/// Client that generates student replies through the configured provider.
#[derive(Debug, Clone)]
pub struct AiClient {
    transport: ProviderTransport,
    config: AiConfig,
    compressor: TranscriptCompressor,
}

impl AiClient {
    #[must_use]
    pub fn new(transport: ProviderTransport, config: AiConfig) -> Self {
        Self {
            transport,
            config,
            compressor: TranscriptCompressor::default(),
        }
    }

    /// Create client from configuration, reading the API key from the environment.
    ///
    /// # Errors
    ///
    /// Returns `AiError::MissingApiKey` if the configured API key environment
    /// variable is not set.
    pub fn from_config(config: AiConfig) -> Result<Self, AiError> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| AiError::MissingApiKey(config.api_key_env.clone()))?;
        let transport = ProviderTransport::new(&config, api_key);
        Ok(Self::new(transport, config))
    }

    /// Replace the transcript compressor used for history.
    #[must_use]
    pub fn with_compressor(mut self, compressor: TranscriptCompressor) -> Self {
        self.compressor = compressor;
        self
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.config.model
    }

    #[must_use]
    pub fn provider_kind(&self) -> &ProviderKind {
        self.transport.kind()
    }

    fn build_prompts(
        &self,
        prompt: &str,
        context: &StudentContext,
        history: &[Message],
    ) -> (String, String) {
        let system = format_student_system_prompt(context);
        let transcript = self.compressor.compress(history);
        (system, format_teaching_turn(prompt, &transcript))
    }
}

#[async_trait]
impl StudentGenerator for AiClient {
    async fn generate(
        &self,
        prompt: &str,
        context: &StudentContext,
        history: &[Message],
    ) -> Result<StudentReply, AiError> {
        let (system, user) = self.build_prompts(prompt, context, history);
        tracing::debug!(
            model = %self.config.model,
            concept = %context.concept,
            history = history.len(),
            "Requesting student reply"
        );

        let text = self.transport.complete(&system, &user).await?;
        extract_reply(&text)
    }
}

/// Parse the first JSON object embedded in model output.
///
/// Each `{` is tried as the start of an object until one deserializes into `T`,
/// so prose or code fences around the object are skipped and braces inside
/// string values are left to the JSON parser.
///
/// # Errors
///
/// Returns `AiError::ParseError` if no JSON object is found or none parses.
pub fn extract_json<T: DeserializeOwned>(text: &str) -> Result<T, AiError> {
    let mut first_error = None;
    for (start, _) in text.match_indices('{') {
        match serde_json::Deserializer::from_str(&text[start..])
            .into_iter::<T>()
            .next()
        {
            Some(Ok(value)) => return Ok(value),
            Some(Err(e)) => {
                first_error.get_or_insert(e);
            }
            None => {}
        }
    }

    Err(match first_error {
        Some(e) => AiError::ParseError(format!("Failed to parse JSON: {e}")),
        None => AiError::ParseError(format!("No JSON object found in response: {text}")),
    })
}

/// Replies with an empty message are rejected so the caller can fall back.
fn extract_reply(text: &str) -> Result<StudentReply, AiError> {
    let reply: StudentReply = extract_json(text)?;
    if reply.message.trim().is_empty() {
        return Err(AiError::ParseError("Student reply was empty".to_string()));
    }
    Ok(reply)
}
