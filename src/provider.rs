//! Chat backends.
//!
//! A [`ChatProvider`] takes an ordered list of `{role, content}` messages
//! and returns either the complete reply ([`ChatProvider::chat`]) or a
//! [`FragmentStream`] of incremental text ([`ChatProvider::chat_stream`]).
//!
//! | Config Value | Backend | Endpoint |
//! |--------------|---------|----------|
//! | `"ollama"` | [`OllamaProvider`] | `POST {url}/api/chat`, JSON lines |
//! | `"openai"` | [`OpenAiCompatibleProvider`] | `POST https://api.openai.com/v1/chat/completions`, SSE |
//! | `"groq"` | [`OpenAiCompatibleProvider`] | `POST https://api.groq.com/openai/v1/chat/completions`, SSE |
//!
//! # Cancellation
//!
//! A stream is fed by a background task through a bounded channel. Dropping
//! the [`FragmentStream`] closes the channel; the task notices on its next
//! send, stops reading, and drops the HTTP response, closing the connection.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::ChatConfig;
use crate::error::ChatError;
use crate::memory::ChatMessage;

/// Reply substituted when a backend answers with empty text.
pub const EMPTY_REPLY_FALLBACK: &str = "I apologize, but I couldn't generate a response.";

const STREAM_BUFFER: usize = 32;

/// Sampling options forwarded to the backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChatOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 8192,
        }
    }
}

impl ChatOptions {
    pub fn from_config(config: &ChatConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

/// Incremental reply text, pulled one fragment at a time.
pub struct FragmentStream {
    rx: mpsc::Receiver<Result<String, ChatError>>,
}

impl FragmentStream {
    pub(crate) fn from_receiver(rx: mpsc::Receiver<Result<String, ChatError>>) -> Self {
        Self { rx }
    }

    /// Next fragment, or `None` once the reply is complete.
    pub async fn next(&mut self) -> Option<Result<String, ChatError>> {
        self.rx.recv().await
    }

    /// Drain the stream into one string, stopping at the first error.
    pub async fn collect_text(mut self) -> Result<String, ChatError> {
        let mut out = String::new();
        while let Some(fragment) = self.next().await {
            out.push_str(&fragment?);
        }
        Ok(out)
    }
}

#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Backend name for logs and errors.
    fn name(&self) -> &'static str;

    /// Complete reply; empty replies become [`EMPTY_REPLY_FALLBACK`].
    async fn chat(&self, messages: &[ChatMessage], options: &ChatOptions)
        -> Result<String, ChatError>;

    /// Incremental reply. Errors before the first byte are returned here;
    /// later ones arrive through the stream.
    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<FragmentStream, ChatError>;
}

/// Build the backend named by `config.provider`.
pub fn create_provider(config: &ChatConfig) -> Result<Box<dyn ChatProvider>, ChatError> {
    let timeout = Duration::from_secs(config.timeout_secs);
    match config.provider.as_str() {
        "ollama" => Ok(Box::new(OllamaProvider::new(
            &config.model,
            config.url.as_deref(),
            timeout,
        )?)),
        "openai" => Ok(Box::new(OpenAiCompatibleProvider::from_env(
            OpenAiFlavor::OpenAi,
            &config.model,
            config.url.as_deref(),
            timeout,
        )?)),
        "groq" => Ok(Box::new(OpenAiCompatibleProvider::from_env(
            OpenAiFlavor::Groq,
            &config.model,
            config.url.as_deref(),
            timeout,
        )?)),
        other => Err(ChatError::Config(format!("unknown chat provider: {}", other))),
    }
}

fn non_empty_or_fallback(content: &str) -> String {
    if content.trim().is_empty() {
        EMPTY_REPLY_FALLBACK.to_string()
    } else {
        content.to_string()
    }
}

fn http_client() -> Result<reqwest::Client, ChatError> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| ChatError::Config(e.to_string()))
}

fn network_error(backend: &'static str, err: reqwest::Error) -> ChatError {
    ChatError::Network {
        backend,
        message: err.to_string(),
    }
}

/// Map a non-success HTTP status to a [`ChatError`].
fn status_error(backend: &'static str, status: StatusCode, body: String) -> ChatError {
    match status.as_u16() {
        401 | 403 => ChatError::InvalidApiKey(backend),
        429 => ChatError::RateLimited(backend),
        code => ChatError::Api {
            backend,
            status: code,
            body,
        },
    }
}

async fn send_checked(
    backend: &'static str,
    request: reqwest::RequestBuilder,
) -> Result<reqwest::Response, ChatError> {
    let response = request
        .send()
        .await
        .map_err(|e| network_error(backend, e))?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(backend, status, body))
}

/// What one line of a streamed reply means.
#[derive(Debug, PartialEq)]
enum LineEvent {
    Fragment(String),
    Skip,
    Done,
}

/// Split complete `\n`-terminated lines off the front of `buf`.
fn drain_lines(buf: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
        let line: Vec<u8> = buf.drain(..=pos).collect();
        let text = String::from_utf8_lossy(&line);
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            lines.push(trimmed.to_string());
        }
    }
    lines
}

fn idle_timeout_error(backend: &'static str, idle_timeout: Duration) -> ChatError {
    ChatError::Network {
        backend,
        message: format!("no data received for {}s", idle_timeout.as_secs_f32()),
    }
}

/// [`send_checked`] bounded to the wait for the response head. Body reads
/// are bounded per chunk by [`spawn_line_reader`].
async fn send_streaming(
    backend: &'static str,
    request: reqwest::RequestBuilder,
    idle_timeout: Duration,
) -> Result<reqwest::Response, ChatError> {
    tokio::time::timeout(idle_timeout, send_checked(backend, request))
        .await
        .map_err(|_| idle_timeout_error(backend, idle_timeout))?
}

/// Forward parsed lines of `response` into a [`FragmentStream`].
///
/// Each read waits at most `idle_timeout`; a stalled backend ends the
/// stream with a network error.
fn spawn_line_reader(
    backend: &'static str,
    mut response: reqwest::Response,
    idle_timeout: Duration,
    parse_line: fn(&'static str, &str) -> Result<LineEvent, ChatError>,
) -> FragmentStream {
    let (tx, rx) = mpsc::channel(STREAM_BUFFER);

    tokio::spawn(async move {
        let mut buf = Vec::new();
        loop {
            let chunk = match tokio::time::timeout(idle_timeout, response.chunk()).await {
                Ok(Ok(Some(chunk))) => chunk,
                Ok(Ok(None)) => break,
                Ok(Err(e)) => {
                    let _ = tx.send(Err(network_error(backend, e))).await;
                    return;
                }
                Err(_) => {
                    warn!(backend, "stream stalled, giving up");
                    let _ = tx.send(Err(idle_timeout_error(backend, idle_timeout))).await;
                    return;
                }
            };
            buf.extend_from_slice(&chunk);

            for line in drain_lines(&mut buf) {
                match parse_line(backend, &line) {
                    Ok(LineEvent::Fragment(text)) => {
                        if tx.send(Ok(text)).await.is_err() {
                            debug!(backend, "stream receiver dropped, cancelling");
                            return;
                        }
                    }
                    Ok(LineEvent::Skip) => {}
                    Ok(LineEvent::Done) => return,
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
            }
        }

        // A final line without a trailing newline.
        buf.push(b'\n');
        for line in drain_lines(&mut buf) {
            match parse_line(backend, &line) {
                Ok(LineEvent::Fragment(text)) => {
                    if tx.send(Ok(text)).await.is_err() {
                        return;
                    }
                }
                Ok(LineEvent::Skip) => {}
                Ok(LineEvent::Done) => return,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            }
        }
    });

    FragmentStream::from_receiver(rx)
}

// ============ Ollama ============

/// Ollama's `/api/chat` endpoint (default `http://localhost:11434`).
pub struct OllamaProvider {
    model: String,
    url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(model: &str, url: Option<&str>, timeout: Duration) -> Result<Self, ChatError> {
        Ok(Self {
            model: model.to_string(),
            url: url
                .unwrap_or("http://localhost:11434")
                .trim_end_matches('/')
                .to_string(),
            timeout,
            client: http_client()?,
        })
    }

    fn body(&self, messages: &[ChatMessage], options: &ChatOptions, stream: bool) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": stream,
            "options": {
                "temperature": options.temperature,
                "num_predict": options.max_tokens,
            },
        })
    }
}

fn parse_ollama_reply(json: &serde_json::Value) -> Result<String, ChatError> {
    match json.get("message") {
        Some(serde_json::Value::Object(message)) => {
            if let Some(content) = message.get("content").and_then(|c| c.as_str()) {
                return Ok(non_empty_or_fallback(content));
            }
        }
        Some(serde_json::Value::String(message)) => return Ok(non_empty_or_fallback(message)),
        _ => {}
    }
    if let Some(response) = json.get("response").and_then(|r| r.as_str()) {
        return Ok(non_empty_or_fallback(response));
    }
    warn!(body = %json, "unexpected Ollama response structure");
    Err(ChatError::InvalidResponse {
        backend: "Ollama",
        message: "no message content in response".to_string(),
    })
}

fn parse_ollama_line(backend: &'static str, line: &str) -> Result<LineEvent, ChatError> {
    let json: serde_json::Value =
        serde_json::from_str(line).map_err(|e| ChatError::InvalidResponse {
            backend,
            message: e.to_string(),
        })?;
    if let Some(error) = json.get("error").and_then(|e| e.as_str()) {
        return Err(ChatError::InvalidResponse {
            backend,
            message: error.to_string(),
        });
    }
    let content = json
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .or_else(|| json.get("response").and_then(|r| r.as_str()));
    match content {
        Some(text) if !text.is_empty() => Ok(LineEvent::Fragment(text.to_string())),
        _ if json.get("done").and_then(|d| d.as_bool()) == Some(true) => Ok(LineEvent::Done),
        _ => Ok(LineEvent::Skip),
    }
}

#[async_trait]
impl ChatProvider for OllamaProvider {
    fn name(&self) -> &'static str {
        "Ollama"
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<String, ChatError> {
        let request = self
            .client
            .post(format!("{}/api/chat", self.url))
            .timeout(self.timeout)
            .json(&self.body(messages, options, false));
        let response = send_checked(self.name(), request).await?;
        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ChatError::InvalidResponse {
                backend: "Ollama",
                message: e.to_string(),
            })?;
        parse_ollama_reply(&json)
    }

    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<FragmentStream, ChatError> {
        let request = self
            .client
            .post(format!("{}/api/chat", self.url))
            .json(&self.body(messages, options, true));
        let response = send_streaming(self.name(), request, self.timeout).await?;
        Ok(spawn_line_reader(
            self.name(),
            response,
            self.timeout,
            parse_ollama_line,
        ))
    }
}

// ============ OpenAI-compatible ============

/// Hosted backends speaking the OpenAI chat-completions protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAiFlavor {
    OpenAi,
    Groq,
}

impl OpenAiFlavor {
    fn name(self) -> &'static str {
        match self {
            OpenAiFlavor::OpenAi => "OpenAI",
            OpenAiFlavor::Groq => "Groq",
        }
    }

    fn default_base_url(self) -> &'static str {
        match self {
            OpenAiFlavor::OpenAi => "https://api.openai.com/v1",
            OpenAiFlavor::Groq => "https://api.groq.com/openai/v1",
        }
    }

    fn api_key_var(self) -> &'static str {
        match self {
            OpenAiFlavor::OpenAi => "OPENAI_API_KEY",
            OpenAiFlavor::Groq => "GROQ_API_KEY",
        }
    }
}

pub struct OpenAiCompatibleProvider {
    flavor: OpenAiFlavor,
    model: String,
    base_url: String,
    api_key: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(
        flavor: OpenAiFlavor,
        model: &str,
        api_key: &str,
        base_url: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, ChatError> {
        Ok(Self {
            flavor,
            model: model.to_string(),
            base_url: base_url
                .unwrap_or(flavor.default_base_url())
                .trim_end_matches('/')
                .to_string(),
            api_key: api_key.to_string(),
            timeout,
            client: http_client()?,
        })
    }

    /// Construct with the key from `OPENAI_API_KEY` or `GROQ_API_KEY`.
    pub fn from_env(
        flavor: OpenAiFlavor,
        model: &str,
        base_url: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, ChatError> {
        let api_key = std::env::var(flavor.api_key_var())
            .map_err(|_| ChatError::Config(format!("{} is not set", flavor.api_key_var())))?;
        Self::new(flavor, model, &api_key, base_url, timeout)
    }

    fn request(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
        stream: bool,
    ) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "model": self.model,
                "messages": messages,
                "stream": stream,
                "temperature": options.temperature,
                "max_tokens": options.max_tokens,
            }))
    }
}

fn parse_completion(backend: &'static str, json: &serde_json::Value) -> Result<String, ChatError> {
    let choice = json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| ChatError::InvalidResponse {
            backend,
            message: "empty response".to_string(),
        })?;
    let message = choice
        .get("message")
        .ok_or_else(|| ChatError::InvalidResponse {
            backend,
            message: "no message in response".to_string(),
        })?;
    let content = message
        .get("content")
        .and_then(|c| c.as_str())
        .unwrap_or_default();
    Ok(non_empty_or_fallback(content))
}

fn parse_sse_line(backend: &'static str, line: &str) -> Result<LineEvent, ChatError> {
    let Some(data) = line.strip_prefix("data:") else {
        // Comments, `event:` and `id:` fields
        return Ok(LineEvent::Skip);
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(LineEvent::Done);
    }
    let json: serde_json::Value =
        serde_json::from_str(data).map_err(|e| ChatError::InvalidResponse {
            backend,
            message: e.to_string(),
        })?;
    let content = json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("content"))
        .and_then(|c| c.as_str());
    match content {
        Some(text) if !text.is_empty() => Ok(LineEvent::Fragment(text.to_string())),
        _ => Ok(LineEvent::Skip),
    }
}

#[async_trait]
impl ChatProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &'static str {
        self.flavor.name()
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<String, ChatError> {
        let request = self.request(messages, options, false).timeout(self.timeout);
        let response = send_checked(self.name(), request).await?;
        let json: serde_json::Value =
            response
                .json()
                .await
                .map_err(|e| ChatError::InvalidResponse {
                    backend: self.name(),
                    message: e.to_string(),
                })?;
        parse_completion(self.name(), &json)
    }

    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<FragmentStream, ChatError> {
        let request = self.request(messages, options, true);
        let response = send_streaming(self.name(), request, self.timeout).await?;
        Ok(spawn_line_reader(
            self.name(),
            response,
            self.timeout,
            parse_sse_line,
        ))
    }
}
