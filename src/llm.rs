//! Language model clients.
//!
//! [`LanguageModel`] is the seam between the answer pipeline and a
//! completion backend. Two backends are provided:
//!
//! - [`OllamaClient`]: `POST {url}/api/generate`, with NDJSON streaming.
//! - [`OpenAiClient`]: `POST {url}/chat/completions`; requires `OPENAI_API_KEY`.
//!
//! Streaming hands back a bounded [`mpsc::Receiver`]. Dropping the receiver
//! cancels the stream: the producer task notices the closed channel and stops
//! reading the response.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::LlmConfig;

const STREAM_BUFFER: usize = 32;

/// One event of a streamed completion.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Chunk(String),
    Done,
    Error(String),
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Generate the full completion for `prompt`.
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Stream the completion. The default sends the whole answer as one chunk.
    async fn stream(&self, prompt: &str) -> Result<mpsc::Receiver<StreamEvent>> {
        let text = self.complete(prompt).await?;
        let (tx, rx) = mpsc::channel(2);
        let _ = tx.send(StreamEvent::Chunk(text)).await;
        let _ = tx.send(StreamEvent::Done).await;
        Ok(rx)
    }
}

/// Build the client named by `config.provider`.
pub fn create_llm(config: &LlmConfig) -> Result<Arc<dyn LanguageModel>> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaClient::new(config)?)),
        "openai" => Ok(Arc::new(OpenAiClient::from_env(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

/// The client carries only connect and idle-read limits, so a stream may
/// run as long as chunks keep arriving. Whole-request deadlines are set
/// per request with [`reqwest::RequestBuilder::timeout`].
fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .connect_timeout(timeout)
        .read_timeout(timeout)
        .build()?)
}

// ============ Ollama ============

pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl OllamaClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        Ok(Self {
            http: http_client(timeout)?,
            base_url: config.base_url(),
            model: config.model.clone(),
            timeout,
        })
    }

    async fn generate(&self, prompt: &str, stream: bool) -> Result<reqwest::Response> {
        let url = format!("{}/api/generate", self.base_url);
        let mut request = self.http.post(&url).json(&json!({
            "model": self.model,
            "prompt": prompt,
            "stream": stream,
        }));
        if !stream {
            request = request.timeout(self.timeout);
        }
        request
            .send()
            .await
            .with_context(|| format!("Error connecting to Ollama at {}", self.base_url))?
            .error_for_status()
            .with_context(|| "Ollama returned an error status")
    }
}

/// One decoded NDJSON line of an Ollama generate stream.
#[derive(Debug, PartialEq)]
enum OllamaLine {
    Chunk { text: String, done: bool },
    Error(String),
    Malformed,
}

fn parse_ollama_line(line: &[u8]) -> OllamaLine {
    let value: serde_json::Value = match serde_json::from_slice(line) {
        Ok(v) => v,
        Err(_) => return OllamaLine::Malformed,
    };
    if let Some(err) = value.get("error").and_then(|e| e.as_str()) {
        return OllamaLine::Error(err.to_string());
    }
    OllamaLine::Chunk {
        text: value
            .get("response")
            .and_then(|r| r.as_str())
            .unwrap_or_default()
            .to_string(),
        done: value.get("done").and_then(|d| d.as_bool()).unwrap_or(false),
    }
}

/// Forward decoded lines to `tx`. Returns `false` once the stream is over,
/// either because it finished or because the receiver went away.
async fn forward_lines(buffer: &mut Vec<u8>, tx: &mpsc::Sender<StreamEvent>) -> bool {
    while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
        let line: Vec<u8> = buffer.drain(..=pos).collect();
        let line = line.trim_ascii();
        if line.is_empty() {
            continue;
        }
        let event = match parse_ollama_line(line) {
            OllamaLine::Chunk { text, done } => {
                if !text.is_empty() && tx.send(StreamEvent::Chunk(text)).await.is_err() {
                    return false;
                }
                if done {
                    let _ = tx.send(StreamEvent::Done).await;
                    return false;
                }
                continue;
            }
            OllamaLine::Error(message) => StreamEvent::Error(message),
            OllamaLine::Malformed => {
                tracing::debug!("skipping malformed stream line");
                continue;
            }
        };
        let _ = tx.send(event).await;
        return false;
    }
    true
}

async fn pump_stream(mut response: reqwest::Response, tx: mpsc::Sender<StreamEvent>) {
    let mut buffer: Vec<u8> = Vec::new();
    loop {
        let next = tokio::select! {
            _ = tx.closed() => {
                tracing::debug!("answer stream cancelled by receiver");
                return;
            }
            next = response.chunk() => next,
        };
        match next {
            Ok(Some(bytes)) => {
                buffer.extend_from_slice(&bytes);
                if !forward_lines(&mut buffer, &tx).await {
                    return;
                }
            }
            Ok(None) => {
                buffer.push(b'\n');
                if forward_lines(&mut buffer, &tx).await {
                    let _ = tx.send(StreamEvent::Done).await;
                }
                return;
            }
            Err(e) => {
                let message = if e.is_timeout() {
                    format!("Ollama stream timed out waiting for output: {}", e)
                } else {
                    format!("Ollama stream error: {}", e)
                };
                let _ = tx.send(StreamEvent::Error(message)).await;
                return;
            }
        }
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let payload: serde_json::Value = self
            .generate(prompt, false)
            .await?
            .json()
            .await
            .with_context(|| "parsing Ollama response body")?;

        payload
            .get("response")
            .and_then(|r| r.as_str())
            .map(|r| r.to_string())
            .ok_or_else(|| anyhow!("missing 'response' in Ollama reply"))
    }

    async fn stream(&self, prompt: &str) -> Result<mpsc::Receiver<StreamEvent>> {
        let response = self.generate(prompt, true).await?;
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        tokio::spawn(pump_stream(response, tx));
        Ok(rx)
    }
}

// ============ OpenAI ============

pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    timeout: Duration,
}

impl OpenAiClient {
    pub fn from_env(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .with_context(|| "reading OpenAI api key from OPENAI_API_KEY")?;
        Self::new(config, api_key)
    }

    pub fn new(config: &LlmConfig, api_key: String) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        Ok(Self {
            http: http_client(timeout)?,
            base_url: config.base_url(),
            model: config.model.clone(),
            api_key,
            timeout,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let payload: serde_json::Value = self
            .http
            .post(url)
            .timeout(self.timeout)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "temperature": 0.2,
                "messages": [{"role": "user", "content": prompt}],
            }))
            .send()
            .await
            .with_context(|| "sending request to OpenAI")?
            .error_for_status()
            .with_context(|| "OpenAI returned an error status")?
            .json()
            .await
            .with_context(|| "parsing OpenAI response body")?;

        payload
            .get("choices")
            .and_then(|choices| choices.as_array())
            .and_then(|choices| choices.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .map(|content| content.to_string())
            .ok_or_else(|| anyhow!("missing message content in OpenAI response"))
    }
}
