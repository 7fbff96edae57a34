//! OpenAI-compatible chat-completion client, blocking and streaming.

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::debug;

use super::{CompletionEvent, LlmClient, StreamingLlmClient};
use crate::config::AiConfig;
use crate::model::CompletionRequest;

/// Buffered events between the SSE reader and the processor.
const EVENT_CHANNEL_CAPACITY: usize = 64;

pub struct OpenAiClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(cfg: &AiConfig) -> Self {
        Self::new(cfg.base_url.clone(), cfg.resolved_api_key())
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    async fn post_completions(
        &self,
        body: &serde_json::Value,
    ) -> anyhow::Result<reqwest::Response> {
        let mut req = self
            .client
            .post(self.completions_url())
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }
        let resp = req.send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await.unwrap_or_else(|_| String::new());
            anyhow::bail!("chat API error (status {}): {}", status, error_text);
        }
        Ok(resp)
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> anyhow::Result<String> {
        let body = serde_json::json!({
            "model": request.model,
            "messages": request.messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });

        let json: serde_json::Value = self.post_completions(&body).await?.json().await?;

        let text = json
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("chat API response missing content"))?
            .to_string();

        Ok(text)
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

#[async_trait]
impl StreamingLlmClient for OpenAiClient {
    async fn stream_chat(
        &self,
        request: &CompletionRequest,
    ) -> anyhow::Result<mpsc::Receiver<CompletionEvent>> {
        let body = serde_json::json!({
            "model": request.model,
            "messages": request.messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "stream": true,
        });

        let resp = self.post_completions(&body).await?;
        debug!(model = %request.model, "streaming completion opened");

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let mut byte_stream = resp.bytes_stream();

        tokio::spawn(async move {
            // SSE frames can split anywhere, including mid-line; buffer
            // until a full line is available.
            let mut line_buf = String::new();
            while let Some(next) = byte_stream.next().await {
                let bytes = match next {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx
                            .send(CompletionEvent::Error(format!("stream read failed: {}", e)))
                            .await;
                        return;
                    }
                };
                line_buf.push_str(&String::from_utf8_lossy(&bytes));
                while let Some(pos) = line_buf.find('\n') {
                    let line: String = line_buf.drain(..=pos).collect();
                    match sse_data(&line) {
                        Some("[DONE]") => {
                            let _ = tx.send(CompletionEvent::Done).await;
                            return;
                        }
                        Some(data) => match delta_content(data) {
                            Ok(Some(delta)) => {
                                if tx.send(CompletionEvent::Delta(delta)).await.is_err() {
                                    return;
                                }
                            }
                            Ok(None) => {}
                            Err(e) => {
                                let _ = tx.send(CompletionEvent::Error(e)).await;
                                return;
                            }
                        },
                        None => {}
                    }
                }
            }
            // Stream closed without a [DONE] marker; the response is over
            // either way.
            let _ = tx.send(CompletionEvent::Done).await;
        });

        Ok(rx)
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

/// Extract the payload of an SSE `data:` line, if this is one.
fn sse_data(line: &str) -> Option<&str> {
    let trimmed = line.trim_end_matches(['\n', '\r']);
    let data = trimmed.strip_prefix("data:")?;
    let data = data.trim_start();
    if data.is_empty() {
        None
    } else {
        Some(data)
    }
}

/// Pull the delta text out of one streamed chunk frame.
fn delta_content(data: &str) -> Result<Option<String>, String> {
    let value: serde_json::Value = serde_json::from_str(data)
        .map_err(|e| format!("invalid stream frame: {}", e))?;
    Ok(value
        .pointer("/choices/0/delta/content")
        .and_then(|v| v.as_str())
        .map(str::to_string))
}
