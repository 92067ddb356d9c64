use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use stratagem_core::ChatHistory;

use crate::generator::{GenError, Generator};
use crate::stream::{parse_sse_line, LineBuffer, SseParsed, TokenSink, THINK_CLOSE, THINK_OPEN};

/// OpenAI-compatible chat-completions back-end. Also covers OpenRouter and
/// DeepSeek endpoints; reasoning models surface their reasoning stream via
/// `reasoning_content` deltas, which are forwarded to the sink between
/// `<think>`/`</think>` markers and excluded from the returned text.
pub struct OpenAiGenerator {
    client: reqwest::Client,
    provider_name: String,
    api_key: String,
    base_url: String,
    chat_path: String,
    model: String,
    max_tokens: u32,
    sink: Option<TokenSink>,
}

impl OpenAiGenerator {
    pub fn new(
        name: impl Into<String>,
        api_key: String,
        base_url: String,
        model: String,
        max_tokens: u32,
        sink: Option<TokenSink>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            provider_name: name.into(),
            api_key,
            base_url,
            chat_path: "/v1/chat/completions".to_string(),
            model,
            max_tokens,
            sink,
        }
    }

    /// Override the chat completions path for endpoints that deviate from
    /// `/v1/chat/completions`.
    pub fn with_chat_path(mut self, chat_path: impl Into<String>) -> Self {
        self.chat_path = chat_path.into();
        self
    }

    fn build_body(&self, history: &ChatHistory, stream: bool) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": history.as_native(),
            "max_tokens": self.max_tokens,
            "stream": stream,
        })
    }

    async fn send(&self, history: &ChatHistory, stream: bool) -> Result<reqwest::Response, GenError> {
        let url = format!("{}{}", self.base_url, self.chat_path);

        debug!(model = %self.model, stream, "sending chat completion request");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&self.build_body(history, stream))
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status == 429 {
            let retry = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|s| s * 1000)
                .unwrap_or(5000);
            return Err(GenError::RateLimited {
                retry_after_ms: retry,
            });
        }

        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "chat completion API error");
            return Err(GenError::Api {
                status,
                message: text,
            });
        }

        Ok(resp)
    }

    async fn complete_plain(&self, history: &ChatHistory) -> Result<String, GenError> {
        let resp = self.send(history, false).await?;
        let api_resp: ApiResponse = resp
            .json()
            .await
            .map_err(|e| GenError::Parse(e.to_string()))?;

        let content = api_resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        if content.is_empty() {
            return Err(GenError::EmptyResponse);
        }
        Ok(content)
    }

    async fn complete_streaming(
        &self,
        history: &ChatHistory,
        sink: &TokenSink,
    ) -> Result<String, GenError> {
        use futures_util::StreamExt;

        let resp = self.send(history, true).await?;

        let mut final_text = String::new();
        let mut reasoning_entered = false;
        let mut main_entered = false;
        let mut line_buf = LineBuffer::new();
        let mut byte_stream = resp.bytes_stream();

        'outer: while let Some(chunk) = byte_stream.next().await {
            let chunk = chunk.map_err(GenError::Http)?;
            let text = match std::str::from_utf8(&chunk) {
                Ok(t) => t,
                Err(_) => continue,
            };

            for line in line_buf.push(text) {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let Some(SseParsed::Data(data)) = parse_sse_line(line) else {
                    continue;
                };
                if data.trim() == "[DONE]" {
                    break 'outer;
                }
                let Ok(chunk_resp) = serde_json::from_str::<StreamChunk>(&data) else {
                    continue;
                };

                for choice in &chunk_resp.choices {
                    if let Some(reasoning) = choice
                        .delta
                        .reasoning_content
                        .as_deref()
                        .filter(|t| !t.is_empty())
                    {
                        if !reasoning_entered {
                            reasoning_entered = true;
                            sink(THINK_OPEN);
                        }
                        sink(reasoning);
                    }
                    if let Some(content) =
                        choice.delta.content.as_deref().filter(|t| !t.is_empty())
                    {
                        if reasoning_entered && !main_entered {
                            main_entered = true;
                            sink(THINK_CLOSE);
                        }
                        final_text.push_str(content);
                        sink(content);
                    }
                }
            }
        }

        if final_text.is_empty() {
            return Err(GenError::EmptyResponse);
        }
        Ok(final_text)
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    fn name(&self) -> &str {
        &self.provider_name
    }

    async fn chat_completion(&self, history: &ChatHistory) -> Result<String, GenError> {
        match &self.sink {
            Some(sink) => self.complete_streaming(history, sink).await,
            None => self.complete_plain(history).await,
        }
    }
}

// API response types (deserialization only)

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
    /// DeepSeek-style reasoning stream; absent on plain models.
    reasoning_content: Option<String>,
}
