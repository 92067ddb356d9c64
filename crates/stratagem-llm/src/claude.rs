use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use stratagem_core::{ChatHistory, Role};

use crate::generator::{GenError, Generator};
use crate::stream::{parse_sse_line, LineBuffer, SseParsed, TokenSink, THINK_CLOSE, THINK_OPEN};

const API_VERSION: &str = "2023-06-01";

/// Anthropic messages-API back-end. Thinking blocks (when the model emits
/// them) are streamed to the sink between `<think>`/`</think>` markers and
/// never included in the returned text.
pub struct ClaudeGenerator {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    sink: Option<TokenSink>,
}

impl ClaudeGenerator {
    pub fn new(
        api_key: String,
        base_url: String,
        model: String,
        max_tokens: u32,
        sink: Option<TokenSink>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url,
            model,
            max_tokens,
            sink,
        }
    }

    /// The messages API takes the system prompt as a top-level field, so
    /// system messages are lifted out of the history here.
    fn build_body(&self, history: &ChatHistory, stream: bool) -> serde_json::Value {
        let system: String = history
            .messages()
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let messages: Vec<serde_json::Value> = history
            .messages()
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| {
                serde_json::json!({
                    "role": m.role.as_str(),
                    "content": m.content,
                })
            })
            .collect();

        serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": system,
            "messages": messages,
            "stream": stream,
        })
    }

    async fn send(&self, history: &ChatHistory, stream: bool) -> Result<reqwest::Response, GenError> {
        let url = format!("{}/v1/messages", self.base_url);

        debug!(model = %self.model, stream, "sending request to Anthropic");

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
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
            warn!(status, body = %text, "Anthropic API error");
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

        let text: String = api_resp
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                _ => None,
            })
            .collect();

        if text.is_empty() {
            return Err(GenError::EmptyResponse);
        }
        Ok(text)
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
        let mut current_event = String::new();
        let mut line_buf = LineBuffer::new();
        let mut byte_stream = resp.bytes_stream();

        while let Some(chunk) = byte_stream.next().await {
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
                match parse_sse_line(line) {
                    Some(SseParsed::Event(ev)) => current_event = ev,
                    Some(SseParsed::Data(data)) => {
                        if current_event != "content_block_delta" {
                            continue;
                        }
                        let Ok(delta) = serde_json::from_str::<ContentBlockDelta>(&data) else {
                            continue;
                        };
                        match delta.delta.delta_type.as_str() {
                            "thinking_delta" => {
                                if let Some(t) = delta.delta.thinking.as_deref() {
                                    if !reasoning_entered {
                                        reasoning_entered = true;
                                        sink(THINK_OPEN);
                                    }
                                    sink(t);
                                }
                            }
                            "text_delta" => {
                                if let Some(t) = delta.delta.text.as_deref() {
                                    if reasoning_entered && !main_entered {
                                        main_entered = true;
                                        sink(THINK_CLOSE);
                                    }
                                    final_text.push_str(t);
                                    sink(t);
                                }
                            }
                            _ => {}
                        }
                    }
                    None => {}
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
impl Generator for ClaudeGenerator {
    fn name(&self) -> &str {
        "claude"
    }

    async fn chat_completion(&self, history: &ChatHistory) -> Result<String, GenError> {
        match &self.sink {
            Some(sink) => self.complete_streaming(history, sink).await,
            None => self.complete_plain(history).await,
        }
    }
}

// Anthropic API response types (deserialization only)

#[derive(Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    /// Reasoning block — excluded from the returned text.
    #[serde(rename = "thinking")]
    #[allow(dead_code)]
    Thinking { thinking: String },
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize)]
struct ContentBlockDelta {
    delta: DeltaContent,
}

#[derive(Deserialize)]
struct DeltaContent {
    #[serde(rename = "type")]
    delta_type: String,
    text: Option<String>,
    thinking: Option<String>,
}
