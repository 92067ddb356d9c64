use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use stratagem_core::ChatHistory;

use crate::generator::{GenError, Generator};
use crate::stream::{LineBuffer, TokenSink};

/// Local Ollama back-end. No authentication; connection failures surface
/// as [`GenError::Unavailable`] so a misconfigured local daemon reads as
/// "not running" rather than a protocol fault.
///
/// Ollama has no separate reasoning stream, so the sink only ever sees
/// main tokens — no thinking markers are emitted.
pub struct OllamaGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    max_tokens: u32,
    sink: Option<TokenSink>,
}

impl OllamaGenerator {
    pub fn new(base_url: String, model: String, max_tokens: u32, sink: Option<TokenSink>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            model,
            max_tokens,
            sink,
        }
    }

    fn build_body(&self, history: &ChatHistory, stream: bool) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": history.as_native(),
            "stream": stream,
            "options": {
                "num_predict": self.max_tokens,
            },
        })
    }

    async fn send(&self, history: &ChatHistory, stream: bool) -> Result<reqwest::Response, GenError> {
        let url = format!("{}/api/chat", self.base_url);

        debug!(model = %self.model, stream, "sending request to Ollama");

        let resp = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(&self.build_body(history, stream))
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    GenError::Unavailable(e.to_string())
                } else {
                    GenError::Http(e)
                }
            })?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "Ollama API error");
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

        if api_resp.message.content.is_empty() {
            return Err(GenError::EmptyResponse);
        }
        Ok(api_resp.message.content)
    }

    /// Ollama streams newline-delimited JSON objects, one per token batch;
    /// the final object carries `done: true`.
    async fn complete_streaming(
        &self,
        history: &ChatHistory,
        sink: &TokenSink,
    ) -> Result<String, GenError> {
        use futures_util::StreamExt;

        let resp = self.send(history, true).await?;

        let mut final_text = String::new();
        let mut line_buf = LineBuffer::new();
        let mut byte_stream = resp.bytes_stream();

        while let Some(chunk) = byte_stream.next().await {
            let chunk = chunk.map_err(GenError::Http)?;
            let Ok(text) = std::str::from_utf8(&chunk) else {
                continue;
            };

            for line in line_buf.push(text) {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<StreamChunk>(line) {
                    Ok(chunk_data) => {
                        if chunk_data.done {
                            continue;
                        }
                        let token = chunk_data.message.content;
                        if !token.is_empty() {
                            final_text.push_str(&token);
                            sink(&token);
                        }
                    }
                    Err(e) => {
                        warn!(line, err = %e, "failed to parse Ollama stream chunk");
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
impl Generator for OllamaGenerator {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn chat_completion(&self, history: &ChatHistory) -> Result<String, GenError> {
        match &self.sink {
            Some(sink) => self.complete_streaming(history, sink).await,
            None => self.complete_plain(history).await,
        }
    }
}

// Ollama API response types (deserialization only)

#[derive(Deserialize)]
struct ApiResponse {
    message: OllamaMessage,
}

#[derive(Deserialize)]
struct OllamaMessage {
    content: String,
}

#[derive(Deserialize)]
struct StreamChunk {
    message: OllamaMessage,
    done: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_chunks_parse_incremental_and_final_forms() {
        let incremental: StreamChunk = serde_json::from_str(
            r#"{"model":"llama3","message":{"role":"assistant","content":"hel"},"done":false}"#,
        )
        .unwrap();
        assert!(!incremental.done);
        assert_eq!(incremental.message.content, "hel");

        let done: StreamChunk = serde_json::from_str(
            r#"{"model":"llama3","message":{"role":"assistant","content":""},"done":true,"done_reason":"stop","eval_count":42}"#,
        )
        .unwrap();
        assert!(done.done);
    }
}
