//! Ollama local provider
//!
//! Ollama streams newline-delimited JSON objects rather than SSE frames.

use async_stream::stream;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;

use crate::{
    error::{Error, Result},
    providers::{Provider, http_client},
    stream::EventStream,
    types::{ChatOptions, Message, ProviderConfig, StreamEvent, ToolSchema},
};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llama3.2";

/// Ollama API client
pub struct OllamaProvider {
    client: reqwest::Client,
    config: ProviderConfig,
}

impl OllamaProvider {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            client: http_client(),
            config,
        }
    }

    fn endpoint(&self) -> String {
        let base = self
            .config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/');
        format!("{}/api/chat", base)
    }
}

#[async_trait::async_trait]
impl Provider for OllamaProvider {
    fn validate_config(&self) -> Result<()> {
        // No credentials needed; the base URL has a local default.
        Ok(())
    }

    fn get_model(&self) -> &str {
        self.config.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    fn format_tools_for_api(&self, _tools: &[ToolSchema]) -> serde_json::Value {
        serde_json::Value::Array(vec![])
    }

    fn create_messages(&self, system: &str, messages: &[Message]) -> serde_json::Value {
        // OpenAI-compatible flat message list
        let mut out = Vec::new();
        if !system.is_empty() {
            out.push(json!({ "role": "system", "content": system }));
        }
        for message in messages {
            match message {
                Message::User { content } => {
                    out.push(json!({ "role": "user", "content": content }));
                }
                Message::Assistant { content, .. } => {
                    out.push(json!({ "role": "assistant", "content": content }));
                }
                Message::Tool { .. } => {}
            }
        }
        serde_json::Value::Array(out)
    }

    async fn stream_chat(
        &self,
        system: &str,
        messages: &[Message],
        options: &ChatOptions,
        _tools: Option<&[ToolSchema]>,
    ) -> Result<EventStream> {
        let payload = json!({
            "model": self.get_model(),
            "messages": self.create_messages(system, messages),
            "stream": true,
            "options": {
                "temperature": options.temperature,
                "num_predict": options.max_tokens,
            },
        });

        let url = self.endpoint();
        tracing::debug!(url = %url, "Ollama streaming request");

        let response = self.client.post(&url).json(&payload).send().await?;
        let status = response.status();
        if status.as_u16() != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::http(status.as_u16(), body));
        }

        Ok(Box::pin(ndjson_stream(response)))
    }
}

fn ndjson_stream(response: reqwest::Response) -> impl futures::Stream<Item = Result<StreamEvent>> {
    stream! {
        let mut bytes = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();
        let mut finished = false;

        'outer: while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    yield Err(Error::Request(e));
                    return;
                }
            };
            buffer.extend_from_slice(&chunk);

            while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line);
                if let Some(event) = parse_line(line.trim()) {
                    let terminal = event.is_terminal();
                    yield Ok(event);
                    if terminal {
                        finished = true;
                        break 'outer;
                    }
                }
            }
        }

        if !finished {
            // Flush any trailing line without a newline
            if !buffer.is_empty() {
                let line = String::from_utf8_lossy(&buffer).to_string();
                if let Some(event) = parse_line(line.trim()) {
                    yield Ok(event);
                }
            }
        }
    }
}

/// Parse one NDJSON line into a normalized event. Blank or malformed lines
/// are skipped.
fn parse_line(line: &str) -> Option<StreamEvent> {
    if line.is_empty() {
        return None;
    }
    let chunk: OllamaChunk = serde_json::from_str(line).ok()?;
    if chunk.done {
        Some(StreamEvent::finished("stop", None))
    } else {
        let content = chunk.message.map(|m| m.content).unwrap_or_default();
        if content.is_empty() {
            None
        } else {
            Some(StreamEvent::delta(content))
        }
    }
}

#[derive(Debug, Deserialize)]
struct OllamaChunk {
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_line() {
        let event = parse_line(r#"{"message": {"content": "Hel"}, "done": false}"#).unwrap();
        assert_eq!(event.content_delta, "Hel");
        assert!(!event.is_terminal());
    }

    #[test]
    fn test_parse_done_line() {
        let event = parse_line(r#"{"message": {"content": ""}, "done": true}"#).unwrap();
        assert_eq!(event.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn test_parse_skips_malformed_lines() {
        assert!(parse_line("{not json").is_none());
        assert!(parse_line("").is_none());
    }

    #[test]
    fn test_default_base_url() {
        let p = OllamaProvider::new(ProviderConfig::default());
        assert_eq!(p.endpoint(), "http://localhost:11434/api/chat");
        assert!(p.validate_config().is_ok());
    }
}
