//! OpenRouter provider (OpenAI-compatible SSE, no tool calling)

use async_stream::stream;
use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource};
use serde::Deserialize;
use serde_json::json;

use crate::{
    error::{Error, Result},
    providers::{Provider, http_client, open_event_source},
    stream::EventStream,
    types::{ChatOptions, Message, ProviderConfig, StreamEvent, ToolSchema},
};

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_MODEL: &str = "anthropic/claude-3.5-sonnet";
const REFERER: &str = "https://github.com/quillrs/quill";

/// OpenRouter API client
pub struct OpenRouterProvider {
    client: reqwest::Client,
    config: ProviderConfig,
}

impl OpenRouterProvider {
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
        format!("{}/chat/completions", base)
    }
}

#[async_trait::async_trait]
impl Provider for OpenRouterProvider {
    fn validate_config(&self) -> Result<()> {
        if self.config.api_key.as_deref().unwrap_or_default().is_empty() {
            return Err(Error::Config(
                "OpenRouter API key required. Set OPENROUTER_API_KEY or [providers.openrouter] api_key"
                    .into(),
            ));
        }
        Ok(())
    }

    fn get_model(&self) -> &str {
        self.config.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    fn format_tools_for_api(&self, _tools: &[ToolSchema]) -> serde_json::Value {
        serde_json::Value::Array(vec![])
    }

    fn create_messages(&self, system: &str, messages: &[Message]) -> serde_json::Value {
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
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
            "stream": true,
        });

        let url = self.endpoint();
        tracing::debug!(url = %url, "OpenRouter streaming request");

        let builder = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.config.api_key.as_deref().unwrap_or_default()),
            )
            .header("HTTP-Referer", REFERER)
            .json(&payload);

        let source = open_event_source(builder).await?;
        Ok(Box::pin(sse_stream(source)))
    }
}

fn sse_stream(mut source: EventSource) -> impl futures::Stream<Item = Result<StreamEvent>> {
    stream! {
        while let Some(event) = source.next().await {
            match event {
                Ok(Event::Open) => {}
                Ok(Event::Message(msg)) => {
                    if msg.data == "[DONE]" {
                        break;
                    }
                    let chunk: StreamChunk = match serde_json::from_str(&msg.data) {
                        Ok(c) => c,
                        Err(_) => continue,
                    };
                    if let Some(choice) = chunk.choices.first() {
                        if let Some(content) = &choice.delta.content {
                            if !content.is_empty() {
                                yield Ok(StreamEvent::delta(content.clone()));
                            }
                        }
                        if let Some(reason) = &choice.finish_reason {
                            yield Ok(StreamEvent::finished(reason.clone(), None));
                        }
                    }
                }
                Err(reqwest_eventsource::Error::StreamEnded) => break,
                Err(e) => {
                    yield Err(Error::Sse(e.to_string()));
                    break;
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_api_key() {
        let p = OpenRouterProvider::new(ProviderConfig::default());
        assert!(p.validate_config().is_err());
    }

    #[test]
    fn test_default_endpoint_and_model() {
        let p = OpenRouterProvider::new(ProviderConfig {
            api_key: Some("k".into()),
            ..Default::default()
        });
        assert_eq!(p.endpoint(), "https://openrouter.ai/api/v1/chat/completions");
        assert_eq!(p.get_model(), "anthropic/claude-3.5-sonnet");
        assert!(!p.supports_tools());
    }
}
