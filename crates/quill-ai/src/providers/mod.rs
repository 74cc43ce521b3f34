//! LLM provider implementations

pub mod anthropic;
pub mod google;
pub mod ollama;
pub mod openai;
pub mod openrouter;

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource};

use crate::{
    error::{Error, Result},
    stream::EventStream,
    types::{ChatOptions, Message, ProviderConfig, ProviderKind, ToolSchema},
};

/// Uniform interface over one LLM vendor.
///
/// The provider set is fixed and small, so this is a closed polymorphic
/// interface selected by [`create_provider`] rather than any kind of plugin
/// discovery.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Check that all required credentials/endpoints are present.
    /// Called by the factory before the provider is handed out.
    fn validate_config(&self) -> Result<()>;

    /// The model this provider will call
    fn get_model(&self) -> &str;

    /// Whether this provider supports native function/tool calling
    fn supports_tools(&self) -> bool {
        false
    }

    /// Reshape provider-agnostic tool schemas into this vendor's native
    /// function-calling format.
    fn format_tools_for_api(&self, tools: &[ToolSchema]) -> serde_json::Value;

    /// Translate the system prompt and message list into this vendor's
    /// request-body message shape. Exposed separately from `stream_chat` so
    /// the wire format is unit-testable.
    fn create_messages(&self, system: &str, messages: &[Message]) -> serde_json::Value;

    /// Issue a streaming chat request.
    ///
    /// The returned stream is finite and yields exactly one terminal event
    /// (carrying the finish reason and any accumulated tool calls). A non-200
    /// response fails the call with [`Error::Http`] including the body.
    async fn stream_chat(
        &self,
        system: &str,
        messages: &[Message],
        options: &ChatOptions,
        tools: Option<&[ToolSchema]>,
    ) -> Result<EventStream>;
}

/// Factory keyed on the configured provider name.
pub fn create_provider(kind: ProviderKind, config: ProviderConfig) -> Result<Box<dyn Provider>> {
    let provider: Box<dyn Provider> = match kind {
        ProviderKind::OpenAI => Box::new(openai::OpenAIProvider::new(config)),
        ProviderKind::Anthropic => Box::new(anthropic::AnthropicProvider::new(config)),
        ProviderKind::Google => Box::new(google::GoogleProvider::new(config)),
        ProviderKind::Ollama => Box::new(ollama::OllamaProvider::new(config)),
        ProviderKind::OpenRouter => Box::new(openrouter::OpenRouterProvider::new(config)),
    };
    provider.validate_config()?;
    Ok(provider)
}

/// HTTP client with the timeouts every adapter shares.
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(60))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Open an SSE connection and wait for it to establish.
///
/// A non-200 status is surfaced as [`Error::Http`] with the response body, so
/// the caller fails the turn before any events are consumed.
pub(crate) async fn open_event_source(builder: reqwest::RequestBuilder) -> Result<EventSource> {
    let mut source = EventSource::new(builder)
        .map_err(|e| Error::Sse(format!("Failed to create event source: {}", e)))?;

    match source.next().await {
        Some(Ok(Event::Open)) => Ok(source),
        Some(Err(reqwest_eventsource::Error::InvalidStatusCode(status, response))) => {
            let body = response.text().await.unwrap_or_default();
            Err(Error::http(status.as_u16(), body))
        }
        Some(Err(e)) => Err(Error::Sse(e.to_string())),
        Some(Ok(Event::Message(_))) | None => {
            Err(Error::Sse("stream ended before opening".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_rejects_missing_openai_key() {
        let err = create_provider(ProviderKind::OpenAI, ProviderConfig::default());
        assert!(matches!(err, Err(Error::Config(_))));
    }

    #[test]
    fn test_factory_rejects_missing_anthropic_key() {
        let err = create_provider(ProviderKind::Anthropic, ProviderConfig::default());
        assert!(matches!(err, Err(Error::Config(_))));
    }

    #[test]
    fn test_factory_accepts_ollama_without_credentials() {
        let provider = create_provider(ProviderKind::Ollama, ProviderConfig::default()).unwrap();
        assert!(!provider.supports_tools());
    }

    #[test]
    fn test_factory_rejects_azure_without_endpoint() {
        let config = ProviderConfig {
            api_key: Some("key".into()),
            api_type: Some("azure".into()),
            ..Default::default()
        };
        let err = create_provider(ProviderKind::OpenAI, config);
        assert!(matches!(err, Err(Error::Config(_))));
    }
}
