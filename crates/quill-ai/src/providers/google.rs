//! Google Gemini provider
//!
//! Gemini's streaming endpoint returns a single JSON array (one element per
//! chunk) rather than an SSE stream, so the whole body is read and parsed
//! before events are replayed to the caller.

use futures::stream;
use serde_json::json;

use crate::{
    error::{Error, Result},
    providers::{Provider, http_client},
    stream::EventStream,
    types::{ChatOptions, Message, ProviderConfig, StreamEvent, ToolSchema},
};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Google Gemini API client
pub struct GoogleProvider {
    client: reqwest::Client,
    config: ProviderConfig,
}

impl GoogleProvider {
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
        format!(
            "{}/models/{}:streamGenerateContent?key={}",
            base,
            self.get_model(),
            self.config.api_key.as_deref().unwrap_or_default(),
        )
    }
}

#[async_trait::async_trait]
impl Provider for GoogleProvider {
    fn validate_config(&self) -> Result<()> {
        if self.config.api_key.as_deref().unwrap_or_default().is_empty() {
            return Err(Error::Config(
                "Gemini API key required. Set GEMINI_API_KEY or [providers.google] api_key".into(),
            ));
        }
        Ok(())
    }

    fn get_model(&self) -> &str {
        self.config.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    fn format_tools_for_api(&self, tools: &[ToolSchema]) -> serde_json::Value {
        // Tool calling is not wired for Gemini; export the declaration shape
        // for completeness.
        json!([{
            "function_declarations": tools.iter().map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                })
            }).collect::<Vec<_>>()
        }])
    }

    fn create_messages(&self, system: &str, messages: &[Message]) -> serde_json::Value {
        let mut contents = Vec::new();
        for message in messages {
            match message {
                Message::User { content } => contents.push(json!({
                    "role": "user",
                    "parts": [{ "text": content }],
                })),
                Message::Assistant { content, .. } => {
                    if !content.is_empty() {
                        contents.push(json!({
                            "role": "model",
                            "parts": [{ "text": content }],
                        }));
                    }
                }
                // No tool-result representation without tool support
                Message::Tool { .. } => {}
            }
        }
        json!({
            "system_instruction": { "parts": [{ "text": system }] },
            "contents": contents,
        })
    }

    async fn stream_chat(
        &self,
        system: &str,
        messages: &[Message],
        options: &ChatOptions,
        _tools: Option<&[ToolSchema]>,
    ) -> Result<EventStream> {
        let wire = self.create_messages(system, messages);
        let payload = json!({
            "systemInstruction": wire["system_instruction"],
            "contents": wire["contents"],
            "generationConfig": {
                "temperature": options.temperature,
                "maxOutputTokens": options.max_tokens,
            },
        });

        let url = self.endpoint();
        tracing::debug!(model = %self.get_model(), "Gemini streaming request");

        let response = self.client.post(&url).json(&payload).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if status.as_u16() != 200 {
            return Err(Error::http(status.as_u16(), body));
        }

        let events = parse_response(&body)?;
        Ok(Box::pin(stream::iter(events.into_iter().map(Ok))))
    }
}

/// Parse a complete Gemini streaming body (JSON array or single object) into
/// normalized events.
fn parse_response(body: &str) -> Result<Vec<StreamEvent>> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| Error::Protocol(format!("Failed to parse Gemini response: {}", e)))?;

    let chunks: Vec<&serde_json::Value> = match &value {
        serde_json::Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };

    let mut events = Vec::new();
    for chunk in chunks {
        if let Some(error) = chunk.get("error") {
            return Err(Error::Protocol(format!("Gemini API error: {}", error)));
        }

        let Some(candidate) = chunk
            .get("candidates")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
        else {
            continue;
        };

        if let Some(parts) = candidate
            .get("content")
            .and_then(|c| c.get("parts"))
            .and_then(|p| p.as_array())
        {
            for part in parts {
                if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
                    if !text.is_empty() {
                        events.push(StreamEvent::delta(text));
                    }
                }
            }
        }

        if let Some(reason) = candidate.get("finishReason").and_then(|r| r.as_str()) {
            let reason = if reason == "STOP" { "stop" } else { reason };
            events.push(StreamEvent::finished(reason, None));
        }
    }

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> GoogleProvider {
        GoogleProvider::new(ProviderConfig {
            api_key: Some("test-key".into()),
            ..Default::default()
        })
    }

    #[test]
    fn test_parse_array_response() {
        let body = r#"[
            {"candidates": [{"content": {"parts": [{"text": "Hello "}]}}]},
            {"candidates": [{"content": {"parts": [{"text": "world"}]}, "finishReason": "STOP"}]}
        ]"#;
        let events = parse_response(body).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].content_delta, "Hello ");
        assert_eq!(events[1].content_delta, "world");
        assert_eq!(events[2].finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn test_parse_single_object_response() {
        let body = r#"{"candidates": [{"content": {"parts": [{"text": "hi"}]}, "finishReason": "MAX_TOKENS"}]}"#;
        let events = parse_response(body).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].finish_reason.as_deref(), Some("MAX_TOKENS"));
    }

    #[test]
    fn test_parse_embedded_error_is_fatal() {
        let body = r#"[{"error": {"code": 400, "message": "bad request"}}]"#;
        assert!(matches!(parse_response(body), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_parse_invalid_json_is_fatal() {
        assert!(matches!(parse_response("not json"), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_create_messages_uses_model_role() {
        let p = provider();
        let wire = p.create_messages(
            "sys",
            &[Message::user("hi"), Message::assistant("hello there")],
        );
        assert_eq!(wire["system_instruction"]["parts"][0]["text"], "sys");
        let contents = wire["contents"].as_array().unwrap();
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
    }

    #[test]
    fn test_no_tool_support() {
        assert!(!provider().supports_tools());
    }
}
