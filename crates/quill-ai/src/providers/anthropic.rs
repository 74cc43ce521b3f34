//! Anthropic Messages API provider

use async_stream::stream;
use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource};
use serde::Deserialize;
use serde_json::json;

use crate::{
    error::{Error, Result},
    providers::{Provider, http_client, open_event_source},
    stream::EventStream,
    types::{ChatOptions, Message, ProviderConfig, StreamEvent, ToolCallRequest, ToolSchema},
};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";
const API_VERSION: &str = "2023-06-01";

/// Anthropic API client
pub struct AnthropicProvider {
    client: reqwest::Client,
    config: ProviderConfig,
}

impl AnthropicProvider {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            client: http_client(),
            config,
        }
    }

    /// Messages endpoint, normalizing the base URL to end in `/v1`.
    fn endpoint(&self) -> String {
        let mut base = self
            .config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();
        if !base.ends_with("/v1") {
            base.push_str("/v1");
        }
        format!("{}/messages", base)
    }
}

#[async_trait::async_trait]
impl Provider for AnthropicProvider {
    fn validate_config(&self) -> Result<()> {
        if self.config.api_key.as_deref().unwrap_or_default().is_empty() {
            return Err(Error::Config(
                "Anthropic API key required. Set ANTHROPIC_API_KEY or [providers.anthropic] api_key"
                    .into(),
            ));
        }
        Ok(())
    }

    fn get_model(&self) -> &str {
        self.config.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    fn supports_tools(&self) -> bool {
        true
    }

    fn format_tools_for_api(&self, tools: &[ToolSchema]) -> serde_json::Value {
        serde_json::Value::Array(
            tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.parameters,
                    })
                })
                .collect(),
        )
    }

    fn create_messages(&self, system: &str, messages: &[Message]) -> serde_json::Value {
        json!({
            "system": system,
            "messages": convert_messages(messages),
        })
    }

    async fn stream_chat(
        &self,
        system: &str,
        messages: &[Message],
        options: &ChatOptions,
        tools: Option<&[ToolSchema]>,
    ) -> Result<EventStream> {
        let mut payload = json!({
            "model": self.get_model(),
            "max_tokens": options.max_tokens,
            "temperature": options.temperature,
            "system": system,
            "messages": convert_messages(messages),
            "stream": true,
        });

        if let Some(tools) = tools {
            if !tools.is_empty() {
                payload["tools"] = self.format_tools_for_api(tools);
            }
        }

        let url = self.endpoint();
        tracing::debug!(url = %url, "Anthropic streaming request");

        let builder = self
            .client
            .post(&url)
            .header("x-api-key", self.config.api_key.as_deref().unwrap_or_default())
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&payload);

        let source = open_event_source(builder).await?;
        Ok(Box::pin(sse_stream(source)))
    }
}

/// Convert provider-agnostic messages into the Anthropic wire shape.
///
/// Invariant: all `tool_use` blocks from one assistant turn live in a single
/// assistant message, and all corresponding `tool_result` blocks live in a
/// single following user message. Results are never split across messages.
fn convert_messages(messages: &[Message]) -> Vec<serde_json::Value> {
    let mut out = Vec::new();
    let mut pending_results: Vec<serde_json::Value> = Vec::new();

    let flush_results = |out: &mut Vec<serde_json::Value>, pending: &mut Vec<serde_json::Value>| {
        if !pending.is_empty() {
            out.push(json!({
                "role": "user",
                "content": std::mem::take(pending),
            }));
        }
    };

    for message in messages {
        match message {
            Message::Tool {
                tool_call_id,
                content,
                ..
            } => {
                let output = if content.trim().is_empty() {
                    "Error: tool returned no output"
                } else {
                    content.as_str()
                };
                pending_results.push(json!({
                    "type": "tool_result",
                    "tool_use_id": tool_call_id,
                    "content": output,
                }));
            }
            Message::User { content } => {
                flush_results(&mut out, &mut pending_results);
                out.push(json!({
                    "role": "user",
                    "content": [{ "type": "text", "text": content }],
                }));
            }
            Message::Assistant {
                content,
                tool_calls,
            } => {
                flush_results(&mut out, &mut pending_results);
                let mut blocks = Vec::new();
                if !content.is_empty() {
                    blocks.push(json!({ "type": "text", "text": content }));
                }
                for call in tool_calls {
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": call.id,
                        "name": call.name,
                        "input": call.arguments,
                    }));
                }
                if !blocks.is_empty() {
                    out.push(json!({ "role": "assistant", "content": blocks }));
                }
            }
        }
    }
    flush_results(&mut out, &mut pending_results);

    out
}

fn sse_stream(mut source: EventSource) -> impl futures::Stream<Item = Result<StreamEvent>> {
    stream! {
        // Accumulated tool_use blocks, keyed by content-block index
        let mut blocks: Vec<Option<ToolUseBlock>> = Vec::new();

        while let Some(event) = source.next().await {
            match event {
                Ok(Event::Open) => {}
                Ok(Event::Message(msg)) => match msg.event.as_str() {
                    "content_block_start" => {
                        if let Ok(data) = serde_json::from_str::<ContentBlockStart>(&msg.data) {
                            if data.content_block.block_type == "tool_use" {
                                let index = data.index as usize;
                                while blocks.len() <= index {
                                    blocks.push(None);
                                }
                                blocks[index] = Some(ToolUseBlock {
                                    id: data.content_block.id.unwrap_or_default(),
                                    name: data.content_block.name.unwrap_or_default(),
                                    input: String::new(),
                                });
                            }
                        }
                    }
                    "content_block_delta" => {
                        if let Ok(data) = serde_json::from_str::<ContentBlockDelta>(&msg.data) {
                            match data.delta.delta_type.as_str() {
                                "text_delta" => {
                                    let text = data.delta.text.unwrap_or_default();
                                    if !text.is_empty() {
                                        yield Ok(StreamEvent::delta(text));
                                    }
                                }
                                "input_json_delta" => {
                                    let index = data.index as usize;
                                    if let Some(Some(block)) = blocks.get_mut(index) {
                                        block
                                            .input
                                            .push_str(&data.delta.partial_json.unwrap_or_default());
                                    }
                                }
                                _ => {}
                            }
                        }
                    }
                    "message_delta" => {
                        if let Ok(data) = serde_json::from_str::<MessageDelta>(&msg.data) {
                            if let Some(reason) = data.delta.stop_reason {
                                let calls = finish_blocks(&mut blocks);
                                yield Ok(StreamEvent::finished(
                                    reason,
                                    (!calls.is_empty()).then_some(calls),
                                ));
                            }
                        }
                    }
                    "message_stop" => break,
                    "error" => {
                        let detail = serde_json::from_str::<ErrorEvent>(&msg.data)
                            .map(|e| e.error.message)
                            .unwrap_or(msg.data);
                        yield Err(Error::Protocol(detail));
                        break;
                    }
                    _ => {}
                },
                Err(reqwest_eventsource::Error::StreamEnded) => break,
                Err(e) => {
                    yield Err(Error::Sse(e.to_string()));
                    break;
                }
            }
        }
    }
}

#[derive(Debug)]
struct ToolUseBlock {
    id: String,
    name: String,
    input: String,
}

/// Parse accumulated tool_use blocks into tool calls.
///
/// Empty input means a tool with no parameters and parses as `{}`; otherwise
/// malformed JSON drops that single call.
fn finish_blocks(blocks: &mut Vec<Option<ToolUseBlock>>) -> Vec<ToolCallRequest> {
    blocks
        .drain(..)
        .flatten()
        .filter_map(|block| {
            let input = block.input.trim();
            let arguments = if input.is_empty() {
                Ok(json!({}))
            } else {
                serde_json::from_str(input)
            };
            match arguments {
                Ok(arguments) => Some(ToolCallRequest::new(block.id, block.name, arguments)),
                Err(e) => {
                    tracing::warn!(
                        tool = %block.name,
                        "Dropping tool_use block with malformed input JSON: {}",
                        e
                    );
                    None
                }
            }
        })
        .collect()
}

// Response event payloads

#[derive(Debug, Deserialize)]
struct ContentBlockStart {
    index: u32,
    content_block: ContentBlockInfo,
}

#[derive(Debug, Deserialize)]
struct ContentBlockInfo {
    #[serde(rename = "type")]
    block_type: String,
    id: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlockDelta {
    index: u32,
    delta: DeltaInfo,
}

#[derive(Debug, Deserialize)]
struct DeltaInfo {
    #[serde(rename = "type")]
    delta_type: String,
    text: Option<String>,
    partial_json: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageDelta {
    delta: StopInfo,
}

#[derive(Debug, Deserialize)]
struct StopInfo {
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEvent {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> AnthropicProvider {
        AnthropicProvider::new(ProviderConfig {
            api_key: Some("test-key".into()),
            ..Default::default()
        })
    }

    #[test]
    fn test_endpoint_normalizes_to_v1() {
        let p = provider();
        assert_eq!(p.endpoint(), "https://api.anthropic.com/v1/messages");

        let p = AnthropicProvider::new(ProviderConfig {
            api_key: Some("k".into()),
            base_url: Some("https://proxy.example.com/v1/".into()),
            ..Default::default()
        });
        assert_eq!(p.endpoint(), "https://proxy.example.com/v1/messages");
    }

    #[test]
    fn test_tool_use_and_results_stay_in_single_messages() {
        let p = provider();
        let calls = vec![
            ToolCallRequest::new("toolu_1", "git_status", json!({})),
            ToolCallRequest::new("toolu_2", "git_log", json!({"max_count": 5})),
        ];
        let messages = vec![
            Message::user("what changed?"),
            Message::assistant_with_tools("Let me look.", calls),
            Message::tool_result("toolu_1", "git_status", "clean"),
            Message::tool_result("toolu_2", "git_log", "abc123 init"),
        ];

        let wire = p.create_messages("sys", &messages);
        assert_eq!(wire["system"], "sys");
        let arr = wire["messages"].as_array().unwrap();
        // user, assistant (text + both tool_use), user (both tool_result)
        assert_eq!(arr.len(), 3);

        let assistant_blocks = arr[1]["content"].as_array().unwrap();
        let tool_uses: Vec<_> = assistant_blocks
            .iter()
            .filter(|b| b["type"] == "tool_use")
            .collect();
        assert_eq!(tool_uses.len(), 2);
        assert_eq!(tool_uses[0]["id"], "toolu_1");
        assert_eq!(tool_uses[1]["id"], "toolu_2");

        assert_eq!(arr[2]["role"], "user");
        let results = arr[2]["content"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|b| b["type"] == "tool_result"));
        assert_eq!(results[0]["tool_use_id"], "toolu_1");
        assert_eq!(results[1]["tool_use_id"], "toolu_2");
    }

    #[test]
    fn test_empty_tool_result_coerced_to_placeholder() {
        let p = provider();
        let messages = vec![
            Message::assistant_with_tools(
                "",
                vec![ToolCallRequest::new("toolu_9", "git_status", json!({}))],
            ),
            Message::tool_result("toolu_9", "git_status", "   "),
        ];
        let wire = p.create_messages("", &messages);
        let results = wire["messages"][1]["content"].as_array().unwrap();
        assert!(results[0]["content"].as_str().unwrap().contains("Error"));
    }

    #[test]
    fn test_empty_tool_input_parses_as_empty_object() {
        let mut blocks = vec![Some(ToolUseBlock {
            id: "toolu_1".into(),
            name: "get_working_directory".into(),
            input: String::new(),
        })];
        let calls = finish_blocks(&mut blocks);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].arguments, json!({}));
    }

    #[test]
    fn test_malformed_tool_input_dropped() {
        let mut blocks = vec![
            Some(ToolUseBlock {
                id: "a".into(),
                name: "bad".into(),
                input: "{broken".into(),
            }),
            Some(ToolUseBlock {
                id: "b".into(),
                name: "good".into(),
                input: r#"{"x": 1}"#.into(),
            }),
        ];
        let calls = finish_blocks(&mut blocks);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "good");
    }

    #[test]
    fn test_format_tools_anthropic_shape() {
        let p = provider();
        let tools = vec![ToolSchema::new(
            "edit_file",
            "Edit a file",
            json!({"type": "object", "properties": {"file_path": {"type": "string"}}}),
        )];
        let formatted = p.format_tools_for_api(&tools);
        assert_eq!(formatted[0]["name"], "edit_file");
        assert!(formatted[0]["input_schema"].is_object());
        assert!(formatted[0].get("function").is_none());
    }
}
