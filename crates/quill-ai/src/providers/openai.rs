//! OpenAI Chat Completions provider (also handles Azure OpenAI deployments)

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

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o";

/// OpenAI (and Azure OpenAI) API client
pub struct OpenAIProvider {
    client: reqwest::Client,
    config: ProviderConfig,
}

impl OpenAIProvider {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            client: http_client(),
            config,
        }
    }

    fn is_azure(&self) -> bool {
        self.config.api_type.as_deref() == Some("azure")
    }

    fn endpoint(&self) -> String {
        if self.is_azure() {
            format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                self.config
                    .azure_endpoint
                    .as_deref()
                    .unwrap_or_default()
                    .trim_end_matches('/'),
                self.config.azure_deployment.as_deref().unwrap_or_default(),
                self.config.azure_api_version.as_deref().unwrap_or_default(),
            )
        } else {
            let base = self
                .config
                .base_url
                .as_deref()
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/');
            format!("{}/chat/completions", base)
        }
    }

    fn build_payload(
        &self,
        system: &str,
        messages: &[Message],
        options: &ChatOptions,
        tools: Option<&[ToolSchema]>,
    ) -> serde_json::Value {
        let model = self.get_model();
        let mut payload = json!({
            "model": model,
            "messages": self.create_messages(system, messages),
            "stream": true,
        });

        if let Some(tools) = tools {
            if !tools.is_empty() {
                payload["tools"] = self.format_tools_for_api(tools);
                payload["tool_choice"] = json!("auto");
            }
        }

        // O-series models reject `temperature` and use `max_completion_tokens`
        if model.starts_with("gpt-") {
            payload["temperature"] = json!(options.temperature);
            payload["max_tokens"] = json!(options.max_tokens);
        } else {
            payload["max_completion_tokens"] = json!(options.max_tokens);
        }

        payload
    }
}

#[async_trait::async_trait]
impl Provider for OpenAIProvider {
    fn validate_config(&self) -> Result<()> {
        if self.config.api_key.as_deref().unwrap_or_default().is_empty() {
            return Err(Error::Config(
                "OpenAI API key required. Set OPENAI_API_KEY or [providers.openai] api_key".into(),
            ));
        }
        if self.is_azure() {
            if self.config.azure_endpoint.is_none() {
                return Err(Error::Config("Azure endpoint required".into()));
            }
            if self.config.azure_deployment.is_none() {
                return Err(Error::Config("Azure deployment required".into()));
            }
            if self.config.azure_api_version.is_none() {
                return Err(Error::Config("Azure API version required".into()));
            }
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
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect(),
        )
    }

    fn create_messages(&self, system: &str, messages: &[Message]) -> serde_json::Value {
        serde_json::Value::Array(convert_messages(system, messages))
    }

    async fn stream_chat(
        &self,
        system: &str,
        messages: &[Message],
        options: &ChatOptions,
        tools: Option<&[ToolSchema]>,
    ) -> Result<EventStream> {
        let payload = self.build_payload(system, messages, options, tools);
        let url = self.endpoint();

        tracing::debug!(url = %url, "OpenAI streaming request");

        let mut builder = self.client.post(&url).json(&payload);
        builder = if self.is_azure() {
            builder.header("api-key", self.config.api_key.as_deref().unwrap_or_default())
        } else {
            builder.header(
                "Authorization",
                format!("Bearer {}", self.config.api_key.as_deref().unwrap_or_default()),
            )
        };

        let source = open_event_source(builder).await?;
        Ok(Box::pin(sse_stream(source)))
    }
}

/// Convert provider-agnostic messages into the OpenAI wire shape.
///
/// Tool turns keep the historical pairing: one assistant message per tool
/// call (each with a single `tool_calls` entry) immediately followed by the
/// matching `tool` role message.
fn convert_messages(system: &str, messages: &[Message]) -> Vec<serde_json::Value> {
    let mut out = Vec::new();

    if !system.is_empty() {
        out.push(json!({ "role": "system", "content": system }));
    }

    let mut i = 0;
    while i < messages.len() {
        match &messages[i] {
            Message::User { content } => {
                out.push(json!({ "role": "user", "content": content }));
                i += 1;
            }
            Message::Assistant {
                content,
                tool_calls,
            } if tool_calls.is_empty() => {
                out.push(json!({ "role": "assistant", "content": content }));
                i += 1;
            }
            Message::Assistant {
                content,
                tool_calls,
            } => {
                // Collect the tool results that follow this assistant turn
                let mut results = std::collections::HashMap::new();
                let mut j = i + 1;
                while let Some(Message::Tool {
                    tool_call_id,
                    content,
                    ..
                }) = messages.get(j)
                {
                    results.insert(tool_call_id.clone(), content.clone());
                    j += 1;
                }

                for (idx, call) in tool_calls.iter().enumerate() {
                    let text = if idx == 0 && !content.is_empty() {
                        json!(content)
                    } else {
                        serde_json::Value::Null
                    };
                    out.push(json!({
                        "role": "assistant",
                        "content": text,
                        "tool_calls": [{
                            "id": call.id,
                            "type": "function",
                            "function": {
                                "name": call.name,
                                "arguments": call.arguments.to_string(),
                            }
                        }]
                    }));
                    let output = results
                        .get(&call.id)
                        .cloned()
                        .unwrap_or_else(|| "Error: tool returned no output".to_string());
                    out.push(json!({
                        "role": "tool",
                        "tool_call_id": call.id,
                        "content": output,
                    }));
                }
                i = j;
            }
            Message::Tool {
                tool_call_id,
                content,
                ..
            } => {
                // Orphan tool result; emit as-is rather than dropping it
                out.push(json!({
                    "role": "tool",
                    "tool_call_id": tool_call_id,
                    "content": content,
                }));
                i += 1;
            }
        }
    }

    out
}

fn sse_stream(mut source: EventSource) -> impl futures::Stream<Item = Result<StreamEvent>> {
    stream! {
        let mut accumulator = ToolCallAccumulator::default();

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
                        if let Some(tool_calls) = &choice.delta.tool_calls {
                            for tc in tool_calls {
                                accumulator.push(
                                    tc.index as usize,
                                    tc.id.as_deref(),
                                    tc.function.as_ref().and_then(|f| f.name.as_deref()),
                                    tc.function.as_ref().and_then(|f| f.arguments.as_deref()),
                                );
                            }
                        }

                        if let Some(content) = &choice.delta.content {
                            if !content.is_empty() {
                                yield Ok(StreamEvent::delta(content.clone()));
                            }
                        }

                        if let Some(reason) = &choice.finish_reason {
                            let calls = accumulator.finish();
                            yield Ok(StreamEvent::finished(
                                reason.clone(),
                                (!calls.is_empty()).then_some(calls),
                            ));
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

/// Accumulates tool-call fragments streamed across chunks, keyed by index.
///
/// Argument JSON arrives as string fragments and is only parsed once the
/// terminal chunk arrives; a fragment set that fails to parse at that point
/// drops that single tool call without aborting the turn.
#[derive(Debug, Default)]
struct ToolCallAccumulator {
    slots: Vec<Slot>,
}

#[derive(Debug, Default, Clone)]
struct Slot {
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallAccumulator {
    fn push(
        &mut self,
        index: usize,
        id: Option<&str>,
        name: Option<&str>,
        fragment: Option<&str>,
    ) {
        while self.slots.len() <= index {
            self.slots.push(Slot::default());
        }
        if let Some(id) = id {
            self.slots[index].id = id.to_string();
        }
        if let Some(name) = name {
            self.slots[index].name = name.to_string();
        }
        if let Some(fragment) = fragment {
            self.slots[index].arguments.push_str(fragment);
        }
    }

    fn finish(&mut self) -> Vec<ToolCallRequest> {
        self.slots
            .drain(..)
            .filter(|slot| !slot.name.is_empty())
            .filter_map(|slot| match serde_json::from_str(&slot.arguments) {
                Ok(arguments) => Some(ToolCallRequest::new(slot.id, slot.name, arguments)),
                Err(e) => {
                    tracing::warn!(
                        tool = %slot.name,
                        "Dropping tool call with malformed argument JSON: {}",
                        e
                    );
                    None
                }
            })
            .collect()
    }
}

// Streaming response chunk types

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
    tool_calls: Option<Vec<StreamToolCall>>,
}

#[derive(Debug, Deserialize)]
struct StreamToolCall {
    #[serde(default)]
    index: u32,
    id: Option<String>,
    function: Option<StreamFunction>,
}

#[derive(Debug, Deserialize)]
struct StreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> OpenAIProvider {
        OpenAIProvider::new(ProviderConfig {
            api_key: Some("test-key".into()),
            model: Some("gpt-4o".into()),
            ..Default::default()
        })
    }

    #[test]
    fn test_fragmented_arguments_accumulate_and_parse() {
        let mut acc = ToolCallAccumulator::default();
        acc.push(0, Some("call_1"), Some("list_directory"), Some(r#"{"path":"#));
        acc.push(0, None, None, Some(r#""/tmp"}"#));

        let calls = acc.finish();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].name, "list_directory");
        assert_eq!(calls[0].arguments, serde_json::json!({"path": "/tmp"}));
    }

    #[test]
    fn test_malformed_arguments_drop_only_that_call() {
        let mut acc = ToolCallAccumulator::default();
        acc.push(0, Some("call_1"), Some("broken"), Some(r#"{"path":"#));
        acc.push(1, Some("call_2"), Some("ok"), Some(r#"{"x":1}"#));

        let calls = acc.finish();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "ok");
    }

    #[test]
    fn test_interleaved_fragments_by_index() {
        let mut acc = ToolCallAccumulator::default();
        acc.push(1, Some("b"), Some("second"), Some(r#"{"n":"#));
        acc.push(0, Some("a"), Some("first"), Some("{}"));
        acc.push(1, None, None, Some("2}"));

        let calls = acc.finish();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "first");
        assert_eq!(calls[1].arguments, serde_json::json!({"n": 2}));
    }

    #[test]
    fn test_create_messages_pairs_each_call_with_its_result() {
        let p = provider();
        let calls = vec![
            ToolCallRequest::new("call_a", "git_status", serde_json::json!({})),
            ToolCallRequest::new("call_b", "git_diff", serde_json::json!({"staged": true})),
        ];
        let messages = vec![
            Message::user("check the repo"),
            Message::assistant_with_tools("Checking.", calls),
            Message::tool_result("call_a", "git_status", "clean"),
            Message::tool_result("call_b", "git_diff", "no changes"),
        ];

        let wire = p.create_messages("sys", &messages);
        let arr = wire.as_array().unwrap();
        // system, user, (assistant, tool) x2
        assert_eq!(arr.len(), 6);
        assert_eq!(arr[0]["role"], "system");
        assert_eq!(arr[1]["role"], "user");

        assert_eq!(arr[2]["role"], "assistant");
        assert_eq!(arr[2]["tool_calls"].as_array().unwrap().len(), 1);
        assert_eq!(arr[2]["tool_calls"][0]["id"], "call_a");
        assert_eq!(arr[3]["role"], "tool");
        assert_eq!(arr[3]["tool_call_id"], "call_a");
        assert_eq!(arr[3]["content"], "clean");

        assert_eq!(arr[4]["role"], "assistant");
        assert_eq!(arr[4]["tool_calls"][0]["id"], "call_b");
        assert_eq!(arr[5]["role"], "tool");
        assert_eq!(arr[5]["tool_call_id"], "call_b");
    }

    #[test]
    fn test_create_messages_missing_result_gets_placeholder() {
        let p = provider();
        let messages = vec![Message::assistant_with_tools(
            "",
            vec![ToolCallRequest::new("call_x", "read_file", serde_json::json!({}))],
        )];
        let wire = p.create_messages("", &messages);
        let arr = wire.as_array().unwrap();
        assert_eq!(arr[1]["role"], "tool");
        assert!(arr[1]["content"].as_str().unwrap().contains("Error"));
    }

    #[test]
    fn test_format_tools_openai_shape() {
        let p = provider();
        let tools = vec![ToolSchema::new(
            "read_file",
            "Read a file",
            serde_json::json!({"type": "object", "properties": {}}),
        )];
        let formatted = p.format_tools_for_api(&tools);
        assert_eq!(formatted[0]["type"], "function");
        assert_eq!(formatted[0]["function"]["name"], "read_file");
        assert!(formatted[0]["function"]["parameters"].is_object());
    }

    #[test]
    fn test_azure_endpoint_shape() {
        let p = OpenAIProvider::new(ProviderConfig {
            api_key: Some("k".into()),
            api_type: Some("azure".into()),
            azure_endpoint: Some("https://example.openai.azure.com/".into()),
            azure_deployment: Some("gpt4o".into()),
            azure_api_version: Some("2024-02-01".into()),
            ..Default::default()
        });
        assert_eq!(
            p.endpoint(),
            "https://example.openai.azure.com/openai/deployments/gpt4o/chat/completions?api-version=2024-02-01"
        );
        assert!(p.validate_config().is_ok());
    }

    #[test]
    fn test_o_series_payload_uses_max_completion_tokens() {
        let p = OpenAIProvider::new(ProviderConfig {
            api_key: Some("k".into()),
            model: Some("o3-mini".into()),
            ..Default::default()
        });
        let payload = p.build_payload("", &[Message::user("hi")], &ChatOptions::default(), None);
        assert!(payload.get("max_completion_tokens").is_some());
        assert!(payload.get("temperature").is_none());

        let gpt = provider().build_payload("", &[Message::user("hi")], &ChatOptions::default(), None);
        assert!(gpt.get("max_tokens").is_some());
        assert!(gpt.get("temperature").is_some());
    }
}
