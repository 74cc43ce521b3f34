//! Core types for LLM interactions

use serde::{Deserialize, Serialize};

/// A tool invocation requested by the model.
///
/// The `id` must round-trip back into the provider-specific tool-result
/// message so the provider can correlate call and result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

impl ToolCallRequest {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Provider-agnostic tool definition.
///
/// Adapters reshape this into their native function-calling schema via
/// [`crate::Provider::format_tools_for_api`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool parameters
    pub parameters: serde_json::Value,
}

impl ToolSchema {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// Provider-agnostic conversation message.
///
/// The system prompt travels separately (providers disagree on where it
/// lives), so there is no `System` variant here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    User {
        content: String,
    },
    Assistant {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCallRequest>,
    },
    /// Result of one executed tool call, keyed by the call id
    Tool {
        tool_call_id: String,
        name: String,
        content: String,
    },
}

impl Message {
    /// Create a user message
    pub fn user(text: impl Into<String>) -> Self {
        Self::User {
            content: text.into(),
        }
    }

    /// Create a text-only assistant message
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::Assistant {
            content: text.into(),
            tool_calls: vec![],
        }
    }

    /// Create an assistant message carrying tool calls
    pub fn assistant_with_tools(text: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self::Assistant {
            content: text.into(),
            tool_calls,
        }
    }

    /// Create a tool result message
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::Tool {
            tool_call_id: tool_call_id.into(),
            name: name.into(),
            content: content.into(),
        }
    }

    /// Get the role as a string
    pub fn role(&self) -> &'static str {
        match self {
            Self::User { .. } => "user",
            Self::Assistant { .. } => "assistant",
            Self::Tool { .. } => "tool",
        }
    }

    /// Get the text content
    pub fn content(&self) -> &str {
        match self {
            Self::User { content } => content,
            Self::Assistant { content, .. } => content,
            Self::Tool { content, .. } => content,
        }
    }
}

/// One normalized event from a provider stream.
///
/// Every adapter emits this shape regardless of vendor wire format. Exactly
/// one terminal event per turn carries `Some(finish_reason)`; tool calls only
/// ever appear on the terminal event, after fragment accumulation completes.
#[derive(Debug, Clone, Default)]
pub struct StreamEvent {
    pub content_delta: String,
    pub finish_reason: Option<String>,
    pub tool_calls: Option<Vec<ToolCallRequest>>,
}

impl StreamEvent {
    /// A content-only delta event
    pub fn delta(text: impl Into<String>) -> Self {
        Self {
            content_delta: text.into(),
            finish_reason: None,
            tool_calls: None,
        }
    }

    /// The terminal event for a turn
    pub fn finished(reason: impl Into<String>, tool_calls: Option<Vec<ToolCallRequest>>) -> Self {
        Self {
            content_delta: String::new(),
            finish_reason: Some(reason.into()),
            tool_calls,
        }
    }

    /// Whether this event terminates the turn
    pub fn is_terminal(&self) -> bool {
        self.finish_reason.is_some()
    }
}

/// Sampling options for a chat request
#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 2000,
        }
    }
}

/// The fixed set of supported providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAI,
    Anthropic,
    Google,
    Ollama,
    OpenRouter,
}

impl ProviderKind {
    /// Parse a configuration string into a provider kind.
    /// Unrecognized names default to OpenAI, matching historical behavior.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "anthropic" => Self::Anthropic,
            "google" | "gemini" => Self::Google,
            "ollama" => Self::Ollama,
            "openrouter" => Self::OpenRouter,
            _ => Self::OpenAI,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenAI => "openai",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
            Self::Ollama => "ollama",
            Self::OpenRouter => "openrouter",
        }
    }
}

/// Configuration consumed by provider constructors.
///
/// Assembled once per invocation from the config file and environment;
/// adapters validate the fields they require and fail fast with
/// [`crate::Error::Config`] before any network call.
#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    /// "azure" routes OpenAI requests through an Azure deployment
    pub api_type: Option<String>,
    pub azure_endpoint: Option<String>,
    pub azure_deployment: Option<String>,
    pub azure_api_version: Option<String>,
}

/// Context window size (in tokens) for known models.
///
/// Used by the memory manager to budget how much recent history fits into a
/// request. Unknown models get a generous default.
pub fn context_window_for(model: &str) -> u32 {
    match model {
        "gpt-3.5-turbo" => 4_097,
        "gpt-3.5-turbo-16k" | "gpt-3.5-turbo-1106" => 16_385,
        "gpt-4" => 8_192,
        "gpt-4-32k" => 32_768,
        "gpt-4-turbo" | "gpt-4-turbo-preview" | "gpt-4o" | "gpt-4o-mini" => 128_000,
        m if m.starts_with("o1") || m.starts_with("o3") || m.starts_with("o4") => 200_000,
        m if m.starts_with("claude") => 200_000,
        _ => 100_000,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_parse() {
        assert_eq!(ProviderKind::parse("anthropic"), ProviderKind::Anthropic);
        assert_eq!(ProviderKind::parse("gemini"), ProviderKind::Google);
        assert_eq!(ProviderKind::parse("OpenRouter"), ProviderKind::OpenRouter);
        assert_eq!(ProviderKind::parse("ollama"), ProviderKind::Ollama);
        // unknown names fall back to openai
        assert_eq!(ProviderKind::parse("something-else"), ProviderKind::OpenAI);
    }

    #[test]
    fn test_stream_event_terminal() {
        assert!(!StreamEvent::delta("hi").is_terminal());
        assert!(StreamEvent::finished("stop", None).is_terminal());
    }

    #[test]
    fn test_context_window_lookup() {
        assert_eq!(context_window_for("gpt-4"), 8_192);
        assert_eq!(context_window_for("o3-mini"), 200_000);
        assert_eq!(context_window_for("claude-sonnet-4-5-20250929"), 200_000);
        assert_eq!(context_window_for("llama3.2"), 100_000);
    }

    #[test]
    fn test_message_roles() {
        assert_eq!(Message::user("hi").role(), "user");
        assert_eq!(Message::assistant("yo").role(), "assistant");
        assert_eq!(Message::tool_result("id", "read_file", "out").role(), "tool");
    }
}
