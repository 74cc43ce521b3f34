//! Streaming orchestrator: drives one provider call to completion

use futures::StreamExt;
use quill_ai::{ChatOptions, Message, Provider, StreamEvent, ToolCallRequest, ToolSchema};

use crate::error::Result;
use crate::host::{DisplaySink, NullSink};

/// What one streamed turn produced
#[derive(Debug, Default)]
pub struct TurnOutcome {
    /// All content deltas concatenated
    pub content: String,
    /// Finish reason from the terminal event; `None` means the stream ended
    /// without one (protocol violation, treated as a completed turn)
    pub finish_reason: Option<String>,
    /// Tool calls carried by the terminal event
    pub tool_calls: Vec<ToolCallRequest>,
}

/// Drive exactly one `stream_chat` call to completion.
///
/// Every non-empty content delta is forwarded to the sink as it arrives and
/// accumulated into the turn buffer for later inspection (plan detection,
/// transcript reconstruction). The terminal event's finish reason and tool
/// calls are recorded; a stream that ends without a terminal event does not
/// hang — it yields an outcome with no tool calls.
pub async fn run_streamed_turn(
    provider: &dyn Provider,
    system: &str,
    messages: &[Message],
    options: &ChatOptions,
    tools: Option<&[ToolSchema]>,
    sink: &dyn DisplaySink,
) -> Result<TurnOutcome> {
    let mut stream = provider.stream_chat(system, messages, options, tools).await?;

    let mut outcome = TurnOutcome::default();

    while let Some(event) = stream.next().await {
        let StreamEvent {
            content_delta,
            finish_reason,
            tool_calls,
        } = event?;

        if !content_delta.is_empty() {
            sink.append(&content_delta);
            outcome.content.push_str(&content_delta);
        }

        if let Some(reason) = finish_reason {
            sink.turn_complete(&reason);
            outcome.finish_reason = Some(reason);
            if let Some(calls) = tool_calls {
                outcome.tool_calls = calls;
            }
        }
    }

    if outcome.finish_reason.is_none() {
        tracing::warn!("Stream ended without a terminal event; treating turn as complete");
    }

    Ok(outcome)
}

/// One-shot text generation with no tools and no display, used by
/// summarization and other background calls.
pub async fn generate_text(
    provider: &dyn Provider,
    system: &str,
    prompt: &str,
    options: &ChatOptions,
) -> Result<String> {
    let messages = vec![Message::user(prompt)];
    let outcome = run_streamed_turn(provider, system, &messages, options, None, &NullSink).await?;
    Ok(outcome.content)
}
