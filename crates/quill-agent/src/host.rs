//! Host-surface traits
//!
//! The core never depends on editor internals: display output, interactive
//! approvals, and editor-side effects all flow through these narrow traits,
//! injected where they are needed.

use async_trait::async_trait;

/// Operator response to a presented plan
#[derive(Debug, Clone, PartialEq)]
pub enum PlanDecision {
    Approve,
    /// Request changes; carries the operator's feedback
    Revise(String),
    Reject,
}

/// Operator response to a first-use tool approval prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolApproval {
    AllowOnce,
    AlwaysAllow,
    Deny,
}

/// How the editor should open a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SplitMode {
    Current,
    Horizontal,
    #[default]
    Vertical,
}

impl SplitMode {
    pub fn parse(s: &str) -> Self {
        match s {
            "current" => Self::Current,
            "horizontal" => Self::Horizontal,
            _ => Self::Vertical,
        }
    }
}

/// Receives streamed output. `append` gets incremental text, not whole
/// messages; `turn_complete` fires once per streamed turn.
pub trait DisplaySink: Send + Sync {
    fn append(&self, text: &str);
    fn turn_complete(&self, finish_reason: &str);
}

/// A sink that discards everything. Used for background calls
/// (summarization, context generation) that should not reach the display.
pub struct NullSink;

impl DisplaySink for NullSink {
    fn append(&self, _text: &str) {}
    fn turn_complete(&self, _finish_reason: &str) {}
}

/// Interactive decisions only the operator can make. All methods block the
/// loop until answered; implementations decide how to ask.
#[async_trait]
pub trait Operator: Send + Sync {
    /// Present a plan and wait for approve / revise / reject
    async fn review_plan(&self, plan: &str) -> PlanDecision;

    /// Yes/no confirmation for a revised plan presented mid-execution
    async fn confirm_revised_plan(&self, plan: &str) -> bool;

    /// First-use approval for a tool. Implementations unable to prompt
    /// should deny.
    async fn approve_tool(&self, tool_name: &str, arguments: &serde_json::Value) -> ToolApproval;

    /// Confirmation for a file operation outside the project directory.
    /// Implementations unable to prompt should deny.
    async fn confirm_outside_path(&self, path: &str, operation: &str) -> bool;
}

/// Side effects on the host editor's window surface.
pub trait EditorSurface: Send + Sync {
    /// Open (or re-focus) a file, optionally jumping to a line.
    /// Returns a human-readable description of what happened.
    fn open_file(&self, path: &str, split: SplitMode, line_number: Option<u64>) -> String;
}

/// An editor surface for headless contexts.
pub struct NullEditor;

impl EditorSurface for NullEditor {
    fn open_file(&self, path: &str, _split: SplitMode, line_number: Option<u64>) -> String {
        match line_number {
            Some(line) => format!("No editor attached; would open {} at line {}", path, line),
            None => format!("No editor attached; would open {}", path),
        }
    }
}
