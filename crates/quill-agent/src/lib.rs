//! quill-agent: agent runtime with tool execution and conversation memory
//!
//! Drives the plan/approve/execute/reflect loop over a [`quill_ai::Provider`],
//! executes tools through a validated registry, and keeps long conversations
//! inside the context window via byte-cutoff history compaction.

pub mod agent;
pub mod error;
pub mod format;
pub mod host;
pub mod memory;
pub mod plan;
pub mod tool;
pub mod turn;

pub use agent::{Agent, AgentConfig, AgentLoopState, run_tool_loop};
pub use error::{Error, Result};
pub use host::{
    DisplaySink, EditorSurface, NullEditor, NullSink, Operator, PlanDecision, SplitMode,
    ToolApproval,
};
pub use memory::{Memory, MemoryConfig};
pub use tool::{BoxedTool, Tool, ToolRegistry};
pub use turn::{TurnOutcome, generate_text, run_streamed_turn};
