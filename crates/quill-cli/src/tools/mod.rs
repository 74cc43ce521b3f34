//! Built-in tools for the agent

mod cwd;
mod edit;
mod git;
mod glob;
mod grep;
mod list;
mod open;
mod read;
pub mod safety;
mod write;

use std::sync::Arc;

use quill_agent::{BoxedTool, EditorSurface, Operator};

pub use cwd::CwdTool;
pub use edit::{EditFileTool, EditLinesTool};
pub use git::{
    GitAddTool, GitBranchTool, GitCommitTool, GitDiffTool, GitLogTool, GitResetTool, GitShowTool,
    GitStatusTool,
};
pub use glob::FindFileTool;
pub use grep::FindInFileTool;
pub use list::ListDirTool;
pub use open::OpenFileTool;
pub use read::ReadFileTool;
pub use write::CreateFileTool;

/// The fixed tool set, wired to the host surfaces.
pub fn builtin_tools(
    operator: Arc<dyn Operator>,
    editor: Arc<dyn EditorSurface>,
    recent_window_bytes: u64,
) -> Vec<BoxedTool> {
    vec![
        Arc::new(CwdTool),
        Arc::new(ListDirTool),
        Arc::new(FindInFileTool),
        Arc::new(FindFileTool),
        Arc::new(ReadFileTool),
        Arc::new(CreateFileTool::new(operator.clone(), recent_window_bytes)),
        Arc::new(OpenFileTool::new(editor)),
        Arc::new(EditFileTool::new(operator.clone())),
        Arc::new(EditLinesTool::new(operator)),
        Arc::new(GitStatusTool),
        Arc::new(GitDiffTool),
        Arc::new(GitLogTool),
        Arc::new(GitShowTool),
        Arc::new(GitBranchTool),
        Arc::new(GitAddTool),
        Arc::new(GitResetTool),
        Arc::new(GitCommitTool),
    ]
}
