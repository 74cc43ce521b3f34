//! Git tools: thin subprocess wrappers with fixed timeouts

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use quill_agent::Tool;
use serde_json::json;
use tokio::process::Command;

/// Run one git command with a timeout, formatting failures as strings.
async fn run_git(args: &[&str], timeout_secs: u64, cwd: &Path) -> Result<String, String> {
    let output = tokio::time::timeout(
        Duration::from_secs(timeout_secs),
        Command::new("git").args(args).current_dir(cwd).output(),
    )
    .await;

    match output {
        Ok(Ok(output)) => {
            if output.status.success() {
                Ok(String::from_utf8_lossy(&output.stdout).to_string())
            } else {
                Err(format!(
                    "Git error: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ))
            }
        }
        Ok(Err(e)) => Err(format!("Error running git {}: {}", args.first().unwrap_or(&""), e)),
        Err(_) => Err(format!(
            "Tool execution timed out: git {}",
            args.first().unwrap_or(&"")
        )),
    }
}

fn cwd() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

fn no_args_schema() -> serde_json::Value {
    json!({ "type": "object", "properties": {}, "required": [] })
}

/// Working-tree status with recent commits for context
pub struct GitStatusTool;

#[async_trait]
impl Tool for GitStatusTool {
    fn name(&self) -> &str {
        "git_status"
    }

    fn description(&self) -> &str {
        "Get the current git repository status, including staged, unstaged, and untracked files, plus recent commit history for context."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        no_args_schema()
    }

    async fn execute(&self, _arguments: &serde_json::Value) -> String {
        let dir = cwd();
        let status = match run_git(&["status"], 10, &dir).await {
            Ok(out) => out,
            Err(e) => return e,
        };

        let mut parts = vec!["=== Git Status ===".to_string(), status];
        if let Ok(log) = run_git(&["log", "-5", "--oneline"], 10, &dir).await {
            parts.push("\n=== Recent Commits ===".to_string());
            parts.push(log);
        }
        parts.join("\n")
    }
}

/// Diff of working tree or staging area, with short status for context
pub struct GitDiffTool;

#[async_trait]
impl Tool for GitDiffTool {
    fn name(&self) -> &str {
        "git_diff"
    }

    fn description(&self) -> &str {
        "Show changes in the working directory or staging area. Use this to see what has been modified."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "staged": {
                    "type": "boolean",
                    "description": "If true, show staged changes (git diff --cached). If false, show unstaged changes. Default: false",
                    "default": false
                },
                "file_path": {
                    "type": "string",
                    "description": "Optional: specific file path to diff. If not provided, shows all changes."
                }
            },
            "required": []
        })
    }

    async fn execute(&self, arguments: &serde_json::Value) -> String {
        let staged = arguments.get("staged").and_then(|v| v.as_bool()).unwrap_or(false);
        let file_path = arguments.get("file_path").and_then(|v| v.as_str());
        let dir = cwd();

        let mut parts = Vec::new();
        if let Ok(status) = run_git(&["status", "-s"], 10, &dir).await {
            parts.push("=== Git Status (short) ===".to_string());
            parts.push(if status.trim().is_empty() {
                "No changes".to_string()
            } else {
                status
            });
        }

        let mut args = vec!["diff"];
        if staged {
            args.push("--cached");
        }
        if let Some(path) = file_path {
            args.push(path);
        }

        match run_git(&args, 30, &dir).await {
            Ok(diff) => {
                let kind = if staged { "Staged Changes" } else { "Unstaged Changes" };
                let file_info = file_path.map(|p| format!(" ({})", p)).unwrap_or_default();
                parts.push(format!("\n=== {}{} ===", kind, file_info));
                parts.push(if diff.trim().is_empty() {
                    "No changes found.".to_string()
                } else {
                    diff
                });
                parts.join("\n")
            }
            Err(e) => e,
        }
    }
}

/// Commit history
pub struct GitLogTool;

#[async_trait]
impl Tool for GitLogTool {
    fn name(&self) -> &str {
        "git_log"
    }

    fn description(&self) -> &str {
        "Show commit history. Useful for understanding recent changes and commit patterns."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "max_count": {
                    "type": "integer",
                    "description": "Maximum number of commits to show (default: 10)",
                    "default": 10
                },
                "oneline": {
                    "type": "boolean",
                    "description": "If true, show compact one-line format (default: true)",
                    "default": true
                },
                "file_path": {
                    "type": "string",
                    "description": "Optional: show history for a specific file path"
                }
            },
            "required": []
        })
    }

    async fn execute(&self, arguments: &serde_json::Value) -> String {
        let max_count = arguments.get("max_count").and_then(|v| v.as_u64()).unwrap_or(10);
        let oneline = arguments.get("oneline").and_then(|v| v.as_bool()).unwrap_or(true);
        let file_path = arguments.get("file_path").and_then(|v| v.as_str());

        let args = log_args(max_count, oneline, file_path);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        match run_git(&args, 10, &cwd()).await {
            Ok(out) if out.trim().is_empty() => "No commits found.".to_string(),
            Ok(out) => out,
            Err(e) => e,
        }
    }
}

fn log_args(max_count: u64, oneline: bool, file_path: Option<&str>) -> Vec<String> {
    let mut args = vec!["log".to_string(), format!("-{}", max_count)];
    if oneline {
        args.push("--oneline".to_string());
    }
    if let Some(path) = file_path {
        args.push(path.to_string());
    }
    args
}

/// Details of one commit
pub struct GitShowTool;

#[async_trait]
impl Tool for GitShowTool {
    fn name(&self) -> &str {
        "git_show"
    }

    fn description(&self) -> &str {
        "Show details of a specific commit including the full diff."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "commit": {
                    "type": "string",
                    "description": "Commit hash, branch name, or reference (e.g., 'HEAD', 'HEAD~1', 'abc123')"
                }
            },
            "required": ["commit"]
        })
    }

    async fn execute(&self, arguments: &serde_json::Value) -> String {
        let Some(commit) = arguments.get("commit").and_then(|v| v.as_str()) else {
            return "Error running git show: missing 'commit' argument".into();
        };
        match run_git(&["show", commit], 30, &cwd()).await {
            Ok(out) => out,
            Err(e) => e,
        }
    }
}

/// Branch listing / current branch
pub struct GitBranchTool;

#[async_trait]
impl Tool for GitBranchTool {
    fn name(&self) -> &str {
        "git_branch"
    }

    fn description(&self) -> &str {
        "List branches or get current branch information."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "list_all": {
                    "type": "boolean",
                    "description": "If true, list all branches. If false, show only the current branch (default: false)",
                    "default": false
                }
            },
            "required": []
        })
    }

    async fn execute(&self, arguments: &serde_json::Value) -> String {
        let list_all = arguments.get("list_all").and_then(|v| v.as_bool()).unwrap_or(false);
        let args: &[&str] = if list_all {
            &["branch", "-a"]
        } else {
            &["branch", "--show-current"]
        };
        match run_git(args, 5, &cwd()).await {
            Ok(out) => out.trim().to_string(),
            Err(e) => e,
        }
    }
}

/// Stage files
pub struct GitAddTool;

#[async_trait]
impl Tool for GitAddTool {
    fn name(&self) -> &str {
        "git_add"
    }

    fn description(&self) -> &str {
        "Stage files for commit. Use this to add files to the staging area."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "files": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "List of file paths to stage. Use ['.'] to stage all changes."
                }
            },
            "required": ["files"]
        })
    }

    async fn execute(&self, arguments: &serde_json::Value) -> String {
        let files = string_array(arguments.get("files"));
        if files.is_empty() {
            return "Error: No files specified to add.".into();
        }

        let dir = cwd();
        let mut args = vec!["add".to_string()];
        args.extend(files.iter().cloned());
        let args_ref: Vec<&str> = args.iter().map(String::as_str).collect();

        match run_git(&args_ref, 30, &dir).await {
            Ok(_) => {
                let mut parts = vec![format!("Successfully staged: {}", files.join(", "))];
                if let Ok(status) = run_git(&["status", "-s"], 10, &dir).await {
                    parts.push("\n=== Updated Status ===".to_string());
                    parts.push(if status.trim().is_empty() {
                        "No changes".to_string()
                    } else {
                        status
                    });
                }
                parts.join("\n")
            }
            Err(e) => e,
        }
    }
}

/// Unstage files (never touches the working tree)
pub struct GitResetTool;

#[async_trait]
impl Tool for GitResetTool {
    fn name(&self) -> &str {
        "git_reset"
    }

    fn description(&self) -> &str {
        "Unstage files from the staging area (does not modify the working directory). Safe operation."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "files": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "List of file paths to unstage. If empty, unstages all files."
                }
            },
            "required": []
        })
    }

    async fn execute(&self, arguments: &serde_json::Value) -> String {
        let files = string_array(arguments.get("files"));

        let mut args = vec!["reset".to_string(), "HEAD".to_string()];
        args.extend(files.iter().cloned());
        let args_ref: Vec<&str> = args.iter().map(String::as_str).collect();

        match run_git(&args_ref, 10, &cwd()).await {
            Ok(_) => {
                if files.is_empty() {
                    "Successfully unstaged all files.".to_string()
                } else {
                    format!("Successfully unstaged: {}", files.join(", "))
                }
            }
            Err(e) => e,
        }
    }
}

/// Commit staged changes. Gathers status, the staged diff, and recent
/// history before attempting the commit so failure messages carry context.
pub struct GitCommitTool;

#[async_trait]
impl Tool for GitCommitTool {
    fn name(&self) -> &str {
        "git_commit"
    }

    fn description(&self) -> &str {
        "Create a new commit with staged changes. Only works if there are staged changes."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "Commit message. Should be descriptive."
                },
                "amend": {
                    "type": "boolean",
                    "description": "If true, amend the previous commit instead of creating a new one (default: false)",
                    "default": false
                }
            },
            "required": ["message"]
        })
    }

    async fn execute(&self, arguments: &serde_json::Value) -> String {
        let message = arguments.get("message").and_then(|v| v.as_str());
        let amend = arguments.get("amend").and_then(|v| v.as_bool()).unwrap_or(false);

        if message.is_none() && !amend {
            return "Error: Commit message is required.".into();
        }

        let dir = cwd();
        let mut parts = Vec::new();

        match run_git(&["status"], 10, &dir).await {
            Ok(status) => {
                parts.push("=== Git Status ===".to_string());
                parts.push(status);
            }
            Err(e) => parts.push(format!("Warning: could not get git status: {}", e)),
        }

        match run_git(&["diff", "--cached"], 30, &dir).await {
            Ok(diff) => {
                parts.push("\n=== Staged Changes (will be committed) ===".to_string());
                parts.push(if diff.trim().is_empty() {
                    "No staged changes found.".to_string()
                } else {
                    diff
                });
            }
            Err(e) => parts.push(format!("\nWarning: could not get staged changes: {}", e)),
        }

        if let Ok(log) = run_git(&["log", "-5", "--oneline"], 10, &dir).await {
            parts.push("\n=== Recent Commits ===".to_string());
            parts.push(log);
        }

        let mut args = vec!["commit".to_string()];
        if amend {
            args.push("--amend".to_string());
        }
        if let Some(message) = message {
            args.push("-m".to_string());
            args.push(message.to_string());
        }
        let args_ref: Vec<&str> = args.iter().map(String::as_str).collect();

        parts.push("\n=== Commit Result ===".to_string());
        match run_git(&args_ref, 30, &dir).await {
            Ok(out) => parts.push(format!("Commit successful:\n{}", out)),
            Err(e) if e.contains("nothing to commit") || e.contains("no changes added") => {
                parts.push("Error: No changes staged for commit. Use git_add first.".to_string());
            }
            Err(e) => parts.push(e),
        }
        parts.join("\n")
    }
}

fn string_array(value: Option<&serde_json::Value>) -> Vec<String> {
    value
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_args_assembly() {
        assert_eq!(log_args(10, true, None), vec!["log", "-10", "--oneline"]);
        assert_eq!(
            log_args(5, false, Some("src/main.rs")),
            vec!["log", "-5", "src/main.rs"]
        );
    }

    #[test]
    fn test_string_array_parsing() {
        let value = json!(["a.rs", "b.rs"]);
        assert_eq!(string_array(Some(&value)), vec!["a.rs", "b.rs"]);
        assert!(string_array(None).is_empty());
        assert!(string_array(Some(&json!("not-an-array"))).is_empty());
    }

    #[tokio::test]
    async fn test_run_git_outside_repo_reports_error() {
        let dir = std::env::temp_dir().join(format!("quill-git-{}", std::process::id()));
        let _ = std::fs::create_dir_all(&dir);
        let result = run_git(&["status"], 10, &dir).await;
        // Not a repository (or git missing entirely) — either way a readable
        // error string, never a panic
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_commit_requires_message() {
        let out = GitCommitTool.execute(&json!({})).await;
        assert!(out.contains("Commit message is required"));
    }
}
