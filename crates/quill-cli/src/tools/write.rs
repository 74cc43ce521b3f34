//! File creation tool

use std::fs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use quill_agent::{Operator, Tool};
use serde_json::json;

use super::safety::validate_path;

/// Creates a file, refusing to clobber unless `overwrite` is set. Parent
/// directories are created as needed. Writes targeting the session summary
/// file get the metadata header injected automatically so the cutoff
/// bookkeeping stays correct no matter who writes the summary.
pub struct CreateFileTool {
    operator: Arc<dyn Operator>,
    recent_window_bytes: u64,
}

impl CreateFileTool {
    pub fn new(operator: Arc<dyn Operator>, recent_window_bytes: u64) -> Self {
        Self {
            operator,
            recent_window_bytes,
        }
    }
}

#[async_trait]
impl Tool for CreateFileTool {
    fn name(&self) -> &str {
        "create_file"
    }

    fn description(&self) -> &str {
        "Create a new file with specified content. Returns success message or error."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path where the new file should be created (absolute or relative to current directory)"
                },
                "content": {
                    "type": "string",
                    "description": "The content to write to the new file"
                },
                "overwrite": {
                    "type": "boolean",
                    "description": "Whether to overwrite if file already exists (default: false)",
                    "default": false
                }
            },
            "required": ["file_path", "content"]
        })
    }

    async fn execute(&self, arguments: &serde_json::Value) -> String {
        let Some(file_path) = arguments.get("file_path").and_then(|v| v.as_str()) else {
            return "Error creating file: missing 'file_path' argument".into();
        };
        let content = arguments
            .get("content")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let overwrite = arguments
            .get("overwrite")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let resolved = match validate_path(file_path, "create file", &self.operator).await {
            Ok(p) => p,
            Err(denial) => return denial,
        };

        if resolved.exists() && !overwrite {
            return format!(
                "File already exists: {}. Set overwrite=true to replace it.",
                file_path
            );
        }

        if let Some(parent) = resolved.parent() {
            if !parent.exists() {
                if let Err(e) = fs::create_dir_all(parent) {
                    return format!("Error creating file: {}", e);
                }
            }
        }

        let content = if is_summary_file(&resolved) {
            format!("{}{}", self.summary_metadata(&resolved), content)
        } else {
            content.to_string()
        };

        match fs::write(&resolved, &content) {
            Ok(()) => format!(
                "Successfully created file: {} ({} characters)",
                file_path,
                content.len()
            ),
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                format!("Permission denied creating file: {}", file_path)
            }
            Err(e) => format!("Error creating file: {}", e),
        }
    }
}

impl CreateFileTool {
    /// Metadata header recording the new cutoff byte for the session's
    /// history log (sibling of the summary file).
    fn summary_metadata(&self, summary_path: &Path) -> String {
        let history = summary_path
            .parent()
            .map(|dir| dir.join("history.txt"))
            .filter(|p| p.exists());
        let cutoff = history
            .and_then(|p| fs::metadata(p).ok())
            .map(|m| m.len().saturating_sub(self.recent_window_bytes))
            .unwrap_or(0);

        let date = chrono::Local::now().format("%Y-%m-%d");
        format!(
            "<!-- SUMMARY_METADATA\ncutoff_byte: {}\nlast_updated: {}\n-->\n\n",
            cutoff, date
        )
    }
}

fn is_summary_file(path: &Path) -> bool {
    path.file_name().map(|n| n == "summary.md").unwrap_or(false)
        && path
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n == quill_agent::memory::SESSION_DIR_NAME)
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_agent::{PlanDecision, ToolApproval};
    use std::path::PathBuf;

    /// Operator that approves outside-project writes (tests run in temp dirs)
    struct PermissiveOperator;

    #[async_trait]
    impl Operator for PermissiveOperator {
        async fn review_plan(&self, _plan: &str) -> PlanDecision {
            PlanDecision::Approve
        }
        async fn confirm_revised_plan(&self, _plan: &str) -> bool {
            true
        }
        async fn approve_tool(&self, _name: &str, _args: &serde_json::Value) -> ToolApproval {
            ToolApproval::AllowOnce
        }
        async fn confirm_outside_path(&self, _path: &str, _operation: &str) -> bool {
            true
        }
    }

    fn tool() -> CreateFileTool {
        CreateFileTool::new(Arc::new(PermissiveOperator), 2000)
    }

    fn temp_root(tag: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!("quill-write-{}-{}", tag, std::process::id()));
        let _ = fs::remove_dir_all(&root);
        fs::create_dir_all(&root).unwrap();
        root
    }

    #[tokio::test]
    async fn test_creates_file_with_parents() {
        let root = temp_root("create");
        let target = root.join("deep/nested/file.txt");
        let out = tool()
            .execute(&json!({"file_path": target.to_str().unwrap(), "content": "hello"}))
            .await;
        assert!(out.starts_with("Successfully created file:"), "got: {}", out);
        assert_eq!(fs::read_to_string(&target).unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_refuses_to_clobber_without_overwrite() {
        let root = temp_root("clobber");
        let target = root.join("file.txt");
        fs::write(&target, "original").unwrap();

        let out = tool()
            .execute(&json!({"file_path": target.to_str().unwrap(), "content": "new"}))
            .await;
        assert!(out.contains("already exists"));
        assert_eq!(fs::read_to_string(&target).unwrap(), "original");

        let out = tool()
            .execute(&json!({
                "file_path": target.to_str().unwrap(),
                "content": "new",
                "overwrite": true
            }))
            .await;
        assert!(out.starts_with("Successfully created file:"));
        assert_eq!(fs::read_to_string(&target).unwrap(), "new");
    }

    #[tokio::test]
    async fn test_summary_file_gets_cutoff_metadata() {
        let root = temp_root("summary");
        let session_dir = root.join(".quill");
        fs::create_dir_all(&session_dir).unwrap();
        fs::write(session_dir.join("history.txt"), "x".repeat(10_000)).unwrap();

        let target = session_dir.join("summary.md");
        let out = tool()
            .execute(&json!({
                "file_path": target.to_str().unwrap(),
                "content": "# Summary",
                "overwrite": true
            }))
            .await;
        assert!(out.starts_with("Successfully created file:"), "got: {}", out);

        let written = fs::read_to_string(&target).unwrap();
        assert!(written.starts_with("<!-- SUMMARY_METADATA"));
        assert!(written.contains("cutoff_byte: 8000"));
        assert!(written.contains("# Summary"));
    }

    #[tokio::test]
    async fn test_non_summary_markdown_untouched() {
        let root = temp_root("plain-md");
        let target = root.join("notes.md");
        tool()
            .execute(&json!({"file_path": target.to_str().unwrap(), "content": "# Notes"}))
            .await;
        assert_eq!(fs::read_to_string(&target).unwrap(), "# Notes");
    }

    #[tokio::test]
    async fn test_system_path_denied() {
        let out = tool()
            .execute(&json!({"file_path": "/etc/quill-test.conf", "content": "x"}))
            .await;
        assert!(out.contains("denied"), "got: {}", out);
    }
}
