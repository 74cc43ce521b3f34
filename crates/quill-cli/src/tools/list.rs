//! Directory listing tool

use async_trait::async_trait;
use quill_agent::Tool;
use serde_json::json;
use std::fs;
use std::path::Path;

/// Lists directory contents, directories before files, files annotated with
/// their size. Missing or wrong-kind paths fail softly with a message.
pub struct ListDirTool;

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "List files and directories in a specified path. Use this to explore project structure and find relevant files."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the directory to list (absolute or relative to current directory). Use '.' for current directory."
                },
                "show_hidden": {
                    "type": "boolean",
                    "description": "Whether to show hidden files/directories (those starting with '.'). Default: false",
                    "default": false
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, arguments: &serde_json::Value) -> String {
        let path_str = arguments
            .get("path")
            .and_then(|v| v.as_str())
            .unwrap_or(".");
        let show_hidden = arguments
            .get("show_hidden")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let path = Path::new(path_str);
        if !path.exists() {
            return format!("Directory not found: {}", path_str);
        }
        if !path.is_dir() {
            return format!("Not a directory: {}", path_str);
        }

        let entries = match fs::read_dir(path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return format!("Permission denied accessing directory: {}", path_str);
            }
            Err(e) => return format!("Error listing directory: {}", e),
        };

        let mut dirs = Vec::new();
        let mut files = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if !show_hidden && name.starts_with('.') {
                continue;
            }
            let file_type = entry.file_type();
            if file_type.as_ref().map(|t| t.is_dir()).unwrap_or(false) {
                dirs.push(name);
            } else {
                let size = entry.metadata().map(|m| m.len()).ok();
                files.push((name, size));
            }
        }
        dirs.sort();
        files.sort_by(|a, b| a.0.cmp(&b.0));

        if dirs.is_empty() && files.is_empty() {
            return format!("Directory is empty: {}", path_str);
        }

        let mut lines = vec![format!(
            "Listing {} ({} directories, {} files):\n",
            path_str,
            dirs.len(),
            files.len()
        )];
        if !dirs.is_empty() {
            lines.push("Directories:".into());
            for d in &dirs {
                lines.push(format!("  {}/", d));
            }
        }
        if !files.is_empty() {
            if !dirs.is_empty() {
                lines.push(String::new());
            }
            lines.push("Files:".into());
            for (name, size) in &files {
                match size {
                    Some(size) if *size < 1024 => lines.push(format!("  {} ({} bytes)", name, size)),
                    Some(size) => lines.push(format!("  {} ({:.1} KB)", name, *size as f64 / 1024.0)),
                    None => lines.push(format!("  {}", name)),
                }
            }
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn fixture(tag: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!("quill-list-{}-{}", tag, std::process::id()));
        let _ = fs::remove_dir_all(&root);
        fs::create_dir_all(root.join("subdir")).unwrap();
        fs::write(root.join("b.txt"), "hello").unwrap();
        fs::write(root.join("a.txt"), "x".repeat(2048)).unwrap();
        fs::write(root.join(".hidden"), "secret").unwrap();
        root
    }

    #[tokio::test]
    async fn test_dirs_before_files_with_sizes() {
        let root = fixture("basic");
        let out = ListDirTool
            .execute(&json!({"path": root.to_str().unwrap()}))
            .await;

        let dirs_pos = out.find("Directories:").unwrap();
        let files_pos = out.find("Files:").unwrap();
        assert!(dirs_pos < files_pos);
        assert!(out.contains("subdir/"));
        assert!(out.contains("b.txt (5 bytes)"));
        assert!(out.contains("a.txt (2.0 KB)"));
        assert!(!out.contains(".hidden"));
    }

    #[tokio::test]
    async fn test_show_hidden() {
        let root = fixture("hidden");
        let out = ListDirTool
            .execute(&json!({"path": root.to_str().unwrap(), "show_hidden": true}))
            .await;
        assert!(out.contains(".hidden"));
    }

    #[tokio::test]
    async fn test_missing_path_soft_failure() {
        let out = ListDirTool
            .execute(&json!({"path": "/nonexistent/quill/dir"}))
            .await;
        assert!(out.starts_with("Directory not found:"));
    }

    #[tokio::test]
    async fn test_not_a_directory_soft_failure() {
        let root = fixture("notdir");
        let file = root.join("b.txt");
        let out = ListDirTool
            .execute(&json!({"path": file.to_str().unwrap()}))
            .await;
        assert!(out.starts_with("Not a directory:"));
    }
}
