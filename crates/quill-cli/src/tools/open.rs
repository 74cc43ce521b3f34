//! Editor file-opening tool

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use quill_agent::{EditorSurface, SplitMode, Tool};
use serde_json::json;

/// Opens a file on the host editor surface. Re-focusing an already-visible
/// file is idempotent; the editor decides.
pub struct OpenFileTool {
    editor: Arc<dyn EditorSurface>,
}

impl OpenFileTool {
    pub fn new(editor: Arc<dyn EditorSurface>) -> Self {
        Self { editor }
    }
}

#[async_trait]
impl Tool for OpenFileTool {
    fn name(&self) -> &str {
        "open_file"
    }

    fn description(&self) -> &str {
        "Open a file in the editor to show it to the user. Use this when you need the user to see the file contents."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path to the file to open (absolute or relative to current directory)"
                },
                "split": {
                    "type": "string",
                    "description": "How to open the file: 'vertical' (default), 'horizontal', or 'current'",
                    "enum": ["current", "horizontal", "vertical"],
                    "default": "vertical"
                },
                "line_number": {
                    "type": "integer",
                    "description": "Optional: line number to jump to after opening the file (1-indexed)"
                }
            },
            "required": ["file_path"]
        })
    }

    async fn execute(&self, arguments: &serde_json::Value) -> String {
        let Some(file_path) = arguments.get("file_path").and_then(|v| v.as_str()) else {
            return "Error opening file: missing 'file_path' argument".into();
        };
        let split = SplitMode::parse(
            arguments
                .get("split")
                .and_then(|v| v.as_str())
                .unwrap_or("vertical"),
        );
        let line_number = arguments.get("line_number").and_then(|v| v.as_u64());

        if !Path::new(file_path).exists() {
            return format!("File not found: {}", file_path);
        }
        if let Some(line) = line_number {
            if line < 1 {
                return format!("Invalid line number {}, must be >= 1", line);
            }
        }

        self.editor.open_file(file_path, split, line_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::fs;

    struct RecordingEditor {
        opened: Mutex<Vec<(String, Option<u64>)>>,
    }

    impl EditorSurface for RecordingEditor {
        fn open_file(&self, path: &str, _split: SplitMode, line_number: Option<u64>) -> String {
            self.opened.lock().push((path.to_string(), line_number));
            format!("Opened file in editor: {}", path)
        }
    }

    #[tokio::test]
    async fn test_delegates_to_editor_surface() {
        let path = std::env::temp_dir().join(format!("quill-open-{}.txt", std::process::id()));
        fs::write(&path, "x").unwrap();

        let editor = Arc::new(RecordingEditor {
            opened: Mutex::new(vec![]),
        });
        let tool = OpenFileTool::new(editor.clone());
        let out = tool
            .execute(&json!({"file_path": path.to_str().unwrap(), "line_number": 1}))
            .await;

        assert!(out.starts_with("Opened file in editor:"));
        assert_eq!(editor.opened.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_file_not_forwarded() {
        let editor = Arc::new(RecordingEditor {
            opened: Mutex::new(vec![]),
        });
        let tool = OpenFileTool::new(editor.clone());
        let out = tool.execute(&json!({"file_path": "/nonexistent/f.txt"})).await;

        assert!(out.starts_with("File not found:"));
        assert!(editor.opened.lock().is_empty());
    }
}
