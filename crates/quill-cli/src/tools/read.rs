//! File reading tool

use async_trait::async_trait;
use quill_agent::Tool;
use serde_json::json;
use std::fs;
use std::io::ErrorKind;

const DEFAULT_MAX_LINES: usize = 100;

/// Reads a file's contents, truncated at `max_lines` with a trailing marker.
/// Missing files and permission failures are distinct soft-failure strings.
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file. Returns the file contents as text."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path to the file to read (absolute or relative to current directory)"
                },
                "max_lines": {
                    "type": "integer",
                    "description": "Maximum number of lines to read (default: 100)",
                    "default": 100
                }
            },
            "required": ["file_path"]
        })
    }

    async fn execute(&self, arguments: &serde_json::Value) -> String {
        let Some(file_path) = arguments.get("file_path").and_then(|v| v.as_str()) else {
            return "Error reading file: missing 'file_path' argument".into();
        };
        let max_lines = arguments
            .get("max_lines")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_MAX_LINES as u64) as usize;

        let content = match fs::read_to_string(file_path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return format!("File not found: {}", file_path);
            }
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                return format!("Permission denied reading file: {}", file_path);
            }
            Err(e) => return format!("Error reading file: {}", e),
        };

        let mut lines: Vec<&str> = Vec::new();
        let mut truncated = false;
        for (i, line) in content.lines().enumerate() {
            if i >= max_lines {
                truncated = true;
                break;
            }
            lines.push(line);
        }

        let mut output = lines.join("\n");
        if truncated {
            output.push_str(&format!("\n... (truncated at {} lines)", max_lines));
        }
        output.push('\n');
        output
    }
}
