//! File editing tools: exact-substring replace and line-range replace

use std::fs;
use std::sync::Arc;

use async_trait::async_trait;
use quill_agent::{Operator, Tool};
use serde_json::json;
use similar::{ChangeTag, TextDiff};

use super::safety::validate_path;

/// Replaces one exact occurrence of `old_content`. Zero or multiple
/// occurrences fail without touching the file — the tool never guesses which
/// occurrence was meant.
pub struct EditFileTool {
    operator: Arc<dyn Operator>,
}

impl EditFileTool {
    pub fn new(operator: Arc<dyn Operator>) -> Self {
        Self { operator }
    }
}

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Edit an existing file by replacing specific content. The old content must match exactly, including whitespace, and must occur exactly once."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path to the file to edit (absolute or relative to current directory)"
                },
                "old_content": {
                    "type": "string",
                    "description": "The exact content to find and replace. Must match exactly including whitespace."
                },
                "new_content": {
                    "type": "string",
                    "description": "The new content to replace the old content with"
                }
            },
            "required": ["file_path", "old_content", "new_content"]
        })
    }

    async fn execute(&self, arguments: &serde_json::Value) -> String {
        let Some(file_path) = arguments.get("file_path").and_then(|v| v.as_str()) else {
            return "Error editing file: missing 'file_path' argument".into();
        };
        let Some(old_content) = arguments.get("old_content").and_then(|v| v.as_str()) else {
            return "Error editing file: missing 'old_content' argument".into();
        };
        let Some(new_content) = arguments.get("new_content").and_then(|v| v.as_str()) else {
            return "Error editing file: missing 'new_content' argument".into();
        };

        let resolved = match validate_path(file_path, "edit file", &self.operator).await {
            Ok(p) => p,
            Err(denial) => return denial,
        };

        let content = match fs::read_to_string(&resolved) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return format!("File not found: {}", file_path);
            }
            Err(e) => return format!("Error editing file: {}", e),
        };

        let occurrences = content.matches(old_content).count();
        if occurrences == 0 {
            return format!(
                "Content not found in {}. The exact content must match including whitespace.",
                file_path
            );
        }
        if occurrences > 1 {
            return format!(
                "Found {} occurrences of the content in {}. Please provide more specific content to replace (include more surrounding context).",
                occurrences, file_path
            );
        }

        let new_file_content = content.replacen(old_content, new_content, 1);
        if let Err(e) = fs::write(&resolved, &new_file_content) {
            return format!("Error editing file: {}", e);
        }

        format!(
            "Successfully edited {}: replaced {} characters with {} characters\n\nDiff:\n{}",
            file_path,
            old_content.len(),
            new_content.len(),
            generate_diff(&content, &new_file_content)
        )
    }
}

/// Replaces a 1-indexed inclusive line range. Bounds are validated against
/// the actual line count; trailing-newline behavior mirrors the original file
/// when the range touches the end of the file.
pub struct EditLinesTool {
    operator: Arc<dyn Operator>,
}

impl EditLinesTool {
    pub fn new(operator: Arc<dyn Operator>) -> Self {
        Self { operator }
    }
}

#[async_trait]
impl Tool for EditLinesTool {
    fn name(&self) -> &str {
        "edit_file_lines"
    }

    fn description(&self) -> &str {
        "Edit specific lines in a file by line number. Line numbers are 1-indexed and both start_line and end_line are INCLUSIVE. To replace a single line, use the same number for both."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path to the file to edit (absolute or relative to current directory)"
                },
                "start_line": {
                    "type": "integer",
                    "description": "Starting line number (1-indexed, INCLUSIVE). This line WILL be replaced."
                },
                "end_line": {
                    "type": "integer",
                    "description": "Ending line number (1-indexed, INCLUSIVE). Must be >= start_line."
                },
                "new_content": {
                    "type": "string",
                    "description": "The new content replacing ALL lines from start_line to end_line (inclusive). May be multiple lines."
                }
            },
            "required": ["file_path", "start_line", "end_line", "new_content"]
        })
    }

    async fn execute(&self, arguments: &serde_json::Value) -> String {
        let Some(file_path) = arguments.get("file_path").and_then(|v| v.as_str()) else {
            return "Error editing file by lines: missing 'file_path' argument".into();
        };
        let Some(start_line) = arguments.get("start_line").and_then(|v| v.as_i64()) else {
            return "Error editing file by lines: missing 'start_line' argument".into();
        };
        let Some(end_line) = arguments.get("end_line").and_then(|v| v.as_i64()) else {
            return "Error editing file by lines: missing 'end_line' argument".into();
        };
        let new_content = arguments
            .get("new_content")
            .and_then(|v| v.as_str())
            .unwrap_or("");

        let resolved = match validate_path(file_path, "edit file", &self.operator).await {
            Ok(p) => p,
            Err(denial) => return denial,
        };

        if start_line < 1 {
            return format!("Invalid start_line: {}. Line numbers must be >= 1.", start_line);
        }
        if end_line < start_line {
            return format!(
                "Invalid line range: end_line ({}) must be >= start_line ({}).",
                end_line, start_line
            );
        }

        let content = match fs::read_to_string(&resolved) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return format!("File not found: {}", file_path);
            }
            Err(e) => return format!("Error editing file by lines: {}", e),
        };

        match replace_lines(&content, start_line as usize, end_line as usize, new_content) {
            Ok((new_file_content, removed, added)) => {
                if let Err(e) = fs::write(&resolved, &new_file_content) {
                    return format!("Error editing file by lines: {}", e);
                }
                format!(
                    "Successfully edited {}: replaced lines {} through {} inclusive ({} line(s) removed, {} line(s) added)",
                    file_path, start_line, end_line, removed, added
                )
            }
            Err(message) => message,
        }
    }
}

/// Core line-range replacement. Returns the new content and the
/// removed/added line counts, or a bounds-error message.
fn replace_lines(
    content: &str,
    start_line: usize,
    end_line: usize,
    new_content: &str,
) -> Result<(String, usize, usize), String> {
    // Lines with their endings preserved, like a raw readlines()
    let lines: Vec<&str> = content.split_inclusive('\n').collect();
    let total_lines = lines.len();

    if start_line > total_lines {
        return Err(format!(
            "start_line ({}) exceeds file length ({} lines).",
            start_line, total_lines
        ));
    }
    if end_line > total_lines {
        return Err(format!(
            "end_line ({}) exceeds file length ({} lines).",
            end_line, total_lines
        ));
    }

    let start_idx = start_line - 1;
    let end_idx = end_line - 1;

    // Split replacement text; a trailing newline produces an empty final
    // piece that records the intent rather than an extra line.
    let mut new_lines: Vec<&str> = if new_content.is_empty() {
        vec![]
    } else {
        new_content.split('\n').collect()
    };
    let content_had_trailing_newline = new_lines.last() == Some(&"");
    if content_had_trailing_newline {
        new_lines.pop();
    }

    let mut formatted: Vec<String> = Vec::with_capacity(new_lines.len());
    for (i, line) in new_lines.iter().enumerate() {
        let is_last = i == new_lines.len() - 1;
        if !is_last {
            formatted.push(format!("{}\n", line));
        } else if end_idx < total_lines - 1 {
            // Mid-file replacement always keeps the following lines intact
            formatted.push(format!("{}\n", line));
        } else if content_had_trailing_newline || lines[end_idx].ends_with('\n') {
            // End-of-file replacement mirrors the original ending
            formatted.push(format!("{}\n", line));
        } else {
            formatted.push(line.to_string());
        }
    }

    let removed = end_idx - start_idx + 1;
    let added = formatted.len();

    let mut result = String::new();
    for line in &lines[..start_idx] {
        result.push_str(line);
    }
    for line in &formatted {
        result.push_str(line);
    }
    for line in &lines[end_idx + 1..] {
        result.push_str(line);
    }

    Ok((result, removed, added))
}

/// Unified-ish diff rendering, truncated to keep tool output readable
fn generate_diff(old: &str, new: &str) -> String {
    let diff = TextDiff::from_lines(old, new);
    let mut output = Vec::new();

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => "-",
            ChangeTag::Insert => "+",
            ChangeTag::Equal => " ",
        };
        output.push(format!("{}{}", sign, change));
    }

    if output.len() > 50 {
        output.truncate(50);
        output.push("... (diff truncated)".to_string());
    }

    output.join("")
}
