//! In-file search tool

use async_trait::async_trait;
use quill_agent::Tool;
use serde_json::json;
use std::fs;

/// Searches one file for a pattern, literal-substring by default or regex
/// when requested. "No matches" is a soft result distinct from a bad pattern
/// or unreadable file.
pub struct FindInFileTool;

#[async_trait]
impl Tool for FindInFileTool {
    fn name(&self) -> &str {
        "find_in_file"
    }

    fn description(&self) -> &str {
        "Search for a text pattern in a specific file. Returns matching lines with line numbers."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path to the file to search in (absolute or relative to current directory)"
                },
                "pattern": {
                    "type": "string",
                    "description": "Text pattern or regex to search for"
                },
                "case_sensitive": {
                    "type": "boolean",
                    "description": "Whether the search should be case sensitive (default: false)",
                    "default": false
                },
                "use_regex": {
                    "type": "boolean",
                    "description": "Treat the pattern as a regular expression instead of a literal substring (default: false)",
                    "default": false
                }
            },
            "required": ["file_path", "pattern"]
        })
    }

    async fn execute(&self, arguments: &serde_json::Value) -> String {
        let Some(file_path) = arguments.get("file_path").and_then(|v| v.as_str()) else {
            return "Error searching file: missing 'file_path' argument".into();
        };
        let Some(pattern) = arguments.get("pattern").and_then(|v| v.as_str()) else {
            return "Error searching file: missing 'pattern' argument".into();
        };
        let case_sensitive = arguments
            .get("case_sensitive")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let use_regex = arguments
            .get("use_regex")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let content = match fs::read_to_string(file_path) {
            Ok(c) => c,
            Err(e) => return format!("Error searching file: {}", e),
        };

        let matcher: Box<dyn Fn(&str) -> bool> = if use_regex {
            let source = if case_sensitive {
                pattern.to_string()
            } else {
                format!("(?i){}", pattern)
            };
            match regex::Regex::new(&source) {
                Ok(re) => Box::new(move |line: &str| re.is_match(line)),
                Err(e) => {
                    return format!("Invalid regex pattern '{}'. Error: {}", pattern, e);
                }
            }
        } else if case_sensitive {
            let needle = pattern.to_string();
            Box::new(move |line: &str| line.contains(&needle))
        } else {
            let needle = pattern.to_lowercase();
            Box::new(move |line: &str| line.to_lowercase().contains(&needle))
        };

        let matches: Vec<String> = content
            .lines()
            .enumerate()
            .filter(|(_, line)| matcher(line))
            .map(|(i, line)| format!("{}:{}", i + 1, line))
            .collect();

        if matches.is_empty() {
            format!("No matches found for '{}' in {}", pattern, file_path)
        } else {
            matches.join("\n")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn fixture(tag: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("quill-grep-{}-{}.txt", tag, std::process::id()));
        fs::write(&path, "fn main() {\n    println!(\"Hello\");\n    // TODO fix\n}\n").unwrap();
        path
    }

    #[tokio::test]
    async fn test_literal_match_with_line_numbers() {
        let path = fixture("literal");
        let out = FindInFileTool
            .execute(&json!({"file_path": path.to_str().unwrap(), "pattern": "hello"}))
            .await;
        assert_eq!(out, "2:    println!(\"Hello\");");
    }

    #[tokio::test]
    async fn test_case_sensitive_literal() {
        let path = fixture("case");
        let out = FindInFileTool
            .execute(&json!({
                "file_path": path.to_str().unwrap(),
                "pattern": "hello",
                "case_sensitive": true
            }))
            .await;
        assert!(out.starts_with("No matches found"));
    }

    #[tokio::test]
    async fn test_regex_mode() {
        let path = fixture("regex");
        let out = FindInFileTool
            .execute(&json!({
                "file_path": path.to_str().unwrap(),
                "pattern": r"fn \w+\(\)",
                "use_regex": true
            }))
            .await;
        assert!(out.starts_with("1:fn main()"));
    }

    #[tokio::test]
    async fn test_invalid_regex_distinct_from_no_match() {
        let path = fixture("badregex");
        let out = FindInFileTool
            .execute(&json!({
                "file_path": path.to_str().unwrap(),
                "pattern": "([unclosed",
                "use_regex": true
            }))
            .await;
        assert!(out.starts_with("Invalid regex pattern"));
    }

    #[tokio::test]
    async fn test_missing_file_is_error_string() {
        let out = FindInFileTool
            .execute(&json!({"file_path": "/nonexistent/quill.txt", "pattern": "x"}))
            .await;
        assert!(out.starts_with("Error searching file:"));
    }
}
