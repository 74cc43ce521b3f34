//! Project file-name search tool

use async_trait::async_trait;
use quill_agent::Tool;
use serde_json::json;
use std::fs;
use std::path::Path;

const DEFAULT_MAX_RESULTS: usize = 20;

/// Finds files by name glob, rooted at the working directory. Truncated
/// result sets carry an explicit "more available" marker.
pub struct FindFileTool;

#[async_trait]
impl Tool for FindFileTool {
    fn name(&self) -> &str {
        "find_file_in_project"
    }

    fn description(&self) -> &str {
        "Find files in the current project/directory by name pattern. Returns a list of matching file paths."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "File name pattern to search for (supports wildcards like *.py, *test*, etc.)"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of results to return (default: 20)",
                    "default": 20
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, arguments: &serde_json::Value) -> String {
        let Some(pattern) = arguments.get("pattern").and_then(|v| v.as_str()) else {
            return "Error finding files: missing 'pattern' argument".into();
        };
        let max_results = arguments
            .get("max_results")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_MAX_RESULTS as u64) as usize;

        let matcher = match glob::Pattern::new(pattern) {
            Ok(p) => p,
            Err(e) => return format!("Error finding files: invalid pattern '{}': {}", pattern, e),
        };

        let root = match std::env::current_dir() {
            Ok(cwd) => cwd,
            Err(e) => return format!("Error finding files: {}", e),
        };

        let mut matches = Vec::new();
        let mut truncated = false;
        walk(&root, &root, &matcher, max_results, &mut matches, &mut truncated);

        if matches.is_empty() {
            format!("No files found matching pattern: {}", pattern)
        } else if truncated {
            format!(
                "{}\n... ({} results shown, more available)",
                matches.join("\n"),
                matches.len()
            )
        } else {
            matches.join("\n")
        }
    }
}

/// Depth-first walk matching file names against the pattern. Hidden
/// directories are skipped.
fn walk(
    root: &Path,
    dir: &Path,
    matcher: &glob::Pattern,
    max_results: usize,
    matches: &mut Vec<String>,
    truncated: &mut bool,
) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    let mut entries: Vec<_> = entries.flatten().collect();
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        if matches.len() >= max_results {
            *truncated = true;
            return;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        let path = entry.path();
        if path.is_dir() {
            if !name.starts_with('.') {
                walk(root, &path, matcher, max_results, matches, truncated);
            }
        } else if matcher.matches(&name) {
            let display = path
                .strip_prefix(root)
                .map(|p| format!("./{}", p.display()))
                .unwrap_or_else(|_| path.display().to_string());
            matches.push(display);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn fixture(tag: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!("quill-glob-{}-{}", tag, std::process::id()));
        let _ = fs::remove_dir_all(&root);
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join("src/main.rs"), "").unwrap();
        fs::write(root.join("src/lib.rs"), "").unwrap();
        fs::write(root.join("readme.md"), "").unwrap();
        root
    }

    #[test]
    fn test_walk_matches_by_name() {
        let root = fixture("walk");
        let matcher = glob::Pattern::new("*.rs").unwrap();
        let mut matches = Vec::new();
        let mut truncated = false;
        walk(&root, &root, &matcher, 20, &mut matches, &mut truncated);

        assert_eq!(matches.len(), 2);
        assert!(matches.iter().any(|m| m.ends_with("main.rs")));
        assert!(!truncated);
    }

    #[test]
    fn test_walk_truncates_with_marker() {
        let root = fixture("truncate");
        for i in 0..10 {
            fs::write(root.join(format!("file{}.txt", i)), "").unwrap();
        }
        let matcher = glob::Pattern::new("*.txt").unwrap();
        let mut matches = Vec::new();
        let mut truncated = false;
        walk(&root, &root, &matcher, 5, &mut matches, &mut truncated);

        assert_eq!(matches.len(), 5);
        assert!(truncated);
    }

    #[tokio::test]
    async fn test_invalid_pattern_is_error_string() {
        let out = FindFileTool.execute(&json!({"pattern": "[unclosed"})).await;
        assert!(out.starts_with("Error finding files:"));
    }
}
