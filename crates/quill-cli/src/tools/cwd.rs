//! Working directory tool

use async_trait::async_trait;
use quill_agent::Tool;
use serde_json::json;

/// Reports the absolute current working directory
pub struct CwdTool;

#[async_trait]
impl Tool for CwdTool {
    fn name(&self) -> &str {
        "get_working_directory"
    }

    fn description(&self) -> &str {
        "Get the current working directory path. Use this to understand the project root location."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({ "type": "object", "properties": {}, "required": [] })
    }

    async fn execute(&self, _arguments: &serde_json::Value) -> String {
        match std::env::current_dir() {
            Ok(cwd) => format!("Current working directory: {}", cwd.display()),
            Err(e) => format!("Error getting working directory: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reports_absolute_cwd() {
        let out = CwdTool.execute(&json!({})).await;
        assert!(out.starts_with("Current working directory: /"));
    }
}
