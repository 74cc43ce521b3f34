//! Tool trait and the validating, approval-gated executor

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use quill_ai::ToolSchema;

use crate::host::{Operator, ToolApproval};

/// An executable local capability.
///
/// Execution never fails at the type level: errors, timeouts, and denials are
/// all encoded as human-readable strings the model can react to.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (used in API calls)
    fn name(&self) -> &str;

    /// Tool description for the LLM
    fn description(&self) -> &str;

    /// JSON Schema for parameters
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments
    async fn execute(&self, arguments: &serde_json::Value) -> String;
}

/// Type alias for a shared tool
pub type BoxedTool = Arc<dyn Tool>;

/// Export a tool's declaration for the provider layer
pub fn to_schema(tool: &dyn Tool) -> ToolSchema {
    ToolSchema::new(tool.name(), tool.description(), tool.parameters_schema())
}

/// Session-level approval status for a tool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ApprovalStatus {
    Always,
    Denied,
}

/// Holds the fixed tool set and executes calls by name.
///
/// Every execution path funnels through [`ToolRegistry::execute`], which
/// layers the first-use approval gate and JSON-Schema argument validation in
/// front of the tool itself.
pub struct ToolRegistry {
    tools: Vec<BoxedTool>,
    validators: HashMap<String, jsonschema::Validator>,
    approvals: Mutex<HashMap<String, ApprovalStatus>>,
    require_approval: bool,
    operator: Arc<dyn Operator>,
}

impl ToolRegistry {
    pub fn new(tools: Vec<BoxedTool>, operator: Arc<dyn Operator>, require_approval: bool) -> Self {
        let mut validators = HashMap::new();
        for tool in &tools {
            match jsonschema::validator_for(&tool.parameters_schema()) {
                Ok(validator) => {
                    validators.insert(tool.name().to_string(), validator);
                }
                Err(e) => {
                    tracing::warn!(
                        "Invalid parameter schema for tool '{}', skipping validation: {}",
                        tool.name(),
                        e
                    );
                }
            }
        }
        Self {
            tools,
            validators,
            approvals: Mutex::new(HashMap::new()),
            require_approval,
            operator,
        }
    }

    /// Declarations for every registered tool
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.iter().map(|t| to_schema(t.as_ref())).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Forget all session approvals
    pub fn clear_approvals(&self) {
        self.approvals.lock().clear();
    }

    /// Execute a tool by name. Always returns a result string; unknown tools,
    /// denied approvals, invalid arguments, and execution failures are all
    /// reported as text.
    pub async fn execute(&self, name: &str, arguments: &serde_json::Value) -> String {
        tracing::info!(tool = %name, "Executing tool");

        let Some(tool) = self.tools.iter().find(|t| t.name() == name) else {
            tracing::warn!(tool = %name, "Unknown tool requested");
            return format!("Unknown tool: {}", name);
        };

        if self.require_approval {
            if let Some(denial) = self.check_approval(name, arguments).await {
                return denial;
            }
        }

        if let Some(validator) = self.validators.get(name) {
            if let Some(message) = validation_errors(validator, arguments) {
                return message;
            }
        }

        tool.execute(arguments).await
    }

    /// Returns `Some(denial message)` when the tool may not run.
    async fn check_approval(&self, name: &str, arguments: &serde_json::Value) -> Option<String> {
        let cached = self.approvals.lock().get(name).copied();
        match cached {
            Some(ApprovalStatus::Denied) => {
                return Some(format!(
                    "Tool execution blocked: tool '{}' was denied by user",
                    name
                ));
            }
            Some(ApprovalStatus::Always) => return None,
            None => {}
        }

        match self.operator.approve_tool(name, arguments).await {
            ToolApproval::AllowOnce => None,
            ToolApproval::AlwaysAllow => {
                self.approvals
                    .lock()
                    .insert(name.to_string(), ApprovalStatus::Always);
                None
            }
            ToolApproval::Deny => {
                self.approvals
                    .lock()
                    .insert(name.to_string(), ApprovalStatus::Denied);
                Some(format!(
                    "Tool execution blocked: tool '{}' denied by user",
                    name
                ))
            }
        }
    }
}

/// Validate arguments against a compiled schema, returning a readable failure
/// message if invalid.
fn validation_errors(validator: &jsonschema::Validator, args: &serde_json::Value) -> Option<String> {
    let errors: Vec<String> = validator
        .iter_errors(args)
        .map(|e| {
            let path = e.instance_path.to_string();
            if path.is_empty() {
                e.to_string()
            } else {
                format!("{}: {}", path, e)
            }
        })
        .collect();

    if errors.is_empty() {
        None
    } else {
        Some(format!(
            "Tool argument validation failed:\n{}",
            errors.join("\n")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{PlanDecision, ToolApproval};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            })
        }
        async fn execute(&self, arguments: &serde_json::Value) -> String {
            arguments
                .get("text")
                .and_then(|v| v.as_str())
                .unwrap_or("(empty)")
                .to_string()
        }
    }

    /// Operator with a scripted tool-approval answer
    struct ScriptedOperator {
        answer: ToolApproval,
        prompts: AtomicU32,
    }

    impl ScriptedOperator {
        fn new(answer: ToolApproval) -> Self {
            Self {
                answer,
                prompts: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Operator for ScriptedOperator {
        async fn review_plan(&self, _plan: &str) -> PlanDecision {
            PlanDecision::Approve
        }
        async fn confirm_revised_plan(&self, _plan: &str) -> bool {
            true
        }
        async fn approve_tool(&self, _name: &str, _args: &serde_json::Value) -> ToolApproval {
            self.prompts.fetch_add(1, Ordering::Relaxed);
            self.answer
        }
        async fn confirm_outside_path(&self, _path: &str, _operation: &str) -> bool {
            false
        }
    }

    fn registry(answer: ToolApproval, require_approval: bool) -> (ToolRegistry, Arc<ScriptedOperator>) {
        let operator = Arc::new(ScriptedOperator::new(answer));
        let registry = ToolRegistry::new(
            vec![Arc::new(EchoTool)],
            operator.clone(),
            require_approval,
        );
        (registry, operator)
    }

    #[tokio::test]
    async fn test_unknown_tool_returns_message() {
        let (registry, _) = registry(ToolApproval::AllowOnce, false);
        let out = registry.execute("nope", &serde_json::json!({})).await;
        assert!(out.contains("Unknown tool"));
    }

    #[tokio::test]
    async fn test_validation_failure_reported_as_string() {
        let (registry, _) = registry(ToolApproval::AllowOnce, false);
        let out = registry.execute("echo", &serde_json::json!({})).await;
        assert!(out.contains("validation failed"), "got: {}", out);
    }

    #[tokio::test]
    async fn test_successful_execution() {
        let (registry, _) = registry(ToolApproval::AllowOnce, false);
        let out = registry.execute("echo", &serde_json::json!({"text": "hi"})).await;
        assert_eq!(out, "hi");
    }

    #[tokio::test]
    async fn test_denied_tool_blocked_and_cached() {
        let (registry, operator) = registry(ToolApproval::Deny, true);
        let out = registry.execute("echo", &serde_json::json!({"text": "hi"})).await;
        assert!(out.contains("blocked"));

        // Second call is blocked from the cache without prompting again
        let out = registry.execute("echo", &serde_json::json!({"text": "hi"})).await;
        assert!(out.contains("blocked"));
        assert_eq!(operator.prompts.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_always_allow_prompts_once() {
        let (registry, operator) = registry(ToolApproval::AlwaysAllow, true);
        assert_eq!(
            registry.execute("echo", &serde_json::json!({"text": "a"})).await,
            "a"
        );
        assert_eq!(
            registry.execute("echo", &serde_json::json!({"text": "b"})).await,
            "b"
        );
        assert_eq!(operator.prompts.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_allow_once_prompts_every_time() {
        let (registry, operator) = registry(ToolApproval::AllowOnce, true);
        registry.execute("echo", &serde_json::json!({"text": "a"})).await;
        registry.execute("echo", &serde_json::json!({"text": "b"})).await;
        assert_eq!(operator.prompts.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_clear_approvals_resets_denials() {
        let (registry, _) = registry(ToolApproval::Deny, true);
        registry.execute("echo", &serde_json::json!({"text": "a"})).await;
        registry.clear_approvals();
        // Prompt fires again after clearing (and denies again)
        let out = registry.execute("echo", &serde_json::json!({"text": "a"})).await;
        assert!(out.contains("blocked"));
    }

    #[test]
    fn test_schemas_export() {
        let operator = Arc::new(ScriptedOperator::new(ToolApproval::AllowOnce));
        let registry = ToolRegistry::new(vec![Arc::new(EchoTool)], operator, false);
        let schemas = registry.schemas();
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0].name, "echo");
    }
}
