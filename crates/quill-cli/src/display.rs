//! Terminal implementations of the host-surface traits

use std::io::{self, Write};

use async_trait::async_trait;
use quill_agent::{DisplaySink, Operator, PlanDecision, ToolApproval};

/// Streams content straight to stdout
pub struct StdoutSink;

impl DisplaySink for StdoutSink {
    fn append(&self, text: &str) {
        print!("{}", text);
        let _ = io::stdout().flush();
    }

    fn turn_complete(&self, _finish_reason: &str) {
        let _ = io::stdout().flush();
    }
}

/// Interactive operator over stdin. All prompts are synchronous blocking
/// reads; the loop suspends until the operator answers.
pub struct TerminalOperator {
    interactive: bool,
}

impl TerminalOperator {
    pub fn new(interactive: bool) -> Self {
        Self { interactive }
    }

    fn read_line(&self, prompt: &str) -> Option<String> {
        print!("{}", prompt);
        io::stdout().flush().ok()?;
        let mut line = String::new();
        io::stdin().read_line(&mut line).ok()?;
        Some(line.trim().to_string())
    }
}

#[async_trait]
impl Operator for TerminalOperator {
    async fn review_plan(&self, _plan: &str) -> PlanDecision {
        if !self.interactive {
            return PlanDecision::Reject;
        }
        let answer = self
            .read_line(
                "\nPlan presented above. Approve? [y]es to proceed, [n]o to cancel, [r]evise for changes: ",
            )
            .unwrap_or_default()
            .to_lowercase();

        match answer.as_str() {
            "n" | "no" => PlanDecision::Reject,
            "r" | "revise" => {
                let feedback = self
                    .read_line("What changes would you like? ")
                    .unwrap_or_default();
                PlanDecision::Revise(feedback)
            }
            _ => PlanDecision::Approve,
        }
    }

    async fn confirm_revised_plan(&self, _plan: &str) -> bool {
        if !self.interactive {
            return false;
        }
        let answer = self
            .read_line("Approve revised plan? [y]es to proceed, [n]o to cancel: ")
            .unwrap_or_default()
            .to_lowercase();
        matches!(answer.as_str(), "y" | "yes")
    }

    async fn approve_tool(&self, tool_name: &str, arguments: &serde_json::Value) -> ToolApproval {
        if !self.interactive {
            return ToolApproval::Deny;
        }
        let args = quill_agent::format::ellipsize(&arguments.to_string(), 100);
        println!("\nAI wants to use tool: {}", tool_name);
        println!("Arguments: {}", args);
        let answer = self
            .read_line("[1] Allow once  [2] Always allow  [3] Deny: ")
            .unwrap_or_default();

        match answer.as_str() {
            "1" => ToolApproval::AllowOnce,
            "2" => ToolApproval::AlwaysAllow,
            _ => ToolApproval::Deny,
        }
    }

    async fn confirm_outside_path(&self, path: &str, operation: &str) -> bool {
        if !self.interactive {
            // Deny by default when confirmation cannot be obtained
            return false;
        }
        println!("\nAI wants to {}:\n  {}", operation, path);
        println!("This is OUTSIDE the project directory.");
        let answer = self
            .read_line("Allow this operation? [y/N]: ")
            .unwrap_or_default()
            .to_lowercase();
        matches!(answer.as_str(), "y" | "yes")
    }
}
