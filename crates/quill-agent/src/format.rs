//! Display formatting for tool activity

use quill_ai::ToolCallRequest;

/// A horizontal separator line
pub fn separator(ch: char, width: usize) -> String {
    ch.to_string().repeat(width)
}

/// Shorten a rendering to roughly `max` bytes, respecting char boundaries
pub fn ellipsize(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut cut = max;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &text[..cut])
}

/// One-line rendering of a tool call: `name(key="value", ...)`
pub fn format_tool_call(name: &str, arguments: &serde_json::Value) -> String {
    let args = match arguments {
        serde_json::Value::Object(map) => map
            .iter()
            .map(|(k, v)| format!("{}={}", k, ellipsize(&v.to_string(), 40)))
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    };
    ellipsize(&format!("{}({})", name, args), 80)
}

/// Render a completed tool execution for the display sink: header line,
/// indented output truncated to `max_lines`.
pub fn format_tool_result(
    name: &str,
    arguments: &serde_json::Value,
    output: &str,
    max_lines: usize,
) -> String {
    let header = separator('─', 60);
    let call = format_tool_call(name, arguments);

    let lines: Vec<&str> = output.lines().collect();
    let shown = lines.len().min(max_lines);
    let mut body: Vec<String> = lines[..shown].iter().map(|l| format!("  {}", l)).collect();
    if lines.len() > max_lines {
        body.push(format!("  ... (truncated, {} more lines)", lines.len() - max_lines));
    }

    format!(
        "\n{}\n✓ {}\n\nOutput:\n{}\n{}\n",
        header,
        call,
        body.join("\n"),
        header
    )
}

/// Render pending tool calls as a reviewable step list, used when the model
/// jumps straight to tool calls and the operator must approve them as a plan.
pub fn format_tool_call_plan(explanation: &str, calls: &[ToolCallRequest]) -> String {
    let mut out = String::new();
    if !explanation.trim().is_empty() {
        out.push_str(explanation.trim());
        out.push_str("\n\n");
    }
    out.push_str("Tools to execute:\n");
    for (i, call) in calls.iter().enumerate() {
        out.push_str(&format!(
            "  {}. {}\n",
            i + 1,
            format_tool_call(&call.name, &call.arguments)
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ellipsize_respects_char_boundaries() {
        assert_eq!(ellipsize("short", 40), "short");
        let long = "é".repeat(30); // 60 bytes
        let cut = ellipsize(&long, 41); // 41 falls mid-character
        assert!(cut.ends_with("..."));
        assert!(cut.len() <= 44);
    }

    #[test]
    fn test_format_tool_call_renders_args() {
        let line = format_tool_call(
            "read_file",
            &serde_json::json!({"file_path": "src/main.rs", "max_lines": 50}),
        );
        assert!(line.starts_with("read_file("));
        assert!(line.contains("file_path"));
        assert!(line.contains("max_lines=50"));
    }

    #[test]
    fn test_format_tool_result_truncates() {
        let output = (0..30).map(|i| format!("line {}", i)).collect::<Vec<_>>().join("\n");
        let block = format_tool_result("git_log", &serde_json::json!({}), &output, 5);
        assert!(block.contains("line 4"));
        assert!(!block.contains("line 25"));
        assert!(block.contains("25 more lines"));
    }

    #[test]
    fn test_format_tool_call_plan_numbers_steps() {
        let calls = vec![
            ToolCallRequest::new("1", "git_status", serde_json::json!({})),
            ToolCallRequest::new("2", "git_diff", serde_json::json!({"staged": true})),
        ];
        let text = format_tool_call_plan("Checking the repo first.", &calls);
        assert!(text.contains("1. git_status"));
        assert!(text.contains("2. git_diff"));
        assert!(text.starts_with("Checking the repo first."));
    }
}
