//! Project-context generation
//!
//! Has the model explore the project with tools and distill a context
//! summary into `context.md`, regenerated when absent or older than a day.

use std::fs;
use std::sync::LazyLock;
use std::time::{Duration, SystemTime};

use quill_ai::{ChatOptions, Provider};
use quill_agent::{Memory, Result, ToolRegistry, run_tool_loop};
use regex::Regex;

const MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);
const MAX_ITERATIONS: u32 = 20;

static MARKDOWN_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```markdown\n(.*?)\n```").unwrap());

const SYSTEM: &str = "\
You are a helpful assistant that analyzes projects and creates concise context \
summaries. Use the available tools to explore the project structure and files.";

const PROMPT: &str = "\
Please analyze this project and create a concise project context summary.

Use the available tools to:
1. Get the working directory
2. List the root directory contents
3. Look for README files, package.json, requirements.txt, Cargo.toml, go.mod, pom.xml, or other project metadata files
4. Read key configuration/metadata files to understand the project

Then output a markdown summary in this format:

# Project: [Name]

## Type
[e.g., Python web application, JavaScript library, Rust CLI tool, etc.]

## Purpose
[Brief description of what this project does]

## Tech Stack
[Key technologies, frameworks, and dependencies]

## Structure
[Brief overview of directory structure and key files]

## Key Files
[List important entry points, config files, etc.]

Important: Output ONLY the markdown summary. Do not include any conversational text before or after the markdown.";

/// Whether `context.md` is missing or stale
pub fn is_stale(memory: &Memory) -> bool {
    let Ok(metadata) = fs::metadata(memory.context_path()) else {
        return true;
    };
    metadata
        .modified()
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .map(|age| age > MAX_AGE)
        .unwrap_or(true)
}

/// Generate and persist the project context
pub async fn generate(
    provider: &dyn Provider,
    registry: &ToolRegistry,
    memory: &Memory,
    options: &ChatOptions,
) -> Result<()> {
    tracing::info!("Generating project context");

    let content = run_tool_loop(provider, registry, SYSTEM, PROMPT, options, MAX_ITERATIONS).await?;
    if content.trim().is_empty() {
        tracing::warn!("Context generation produced no content");
        return Ok(());
    }

    // Unwrap a ```markdown fence if the model added one anyway
    let content = MARKDOWN_FENCE
        .captures(&content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or(content);

    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    let full = format!(
        "<!-- Context generated at: {} -->\n\n{}",
        timestamp,
        content.trim()
    );

    fs::create_dir_all(memory.dir())?;
    fs::write(memory.context_path(), full)?;
    tracing::info!(path = %memory.context_path().display(), "Context saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_agent::MemoryConfig;
    use std::path::PathBuf;

    fn temp_root(tag: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!("quill-context-{}-{}", tag, std::process::id()));
        let _ = fs::remove_dir_all(&root);
        fs::create_dir_all(&root).unwrap();
        root
    }

    #[test]
    fn test_missing_context_is_stale() {
        let root = temp_root("missing");
        let memory = Memory::new(&root, MemoryConfig::default());
        assert!(is_stale(&memory));
    }

    #[test]
    fn test_fresh_context_is_not_stale() {
        let root = temp_root("fresh");
        let memory = Memory::new(&root, MemoryConfig::default());
        fs::create_dir_all(memory.dir()).unwrap();
        fs::write(memory.context_path(), "# Project: x").unwrap();
        assert!(!is_stale(&memory));
    }

    #[test]
    fn test_markdown_fence_unwrapped() {
        let wrapped = "```markdown\n# Project: quill\n```";
        let inner = MARKDOWN_FENCE
            .captures(wrapped)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .unwrap();
        assert_eq!(inner, "# Project: quill");
    }
}
