//! Plan detection heuristics
//!
//! String-based detection is inherently fuzzy, so it is isolated here as pure
//! functions the state machine calls but never re-implements.

use std::sync::LazyLock;

use regex::Regex;

/// Marker the system prompt instructs the model to put on revised plans.
pub const REVISED_PLAN_MARKER: &str = "REVISED PLAN";

static NUMBERED_STEP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+\.\s+").unwrap());

static PLAN_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?si)(GOAL:.*?PLAN:.*?TOOLS REQUIRED:.*?ESTIMATED STEPS:[^\n]*)").unwrap()
});

/// Whether a turn's accumulated text is a plan presentation.
///
/// Requires both the goal/plan markers AND at least one numbered step; the
/// markers alone (a model merely talking about "the plan") must not trigger
/// the approval gate.
pub fn looks_like_plan(text: &str) -> bool {
    let has_markers = text.contains("GOAL:") && text.contains("PLAN:");
    has_markers && NUMBERED_STEP.is_match(text)
}

/// Whether the text carries the revised-plan marker.
pub fn is_revised_plan(text: &str) -> bool {
    text.contains(REVISED_PLAN_MARKER)
}

/// Extract a plan block (GOAL/PLAN/TOOLS REQUIRED/ESTIMATED STEPS) from
/// conversation text, if one is present. Used during compaction to persist an
/// active plan before its transcript is summarized away.
pub fn extract_plan(text: &str) -> Option<String> {
    PLAN_BLOCK
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_PLAN: &str = "\
GOAL: Commit the pending changes

PLAN:
1. Check repository status (git_status)
2. Review changes (git_diff)
3. Stage and commit (git_add, git_commit)

TOOLS REQUIRED: git_status, git_diff, git_add, git_commit

ESTIMATED STEPS: 3";

    #[test]
    fn test_full_plan_detected() {
        assert!(looks_like_plan(FULL_PLAN));
    }

    #[test]
    fn test_markers_without_steps_not_detected() {
        let text = "GOAL: do the thing\nPLAN: I'll figure it out as I go";
        assert!(!looks_like_plan(text));
    }

    #[test]
    fn test_steps_without_markers_not_detected() {
        let text = "Here's what I did:\n1. Read the file\n2. Edited it";
        assert!(!looks_like_plan(text));
    }

    #[test]
    fn test_mention_of_plan_not_detected() {
        assert!(!looks_like_plan("I have a plan in mind, bear with me."));
    }

    #[test]
    fn test_revised_plan_marker() {
        assert!(is_revised_plan("REVISED PLAN\n\nGOAL: ..."));
        assert!(is_revised_plan("=== REVISED PLAN ==="));
        assert!(!is_revised_plan(FULL_PLAN));
    }

    #[test]
    fn test_extract_plan_from_conversation() {
        let conversation = format!(
            ">>>User:\nplease commit\n\n>>>Assistant:\n{}\n\nSounds good?",
            FULL_PLAN
        );
        let plan = extract_plan(&conversation).unwrap();
        assert!(plan.starts_with("GOAL:"));
        assert!(plan.contains("ESTIMATED STEPS: 3"));
    }

    #[test]
    fn test_extract_plan_absent() {
        assert!(extract_plan("just a normal chat about rust lifetimes").is_none());
    }
}
