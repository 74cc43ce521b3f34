//! Conversation memory: append-only history log and summary compaction
//!
//! The history log only ever grows; a byte offset recorded in the summary's
//! metadata header marks how much of it has already been folded into the
//! rolling summary. Loading "recent" history means reading from that offset
//! to EOF.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use quill_ai::{ChatOptions, Message, Provider};
use regex::Regex;

use crate::error::{Error, Result};
use crate::plan::extract_plan;
use crate::turn::generate_text;

/// Directory under the project root holding session state
pub const SESSION_DIR_NAME: &str = ".quill";

static CUTOFF_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"cutoff_byte:\s*(\d+)").unwrap());
static METADATA_COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^<!--.*?-->\s*").unwrap());

/// Compaction tuning. All sizes are raw bytes of history-log text.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Bytes of recent history left uncompacted below the new cutoff
    pub recent_window_bytes: u64,
    /// Uncompacted tail size that triggers compaction
    pub compaction_threshold_bytes: u64,
    /// Minimum log size before the first summary is attempted
    pub min_history_bytes: u64,
    /// Per-request span size; larger spans are summarized in chunks
    pub chunk_size_bytes: u64,
    /// Hard cap on a single compaction's span; older excess is dropped
    pub max_compaction_bytes: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            recent_window_bytes: 30_480,
            compaction_threshold_bytes: 76_800,
            min_history_bytes: 1_024,
            chunk_size_bytes: 51_200,
            max_compaction_bytes: 204_800,
        }
    }
}

/// Per-project conversation memory rooted at `<project>/.quill/`.
///
/// Single-writer by contract: one active session per project directory.
pub struct Memory {
    dir: PathBuf,
    enabled: bool,
    config: MemoryConfig,
}

impl Memory {
    pub fn new(project_root: &Path, config: MemoryConfig) -> Self {
        Self {
            dir: project_root.join(SESSION_DIR_NAME),
            enabled: true,
            config,
        }
    }

    /// A memory that persists nothing (session mode off)
    pub fn disabled() -> Self {
        Self {
            dir: PathBuf::new(),
            enabled: false,
            config: MemoryConfig::default(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn history_path(&self) -> PathBuf {
        self.dir.join("history.txt")
    }

    pub fn summary_path(&self) -> PathBuf {
        self.dir.join("summary.md")
    }

    pub fn context_path(&self) -> PathBuf {
        self.dir.join("context.md")
    }

    pub fn plan_path(&self) -> PathBuf {
        self.dir.join("plan.md")
    }

    // --- History log ---

    /// Append one turn to the history log. No read-modify-write.
    pub fn append_turn(&self, role: &str, text: &str) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        fs::create_dir_all(&self.dir)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.history_path())?;
        write!(file, ">>>{}:\n{}\n\n", role, text)?;
        Ok(())
    }

    /// Current size of the history log in bytes
    pub fn history_size(&self) -> u64 {
        fs::metadata(self.history_path())
            .map(|m| m.len())
            .unwrap_or(0)
    }

    /// Read recent history (bytes `[cutoff, EOF)`) into provider messages.
    ///
    /// Walking newest-first, the newest 4 turns are always included so the
    /// conversation keeps immediate context across a compaction boundary;
    /// older turns are added while the running character budget stays
    /// positive.
    pub fn load_recent_history(&self, cutoff: u64, budget: i64) -> Vec<Message> {
        if !self.enabled {
            return vec![];
        }
        let content = match self.read_range_lossy(cutoff, u64::MAX) {
            Ok(c) => c,
            Err(_) => return vec![],
        };

        let mut turns = parse_turns(&content);
        turns.reverse(); // newest first

        let mut budget = budget;
        let mut kept = Vec::new();
        for (i, (role, body)) in turns.into_iter().enumerate() {
            budget -= body.len() as i64;
            if i < 4 || budget > 0 {
                kept.push((role, body));
            } else {
                break;
            }
        }
        kept.reverse();

        kept.into_iter()
            .filter_map(|(role, body)| match role.as_str() {
                "user" => Some(Message::user(body)),
                "assistant" => Some(Message::assistant(body)),
                _ => None,
            })
            .collect()
    }

    /// Read a raw byte range of the history log with permissive decoding.
    ///
    /// Chunk boundaries may split multi-byte characters; undecodable bytes at
    /// the edges are dropped rather than failing the read.
    fn read_range_lossy(&self, start: u64, len: u64) -> std::io::Result<String> {
        let mut file = File::open(self.history_path())?;
        file.seek(SeekFrom::Start(start))?;
        let mut bytes = Vec::new();
        file.take(len).read_to_end(&mut bytes)?;
        let text = String::from_utf8_lossy(&bytes)
            .trim_matches('\u{FFFD}')
            .to_string();
        Ok(text)
    }

    // --- Summary ---

    /// Byte offset below which history is already represented in the summary
    pub fn summary_cutoff(&self) -> u64 {
        let Ok(file) = File::open(self.summary_path()) else {
            return 0;
        };
        let reader = BufReader::new(file);
        for line in reader.lines().take(10).map_while(|l| l.ok()) {
            if let Some(caps) = CUTOFF_RE.captures(&line) {
                if let Ok(value) = caps[1].parse() {
                    return value;
                }
            }
        }
        0
    }

    /// Full summary file contents (metadata header included)
    pub fn load_summary(&self) -> Option<String> {
        read_nonempty(&self.summary_path())
    }

    pub fn load_context(&self) -> Option<String> {
        read_nonempty(&self.context_path())
    }

    /// Rewrite the summary wholesale with a fresh metadata header
    pub fn write_summary(&self, body: &str, cutoff: u64) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let date = chrono::Local::now().format("%Y-%m-%d");
        let content = format!(
            "<!-- SUMMARY_METADATA\ncutoff_byte: {}\nlast_updated: {}\n-->\n\n{}",
            cutoff, date, body
        );
        fs::write(self.summary_path(), content)?;
        Ok(())
    }

    // --- Plan ---

    /// Persist an approved plan so it survives restarts and compactions
    pub fn save_plan(&self, plan: &str) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        fs::create_dir_all(&self.dir)?;
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        let content = format!("<!-- Plan saved at: {} -->\n\n{}\n", timestamp, plan.trim());
        fs::write(self.plan_path(), content)?;
        Ok(())
    }

    /// Load the pending plan, metadata header stripped
    pub fn load_plan(&self) -> Option<String> {
        let content = read_nonempty(&self.plan_path())?;
        let stripped = METADATA_COMMENT_RE.replace(&content, "").trim().to_string();
        (!stripped.is_empty()).then_some(stripped)
    }

    /// Remove the pending plan (execution finished or operator cleared it)
    pub fn clear_plan(&self) {
        let _ = fs::remove_file(self.plan_path());
    }

    // --- Compaction ---

    /// Whether the uncompacted tail has grown past the threshold, or the log
    /// is large enough to deserve a first summary.
    pub fn needs_compaction(&self) -> bool {
        if !self.enabled {
            return false;
        }
        let size = self.history_size();
        let cutoff = self.summary_cutoff();
        let new_content = size.saturating_sub(cutoff);

        if new_content > self.config.compaction_threshold_bytes {
            return true;
        }
        !self.summary_path().exists() && size > self.config.min_history_bytes
    }

    /// Regenerate the summary from the history span `[old cutoff, new cutoff)`.
    ///
    /// The span is capped at `max_compaction_bytes` by advancing its start
    /// (older unsummarized content is deliberately dropped from future
    /// context), and split into `chunk_size_bytes` chunks when large — each
    /// chunk summarized independently into a scratch file, then merged with
    /// the prior summary in a second pass.
    pub async fn compact(&self, provider: &dyn Provider, options: &ChatOptions) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let history_size = self.history_size();
        let old_cutoff = self.summary_cutoff();
        let new_cutoff = history_size.saturating_sub(self.config.recent_window_bytes);

        let mut start = old_cutoff;
        let mut span = new_cutoff.saturating_sub(old_cutoff);
        if span == 0 {
            tracing::debug!("Nothing below the recent window to compact yet");
            return Ok(());
        }
        if span > self.config.max_compaction_bytes {
            tracing::info!(
                "Large backlog ({}KB), limiting to {}KB",
                span / 1024,
                self.config.max_compaction_bytes / 1024
            );
            start = new_cutoff - self.config.max_compaction_bytes;
            span = self.config.max_compaction_bytes;
        }

        let conversation = self.read_range_lossy(start, span)?;

        // Preserve an active plan before its transcript is summarized away
        if !self.plan_path().exists() {
            if let Some(plan) = extract_plan(&conversation) {
                tracing::info!("Found active plan in conversation, saving to plan.md");
                self.save_plan(&plan)?;
            }
        }

        let prior_summary = self
            .load_summary()
            .map(|s| METADATA_COMMENT_RE.replace(&s, "").trim().to_string())
            .filter(|s| !s.is_empty());

        let summary = if span > self.config.chunk_size_bytes {
            self.compact_chunked(provider, options, start, new_cutoff, prior_summary.as_deref())
                .await?
        } else {
            let prompt = match prior_summary.as_deref() {
                Some(prior) => extend_prompt(prior, &conversation),
                None => fresh_prompt(&conversation),
            };
            generate_text(provider, SUMMARIZE_SYSTEM, &prompt, options).await?
        };

        if summary.trim().is_empty() {
            return Err(Error::Compaction("summarization returned no text".into()));
        }

        self.write_summary(summary.trim(), new_cutoff)?;
        tracing::info!(cutoff = new_cutoff, "Summary compaction complete");
        Ok(())
    }

    /// Chunked compaction: ordered spans summarized independently into
    /// scratch files, then consolidated with the prior summary.
    async fn compact_chunked(
        &self,
        provider: &dyn Provider,
        options: &ChatOptions,
        start: u64,
        end: u64,
        prior_summary: Option<&str>,
    ) -> Result<String> {
        let mut scratch_files = Vec::new();
        let mut chunk_summaries = Vec::new();
        let mut offset = start;
        let mut index = 1;

        while offset < end {
            let len = (end - offset).min(self.config.chunk_size_bytes);
            let text = self.read_range_lossy(offset, len)?;
            let summary =
                generate_text(provider, SUMMARIZE_SYSTEM, &chunk_prompt(index, &text), options)
                    .await?;

            let scratch = self.dir.join(format!("summary_chunk_{}.md", index));
            fs::write(&scratch, &summary)?;
            scratch_files.push(scratch);
            chunk_summaries.push(summary);

            offset += len;
            index += 1;
        }

        let merged = generate_text(
            provider,
            SUMMARIZE_SYSTEM,
            &merge_prompt(prior_summary, &chunk_summaries),
            options,
        )
        .await?;

        for scratch in scratch_files {
            let _ = fs::remove_file(scratch);
        }

        Ok(merged)
    }
}

/// Split history-log text into `(role, body)` turns.
///
/// Turns are written as `>>>Role:\n<body>\n\n`; a partial leading fragment
/// (the cutoff can land mid-turn) is discarded by the role sanity check.
pub fn parse_turns(content: &str) -> Vec<(String, String)> {
    let mut turns = Vec::new();
    for chunk in content.split("\n\n>>>") {
        let chunk = chunk.strip_prefix(">>>").unwrap_or(chunk);
        if let Some((role, body)) = chunk.split_once(":\n") {
            let role = role.trim().to_lowercase();
            if role.is_empty() || role.len() > 16 || !role.chars().all(|c| c.is_ascii_alphabetic())
            {
                continue;
            }
            turns.push((role, body.trim_end().to_string()));
        }
    }
    turns
}

fn read_nonempty(path: &Path) -> Option<String> {
    let content = fs::read_to_string(path).ok()?;
    let trimmed = content.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

// --- Summarization prompts ---

const SUMMARIZE_SYSTEM: &str = "\
You are a summarization assistant. You condense coding-conversation history \
into a compact summary that preserves everything needed to continue the \
conversation seamlessly. Output only the summary markdown, with no \
conversational wrapper.";

const FORMAT_INSTRUCTIONS: &str = "\
Generate a summary using this format:

# Conversation Summary

## Key Topics Discussed
[Bullet points of main topics and decisions made]

## Important Information to Remember
[Critical details, decisions, or context that should be retained]

## User Preferences
- Coding style preferences
- Tool or technology preferences
- Communication preferences
- Project-specific conventions

## Action Items
[Any pending tasks or future work mentioned]

NOTE: If there was an active plan during this conversation, do NOT include it \
in the summary. Plans are persisted separately.";

fn fresh_prompt(conversation: &str) -> String {
    format!(
        "Here is a conversation history to summarize:\n\n```\n{}\n```\n\n\
         Please create a comprehensive summary of this conversation.\n\n{}",
        conversation, FORMAT_INSTRUCTIONS
    )
}

fn extend_prompt(prior_summary: &str, conversation: &str) -> String {
    format!(
        "Here is the existing conversation summary:\n\n```markdown\n{}\n```\n\n\
         And here is the new conversation to add to the summary:\n\n```\n{}\n```\n\n\
         Please extend the existing summary with insights from the new conversation.\n\
         Keep all the existing content and only ADD new topics, preferences, and action items.\n\
         Do NOT re-summarize or remove existing content.\n\n{}",
        prior_summary, conversation, FORMAT_INSTRUCTIONS
    )
}

fn chunk_prompt(index: usize, conversation: &str) -> String {
    format!(
        "This is part {} of a longer conversation history being summarized in \
         chunks. Summarize the key topics, decisions, preferences, and action \
         items from this part:\n\n```\n{}\n```",
        index, conversation
    )
}

fn merge_prompt(prior_summary: Option<&str>, chunk_summaries: &[String]) -> String {
    let mut prompt = String::new();
    if let Some(prior) = prior_summary {
        prompt.push_str("Here is the existing conversation summary:\n\n```markdown\n");
        prompt.push_str(prior);
        prompt.push_str("\n```\n\n");
    }
    prompt.push_str(
        "Below are summaries of consecutive parts of newer conversation. Merge \
         them (and the existing summary, if given) into one consolidated summary.\n\n",
    );
    for (i, summary) in chunk_summaries.iter().enumerate() {
        prompt.push_str(&format!("Part {}:\n```markdown\n{}\n```\n\n", i + 1, summary));
    }
    prompt.push_str(FORMAT_INSTRUCTIONS);
    prompt
}
