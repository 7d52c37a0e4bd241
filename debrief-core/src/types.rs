//! Domain types shared across the extraction pipeline.
//!
//! Messages and content blocks are immutable once constructed by the reader;
//! the filter produces new blocks rather than mutating in place.

use serde::{Deserialize, Serialize};

/// Record type of a transcript line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    User,
    Assistant,
    Summary,
    Progress,
    FileHistorySnapshot,
    /// Any record type we don't model explicitly (queue-operation, etc.)
    Other(String),
}

impl MessageKind {
    /// Map a raw `type` field to a kind. Unknown strings are preserved.
    pub fn parse(s: &str) -> Self {
        match s {
            "user" => MessageKind::User,
            "assistant" => MessageKind::Assistant,
            "summary" => MessageKind::Summary,
            "progress" => MessageKind::Progress,
            "file-history-snapshot" => MessageKind::FileHistorySnapshot,
            other => MessageKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MessageKind::User => "user",
            MessageKind::Assistant => "assistant",
            MessageKind::Summary => "summary",
            MessageKind::Progress => "progress",
            MessageKind::FileHistorySnapshot => "file-history-snapshot",
            MessageKind::Other(s) => s,
        }
    }
}

/// Author role of a message payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    User,
    Assistant,
    /// No role, or one we don't recognize.
    #[default]
    None,
}

impl Role {
    pub fn parse(s: &str) -> Self {
        match s {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            _ => Role::None,
        }
    }
}

/// One unit of a message's payload.
///
/// `Text`, `ToolUse` and `ToolResult` come out of the reader; `FileTool`,
/// `CommandTool` and `ToolStub` are the reduced forms the filter substitutes
/// for `ToolUse` blocks. `Other` carries block kinds we don't model, verbatim.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
    },
    FileTool {
        name: String,
        file_path: String,
    },
    CommandTool {
        name: String,
        description: String,
        command_preview: String,
    },
    ToolStub {
        name: String,
    },
    Other(serde_json::Value),
}

/// A single message parsed from a session transcript.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub kind: MessageKind,
    pub uuid: String,
    pub parent_uuid: String,
    pub timestamp: String,
    pub role: Role,
    pub content: Vec<ContentBlock>,
    /// The raw record as parsed from the transcript line. Cleared by the filter.
    pub raw: serde_json::Value,
}

/// A session id together with its ordered message sequence.
#[derive(Debug, Clone)]
pub struct TranscriptSession {
    pub session_id: String,
    pub messages: Vec<Message>,
}

/// Metadata about a session, taken from a project's `sessions-index.json`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub full_path: String,
    pub first_prompt: String,
    pub summary: String,
    pub message_count: u64,
    pub created: String,
    pub modified: String,
    pub git_branch: String,
    pub project_path: String,
}

/// Counters from the filter stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub original_count: usize,
    pub kept_count: usize,
    pub removed_progress: usize,
    pub removed_file_history: usize,
    pub truncated_messages: usize,
    pub stripped_tool_content: usize,
}

/// Output of the filter stage.
#[derive(Debug, Clone)]
pub struct FilteredTranscript {
    pub session_id: String,
    pub messages: Vec<Message>,
    pub stats: FilterStats,
}

/// Classification of a single file change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeStatus {
    Added,
    Modified,
    Deleted,
    Renamed,
}

impl ChangeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeStatus::Added => "added",
            ChangeStatus::Modified => "modified",
            ChangeStatus::Deleted => "deleted",
            ChangeStatus::Renamed => "renamed",
        }
    }
}

/// A single file's change information.
#[derive(Debug, Clone, PartialEq)]
pub struct FileChange {
    pub path: String,
    pub status: ChangeStatus,
    pub additions: usize,
    pub deletions: usize,
    pub diff_text: String,
}

/// Where a change set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeSource {
    /// Parsed from version-control output.
    Git,
    /// Reconstructed from file-tool invocations in the transcript.
    ToolCalls,
}

impl ChangeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeSource::Git => "git",
            ChangeSource::ToolCalls => "tool_calls",
        }
    }
}

/// Aggregate code changes attributed to a session.
///
/// Invariant: the totals equal the sums over `files`.
#[derive(Debug, Clone)]
pub struct ChangeSet {
    pub files: Vec<FileChange>,
    pub total_additions: usize,
    pub total_deletions: usize,
    pub truncated: bool,
    pub source: ChangeSource,
}

impl ChangeSet {
    pub fn empty(source: ChangeSource) -> Self {
        Self {
            files: Vec::new(),
            total_additions: 0,
            total_deletions: 0,
            truncated: false,
            source,
        }
    }
}

/// One file entry in a briefing's "what got built" section.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BuiltFile {
    pub file: String,
    pub description: String,
    pub key_code: String,
    pub key_decisions: Vec<String>,
}

/// One pattern observation in a briefing.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PatternUse {
    pub pattern: String,
    #[serde(rename = "where")]
    pub location: String,
    pub explained: String,
}

/// The single most likely source of future trouble.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RiskNote {
    pub issue: String,
    #[serde(rename = "where")]
    pub location: String,
    pub why: String,
    pub what_to_check: String,
}

/// One concept the session touched, with evidence of understanding.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ConceptNote {
    pub concept: String,
    pub in_code: String,
    pub developer_understood: bool,
    pub evidence: String,
}

/// Summarizer output for one session, as persisted.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Briefing {
    pub session_id: String,
    pub project_path: String,
    pub session_summary: String,
    pub what_got_built: Vec<BuiltFile>,
    pub how_pieces_connect: String,
    pub patterns_used: Vec<PatternUse>,
    pub will_bite_you: Option<RiskNote>,
    pub concepts_touched: Vec<ConceptNote>,
    pub created_at: String,
}

impl Briefing {
    /// Render the briefing as a human-readable Markdown document.
    pub fn to_markdown(&self) -> String {
        let mut lines: Vec<String> = Vec::new();
        lines.push(format!("# Session Briefing: {}", self.session_id));
        lines.push(String::new());
        lines.push(format!("**Project:** {}", self.project_path));
        lines.push(format!("**Generated:** {}", self.created_at));
        lines.push(String::new());

        lines.push("## Summary".to_string());
        lines.push(self.session_summary.clone());
        lines.push(String::new());

        if !self.what_got_built.is_empty() {
            lines.push("## What Got Built".to_string());
            for item in &self.what_got_built {
                lines.push(format!("### `{}`", item.file));
                lines.push(item.description.clone());
                if !item.key_code.is_empty() {
                    lines.push(format!("- **Key code:** {}", item.key_code));
                }
                for decision in &item.key_decisions {
                    lines.push(format!("- {}", decision));
                }
                lines.push(String::new());
            }
        }

        if !self.how_pieces_connect.is_empty() {
            lines.push("## How Pieces Connect".to_string());
            lines.push(self.how_pieces_connect.clone());
            lines.push(String::new());
        }

        if !self.patterns_used.is_empty() {
            lines.push("## Patterns Used".to_string());
            for p in &self.patterns_used {
                lines.push(format!(
                    "- **{}** ({}): {}",
                    p.pattern, p.location, p.explained
                ));
            }
            lines.push(String::new());
        }

        if let Some(risk) = &self.will_bite_you {
            lines.push("## Will Bite You".to_string());
            lines.push(format!("**Issue:** {}", risk.issue));
            lines.push(format!("**Where:** {}", risk.location));
            lines.push(format!("**Why:** {}", risk.why));
            lines.push(format!("**What to check:** {}", risk.what_to_check));
            lines.push(String::new());
        }

        if !self.concepts_touched.is_empty() {
            lines.push("## Concepts Touched".to_string());
            for c in &self.concepts_touched {
                let marker = if c.developer_understood { "Y" } else { "N" };
                lines.push(format!(
                    "- **{}** [{}] ({}): {}",
                    c.concept, marker, c.in_code, c.evidence
                ));
            }
            lines.push(String::new());
        }

        lines.join("\n")
    }
}

/// Cross-session tracking, one record per project, merged on write.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AccumulatedInsights {
    pub project_path: String,
    pub recurring_patterns: Vec<String>,
    pub known_issues: Vec<String>,
    pub architecture_notes: Vec<String>,
    pub last_updated: String,
    pub briefing_count: u64,
}

/// A stored reusable prompt template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prompt {
    pub id: String,
    pub name: String,
    pub content: String,
    pub category: String,
    pub variables: Vec<String>,
    pub use_count: i64,
    pub created_at: String,
    pub updated_at: String,
    pub schema_version: i32,
}

impl Prompt {
    /// Build a new prompt with a fresh id and timestamps, extracting
    /// `{{var}}` placeholders from the content.
    pub fn new(name: &str, content: &str, category: &str) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            content: content.to_string(),
            category: category.to_string(),
            variables: crate::template::extract_variables(content),
            use_count: 0,
            created_at: now.clone(),
            updated_at: now,
            schema_version: crate::store::SCHEMA_VERSION,
        }
    }
}
