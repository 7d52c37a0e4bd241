//! Transcript reader
//!
//! Resolves Claude Code sessions through the per-project `sessions-index.json`
//! documents and parses session JSONL files into ordered [`Message`]
//! sequences.
//!
//! # Error Handling
//!
//! The parser is designed to be resilient and recover from partial corruption:
//!
//! - **Malformed JSON lines**: skipped silently, parsing continues. A single
//!   bad line never aborts the transcript.
//! - **Unreadable transcript file**: surfaced as [`Error::SessionRead`].
//! - **Missing or unparseable index documents**: the project is skipped.
//! - **Missing fields**: defaulted via `#[serde(default)]`.

use crate::error::{Error, Result};
use crate::types::{ContentBlock, Message, MessageKind, Role, SessionInfo, TranscriptSession};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Reads sessions from a Claude Code projects directory.
pub struct SessionReader {
    projects_dir: PathBuf,
}

// ============================================
// Raw JSONL record types (serde deserialization)
// ============================================

/// Represents a single line from a session JSONL file.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawRecord {
    #[serde(rename = "type")]
    record_type: Option<String>,
    uuid: Option<String>,
    parent_uuid: Option<String>,
    timestamp: Option<String>,
    summary: Option<String>,
    message: Option<RawMessage>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawMessage {
    role: Option<String>,
    content: Option<RawContent>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawContent {
    Text(String),
    Blocks(Vec<serde_json::Value>),
    // Kept so an object-shaped content field still parses (and yields an
    // empty block sequence) instead of dropping the record.
    Other(#[allow(dead_code)] serde_json::Value),
}

/// A project's `sessions-index.json` document.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct SessionsIndex {
    original_path: String,
    entries: Vec<IndexEntry>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct IndexEntry {
    session_id: String,
    full_path: String,
    first_prompt: String,
    summary: String,
    message_count: u64,
    created: String,
    modified: String,
    git_branch: String,
    project_path: Option<String>,
}

impl SessionReader {
    pub fn new(projects_dir: PathBuf) -> Self {
        Self { projects_dir }
    }

    /// List available sessions, optionally filtered by original project path,
    /// sorted by modification time descending.
    ///
    /// A missing or empty projects directory yields an empty list, not an error.
    pub fn list_sessions(&self, project_path: Option<&str>) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> = Vec::new();

        let entries = match std::fs::read_dir(&self.projects_dir) {
            Ok(entries) => entries,
            Err(_) => return sessions,
        };

        let mut project_dirs: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        project_dirs.sort();

        for project_dir in project_dirs {
            let index_path = project_dir.join("sessions-index.json");

            let index: SessionsIndex = match std::fs::read_to_string(&index_path)
                .ok()
                .and_then(|text| serde_json::from_str(&text).ok())
            {
                Some(index) => index,
                None => continue,
            };

            if let Some(filter) = project_path {
                if index.original_path != filter {
                    continue;
                }
            }

            for entry in index.entries {
                sessions.push(SessionInfo {
                    session_id: entry.session_id,
                    full_path: entry.full_path,
                    first_prompt: entry.first_prompt,
                    summary: entry.summary,
                    message_count: entry.message_count,
                    created: entry.created,
                    modified: entry.modified,
                    git_branch: entry.git_branch,
                    project_path: entry
                        .project_path
                        .unwrap_or_else(|| index.original_path.clone()),
                });
            }
        }

        sessions.sort_by(|a, b| b.modified.cmp(&a.modified));
        sessions
    }

    /// Get the most recently modified session.
    pub fn latest_session(&self, project_path: Option<&str>) -> Result<SessionInfo> {
        self.list_sessions(project_path)
            .into_iter()
            .next()
            .ok_or_else(|| Error::SessionNotFound("no sessions found".to_string()))
    }

    /// Read all messages from a session's JSONL file.
    pub fn read_session(
        &self,
        session_id: &str,
        project_path: Option<&str>,
    ) -> Result<TranscriptSession> {
        let info = self
            .list_sessions(project_path)
            .into_iter()
            .find(|s| s.session_id == session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;

        let jsonl_path = PathBuf::from(&info.full_path);
        if !jsonl_path.exists() {
            return Err(Error::SessionRead(format!(
                "JSONL file not found: {}",
                jsonl_path.display()
            )));
        }

        let messages = parse_transcript(&jsonl_path)?;
        Ok(TranscriptSession {
            session_id: session_id.to_string(),
            messages,
        })
    }
}

/// Parse a session JSONL file into messages, one record per line.
///
/// Lines that fail to parse are skipped; only an unreadable file is an error.
pub fn parse_transcript(path: &Path) -> Result<Vec<Message>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::SessionRead(format!("{}: {}", path.display(), e)))?;

    let mut messages: Vec<Message> = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let raw: serde_json::Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(_) => continue,
        };

        let record: RawRecord = match serde_json::from_value(raw.clone()) {
            Ok(r) => r,
            Err(_) => continue,
        };

        let kind = MessageKind::parse(record.record_type.as_deref().unwrap_or(""));

        let mut role = Role::None;
        let mut content: Vec<ContentBlock> = Vec::new();

        match kind {
            MessageKind::User | MessageKind::Assistant => {
                let inner = record.message.unwrap_or_default();
                role = Role::parse(inner.role.as_deref().unwrap_or(kind.as_str()));
                content = match inner.content {
                    Some(RawContent::Text(text)) => vec![ContentBlock::Text { text }],
                    Some(RawContent::Blocks(blocks)) => {
                        blocks.iter().map(block_from_value).collect()
                    }
                    _ => Vec::new(),
                };
            }
            MessageKind::Summary => {
                content = vec![ContentBlock::Text {
                    text: record.summary.unwrap_or_default(),
                }];
            }
            _ => {}
        }

        messages.push(Message {
            kind,
            uuid: record.uuid.unwrap_or_default(),
            parent_uuid: record.parent_uuid.unwrap_or_default(),
            timestamp: record.timestamp.unwrap_or_default(),
            role,
            content,
            raw,
        });
    }

    Ok(messages)
}

/// Convert one raw content block into a [`ContentBlock`].
///
/// Unknown block kinds are carried verbatim so downstream stages can decide
/// what to do with them.
fn block_from_value(value: &serde_json::Value) -> ContentBlock {
    let get_str =
        |key: &str| -> String { value.get(key).and_then(|v| v.as_str()).unwrap_or("").to_string() };

    match value.get("type").and_then(|v| v.as_str()) {
        Some("text") => ContentBlock::Text { text: get_str("text") },
        Some("tool_use") => ContentBlock::ToolUse {
            name: get_str("name"),
            input: value.get("input").cloned().unwrap_or(serde_json::Value::Null),
        },
        Some("tool_result") => ContentBlock::ToolResult {
            tool_use_id: get_str("tool_use_id"),
        },
        _ => ContentBlock::Other(value.clone()),
    }
}
