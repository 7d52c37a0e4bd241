//! Content filter
//!
//! Reduces a transcript to high-signal content. Pure and deterministic: the
//! same input always yields the same [`FilteredTranscript`], and nothing is
//! mutated in place.

use crate::types::{
    ContentBlock, FilterStats, FilteredTranscript, Message, MessageKind, Role,
};

/// Assistant text shorter than this is dropped (boundary kept at exactly 50).
const SHORT_ASSISTANT_THRESHOLD: usize = 50;
/// Assistant text longer than this is truncated (exactly 500 passes through).
const LONG_ASSISTANT_THRESHOLD: usize = 500;
/// Truncation target in characters, before the ellipsis marker.
const TRUNCATE_TO: usize = 300;
/// Kept prefix of shell commands.
const COMMAND_PREVIEW: usize = 100;

/// Tool names whose file_path survives filtering.
const FILE_TOOLS: [&str; 3] = ["Write", "Edit", "Read"];
/// Shell execution tool.
const SHELL_TOOL: &str = "Bash";

/// Apply the reduction rules to a message sequence.
///
/// Rules, in precedence order:
/// 1. progress / file-history-snapshot records are dropped and counted.
/// 2. summary records are kept verbatim.
/// 3. user messages are kept verbatim, regardless of length.
/// 4. assistant messages get block-level stripping, then a survival test.
/// 5. everything else is dropped.
pub fn filter_transcript(session_id: &str, messages: &[Message]) -> FilteredTranscript {
    let mut stats = FilterStats {
        original_count: messages.len(),
        ..Default::default()
    };
    let mut kept: Vec<Message> = Vec::new();

    for msg in messages {
        match msg.kind {
            MessageKind::Progress => {
                stats.removed_progress += 1;
                continue;
            }
            MessageKind::FileHistorySnapshot => {
                stats.removed_file_history += 1;
                continue;
            }
            MessageKind::Summary => {
                kept.push(msg.clone());
                continue;
            }
            _ => {}
        }

        match msg.role {
            Role::User => kept.push(msg.clone()),
            Role::Assistant => {
                let content = filter_assistant_blocks(&msg.content, &mut stats);
                if !survives(&content) {
                    continue;
                }
                kept.push(Message {
                    kind: msg.kind.clone(),
                    uuid: msg.uuid.clone(),
                    parent_uuid: msg.parent_uuid.clone(),
                    timestamp: msg.timestamp.clone(),
                    role: msg.role,
                    content,
                    // Raw payloads don't survive filtering.
                    raw: serde_json::Value::Null,
                });
            }
            Role::None => {}
        }
    }

    stats.kept_count = kept.len();

    FilteredTranscript {
        session_id: session_id.to_string(),
        messages: kept,
        stats,
    }
}

/// Filter individual content blocks of an assistant message.
fn filter_assistant_blocks(content: &[ContentBlock], stats: &mut FilterStats) -> Vec<ContentBlock> {
    let mut result: Vec<ContentBlock> = Vec::with_capacity(content.len());

    for block in content {
        match block {
            ContentBlock::Text { text } => {
                if text.chars().count() > LONG_ASSISTANT_THRESHOLD {
                    stats.truncated_messages += 1;
                    let mut truncated: String = text.chars().take(TRUNCATE_TO).collect();
                    truncated.push_str("...");
                    result.push(ContentBlock::Text { text: truncated });
                } else {
                    result.push(block.clone());
                }
            }
            ContentBlock::ToolUse { name, input } => {
                stats.stripped_tool_content += 1;
                if FILE_TOOLS.contains(&name.as_str()) {
                    result.push(ContentBlock::FileTool {
                        name: name.clone(),
                        file_path: str_field(input, "file_path"),
                    });
                } else if name == SHELL_TOOL {
                    let command = str_field(input, "command");
                    result.push(ContentBlock::CommandTool {
                        name: name.clone(),
                        description: str_field(input, "description"),
                        command_preview: command.chars().take(COMMAND_PREVIEW).collect(),
                    });
                } else {
                    result.push(ContentBlock::ToolStub { name: name.clone() });
                }
            }
            ContentBlock::ToolResult { tool_use_id } => {
                result.push(ContentBlock::ToolResult {
                    tool_use_id: tool_use_id.clone(),
                });
            }
            // Already-stripped and unknown blocks pass through unchanged.
            other => result.push(other.clone()),
        }
    }

    result
}

/// A filtered assistant message survives iff it has a non-text block or at
/// least one text block of 50+ characters.
fn survives(content: &[ContentBlock]) -> bool {
    if content.is_empty() {
        return false;
    }
    content.iter().any(|block| match block {
        ContentBlock::Text { text } => text.chars().count() >= SHORT_ASSISTANT_THRESHOLD,
        _ => true,
    })
}

fn str_field(input: &serde_json::Value, key: &str) -> String {
    input
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}
