//! HTTP client for the remote summarizer
//!
//! Sends a filtered conversation and a formatted change set to the Anthropic
//! Messages API and parses the structured briefing out of the response.
//! Malformed responses are retried a bounded number of times before a typed
//! failure is surfaced; API and rate-limit errors surface immediately.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use crate::config::SummarizerConfig;
use crate::error::{Error, Result};
use crate::types::{Briefing, ChangeSet, ContentBlock, FilteredTranscript, MessageKind, Role};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_OUTPUT_TOKENS: u32 = 4096;

const ANALYSIS_PROMPT: &str = r#"You are analyzing a developer's coding session with an AI assistant.
You are given TWO sources of truth:
1. CODEBASE DIFF - what actually changed in the code (the ground truth)
2. CONVERSATION - the developer's messages and AI responses (the context)

The diff tells you WHAT changed. The conversation tells you WHY.
Use both. When they conflict, trust the diff.

Produce a post-session briefing. Be SPECIFIC - reference actual files,
functions, and patterns from the DIFF. Never be generic.

Return JSON with exactly these fields:

{
  "session_summary": "2-3 sentences. What was built/changed. Reference actual file names and functionality from the diff.",

  "what_got_built": [
    {
      "file": "path/to/file.py",
      "description": "What this file does in plain language",
      "key_code": "The most important function/class and what it does",
      "key_decisions": ["Why X pattern was chosen over Y"]
    }
  ],

  "how_pieces_connect": "2-3 sentences explaining the architecture. How do the files relate? What calls what? Reference actual imports and function names.",

  "patterns_used": [
    {
      "pattern": "Name of pattern (e.g., closure-based DI)",
      "where": "file.py:function_name (from the diff)",
      "explained": "What it does and why, in 1-2 sentences."
    }
  ],

  "will_bite_you": {
    "issue": "The single most likely thing to cause problems",
    "where": "file.py:line or function (be precise)",
    "why": "Why this is fragile or non-obvious",
    "what_to_check": "What to look at when it breaks"
  },

  "concepts_touched": [
    {
      "concept": "e.g., SQLite WAL mode",
      "in_code": "Where this concept appears in the actual diff",
      "developer_understood": true,
      "evidence": "From the conversation: what shows understanding"
    }
  ]
}

Respond with ONLY valid JSON, no markdown fencing."#;

/// Request body for POST /v1/messages
#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<RequestMessage<'a>>,
}

#[derive(Serialize)]
struct RequestMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Response body from POST /v1/messages
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ResponseBlock {
    text: String,
}

/// The briefing fields as returned by the summarizer.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct BriefingPayload {
    session_summary: String,
    what_got_built: Vec<crate::types::BuiltFile>,
    how_pieces_connect: String,
    patterns_used: Vec<crate::types::PatternUse>,
    will_bite_you: Option<crate::types::RiskNote>,
    concepts_touched: Vec<crate::types::ConceptNote>,
}

/// HTTP client for the remote summarizer
pub struct SummarizerClient {
    config: SummarizerConfig,
    http_client: reqwest::Client,
    base_url: String,
}

impl SummarizerClient {
    /// Create a new client from configuration.
    ///
    /// Fails with a typed error if no API key can be resolved.
    pub fn new(config: SummarizerConfig) -> Result<Self> {
        let api_key = config
            .resolve_api_key()
            .ok_or_else(|| Error::Summarizer("no API key configured (set ANTHROPIC_API_KEY)".to_string()))?;

        let base_url = config.endpoint.trim_end_matches('/').to_string();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&api_key)
                .map_err(|e| Error::Summarizer(format!("invalid api key: {}", e)))?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Summarizer(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
            base_url,
        })
    }

    /// Summarize a filtered transcript and change set into a [`Briefing`].
    pub async fn summarize(
        &self,
        filtered: &FilteredTranscript,
        changes: &ChangeSet,
        project_path: &str,
    ) -> Result<Briefing> {
        let conversation = format_conversation(filtered);
        let diff = format_changes(changes);
        let user_message = build_user_message(&diff, &conversation, self.config.max_input_chars);

        let mut last_error = String::new();

        for attempt in 0..self.config.max_retries {
            let text = self.request_completion(&user_message).await?;

            match serde_json::from_str::<BriefingPayload>(strip_fences(&text)) {
                Ok(payload) => {
                    return Ok(Briefing {
                        session_id: filtered.session_id.clone(),
                        project_path: project_path.to_string(),
                        session_summary: payload.session_summary,
                        what_got_built: payload.what_got_built,
                        how_pieces_connect: payload.how_pieces_connect,
                        patterns_used: payload.patterns_used,
                        will_bite_you: payload.will_bite_you,
                        concepts_touched: payload.concepts_touched,
                        created_at: chrono::Utc::now().to_rfc3339(),
                    });
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "summarizer returned malformed JSON");
                    last_error = e.to_string();
                }
            }
        }

        Err(Error::Summarizer(format!(
            "failed to parse response after {} attempts: {}",
            self.config.max_retries, last_error
        )))
    }

    /// One Messages API round trip, returning the first text block.
    async fn request_completion(&self, user_message: &str) -> Result<String> {
        let url = format!("{}/v1/messages", self.base_url);

        let request_body = MessagesRequest {
            model: &self.config.model,
            max_tokens: MAX_OUTPUT_TOKENS,
            system: ANALYSIS_PROMPT,
            messages: vec![RequestMessage {
                role: "user",
                content: user_message,
            }],
        };

        let response = self
            .http_client
            .post(&url)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| Error::Summarizer(format!("HTTP request failed: {}", e)))?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::Summarizer(
                "rate limit exceeded; wait a minute and try again, or try a smaller session"
                    .to_string(),
            ));
        }

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            return Err(Error::Summarizer(format!(
                "API error ({}): {}",
                status, error_text
            )));
        }

        let body: MessagesResponse = response
            .json()
            .await
            .map_err(|e| Error::Summarizer(format!("failed to parse response body: {}", e)))?;

        body.content
            .into_iter()
            .next()
            .map(|block| block.text)
            .ok_or_else(|| Error::Summarizer("empty response content".to_string()))
    }
}

/// Assemble the user message, keeping the total under `max_chars`.
///
/// The diff is the ground truth, so when the input is too large the
/// conversation gives way first; only when the diff alone would blow the
/// budget are both halved.
fn build_user_message(diff: &str, conversation: &str, max_chars: usize) -> String {
    let assemble = |diff: &str, conversation: &str| {
        format!("## CODEBASE DIFF\n\n{diff}\n\n## CONVERSATION\n\n{conversation}")
    };

    let message = assemble(diff, conversation);
    if message.chars().count() <= max_chars {
        return message;
    }

    let diff_len = diff.chars().count();
    let available_for_conversation = max_chars.saturating_sub(diff_len + 100);
    if available_for_conversation > 10_000 {
        let kept: String = conversation.chars().take(available_for_conversation).collect();
        return assemble(diff, &format!("{kept}\n\n[...conversation truncated...]"));
    }

    let half = max_chars / 2;
    let diff_kept: String = diff.chars().take(half).collect();
    let conversation_kept: String = conversation.chars().take(half).collect();
    assemble(
        &format!("{diff_kept}\n\n[...diff truncated...]"),
        &format!("{conversation_kept}\n\n[...conversation truncated...]"),
    )
}

/// Format filtered messages into readable conversation text.
pub fn format_conversation(filtered: &FilteredTranscript) -> String {
    let mut parts: Vec<String> = Vec::new();

    for msg in &filtered.messages {
        match msg.role {
            Role::User => {
                let text = extract_text(&msg.content);
                if !text.is_empty() {
                    parts.push(format!("USER: {}", text));
                }
            }
            Role::Assistant => {
                let text = extract_text(&msg.content);
                let tools = extract_tools(&msg.content);
                let mut line = if text.is_empty() {
                    "ASSISTANT:".to_string()
                } else {
                    format!("ASSISTANT: {}", text)
                };
                if !tools.is_empty() {
                    line.push_str(&format!("\n  [Tools: {}]", tools.join(", ")));
                }
                parts.push(line);
            }
            Role::None => {
                if msg.kind == MessageKind::Summary {
                    let text = extract_text(&msg.content);
                    if !text.is_empty() {
                        parts.push(format!("SESSION SUMMARY: {}", text));
                    }
                }
            }
        }
    }

    parts.join("\n\n")
}

/// Format a change set into text for the prompt.
pub fn format_changes(changes: &ChangeSet) -> String {
    if changes.files.is_empty() {
        return "(no diff available)".to_string();
    }

    let mut parts: Vec<String> = Vec::new();
    parts.push(format!(
        "Source: {} | +{} -{} | {} files",
        changes.source.as_str(),
        changes.total_additions,
        changes.total_deletions,
        changes.files.len()
    ));
    if changes.truncated {
        parts.push("(diff truncated)".to_string());
    }
    parts.push(String::new());

    for file in &changes.files {
        if file.diff_text.is_empty() {
            parts.push(format!("  {}: {}", file.status.as_str(), file.path));
        } else {
            parts.push(file.diff_text.clone());
        }
    }

    parts.join("\n")
}

fn extract_text(content: &[ContentBlock]) -> String {
    let texts: Vec<&str> = content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    texts.join(" ")
}

fn extract_tools(content: &[ContentBlock]) -> Vec<String> {
    content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::FileTool { name, file_path } if !file_path.is_empty() => {
                Some(format!("{}({})", name, file_path))
            }
            ContentBlock::FileTool { name, .. } => Some(name.clone()),
            ContentBlock::CommandTool { name, .. } => Some(name.clone()),
            ContentBlock::ToolStub { name } => Some(name.clone()),
            ContentBlock::ToolUse { name, .. } => Some(name.clone()),
            _ => None,
        })
        .collect()
}

/// Strip optional ```json fencing from a model response.
fn strip_fences(text: &str) -> &str {
    let text = text.trim();
    if !text.starts_with("```") {
        return text;
    }

    let without_open = match text.find('\n') {
        Some(index) => &text[index + 1..],
        None => return text,
    };
    without_open
        .trim_end()
        .strip_suffix("```")
        .map(str::trim_end)
        .unwrap_or(without_open)
}
