//! Change-set extractor
//!
//! Reconstructs a best-effort description of the code changes made during a
//! session. Strategies are tried strictly in order:
//!
//! 1. `git diff HEAD~1` in the project directory
//! 2. `git diff HEAD`
//! 3. `git status --porcelain`, synthesizing whole-file additions
//! 4. file-tool invocations recorded in the transcript
//!
//! Every failure mode (not a repository, git missing, timeout, read errors)
//! degrades to the next strategy. [`extract`] never returns an error.

use crate::types::{ChangeSet, ChangeSource, ChangeStatus, ContentBlock, FileChange, Message, Role};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::time::timeout;

use crate::error::{Error, Result};

/// Cap on aggregate diff text handed to the summarizer (~8k tokens).
const MAX_DIFF_CHARS: usize = 32_000;
/// Timeout for each git invocation.
const GIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Extract a change set for a session.
///
/// Prefers version control; falls back to reconstructing from file-tool
/// invocations in `transcript` when git is unusable.
pub async fn extract(project_path: &str, transcript: Option<&[Message]>) -> ChangeSet {
    match git_changes(project_path).await {
        Ok(changes) => changes,
        Err(e) => {
            tracing::debug!(project = project_path, error = %e, "git unusable, falling back to tool calls");
            match transcript {
                Some(messages) => tool_call_changes(messages),
                None => ChangeSet::empty(ChangeSource::ToolCalls),
            }
        }
    }
}

/// Query git for the session's changes.
async fn git_changes(project_path: &str) -> Result<ChangeSet> {
    let cwd = Path::new(project_path);
    if !cwd.is_dir() {
        return Err(Error::Git(format!("not a directory: {}", project_path)));
    }

    // Repository probe; a non-zero exit means we're not in a working tree.
    let probe = run_git(cwd, &["rev-parse", "--git-dir"]).await?;
    if !probe.status.success() {
        return Err(Error::Git(format!("not a git repository: {}", project_path)));
    }

    // Diff against the previous commit first.
    let mut diff_text = String::new();
    if let Ok(output) = run_git(cwd, &["diff", "HEAD~1"]).await {
        if output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            if !stdout.trim().is_empty() {
                diff_text = stdout.into_owned();
            }
        }
    }

    // Then the working tree against the current commit.
    if diff_text.is_empty() {
        let output = run_git(cwd, &["diff", "HEAD"]).await?;
        if output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            if !stdout.trim().is_empty() {
                diff_text = stdout.into_owned();
            }
        }
    }

    // No diffable commits; look at working-tree status instead.
    if diff_text.is_empty() {
        let output = run_git(cwd, &["status", "--porcelain"]).await?;
        if output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            if !stdout.trim().is_empty() {
                return Ok(status_to_changes(&stdout, cwd));
            }
        }
    }

    if diff_text.is_empty() {
        return Ok(ChangeSet::empty(ChangeSource::Git));
    }

    Ok(parse_diff(&diff_text))
}

/// Run one bounded git command.
async fn run_git(cwd: &Path, args: &[&str]) -> Result<std::process::Output> {
    let child = tokio::process::Command::new("git")
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output();

    match timeout(GIT_TIMEOUT, child).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(Error::Git(format!("git {}: {}", args.join(" "), e))),
        Err(_) => Err(Error::Git(format!("git {} timed out", args.join(" ")))),
    }
}

/// Parse unified diff output into a [`ChangeSet`].
pub fn parse_diff(diff_text: &str) -> ChangeSet {
    let (diff_text, truncated) = truncate_chars(diff_text, MAX_DIFF_CHARS);

    let mut files: Vec<FileChange> = Vec::new();
    let mut current_path: Option<String> = None;
    let mut current_lines: Vec<&str> = Vec::new();

    for line in diff_text.split('\n') {
        if line.starts_with("diff --git") {
            if let Some(path) = current_path.take() {
                files.push(build_file_change(path, &current_lines));
            }
            current_path = Some(
                line.rsplit_once(" b/")
                    .map(|(_, path)| path.to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
            );
            current_lines = vec![line];
        } else if current_path.is_some() {
            current_lines.push(line);
        }
    }
    if let Some(path) = current_path.take() {
        files.push(build_file_change(path, &current_lines));
    }

    let total_additions = files.iter().map(|f| f.additions).sum();
    let total_deletions = files.iter().map(|f| f.deletions).sum();

    ChangeSet {
        files,
        total_additions,
        total_deletions,
        truncated,
        source: ChangeSource::Git,
    }
}

/// Build a [`FileChange`] from the collected diff lines of one file.
fn build_file_change(path: String, lines: &[&str]) -> FileChange {
    let mut additions = 0;
    let mut deletions = 0;
    let mut status = ChangeStatus::Modified;

    for line in lines {
        if line.starts_with("new file") {
            status = ChangeStatus::Added;
        } else if line.starts_with("deleted file") {
            status = ChangeStatus::Deleted;
        } else if line.starts_with("rename") {
            status = ChangeStatus::Renamed;
        } else if line.starts_with('+') && !line.starts_with("+++") {
            additions += 1;
        } else if line.starts_with('-') && !line.starts_with("---") {
            deletions += 1;
        }
    }

    FileChange {
        path,
        status,
        additions,
        deletions,
        diff_text: lines.join("\n"),
    }
}

/// Convert `git status --porcelain` output into a [`ChangeSet`].
///
/// There is no commit to diff against, so added/modified files are read in
/// full and presented as pure additions, bounded by the global diff budget.
/// Paths that cannot be read are kept with zero counts and no body.
fn status_to_changes(status_output: &str, cwd: &Path) -> ChangeSet {
    let mut files: Vec<FileChange> = Vec::new();
    let mut total_additions = 0;
    let mut total_deletions = 0;
    let mut total_chars = 0usize;

    for line in status_output.trim().split('\n') {
        if line.len() < 4 {
            continue;
        }
        let code = line[..2].trim();
        let path = line[3..].trim().to_string();

        let status = match code {
            "??" | "A" => ChangeStatus::Added,
            "D" => ChangeStatus::Deleted,
            "R" => ChangeStatus::Renamed,
            _ => ChangeStatus::Modified,
        };

        let mut additions = 0;
        let deletions = 0;
        let mut diff_text = String::new();

        if matches!(status, ChangeStatus::Added | ChangeStatus::Modified)
            && total_chars < MAX_DIFF_CHARS
        {
            let full_path = cwd.join(&path);
            if let Ok(content) = std::fs::read_to_string(&full_path) {
                let file_lines: Vec<&str> = content.lines().collect();
                additions = file_lines.len();
                let body: Vec<String> = file_lines.iter().map(|l| format!("+{}", l)).collect();
                diff_text = format!(
                    "diff --git a/{path} b/{path}\nnew file\n--- /dev/null\n+++ b/{path}\n{}",
                    body.join("\n")
                );
                total_chars += diff_text.chars().count();
            }
        }

        total_additions += additions;
        total_deletions += deletions;
        files.push(FileChange {
            path,
            status,
            additions,
            deletions,
            diff_text,
        });
    }

    ChangeSet {
        files,
        total_additions,
        total_deletions,
        truncated: total_chars >= MAX_DIFF_CHARS,
        source: ChangeSource::Git,
    }
}

/// Reconstruct file changes from Write/Edit tool invocations.
///
/// The first write of a path marks it added; an edit of a path not previously
/// seen marks it modified. First classification wins.
pub fn tool_call_changes(messages: &[Message]) -> ChangeSet {
    let mut seen: Vec<(String, ChangeStatus)> = Vec::new();

    for msg in messages {
        if msg.role != Role::Assistant {
            continue;
        }
        for block in &msg.content {
            let (name, path) = match block {
                ContentBlock::ToolUse { name, input } => (
                    name.as_str(),
                    input
                        .get("file_path")
                        .and_then(|v| v.as_str())
                        .unwrap_or("")
                        .to_string(),
                ),
                // Filtered transcripts carry the reduced form.
                ContentBlock::FileTool { name, file_path } => (name.as_str(), file_path.clone()),
                _ => continue,
            };

            if path.is_empty() {
                continue;
            }

            let already_seen = seen.iter().any(|(p, _)| *p == path);
            match name {
                "Write" if !already_seen => seen.push((path, ChangeStatus::Added)),
                "Edit" if !already_seen => seen.push((path, ChangeStatus::Modified)),
                _ => {}
            }
        }
    }

    let files: Vec<FileChange> = seen
        .into_iter()
        .map(|(path, status)| FileChange {
            path,
            status,
            additions: 0,
            deletions: 0,
            diff_text: String::new(),
        })
        .collect();

    ChangeSet {
        files,
        total_additions: 0,
        total_deletions: 0,
        truncated: false,
        source: ChangeSource::ToolCalls,
    }
}

/// Truncate to at most `max` characters, reporting whether anything was cut.
fn truncate_chars(text: &str, max: usize) -> (&str, bool) {
    match text.char_indices().nth(max) {
        Some((byte_index, _)) => (&text[..byte_index], true),
        None => (text, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageKind;
    use std::process::Command;
    use tempfile::TempDir;

    const SAMPLE_DIFF: &str = "\
diff --git a/src/lib.rs b/src/lib.rs
index 1111111..2222222 100644
--- a/src/lib.rs
+++ b/src/lib.rs
@@ -1,3 +1,4 @@
 fn existing() {}
+fn added_one() {}
+fn added_two() {}
-fn removed() {}
diff --git a/src/new.rs b/src/new.rs
new file mode 100644
--- /dev/null
+++ b/src/new.rs
@@ -0,0 +1,2 @@
+line one
+line two";

    #[test]
    fn test_parse_diff_counts_and_statuses() {
        let changes = parse_diff(SAMPLE_DIFF);

        assert_eq!(changes.files.len(), 2);
        assert_eq!(changes.source, ChangeSource::Git);
        assert!(!changes.truncated);

        let lib = &changes.files[0];
        assert_eq!(lib.path, "src/lib.rs");
        assert_eq!(lib.status, ChangeStatus::Modified);
        assert_eq!(lib.additions, 2);
        assert_eq!(lib.deletions, 1);

        let new = &changes.files[1];
        assert_eq!(new.path, "src/new.rs");
        assert_eq!(new.status, ChangeStatus::Added);
        assert_eq!(new.additions, 2);
        assert_eq!(new.deletions, 0);

        // Totals always reconcile against the per-file sums.
        assert_eq!(
            changes.total_additions,
            changes.files.iter().map(|f| f.additions).sum::<usize>()
        );
        assert_eq!(
            changes.total_deletions,
            changes.files.iter().map(|f| f.deletions).sum::<usize>()
        );
    }

    #[test]
    fn test_parse_diff_caps_aggregate_text() {
        let mut big = String::from("diff --git a/big.rs b/big.rs\n--- a/big.rs\n+++ b/big.rs\n");
        for i in 0..4000 {
            big.push_str(&format!("+line number {} with some padding text\n", i));
        }
        let changes = parse_diff(&big);
        assert!(changes.truncated);
        let total_chars: usize = changes
            .files
            .iter()
            .map(|f| f.diff_text.chars().count())
            .sum();
        assert!(total_chars <= MAX_DIFF_CHARS);
    }

    #[test]
    fn test_status_to_changes_reads_untracked_files() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "alpha\nbeta\n").unwrap();

        let changes = status_to_changes("?? notes.txt\n D gone.txt", tmp.path());

        assert_eq!(changes.files.len(), 2);
        let added = &changes.files[0];
        assert_eq!(added.path, "notes.txt");
        assert_eq!(added.status, ChangeStatus::Added);
        assert_eq!(added.additions, 2);
        assert!(added.diff_text.contains("+alpha"));
        assert!(added.diff_text.contains("+beta"));

        let deleted = &changes.files[1];
        assert_eq!(deleted.status, ChangeStatus::Deleted);
        assert_eq!(deleted.additions, 0);
        assert!(deleted.diff_text.is_empty());

        assert_eq!(changes.total_additions, 2);
    }

    #[test]
    fn test_status_to_changes_unreadable_path_kept_empty() {
        let tmp = TempDir::new().unwrap();
        let changes = status_to_changes("?? missing.txt", tmp.path());
        assert_eq!(changes.files.len(), 1);
        assert_eq!(changes.files[0].additions, 0);
        assert!(changes.files[0].diff_text.is_empty());
    }

    fn assistant_with_tool(name: &str, path: &str) -> Message {
        Message {
            kind: MessageKind::Assistant,
            uuid: String::new(),
            parent_uuid: String::new(),
            timestamp: String::new(),
            role: Role::Assistant,
            content: vec![ContentBlock::ToolUse {
                name: name.to_string(),
                input: serde_json::json!({"file_path": path}),
            }],
            raw: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_tool_calls_first_classification_wins() {
        // Write then Edit on the same path stays "added".
        let messages = vec![
            assistant_with_tool("Write", "/tmp/f.py"),
            assistant_with_tool("Edit", "/tmp/f.py"),
        ];
        let changes = tool_call_changes(&messages);

        assert_eq!(changes.source, ChangeSource::ToolCalls);
        assert_eq!(changes.files.len(), 1);
        assert_eq!(changes.files[0].path, "/tmp/f.py");
        assert_eq!(changes.files[0].status, ChangeStatus::Added);
    }

    #[test]
    fn test_tool_calls_edit_of_unseen_path_is_modified() {
        let messages = vec![assistant_with_tool("Edit", "/tmp/existing.rs")];
        let changes = tool_call_changes(&messages);
        assert_eq!(changes.files[0].status, ChangeStatus::Modified);
    }

    #[test]
    fn test_tool_calls_ignore_user_messages_and_other_tools() {
        let mut user = assistant_with_tool("Write", "/tmp/ignored.rs");
        user.role = Role::User;
        let messages = vec![user, assistant_with_tool("Grep", "/tmp/also-ignored.rs")];
        let changes = tool_call_changes(&messages);
        assert!(changes.files.is_empty());
    }

    #[tokio::test]
    async fn test_extract_falls_back_without_git_repo() {
        let tmp = TempDir::new().unwrap();
        let messages = vec![assistant_with_tool("Write", "/tmp/new.rs")];

        let changes = extract(tmp.path().to_str().unwrap(), Some(&messages)).await;

        // Not a repository: reconstruction from the transcript takes over.
        assert_eq!(changes.source, ChangeSource::ToolCalls);
        assert_eq!(changes.files.len(), 1);
    }

    #[tokio::test]
    async fn test_extract_never_errors_on_nonsense_path() {
        let changes = extract("/definitely/not/a/real/path", None).await;
        assert_eq!(changes.source, ChangeSource::ToolCalls);
        assert!(changes.files.is_empty());
    }

    #[tokio::test]
    async fn test_extract_untracked_file_in_fresh_repo() {
        // Scenario: a git repo with no commits and one untracked two-line file.
        if Command::new("git").arg("--version").output().is_err() {
            return;
        }
        let tmp = TempDir::new().unwrap();
        let ok = Command::new("git")
            .args(["init", "-q"])
            .current_dir(tmp.path())
            .status()
            .map(|s| s.success())
            .unwrap_or(false);
        if !ok {
            return;
        }
        std::fs::write(tmp.path().join("snippet.py"), "print('a')\nprint('b')\n").unwrap();

        let changes = extract(tmp.path().to_str().unwrap(), None).await;

        assert_eq!(changes.source, ChangeSource::Git);
        assert_eq!(changes.files.len(), 1);
        assert_eq!(changes.files[0].status, ChangeStatus::Added);
        assert_eq!(changes.files[0].additions, 2);
        assert!(changes.files[0].diff_text.contains("+print('a')"));
        assert!(changes.files[0].diff_text.contains("+print('b')"));
    }
}
