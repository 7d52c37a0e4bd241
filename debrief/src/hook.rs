//! debrief-hook - the asynchronous trigger boundary
//!
//! Claude Code invokes this binary on Stop and PreCompact lifecycle events
//! with a JSON payload on stdin. All real work happens in a detached
//! `debrief analyze --background` process; this binary only negotiates the
//! session lock and must answer within the hook's latency budget.
//!
//! The response contract is absolute: exactly one
//! `{"continue": true, "suppressOutput": true}` object on stdout and exit
//! code 0, no matter what went wrong internally.

use debrief_core::locks::{
    spawn_detached, LockStore, SpawnOptions, DEFAULT_LOCK_MAX_AGE, STALE_SWEEP_MAX_AGE,
};
use debrief_core::Config;
use serde::Deserialize;
use std::io::Read;

/// Payload Claude Code writes to the hook's stdin.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct HookInput {
    session_id: String,
    /// Working-directory hint; session resolution recovers it from the
    /// transcript, so it is accepted but not forwarded.
    #[allow(dead_code)]
    cwd: Option<String>,
}

fn main() {
    let event = std::env::args().nth(1).unwrap_or_default();

    // Nothing inside may break the response contract.
    let _ = std::panic::catch_unwind(|| run(&event));

    print!("{}", r#"{"continue": true, "suppressOutput": true}"#);
}

fn run(event: &str) {
    let Some(input) = read_stdin_payload() else {
        return;
    };
    if input.session_id.is_empty() {
        return;
    }

    let config = Config::load().unwrap_or_default();
    let locks = LockStore::new(config.locks_dir());
    let options = SpawnOptions {
        snapshot: event == "pre-compact",
        logs_dir: config.logs_dir(),
        // DEBRIEF_ANALYZE_BIN overrides which binary handles the analysis.
        program: std::env::var_os("DEBRIEF_ANALYZE_BIN").map(std::path::PathBuf::from),
    };

    match event {
        "pre-compact" => {
            // Snapshots don't overwrite each other, so no dedup is needed.
            spawn_detached(&input.session_id, &options);
        }
        _ => {
            locks.sweep_stale(STALE_SWEEP_MAX_AGE);

            // A fresh lock means an extraction is already running.
            if locks.is_locked(&input.session_id, DEFAULT_LOCK_MAX_AGE) {
                return;
            }

            if locks.create(&input.session_id).is_err() {
                return;
            }
            spawn_detached(&input.session_id, &options);
        }
    }
}

/// Parse the hook payload from stdin; None on empty or malformed input.
fn read_stdin_payload() -> Option<HookInput> {
    let mut data = String::new();
    std::io::stdin().read_to_string(&mut data).ok()?;
    if data.trim().is_empty() {
        return None;
    }
    serde_json::from_str(&data).ok()
}
