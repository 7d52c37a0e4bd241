//! Hook installer
//!
//! Registers the `debrief-hook` binary for the Stop and PreCompact lifecycle
//! events by patching the host's `~/.claude/settings.json`. Only entries
//! whose command contains the marker are ever touched; foreign hooks are
//! preserved verbatim.

use crate::error::{Error, Result};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Substring identifying our hook commands inside settings.json.
pub const HOOK_MARKER: &str = "debrief-hook";

/// Lifecycle events we register for, paired with the hook subcommand.
const HOOK_EVENTS: [(&str, &str); 2] = [("Stop", "stop"), ("PreCompact", "pre-compact")];

/// Per-event outcome of an install pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    Added,
    AlreadyExists,
}

/// Per-event outcome of an uninstall pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    NotFound,
}

/// Patches hook registrations into one settings file.
pub struct HookInstaller {
    settings_path: PathBuf,
    hook_program: PathBuf,
}

impl HookInstaller {
    pub fn new(settings_path: PathBuf, hook_program: PathBuf) -> Self {
        Self {
            settings_path,
            hook_program,
        }
    }

    /// Add our hooks, leaving everything else in the file untouched.
    pub fn install(&self) -> Result<BTreeMap<String, InstallOutcome>> {
        let mut settings = self.load_settings();

        if !settings.get("hooks").map(Value::is_object).unwrap_or(false) {
            settings["hooks"] = json!({});
        }

        let mut results = BTreeMap::new();

        for (event, subcommand) in HOOK_EVENTS {
            let matchers = settings["hooks"]
                .get(event)
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();

            if has_our_hook(&matchers) {
                results.insert(event.to_string(), InstallOutcome::AlreadyExists);
                continue;
            }

            let mut matchers = matchers;
            matchers.push(json!({
                "hooks": [{
                    "type": "command",
                    "command": format!("{} {}", self.hook_program.display(), subcommand),
                    "timeout": 5,
                }]
            }));
            settings["hooks"][event] = Value::Array(matchers);
            results.insert(event.to_string(), InstallOutcome::Added);
        }

        self.write_settings(&settings)?;
        Ok(results)
    }

    /// Remove only our hooks, preserving all other registrations.
    pub fn uninstall(&self) -> Result<BTreeMap<String, RemoveOutcome>> {
        let mut results = BTreeMap::new();

        let mut settings = match self.try_load_settings() {
            Some(settings) => settings,
            None => {
                for (event, _) in HOOK_EVENTS {
                    results.insert(event.to_string(), RemoveOutcome::NotFound);
                }
                return Ok(results);
            }
        };

        for (event, _) in HOOK_EVENTS {
            let matchers = settings
                .get("hooks")
                .and_then(|hooks| hooks.get(event))
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();

            if !has_our_hook(&matchers) {
                results.insert(event.to_string(), RemoveOutcome::NotFound);
                continue;
            }

            let remaining: Vec<Value> = matchers
                .into_iter()
                .filter_map(strip_our_hooks)
                .collect();

            let hooks = settings["hooks"]
                .as_object_mut()
                .expect("hooks checked above");
            if remaining.is_empty() {
                hooks.remove(event);
            } else {
                hooks.insert(event.to_string(), Value::Array(remaining));
            }

            results.insert(event.to_string(), RemoveOutcome::Removed);
        }

        self.write_settings(&settings)?;
        Ok(results)
    }

    /// Per-event registration status.
    pub fn check(&self) -> BTreeMap<String, bool> {
        let mut results = BTreeMap::new();
        let settings = self.try_load_settings().unwrap_or_else(|| json!({}));

        for (event, _) in HOOK_EVENTS {
            let registered = settings
                .get("hooks")
                .and_then(|hooks| hooks.get(event))
                .and_then(Value::as_array)
                .map(|matchers| has_our_hook(matchers))
                .unwrap_or(false);
            results.insert(event.to_string(), registered);
        }

        results
    }

    /// Existing settings, or an empty object when missing or corrupt.
    fn load_settings(&self) -> Value {
        self.try_load_settings().unwrap_or_else(|| json!({}))
    }

    fn try_load_settings(&self) -> Option<Value> {
        let text = std::fs::read_to_string(&self.settings_path).ok()?;
        serde_json::from_str(&text).ok()
    }

    fn write_settings(&self, settings: &Value) -> Result<()> {
        if let Some(parent) = self.settings_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("failed to create settings dir: {}", e)))?;
        }
        let text = serde_json::to_string_pretty(settings)?;
        std::fs::write(&self.settings_path, text)
            .map_err(|e| Error::Config(format!("failed to write settings: {}", e)))?;
        Ok(())
    }
}

fn is_our_hook(hook: &Value) -> bool {
    hook.get("command")
        .and_then(Value::as_str)
        .map(|command| command.contains(HOOK_MARKER))
        .unwrap_or(false)
}

fn has_our_hook(matchers: &[Value]) -> bool {
    matchers.iter().any(|group| {
        group
            .get("hooks")
            .and_then(Value::as_array)
            .map(|hooks| hooks.iter().any(is_our_hook))
            .unwrap_or(false)
    })
}

/// Drop our hooks from one matcher group; None when the group becomes empty.
fn strip_our_hooks(group: Value) -> Option<Value> {
    let Some(hooks) = group.get("hooks").and_then(Value::as_array) else {
        return Some(group);
    };

    let remaining: Vec<Value> = hooks
        .iter()
        .filter(|hook| !is_our_hook(hook))
        .cloned()
        .collect();

    if remaining.is_empty() {
        return None;
    }

    let mut group = group;
    group["hooks"] = Value::Array(remaining);
    Some(group)
}
