//! Filesystem lock markers and detached background execution
//!
//! Lifecycle events can fire faster than an extraction completes, so the
//! trigger boundary coordinates through marker files: one `<session>.lock`
//! per session, containing its creation time. Markers are best-effort and
//! fail open: anything unreadable or unparseable counts as unlocked, so a
//! corrupt marker can never block analysis.
//!
//! The guarantee is "at most one concurrent extraction per session", not
//! strict mutual exclusion.

use chrono::{DateTime, Utc};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

/// Age below which a marker blocks a new extraction.
pub const DEFAULT_LOCK_MAX_AGE: Duration = Duration::from_secs(60);
/// Age beyond which the sweep removes markers regardless of owner.
pub const STALE_SWEEP_MAX_AGE: Duration = Duration::from_secs(300);

/// Marker-file lock store rooted at one directory.
pub struct LockStore {
    dir: PathBuf,
}

impl LockStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn marker_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}.lock", session_id))
    }

    /// True iff a marker exists and is younger than `max_age`.
    ///
    /// Unreadable or malformed markers are treated as not locked.
    pub fn is_locked(&self, session_id: &str, max_age: Duration) -> bool {
        marker_is_fresh(&self.marker_path(session_id), max_age)
    }

    /// Write (or overwrite) a marker with the current time.
    pub fn create(&self, session_id: &str) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.marker_path(session_id);
        std::fs::write(&path, Utc::now().to_rfc3339())?;
        Ok(path)
    }

    /// Best-effort delete; never fails, even if the marker is absent.
    pub fn remove(&self, session_id: &str) {
        let _ = std::fs::remove_file(self.marker_path(session_id));
    }

    /// Remove every marker older than `max_age`, plus unreadable ones.
    ///
    /// Independent of whichever session is currently being processed.
    pub fn sweep_stale(&self, max_age: Duration) {
        let pattern = self.dir.join("*.lock");
        let Some(pattern) = pattern.to_str().map(str::to_string) else {
            return;
        };
        let Ok(paths) = glob::glob(&pattern) else {
            return;
        };

        for path in paths.flatten() {
            if !marker_is_fresh(&path, max_age) {
                let _ = std::fs::remove_file(&path);
            }
        }
    }
}

fn marker_is_fresh(path: &Path, max_age: Duration) -> bool {
    let Ok(content) = std::fs::read_to_string(path) else {
        return false;
    };
    let Ok(created) = DateTime::parse_from_rfc3339(content.trim()) else {
        return false;
    };
    let age = Utc::now().signed_duration_since(created.with_timezone(&Utc));
    match chrono::Duration::from_std(max_age) {
        Ok(max_age) => age < max_age,
        Err(_) => false,
    }
}

/// Removes a session's lock when dropped.
///
/// The background extraction holds one of these for its entire run so the
/// lock is released on every exit path, success or failure.
pub struct LockGuard {
    store: LockStore,
    session_id: String,
}

impl LockGuard {
    pub fn new(locks_dir: PathBuf, session_id: &str) -> Self {
        Self {
            store: LockStore::new(locks_dir),
            session_id: session_id.to_string(),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.store.remove(&self.session_id);
    }
}

/// Options for [`spawn_detached`].
pub struct SpawnOptions {
    /// Save the briefing with a timestamp suffix and skip the insight merge.
    pub snapshot: bool,
    /// Directory the child's output log lives in.
    pub logs_dir: PathBuf,
    /// Override the binary to launch (defaults to `debrief` next to the
    /// current executable, falling back to PATH lookup).
    pub program: Option<PathBuf>,
}

/// Launch `debrief analyze --background` as a detached process.
///
/// The child runs in its own process group with stdin closed and output
/// appended to `<logs_dir>/analyze-<session_id>.log`. Returns immediately
/// without waiting; spawn failures are swallowed since there is nobody to
/// report them to.
pub fn spawn_detached(session_id: &str, options: &SpawnOptions) {
    if std::fs::create_dir_all(&options.logs_dir).is_err() {
        return;
    }
    let log_path = options
        .logs_dir
        .join(format!("analyze-{}.log", session_id));

    let Ok(log_file) = OpenOptions::new().create(true).append(true).open(&log_path) else {
        return;
    };
    let Ok(log_file_err) = log_file.try_clone() else {
        return;
    };

    let program = options
        .program
        .clone()
        .unwrap_or_else(default_analyze_program);

    let mut command = Command::new(program);
    command
        .arg("analyze")
        .args(["--session-id", session_id])
        .arg("--background");
    if options.snapshot {
        command.arg("--snapshot");
    }

    command
        .stdin(Stdio::null())
        .stdout(Stdio::from(log_file))
        .stderr(Stdio::from(log_file_err));

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // Detach from the caller's session and controlling terminal.
        command.process_group(0);
    }

    let _ = command.spawn();
}

/// The `debrief` binary, preferring a sibling of the current executable.
fn default_analyze_program() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("debrief")))
        .filter(|path| path.exists())
        .unwrap_or_else(|| PathBuf::from("debrief"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_lifecycle() {
        let tmp = TempDir::new().unwrap();
        let store = LockStore::new(tmp.path().to_path_buf());

        assert!(!store.is_locked("s1", DEFAULT_LOCK_MAX_AGE));

        store.create("s1").unwrap();
        assert!(store.is_locked("s1", DEFAULT_LOCK_MAX_AGE));

        store.remove("s1");
        assert!(!store.is_locked("s1", DEFAULT_LOCK_MAX_AGE));

        // Removing again never fails.
        store.remove("s1");
    }

    #[test]
    fn test_aged_marker_unlocks_while_file_remains() {
        let tmp = TempDir::new().unwrap();
        let store = LockStore::new(tmp.path().to_path_buf());

        let path = store.create("s1").unwrap();
        let old = Utc::now() - chrono::Duration::seconds(61);
        std::fs::write(&path, old.to_rfc3339()).unwrap();

        assert!(!store.is_locked("s1", Duration::from_secs(60)));
        assert!(path.exists());
        // Still fresh under a looser threshold.
        assert!(store.is_locked("s1", Duration::from_secs(120)));
    }

    #[test]
    fn test_malformed_marker_fails_open() {
        let tmp = TempDir::new().unwrap();
        let store = LockStore::new(tmp.path().to_path_buf());

        let path = store.create("s1").unwrap();
        std::fs::write(&path, "not a timestamp").unwrap();

        assert!(!store.is_locked("s1", DEFAULT_LOCK_MAX_AGE));
    }

    #[test]
    fn test_create_overwrites_existing_marker() {
        let tmp = TempDir::new().unwrap();
        let store = LockStore::new(tmp.path().to_path_buf());

        let path = store.create("s1").unwrap();
        std::fs::write(&path, "garbage").unwrap();
        store.create("s1").unwrap();

        assert!(store.is_locked("s1", DEFAULT_LOCK_MAX_AGE));
    }

    #[test]
    fn test_sweep_removes_stale_and_garbage_keeps_fresh() {
        let tmp = TempDir::new().unwrap();
        let store = LockStore::new(tmp.path().to_path_buf());

        let fresh = store.create("fresh").unwrap();
        let stale = store.create("stale").unwrap();
        let old = Utc::now() - chrono::Duration::seconds(301);
        std::fs::write(&stale, old.to_rfc3339()).unwrap();
        let garbage = store.create("garbage").unwrap();
        std::fs::write(&garbage, "???").unwrap();

        store.sweep_stale(STALE_SWEEP_MAX_AGE);

        assert!(fresh.exists());
        assert!(!stale.exists());
        assert!(!garbage.exists());
    }

    #[test]
    fn test_sweep_missing_dir_is_harmless() {
        let store = LockStore::new(PathBuf::from("/nonexistent/locks"));
        store.sweep_stale(STALE_SWEEP_MAX_AGE);
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let tmp = TempDir::new().unwrap();
        let store = LockStore::new(tmp.path().to_path_buf());
        store.create("s1").unwrap();

        {
            let _guard = LockGuard::new(tmp.path().to_path_buf(), "s1");
            assert!(store.is_locked("s1", DEFAULT_LOCK_MAX_AGE));
        }

        assert!(!store.is_locked("s1", DEFAULT_LOCK_MAX_AGE));
    }

    #[test]
    fn test_second_trigger_observes_fresh_lock() {
        // Two trigger events one second apart: the second sees the first's
        // marker and must not spawn.
        let tmp = TempDir::new().unwrap();
        let store = LockStore::new(tmp.path().to_path_buf());

        let first_spawns = !store.is_locked("s1", DEFAULT_LOCK_MAX_AGE);
        assert!(first_spawns);
        store.create("s1").unwrap();

        let second_spawns = !store.is_locked("s1", DEFAULT_LOCK_MAX_AGE);
        assert!(!second_spawns);
    }
}
