//! Pipeline orchestrator
//!
//! Sequences reader -> filter -> change extraction -> summarizer ->
//! persistence -> insight merge. Parsing and change-set failures are absorbed
//! by their components; summarizer and persistence failures surface as typed
//! errors.

use crate::changes;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::filter::filter_transcript;
use crate::reader::SessionReader;
use crate::summarizer::SummarizerClient;
use crate::types::{AccumulatedInsights, Briefing};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::PathBuf;

/// How a finished briefing is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    /// Overwrite `<session>.json`/`.md` and merge insights.
    Standard,
    /// Save with a timestamp suffix and leave insights untouched
    /// (pre-compaction snapshots accumulate rather than replace).
    Snapshot,
}

/// Summary line for one persisted briefing.
#[derive(Debug, Clone)]
pub struct BriefingSummary {
    pub session_id: String,
    pub project_path: String,
    pub session_summary: String,
    pub created_at: String,
}

/// Aggregate status for the CLI overview.
#[derive(Debug, Clone)]
pub struct PipelineStatus {
    pub total_sessions: usize,
    pub total_briefings: usize,
    pub projects: Vec<String>,
}

/// The extraction pipeline, wired to one set of directories.
pub struct Pipeline {
    reader: SessionReader,
    summarizer: SummarizerClient,
    briefings_dir: PathBuf,
    insights_dir: PathBuf,
}

impl Pipeline {
    /// Build a pipeline from configuration.
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self::with_paths(
            config.projects_dir(),
            config.briefings_dir(),
            config.insights_dir(),
            SummarizerClient::new(config.summarizer.clone())?,
        ))
    }

    /// Build a pipeline against explicit directories (for tests).
    pub fn with_paths(
        projects_dir: PathBuf,
        briefings_dir: PathBuf,
        insights_dir: PathBuf,
        summarizer: SummarizerClient,
    ) -> Self {
        Self {
            reader: SessionReader::new(projects_dir),
            summarizer,
            briefings_dir,
            insights_dir,
        }
    }

    pub fn reader(&self) -> &SessionReader {
        &self.reader
    }

    /// Run the full pipeline on a session.
    ///
    /// With no session id, the most recently modified session is used and its
    /// project path adopted unless one was supplied.
    pub async fn run(
        &self,
        session_id: Option<&str>,
        project_path: Option<&str>,
        mode: SaveMode,
    ) -> Result<Briefing> {
        let mut project_path = project_path.map(str::to_string);

        // Step 1: resolve the session.
        let session_id = match session_id {
            Some(id) => id.to_string(),
            None => {
                let info = self.reader.latest_session(project_path.as_deref())?;
                if project_path.is_none() && !info.project_path.is_empty() {
                    project_path = Some(info.project_path);
                }
                info.session_id
            }
        };

        // Step 2: read the transcript.
        let transcript = self
            .reader
            .read_session(&session_id, project_path.as_deref())?;
        tracing::info!(
            session_id = %session_id,
            messages = transcript.messages.len(),
            "transcript read"
        );

        // Step 3: fall back to the first working-directory hint in the raw
        // records when no project path is known.
        let project_path = project_path
            .or_else(|| {
                transcript.messages.iter().find_map(|msg| {
                    msg.raw
                        .get("cwd")
                        .and_then(|v| v.as_str())
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                })
            })
            .unwrap_or_default();

        // Step 4: filter.
        let filtered = filter_transcript(&session_id, &transcript.messages);
        tracing::info!(
            kept = filtered.stats.kept_count,
            original = filtered.stats.original_count,
            "transcript filtered"
        );

        // Step 5: change set, with the raw transcript as fallback input.
        let change_set = changes::extract(&project_path, Some(&transcript.messages)).await;
        tracing::info!(
            files = change_set.files.len(),
            source = change_set.source.as_str(),
            "change set extracted"
        );

        // Step 6: summarize. Typed failures propagate unchanged.
        let briefing = self
            .summarizer
            .summarize(&filtered, &change_set, &project_path)
            .await?;

        // Steps 7-8: persist, then merge insights.
        match mode {
            SaveMode::Standard => {
                self.save_briefing(&briefing)?;
                self.update_insights(&briefing)?;
            }
            SaveMode::Snapshot => {
                self.save_snapshot(&briefing)?;
            }
        }

        Ok(briefing)
    }

    /// Save a briefing as JSON and rendered Markdown.
    pub fn save_briefing(&self, briefing: &Briefing) -> Result<(PathBuf, PathBuf)> {
        self.write_briefing_files(briefing, &briefing.session_id)
    }

    /// Save a briefing under a timestamped name.
    pub fn save_snapshot(&self, briefing: &Briefing) -> Result<(PathBuf, PathBuf)> {
        let stamp = Utc::now().format("%Y%m%d-%H%M%S");
        let stem = format!("{}-{}", briefing.session_id, stamp);
        self.write_briefing_files(briefing, &stem)
    }

    fn write_briefing_files(&self, briefing: &Briefing, stem: &str) -> Result<(PathBuf, PathBuf)> {
        std::fs::create_dir_all(&self.briefings_dir)
            .map_err(|e| Error::Briefing(format!("failed to create briefings dir: {}", e)))?;

        let json_path = self.briefings_dir.join(format!("{}.json", stem));
        let md_path = self.briefings_dir.join(format!("{}.md", stem));

        let json = serde_json::to_string_pretty(briefing)?;
        std::fs::write(&json_path, json)
            .map_err(|e| Error::Briefing(format!("failed to write {}: {}", json_path.display(), e)))?;
        std::fs::write(&md_path, briefing.to_markdown())
            .map_err(|e| Error::Briefing(format!("failed to write {}: {}", md_path.display(), e)))?;

        Ok((json_path, md_path))
    }

    /// Load a previously saved briefing by session id.
    pub fn load_briefing(&self, session_id: &str) -> Result<Option<Briefing>> {
        let json_path = self.briefings_dir.join(format!("{}.json", session_id));
        if !json_path.exists() {
            return Ok(None);
        }

        let text = std::fs::read_to_string(&json_path)
            .map_err(|e| Error::Briefing(format!("failed to load briefing: {}", e)))?;
        let briefing = serde_json::from_str(&text)
            .map_err(|e| Error::Briefing(format!("failed to parse briefing: {}", e)))?;
        Ok(Some(briefing))
    }

    /// List saved briefings, newest first. Unreadable files are skipped.
    pub fn list_briefings(&self) -> Vec<BriefingSummary> {
        let pattern = self.briefings_dir.join("*.json");
        let Some(pattern) = pattern.to_str().map(str::to_string) else {
            return Vec::new();
        };
        let Ok(paths) = glob::glob(&pattern) else {
            return Vec::new();
        };

        let mut paths: Vec<PathBuf> = paths.flatten().collect();
        paths.sort();
        paths.reverse();

        paths
            .iter()
            .filter_map(|path| {
                let text = std::fs::read_to_string(path).ok()?;
                let briefing: Briefing = serde_json::from_str(&text).ok()?;
                Some(BriefingSummary {
                    session_id: briefing.session_id,
                    project_path: briefing.project_path,
                    session_summary: briefing.session_summary,
                    created_at: briefing.created_at,
                })
            })
            .collect()
    }

    /// Merge a briefing's patterns, issue and architecture note into the
    /// project's accumulated insight record.
    ///
    /// Dedup is exact string match. Concurrent writers may clobber each
    /// other; last writer wins, which is acceptable for advisory insights.
    pub fn update_insights(&self, briefing: &Briefing) -> Result<AccumulatedInsights> {
        std::fs::create_dir_all(&self.insights_dir)
            .map_err(|e| Error::Briefing(format!("failed to create insights dir: {}", e)))?;
        let path = self.insights_path(&briefing.project_path);

        let mut insights = std::fs::read_to_string(&path)
            .ok()
            .and_then(|text| serde_json::from_str::<AccumulatedInsights>(&text).ok())
            .unwrap_or_else(|| AccumulatedInsights {
                project_path: briefing.project_path.clone(),
                ..Default::default()
            });

        for pattern in &briefing.patterns_used {
            if !pattern.pattern.is_empty()
                && !insights.recurring_patterns.contains(&pattern.pattern)
            {
                insights.recurring_patterns.push(pattern.pattern.clone());
            }
        }

        if let Some(risk) = &briefing.will_bite_you {
            if !risk.issue.is_empty() && !insights.known_issues.contains(&risk.issue) {
                insights.known_issues.push(risk.issue.clone());
            }
        }

        if !briefing.how_pieces_connect.is_empty()
            && !insights
                .architecture_notes
                .contains(&briefing.how_pieces_connect)
        {
            insights
                .architecture_notes
                .push(briefing.how_pieces_connect.clone());
        }

        insights.briefing_count += 1;
        insights.last_updated = Utc::now().to_rfc3339();

        let json = serde_json::to_string_pretty(&insights)?;
        std::fs::write(&path, json)
            .map_err(|e| Error::Briefing(format!("failed to write insights: {}", e)))?;

        Ok(insights)
    }

    /// Load the accumulated insight record for a project, if any.
    pub fn load_insights(&self, project_path: &str) -> Option<AccumulatedInsights> {
        let path = self.insights_path(project_path);
        let text = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&text).ok()
    }

    fn insights_path(&self, project_path: &str) -> PathBuf {
        self.insights_dir
            .join(format!("{}.json", project_id(project_path)))
    }

    /// Overall status for the CLI.
    pub fn status(&self) -> PipelineStatus {
        let sessions = self.reader.list_sessions(None);
        let briefings = self.list_briefings();

        let mut projects: Vec<String> = Vec::new();
        for session in &sessions {
            if !session.project_path.is_empty() && !projects.contains(&session.project_path) {
                projects.push(session.project_path.clone());
            }
        }

        PipelineStatus {
            total_sessions: sessions.len(),
            total_briefings: briefings.len(),
            projects,
        }
    }
}

/// Deterministic project id: first 16 hex chars of SHA-256 of the path.
pub fn project_id(project_path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(project_path.as_bytes());
    let hash = hasher.finalize();
    format!("{:x}", hash)[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SummarizerConfig;
    use crate::types::{PatternUse, RiskNote};
    use tempfile::TempDir;

    fn test_pipeline(tmp: &TempDir) -> Pipeline {
        let summarizer = SummarizerClient::new(SummarizerConfig {
            api_key: Some("sk-test".to_string()),
            ..Default::default()
        })
        .unwrap();

        Pipeline::with_paths(
            tmp.path().join("projects"),
            tmp.path().join("briefings"),
            tmp.path().join("insights"),
            summarizer,
        )
    }

    fn sample_briefing(session_id: &str) -> Briefing {
        Briefing {
            session_id: session_id.to_string(),
            project_path: "/home/dev/alpha".to_string(),
            session_summary: "Did things.".to_string(),
            how_pieces_connect: "a calls b".to_string(),
            patterns_used: vec![PatternUse {
                pattern: "builder".to_string(),
                location: "src/x.rs".to_string(),
                explained: "constructs config".to_string(),
            }],
            will_bite_you: Some(RiskNote {
                issue: "race in sync".to_string(),
                ..Default::default()
            }),
            created_at: Utc::now().to_rfc3339(),
            ..Default::default()
        }
    }

    #[test]
    fn test_project_id_is_stable_and_short() {
        let a = project_id("/home/dev/alpha");
        let b = project_id("/home/dev/alpha");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert_ne!(a, project_id("/home/dev/beta"));
    }

    #[test]
    fn test_save_and_load_briefing_round_trip() {
        let tmp = TempDir::new().unwrap();
        let pipeline = test_pipeline(&tmp);
        let briefing = sample_briefing("sess-1");

        let (json_path, md_path) = pipeline.save_briefing(&briefing).unwrap();
        assert!(json_path.exists());
        assert!(md_path.exists());

        let loaded = pipeline.load_briefing("sess-1").unwrap().unwrap();
        assert_eq!(loaded.session_summary, "Did things.");
        assert_eq!(loaded.patterns_used.len(), 1);

        assert!(pipeline.load_briefing("missing").unwrap().is_none());
    }

    #[test]
    fn test_snapshot_does_not_overwrite_standard_briefing() {
        let tmp = TempDir::new().unwrap();
        let pipeline = test_pipeline(&tmp);
        let briefing = sample_briefing("sess-1");

        pipeline.save_briefing(&briefing).unwrap();
        let (snapshot_json, _) = pipeline.save_snapshot(&briefing).unwrap();

        assert_ne!(
            snapshot_json,
            tmp.path().join("briefings").join("sess-1.json")
        );
        assert!(snapshot_json
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("sess-1-"));
        assert_eq!(pipeline.list_briefings().len(), 2);
    }

    #[test]
    fn test_update_insights_merges_and_dedups() {
        let tmp = TempDir::new().unwrap();
        let pipeline = test_pipeline(&tmp);
        let briefing = sample_briefing("sess-1");

        let first = pipeline.update_insights(&briefing).unwrap();
        assert_eq!(first.briefing_count, 1);
        assert_eq!(first.recurring_patterns, vec!["builder"]);
        assert_eq!(first.known_issues, vec!["race in sync"]);
        assert_eq!(first.architecture_notes, vec!["a calls b"]);

        // Merging the same briefing again bumps the counter but adds nothing.
        let second = pipeline.update_insights(&briefing).unwrap();
        assert_eq!(second.briefing_count, 2);
        assert_eq!(second.recurring_patterns, vec!["builder"]);
        assert_eq!(second.known_issues.len(), 1);

        let loaded = pipeline.load_insights("/home/dev/alpha").unwrap();
        assert_eq!(loaded.briefing_count, 2);
    }

    #[test]
    fn test_update_insights_recovers_from_corrupt_record() {
        let tmp = TempDir::new().unwrap();
        let pipeline = test_pipeline(&tmp);
        let briefing = sample_briefing("sess-1");

        std::fs::create_dir_all(tmp.path().join("insights")).unwrap();
        std::fs::write(
            tmp.path()
                .join("insights")
                .join(format!("{}.json", project_id("/home/dev/alpha"))),
            "corrupt {",
        )
        .unwrap();

        let insights = pipeline.update_insights(&briefing).unwrap();
        assert_eq!(insights.briefing_count, 1);
    }

    #[test]
    fn test_status_counts() {
        let tmp = TempDir::new().unwrap();
        let pipeline = test_pipeline(&tmp);
        pipeline.save_briefing(&sample_briefing("sess-1")).unwrap();

        let status = pipeline.status();
        assert_eq!(status.total_sessions, 0);
        assert_eq!(status.total_briefings, 1);
        assert!(status.projects.is_empty());
    }
}
