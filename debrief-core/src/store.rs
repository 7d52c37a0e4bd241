//! Prompt store
//!
//! SQLite-backed storage for reusable prompt templates, keyed by a unique
//! name. The schema version lives in a `meta` table and is checked on open.

use crate::error::{Error, Result};
use crate::types::Prompt;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

pub const SCHEMA_VERSION: i32 = 1;

/// Check a prompt name against `^[a-z0-9][a-z0-9_-]*$`.
pub fn validate_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let head_ok = chars
        .next()
        .map(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .unwrap_or(false);
    let tail_ok = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');

    if head_ok && tail_ok {
        Ok(())
    } else {
        Err(Error::InvalidName(name.to_string()))
    }
}

/// SQLite-backed prompt storage.
pub struct PromptStore {
    conn: Connection,
}

impl PromptStore {
    /// Open (or create) the store at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS prompts (
                id TEXT PRIMARY KEY,
                name TEXT UNIQUE NOT NULL,
                content TEXT NOT NULL,
                category TEXT NOT NULL DEFAULT 'general',
                variables TEXT NOT NULL DEFAULT '[]',
                use_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                schema_version INTEGER NOT NULL DEFAULT 1
            );",
        )?;

        let version: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match version {
            None => {
                self.conn.execute(
                    "INSERT INTO meta (key, value) VALUES ('schema_version', ?1)",
                    params![SCHEMA_VERSION.to_string()],
                )?;
            }
            Some(value) => {
                let got: i32 = value.parse().unwrap_or(-1);
                if got != SCHEMA_VERSION {
                    return Err(Error::SchemaVersion {
                        expected: SCHEMA_VERSION,
                        got,
                    });
                }
            }
        }

        Ok(())
    }

    fn row_to_prompt(row: &Row<'_>) -> rusqlite::Result<Prompt> {
        let variables_json: String = row.get("variables")?;
        Ok(Prompt {
            id: row.get("id")?,
            name: row.get("name")?,
            content: row.get("content")?,
            category: row.get("category")?,
            variables: serde_json::from_str(&variables_json).unwrap_or_default(),
            use_count: row.get("use_count")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            schema_version: row.get("schema_version")?,
        })
    }

    /// Insert a new prompt. The name must be unused.
    pub fn save(&self, prompt: &Prompt) -> Result<()> {
        let variables = serde_json::to_string(&prompt.variables)?;
        let result = self.conn.execute(
            "INSERT INTO prompts
                (id, name, content, category, variables, use_count,
                 created_at, updated_at, schema_version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                prompt.id,
                prompt.name,
                prompt.content,
                prompt.category,
                variables,
                prompt.use_count,
                prompt.created_at,
                prompt.updated_at,
                prompt.schema_version,
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(Error::PromptAlreadyExists(prompt.name.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Fetch a prompt by name.
    pub fn get(&self, name: &str) -> Result<Prompt> {
        self.conn
            .query_row(
                "SELECT * FROM prompts WHERE name = ?1",
                params![name],
                Self::row_to_prompt,
            )
            .optional()?
            .ok_or_else(|| Error::PromptNotFound(name.to_string()))
    }

    /// Delete a prompt by name, returning the deleted record.
    pub fn delete(&self, name: &str) -> Result<Prompt> {
        let prompt = self.get(name)?;
        self.conn
            .execute("DELETE FROM prompts WHERE name = ?1", params![name])?;
        Ok(prompt)
    }

    /// List prompts ordered by name, optionally restricted to one category.
    pub fn list(&self, category: Option<&str>) -> Result<Vec<Prompt>> {
        let mut prompts = Vec::new();
        match category {
            Some(category) => {
                let mut stmt = self
                    .conn
                    .prepare("SELECT * FROM prompts WHERE category = ?1 ORDER BY name")?;
                let rows = stmt.query_map(params![category], Self::row_to_prompt)?;
                for row in rows {
                    prompts.push(row?);
                }
            }
            None => {
                let mut stmt = self.conn.prepare("SELECT * FROM prompts ORDER BY name")?;
                let rows = stmt.query_map([], Self::row_to_prompt)?;
                for row in rows {
                    prompts.push(row?);
                }
            }
        }
        Ok(prompts)
    }

    /// Substring search over name, content and category.
    pub fn search(&self, query: &str) -> Result<Vec<Prompt>> {
        let pattern = format!("%{}%", query);
        let mut stmt = self.conn.prepare(
            "SELECT * FROM prompts
             WHERE name LIKE ?1 OR content LIKE ?1 OR category LIKE ?1
             ORDER BY name",
        )?;
        let rows = stmt.query_map(params![pattern], Self::row_to_prompt)?;
        let mut prompts = Vec::new();
        for row in rows {
            prompts.push(row?);
        }
        Ok(prompts)
    }

    /// Most recently updated prompts.
    pub fn recent(&self, limit: usize) -> Result<Vec<Prompt>> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM prompts ORDER BY updated_at DESC LIMIT ?1")?;
        let rows = stmt.query_map(params![limit as i64], Self::row_to_prompt)?;
        let mut prompts = Vec::new();
        for row in rows {
            prompts.push(row?);
        }
        Ok(prompts)
    }

    /// Bump a prompt's use counter, returning the updated record.
    pub fn record_use(&self, name: &str) -> Result<Prompt> {
        // Existence check first so a miss is PromptNotFound, not a no-op.
        self.get(name)?;
        let now = chrono::Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE prompts SET use_count = use_count + 1, updated_at = ?1 WHERE name = ?2",
            params![now, name],
        )?;
        self.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("code-review_2").is_ok());
        assert!(validate_name("9lives").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("Bad").is_err());
        assert!(validate_name("-leading-dash").is_err());
        assert!(validate_name("has space").is_err());
    }

    #[test]
    fn test_save_and_get() {
        let store = PromptStore::open_in_memory().unwrap();
        let prompt = Prompt::new("review", "Review {{file}} carefully", "code");

        store.save(&prompt).unwrap();
        let loaded = store.get("review").unwrap();
        assert_eq!(loaded.content, "Review {{file}} carefully");
        assert_eq!(loaded.variables, vec!["file"]);
        assert_eq!(loaded.category, "code");
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let store = PromptStore::open_in_memory().unwrap();
        store.save(&Prompt::new("dup", "one", "general")).unwrap();

        let result = store.save(&Prompt::new("dup", "two", "general"));
        assert!(matches!(result, Err(Error::PromptAlreadyExists(name)) if name == "dup"));
    }

    #[test]
    fn test_get_missing_prompt() {
        let store = PromptStore::open_in_memory().unwrap();
        assert!(matches!(
            store.get("ghost"),
            Err(Error::PromptNotFound(name)) if name == "ghost"
        ));
    }

    #[test]
    fn test_delete_returns_record() {
        let store = PromptStore::open_in_memory().unwrap();
        store.save(&Prompt::new("tmp", "content", "general")).unwrap();

        let deleted = store.delete("tmp").unwrap();
        assert_eq!(deleted.name, "tmp");
        assert!(store.get("tmp").is_err());
    }

    #[test]
    fn test_list_and_filter_by_category() {
        let store = PromptStore::open_in_memory().unwrap();
        store.save(&Prompt::new("b-review", "x", "code")).unwrap();
        store.save(&Prompt::new("a-plan", "y", "planning")).unwrap();

        let all = store.list(None).unwrap();
        let names: Vec<&str> = all.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a-plan", "b-review"]);

        let code = store.list(Some("code")).unwrap();
        assert_eq!(code.len(), 1);
        assert_eq!(code[0].name, "b-review");
    }

    #[test]
    fn test_search_matches_content() {
        let store = PromptStore::open_in_memory().unwrap();
        store
            .save(&Prompt::new("alpha", "summarize the diff", "general"))
            .unwrap();
        store.save(&Prompt::new("beta", "other", "general")).unwrap();

        let hits = store.search("diff").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "alpha");
    }

    #[test]
    fn test_record_use_bumps_counter() {
        let store = PromptStore::open_in_memory().unwrap();
        store.save(&Prompt::new("used", "content", "general")).unwrap();

        let updated = store.record_use("used").unwrap();
        assert_eq!(updated.use_count, 1);
        let again = store.record_use("used").unwrap();
        assert_eq!(again.use_count, 2);

        assert!(store.record_use("missing").is_err());
    }

    #[test]
    fn test_open_persists_across_reopen() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("store.db");

        {
            let store = PromptStore::open(&path).unwrap();
            store.save(&Prompt::new("keep", "content", "general")).unwrap();
        }

        let store = PromptStore::open(&path).unwrap();
        assert_eq!(store.get("keep").unwrap().content, "content");
    }
}
