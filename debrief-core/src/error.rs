//! Error types for debrief-core

use thiserror::Error;

/// Main error type for the debrief-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Prompt store error
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Session not found in any project index
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Transcript file could not be read
    #[error("session read error: {0}")]
    SessionRead(String),

    /// Version-control query failed (always absorbed by the change-set fallbacks)
    #[error("git error: {0}")]
    Git(String),

    /// Remote summarizer failed (API error, rate limit, unparseable response)
    #[error("summarizer error: {0}")]
    Summarizer(String),

    /// Briefing or insight persistence failed
    #[error("briefing error: {0}")]
    Briefing(String),

    /// Prompt not found in the store
    #[error("prompt not found: {0}")]
    PromptNotFound(String),

    /// Prompt name already taken
    #[error("prompt already exists: {0}")]
    PromptAlreadyExists(String),

    /// Prompt name fails the naming rules
    #[error("invalid name: {0:?} (must match ^[a-z0-9][a-z0-9_-]*$)")]
    InvalidName(String),

    /// Template referenced variables that were not supplied
    #[error("missing variables: {}", .0.join(", "))]
    MissingVariables(Vec<String>),

    /// Prompt store schema version mismatch
    #[error("schema version mismatch: expected {expected}, got {got}")]
    SchemaVersion { expected: i32, got: i32 },
}

/// Result type alias for debrief-core
pub type Result<T> = std::result::Result<T, Error>;
