//! # debrief-core
//!
//! Core library for debrief - post-session briefings for AI coding sessions.
//!
//! This library provides:
//! - The transcript reader for Claude Code session JSONL files
//! - A deterministic content filter that reduces transcripts to high-signal content
//! - A change-set extractor (git first, tool-call reconstruction as fallback)
//! - The pipeline orchestrator and briefing/insight persistence
//! - Filesystem lock markers and detached background execution for hook triggers
//! - A SQLite-backed prompt template store
//! - The hook installer for Claude Code settings
//!
//! ## Architecture
//!
//! Data flows one way: the reader produces a message sequence, the filter
//! reduces it, the change-set extractor independently reconstructs what code
//! changed, and the orchestrator hands both to the remote summarizer before
//! persisting the briefing and merging cross-session insights.
//!
//! ## Example
//!
//! ```rust,no_run
//! use debrief_core::{Config, Pipeline, SaveMode};
//!
//! # async fn run() -> debrief_core::Result<()> {
//! let config = Config::load()?;
//! let pipeline = Pipeline::new(&config)?;
//! let briefing = pipeline.run(None, None, SaveMode::Standard).await?;
//! println!("{}", briefing.session_summary);
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use error::{Error, Result};
pub use pipeline::{Pipeline, SaveMode};
pub use types::*;

// Public modules
pub mod changes;
pub mod config;
pub mod error;
pub mod filter;
pub mod installer;
pub mod locks;
pub mod logging;
pub mod pipeline;
pub mod reader;
pub mod store;
pub mod summarizer;
pub mod template;
pub mod types;
