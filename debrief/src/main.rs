//! debrief - post-session briefings for Claude Code sessions
//!
//! The composition root: wires configuration into the extraction pipeline and
//! the prompt store, and renders results for the terminal.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use debrief_core::installer::{HookInstaller, InstallOutcome, RemoveOutcome};
use debrief_core::locks::LockGuard;
use debrief_core::store::PromptStore;
use debrief_core::{Briefing, Config, Pipeline, Prompt, SaveMode};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "debrief")]
#[command(about = "Post-session briefings for AI coding sessions")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a session and generate a briefing
    Analyze {
        /// Session ID to analyze (defaults to the most recent session)
        #[arg(short, long)]
        session_id: Option<String>,

        /// Project path to scope session resolution
        #[arg(short, long)]
        project: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        output: OutputFormat,

        /// Run silently, logging to the per-session analysis log
        #[arg(long)]
        background: bool,

        /// Save with a timestamp suffix and skip the insight merge
        #[arg(long)]
        snapshot: bool,

        /// Send a desktop notification when the briefing is ready
        #[arg(long)]
        notify: bool,
    },

    /// List available sessions
    Sessions {
        /// Project path to filter by
        #[arg(short, long)]
        project: Option<String>,
    },

    /// View previously generated briefings
    Briefing {
        /// Session ID (omit to list all briefings)
        #[arg(short, long)]
        session_id: Option<String>,

        /// Show file details and key code
        #[arg(long)]
        detail: bool,

        /// Show everything, rendered as Markdown
        #[arg(long)]
        full: bool,
    },

    /// Show status overview
    Status,

    /// Manage stored prompt templates
    Prompt {
        #[command(subcommand)]
        command: PromptCommands,
    },

    /// Register or remove debrief hooks in Claude Code
    Setup {
        /// Remove debrief hooks instead of installing them
        #[arg(long)]
        remove: bool,

        /// Show hook registration status
        #[arg(long)]
        status: bool,
    },
}

#[derive(Subcommand)]
enum PromptCommands {
    /// Store a new prompt template
    Add {
        name: String,
        content: String,
        #[arg(short, long, default_value = "general")]
        category: String,
    },
    /// Show one prompt
    Show { name: String },
    /// Fill a prompt's variables and print the expanded text
    Use {
        name: String,
        /// Variable values as key=value pairs
        #[arg(short, long = "var")]
        vars: Vec<String>,
    },
    /// List prompts, optionally by category
    List {
        #[arg(short, long)]
        category: Option<String>,
    },
    /// Search prompts by substring
    Search { query: String },
    /// Delete a prompt
    Delete { name: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
    Markdown,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    Config::ensure_xdg_env();
    let config = Config::load().context("failed to load configuration")?;

    match cli.command {
        Commands::Analyze {
            session_id,
            project,
            output,
            background,
            snapshot,
            notify,
        } => {
            if background {
                run_background_analysis(&config, session_id, project, snapshot, notify).await;
                Ok(())
            } else {
                run_interactive_analysis(&config, session_id, project, output, snapshot, notify)
                    .await
            }
        }
        Commands::Sessions { project } => run_sessions(&config, project.as_deref()),
        Commands::Briefing {
            session_id,
            detail,
            full,
        } => run_briefing(&config, session_id.as_deref(), detail, full),
        Commands::Status => run_status(&config),
        Commands::Prompt { command } => run_prompt(&config, command),
        Commands::Setup { remove, status } => run_setup(&config, remove, status),
    }
}

/// Background mode: log instead of printing, release the lock on every exit
/// path, and always exit 0 so the detached process never alarms anyone.
async fn run_background_analysis(
    config: &Config,
    session_id: Option<String>,
    project: Option<String>,
    snapshot: bool,
    notify: bool,
) {
    debrief_core::logging::init_background(&config.logging);

    // The trigger created the lock before spawning us; hold a guard so it is
    // removed however this run ends.
    let _lock_guard = session_id
        .as_deref()
        .map(|id| LockGuard::new(config.locks_dir(), id));

    let mode = if snapshot {
        SaveMode::Snapshot
    } else {
        SaveMode::Standard
    };

    let result = async {
        let pipeline = Pipeline::new(config)?;
        pipeline
            .run(session_id.as_deref(), project.as_deref(), mode)
            .await
    }
    .await;

    match result {
        Ok(briefing) => {
            tracing::info!(
                session_id = %briefing.session_id,
                files = briefing.what_got_built.len(),
                "briefing saved"
            );
            if notify {
                send_notification(&briefing.session_id);
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "analysis failed");
        }
    }
}

async fn run_interactive_analysis(
    config: &Config,
    session_id: Option<String>,
    project: Option<String>,
    output: OutputFormat,
    snapshot: bool,
    notify: bool,
) -> Result<()> {
    let _guard = debrief_core::logging::init(&config.logging);

    let mode = if snapshot {
        SaveMode::Snapshot
    } else {
        SaveMode::Standard
    };

    let pipeline = Pipeline::new(config)?;
    let briefing = pipeline
        .run(session_id.as_deref(), project.as_deref(), mode)
        .await
        .context("analysis failed")?;

    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&briefing)?),
        OutputFormat::Markdown => println!("{}", briefing.to_markdown()),
        OutputFormat::Text => print_briefing_text(&briefing),
    }

    if notify {
        send_notification(&briefing.session_id);
    }

    Ok(())
}

fn run_sessions(config: &Config, project: Option<&str>) -> Result<()> {
    let pipeline_reader = debrief_core::reader::SessionReader::new(config.projects_dir());
    let sessions = pipeline_reader.list_sessions(project);

    if sessions.is_empty() {
        println!("No sessions found.");
        return Ok(());
    }

    println!("{:<4} {:<38} {:<50} {:>6}  {}", "#", "Session ID", "Summary", "Msgs", "Modified");
    for (i, session) in sessions.iter().enumerate() {
        let label = if session.summary.is_empty() {
            &session.first_prompt
        } else {
            &session.summary
        };
        println!(
            "{:<4} {:<38} {:<50} {:>6}  {}",
            i + 1,
            session.session_id,
            clip(label, 50),
            session.message_count,
            clip(&session.modified, 10),
        );
    }
    println!("\nUse: debrief analyze -s <session-id>");
    Ok(())
}

fn run_briefing(
    config: &Config,
    session_id: Option<&str>,
    detail: bool,
    full: bool,
) -> Result<()> {
    let pipeline = pipeline_without_summarizer(config)?;

    match session_id {
        Some(id) => {
            let briefing = pipeline
                .load_briefing(id)?
                .with_context(|| format!("no briefing found for session {}", id))?;

            if full {
                println!("{}", briefing.to_markdown());
            } else if detail {
                print_briefing_text(&briefing);
            } else {
                print_briefing_compact(&briefing);
            }
        }
        None => {
            let briefings = pipeline.list_briefings();
            if briefings.is_empty() {
                println!("No briefings generated yet.");
                return Ok(());
            }

            println!("{:<4} {:<38} {:<50} {}", "#", "Session ID", "Summary", "Created");
            for (i, b) in briefings.iter().enumerate() {
                println!(
                    "{:<4} {:<38} {:<50} {}",
                    i + 1,
                    b.session_id,
                    clip(&b.session_summary, 50),
                    clip(&b.created_at, 10),
                );
            }
            println!("\nUse: debrief briefing -s <session-id>");
        }
    }
    Ok(())
}

fn run_status(config: &Config) -> Result<()> {
    let pipeline = pipeline_without_summarizer(config)?;
    let status = pipeline.status();

    println!("Sessions:  {}", status.total_sessions);
    println!("Briefings: {}", status.total_briefings);
    if status.projects.is_empty() {
        println!("Projects:  none");
    } else {
        println!("Projects:  {}", status.projects.join(", "));
    }

    for project in &status.projects {
        if let Some(insights) = pipeline.load_insights(project) {
            println!("\nInsights for {}:", project);
            println!("  Briefings: {}", insights.briefing_count);
            if !insights.recurring_patterns.is_empty() {
                println!("  Patterns:  {}", insights.recurring_patterns.join(", "));
            }
            println!("  Known issues: {}", insights.known_issues.len());
        }
    }

    Ok(())
}

fn run_prompt(config: &Config, command: PromptCommands) -> Result<()> {
    let store = PromptStore::open(&config.store_path()).context("failed to open prompt store")?;

    match command {
        PromptCommands::Add {
            name,
            content,
            category,
        } => {
            debrief_core::store::validate_name(&name)?;
            let prompt = Prompt::new(&name, &content, &category);
            store.save(&prompt)?;
            println!("Stored prompt '{}' ({} variables)", name, prompt.variables.len());
        }
        PromptCommands::Use { name, vars } => {
            let prompt = store.get(&name)?;
            let values: std::collections::HashMap<String, String> = vars
                .iter()
                .filter_map(|pair| {
                    pair.split_once('=')
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                })
                .collect();

            let missing = debrief_core::template::validate_variables(&prompt.content, &values);
            if !missing.is_empty() {
                return Err(debrief_core::Error::MissingVariables(missing).into());
            }

            println!(
                "{}",
                debrief_core::template::fill_template(&prompt.content, &values)
            );
            store.record_use(&name)?;
        }
        PromptCommands::Show { name } => {
            let prompt = store.get(&name)?;
            println!("{} [{}]  used {} times", prompt.name, prompt.category, prompt.use_count);
            if !prompt.variables.is_empty() {
                println!("variables: {}", prompt.variables.join(", "));
            }
            println!("\n{}", prompt.content);
        }
        PromptCommands::List { category } => {
            let prompts = store.list(category.as_deref())?;
            if prompts.is_empty() {
                println!("No prompts stored.");
            }
            for prompt in prompts {
                println!("{:<24} [{}] {}", prompt.name, prompt.category, clip(&prompt.content, 60));
            }
        }
        PromptCommands::Search { query } => {
            let prompts = store.search(&query)?;
            if prompts.is_empty() {
                println!("No prompts matching '{}'.", query);
            }
            for prompt in prompts {
                println!("{:<24} [{}] {}", prompt.name, prompt.category, clip(&prompt.content, 60));
            }
        }
        PromptCommands::Delete { name } => {
            store.delete(&name)?;
            println!("Deleted prompt '{}'", name);
        }
    }

    Ok(())
}

fn run_setup(config: &Config, remove: bool, status: bool) -> Result<()> {
    let installer = HookInstaller::new(config.claude_settings_path(), hook_program());

    if status {
        println!("Hook registration status:");
        for (event, registered) in installer.check() {
            let marker = if registered { "registered" } else { "not registered" };
            println!("  {}: {}", event, marker);
        }
        return Ok(());
    }

    if remove {
        println!("Removing debrief hooks:");
        for (event, outcome) in installer.uninstall()? {
            let label = match outcome {
                RemoveOutcome::Removed => "removed",
                RemoveOutcome::NotFound => "not found",
            };
            println!("  {}: {}", event, label);
        }
        return Ok(());
    }

    println!("Installing debrief hooks:");
    for (event, outcome) in installer.install()? {
        let label = match outcome {
            InstallOutcome::Added => "added",
            InstallOutcome::AlreadyExists => "already exists",
        };
        println!("  {}: {}", event, label);
    }
    println!();
    println!("debrief will analyze sessions automatically via the Anthropic API.");
    println!("  API key: from ANTHROPIC_API_KEY environment variable");
    println!("  Disable anytime: debrief setup --remove");

    Ok(())
}

/// Pipeline for read-only commands; a placeholder key means viewing saved
/// briefings never requires credentials.
fn pipeline_without_summarizer(config: &Config) -> Result<Pipeline> {
    let mut summarizer_config = config.summarizer.clone();
    if summarizer_config.resolve_api_key().is_none() {
        summarizer_config.api_key = Some("unused".to_string());
    }
    Ok(Pipeline::with_paths(
        config.projects_dir(),
        config.briefings_dir(),
        config.insights_dir(),
        debrief_core::summarizer::SummarizerClient::new(summarizer_config)?,
    ))
}

/// The debrief-hook binary next to the current executable.
fn hook_program() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("debrief-hook")))
        .filter(|path| path.exists())
        .unwrap_or_else(|| PathBuf::from("debrief-hook"))
}

fn print_briefing_text(briefing: &Briefing) {
    println!("Session Briefing: {}", short_id(&briefing.session_id));
    println!("Project: {}", briefing.project_path);
    println!();
    println!("{}", briefing.session_summary);

    if !briefing.what_got_built.is_empty() {
        println!("\nWhat Got Built:");
        for item in &briefing.what_got_built {
            println!("  {} - {}", item.file, item.description);
            if !item.key_code.is_empty() {
                println!("    key code: {}", clip(&item.key_code, 70));
            }
        }
    }

    if !briefing.how_pieces_connect.is_empty() {
        println!("\nHow Pieces Connect:");
        println!("  {}", briefing.how_pieces_connect);
    }

    if let Some(risk) = &briefing.will_bite_you {
        println!("\nWill Bite You:");
        println!("  {}", risk.issue);
        println!("  where: {}", risk.location);
        println!("  why:   {}", risk.why);
        println!("  check: {}", risk.what_to_check);
    }

    if !briefing.patterns_used.is_empty() {
        println!("\nPatterns Used:");
        for pattern in &briefing.patterns_used {
            println!("  {} ({}): {}", pattern.pattern, pattern.location, pattern.explained);
        }
    }
}

fn print_briefing_compact(briefing: &Briefing) {
    println!(
        "Session {} - {}",
        short_id(&briefing.session_id),
        clip(&briefing.session_summary, 60)
    );
    println!(
        "  {} files changed | {} patterns | {} issue",
        briefing.what_got_built.len(),
        briefing.patterns_used.len(),
        if briefing.will_bite_you.is_some() { 1 } else { 0 },
    );

    if let Some(risk) = &briefing.will_bite_you {
        println!("  Warning: {}", risk.issue);
        if !risk.location.is_empty() {
            println!("    -> {}", risk.location);
        }
    }

    if !briefing.what_got_built.is_empty() {
        let files: Vec<&str> = briefing
            .what_got_built
            .iter()
            .map(|item| item.file.as_str())
            .collect();
        println!("  Files: {}", files.join(", "));
    }
}

/// Fire a desktop notification; best-effort, nothing to report on failure.
fn send_notification(session_id: &str) {
    let message = format!("Session {} analyzed", short_id(session_id));

    #[cfg(target_os = "macos")]
    let result = std::process::Command::new("osascript")
        .args([
            "-e",
            &format!("display notification \"{}\" with title \"debrief\"", message),
        ])
        .spawn();

    #[cfg(target_os = "linux")]
    let result = std::process::Command::new("notify-send")
        .args(["debrief", &message])
        .spawn();

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    let result: std::io::Result<std::process::Child> = Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "no notifier",
    ));

    if let Ok(mut child) = result {
        let _ = child.wait();
    }
}

fn short_id(session_id: &str) -> &str {
    session_id.get(..8).unwrap_or(session_id)
}

fn clip(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
