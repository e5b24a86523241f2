//! CLI command implementations.
//!
//! Contains the business logic for each CLI command.

// Allow certain patterns that improve readability in CLI output formatting
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::format_push_string)]

use std::io::{self, Write as IoWrite};
use std::path::Path;

use futures_util::StreamExt;
use tokio::runtime::Runtime;

use crate::agent::{AgentConfig, Orchestrator, ProgressEvent, PromptSet, create_provider};
use crate::cli::output::{
    OutputFormat, format_event_line, format_history, format_insight, format_insights,
    format_outcome, format_user_context,
};
use crate::cli::parser::{Cli, Commands, HoldingCommands, ProfileCommands, QueryArgs};
use crate::container::Container;
use crate::error::{CommandError, Result, StorageError};
use crate::storage::{Holding, InsightStore, MemoryStore, SqliteStore, UserProfile};

/// Executes the CLI command.
///
/// # Arguments
///
/// * `cli` - Parsed CLI arguments.
///
/// # Returns
///
/// Result with output string on success.
///
/// # Errors
///
/// Returns an error if the command fails to execute.
pub fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);
    let db_path = cli.get_db_path();

    match &cli.command {
        Commands::Init { force } => cmd_init(&db_path, *force, format),
        Commands::Ask(args) => cmd_ask(&db_path, args, format, cli.verbose),
        Commands::Stream(args) => cmd_stream(&db_path, args, format),
        Commands::History {
            user,
            session,
            limit,
        } => cmd_history(&db_path, user, session.as_deref(), *limit, format),
        Commands::Insights {
            user, id: Some(id), ..
        } => cmd_insight_show(&db_path, user, *id, format),
        Commands::Insights {
            user, query, limit, ..
        } => cmd_insights(&db_path, user, query.as_deref(), *limit, format),
        Commands::Profile(sub) => execute_profile(sub, &db_path, format),
        Commands::Holding(sub) => execute_holding(sub, &db_path, format),
        Commands::InitPrompts { dir } => cmd_init_prompts(dir.as_deref(), format),
    }
}

/// Dispatches profile subcommands.
fn execute_profile(cmd: &ProfileCommands, db_path: &Path, format: OutputFormat) -> Result<String> {
    match cmd {
        ProfileCommands::Set {
            user,
            risk_tolerance,
            investment_goal,
            experience_level,
            sectors,
            interests,
        } => {
            let profile = UserProfile {
                user_id: user.clone(),
                risk_tolerance: risk_tolerance.clone(),
                investment_goal: investment_goal.clone(),
                experience_level: experience_level.clone(),
                preferred_sectors: sectors.clone(),
            };
            cmd_profile_set(db_path, profile, interests, format)
        }
        ProfileCommands::Show { user } => cmd_profile_show(db_path, user, format),
    }
}

/// Dispatches holding subcommands.
fn execute_holding(cmd: &HoldingCommands, db_path: &Path, format: OutputFormat) -> Result<String> {
    match cmd {
        HoldingCommands::Add {
            symbol,
            user,
            name,
            quantity,
            avg_price,
        } => {
            if !quantity.is_finite() || *quantity < 0.0 {
                return Err(CommandError::InvalidArgument(format!(
                    "quantity must be a non-negative number, got {quantity}"
                ))
                .into());
            }
            let holding = Holding {
                symbol: symbol.clone(),
                name: name.clone().unwrap_or_else(|| symbol.clone()),
                quantity: *quantity,
                avg_price: *avg_price,
            };
            cmd_holding_add(db_path, user, holding, format)
        }
    }
}

/// Opens storage and ensures it's initialized.
fn open_storage(db_path: &Path) -> Result<SqliteStore> {
    let store = SqliteStore::open(db_path)?;

    if !store.is_initialized()? {
        return Err(StorageError::NotInitialized.into());
    }

    Ok(store)
}

/// Creates the tokio runtime used as the sync/async bridge.
fn runtime() -> Result<Runtime> {
    Runtime::new().map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to create async runtime: {e}")).into()
    })
}

/// Agent configuration from the environment plus command-line overrides.
fn agent_config(args: Option<&QueryArgs>) -> Result<AgentConfig> {
    let mut builder = AgentConfig::builder();
    if let Some(args) = args {
        if let Some(provider) = &args.provider {
            builder = builder.provider(provider);
        }
        if let Some(n) = args.max_iterations {
            builder = builder.max_iterations(n);
        }
        if let Some(dir) = &args.prompt_dir {
            builder = builder.prompt_dir(dir);
        }
    }
    builder.from_env().build().map_err(|e| {
        CommandError::ExecutionFailed(format!("Agent configuration error: {e}")).into()
    })
}

fn orchestrator(db_path: &Path, args: &QueryArgs) -> Result<Orchestrator> {
    let store = open_storage(db_path)?;
    let config = agent_config(Some(args))?;
    let container = Container::from_config(&config, store).map_err(|e| {
        CommandError::ExecutionFailed(format!("Provider creation failed: {e}"))
    })?;
    Ok(Orchestrator::new(container, config))
}

// ==================== Command Implementations ====================

fn cmd_init(db_path: &Path, force: bool, format: OutputFormat) -> Result<String> {
    // Check if already exists
    if db_path.exists() && !force {
        return Err(CommandError::ExecutionFailed(
            "Database already exists. Use --force to reinitialize.".to_string(),
        )
        .into());
    }

    // If force, delete existing
    if force && db_path.exists() {
        std::fs::remove_file(db_path).map_err(|e| {
            CommandError::ExecutionFailed(format!("Failed to remove existing database: {e}"))
        })?;
    }

    let store = SqliteStore::open(db_path)?;
    store.init()?;

    match format {
        OutputFormat::Text => Ok(format!(
            "Initialized insight database at: {}\n",
            db_path.display()
        )),
        OutputFormat::Json | OutputFormat::Ndjson => {
            let json = serde_json::json!({
                "success": true,
                "path": db_path.to_string_lossy(),
                "force": force
            });
            Ok(format.to_json(&json))
        }
    }
}

fn cmd_ask(db_path: &Path, args: &QueryArgs, format: OutputFormat, verbose: bool) -> Result<String> {
    let orchestrator = orchestrator(db_path, args)?;
    let rt = runtime()?;

    let outcome = rt
        .block_on(orchestrator.execute(&args.query, &args.user, &args.session))
        .map_err(|e| CommandError::ExecutionFailed(format!("Query failed: {e}")))?;

    match format {
        OutputFormat::Text => Ok(format_outcome(&outcome, verbose)),
        OutputFormat::Json | OutputFormat::Ndjson => Ok(format.to_json(&outcome)),
    }
}

/// Writes each event as it arrives. Text mode prints progress lines and
/// returns the final response; JSON modes print one event per line.
fn cmd_stream(db_path: &Path, args: &QueryArgs, format: OutputFormat) -> Result<String> {
    let orchestrator = orchestrator(db_path, args)?;
    let rt = runtime()?;

    rt.block_on(async {
        let events = orchestrator.stream(&args.query, &args.user, &args.session);
        let mut events = std::pin::pin!(events);
        let mut stdout = io::stdout().lock();
        let mut result: Result<String> = Ok(String::new());

        while let Some(event) = events.next().await {
            match format {
                OutputFormat::Text => {
                    if let Some(line) = format_event_line(&event) {
                        writeln!(stdout, "{line}")?;
                    }
                }
                OutputFormat::Json | OutputFormat::Ndjson => {
                    writeln!(stdout, "{}", OutputFormat::Ndjson.to_json(&event))?;
                }
            }
            stdout.flush()?;

            match event {
                ProgressEvent::Completed { response } if format == OutputFormat::Text => {
                    result = Ok(format!("\n{}\n", response.trim_end()));
                }
                ProgressEvent::Error { message } => {
                    result = Err(
                        CommandError::ExecutionFailed(format!("Query failed: {message}")).into(),
                    );
                }
                _ => {}
            }
        }
        result
    })
}

fn cmd_history(
    db_path: &Path,
    user: &str,
    session: Option<&str>,
    limit: usize,
    format: OutputFormat,
) -> Result<String> {
    let store = open_storage(db_path)?;
    let rt = runtime()?;
    let messages = rt.block_on(store.history(user, session, limit))?;
    Ok(format_history(&messages, format))
}

fn cmd_insights(
    db_path: &Path,
    user: &str,
    query: Option<&str>,
    limit: usize,
    format: OutputFormat,
) -> Result<String> {
    let store = open_storage(db_path)?;
    let rt = runtime()?;

    let insights = match query {
        Some(query) => {
            // Query with the provider that embedded the stored insights.
            let provider = agent_config(None)
                .ok()
                .and_then(|config| create_provider(&config).ok());
            let embedding = match provider {
                Some(provider) => rt.block_on(provider.embed(query)).ok(),
                None => None,
            };
            rt.block_on(store.search(user, query, embedding.as_deref(), limit))?
        }
        None => rt.block_on(store.user_insights(user, limit))?,
    };
    Ok(format_insights(&insights, format))
}

fn cmd_insight_show(db_path: &Path, user: &str, id: i64, format: OutputFormat) -> Result<String> {
    let store = open_storage(db_path)?;
    let rt = runtime()?;
    let insight = rt.block_on(store.get(user, id))?;
    Ok(format_insight(&insight, format))
}

fn cmd_profile_set(
    db_path: &Path,
    profile: UserProfile,
    interests: &[String],
    format: OutputFormat,
) -> Result<String> {
    let store = open_storage(db_path)?;
    let rt = runtime()?;
    let user = profile.user_id.clone();

    let context = rt.block_on(async {
        store.upsert_profile(profile).await?;
        for interest in interests.iter().filter(|i| !i.trim().is_empty()) {
            store.add_interest(&user, interest.trim()).await?;
        }
        store.get_user_context(&user, None).await
    })?;

    match format {
        OutputFormat::Text => Ok(format!(
            "Profile updated.\n{}",
            format_user_context(&context, format)
        )),
        OutputFormat::Json | OutputFormat::Ndjson => Ok(format_user_context(&context, format)),
    }
}

fn cmd_profile_show(db_path: &Path, user: &str, format: OutputFormat) -> Result<String> {
    let store = open_storage(db_path)?;
    let rt = runtime()?;
    let context = rt.block_on(store.get_user_context(user, None))?;
    Ok(format_user_context(&context, format))
}

fn cmd_holding_add(
    db_path: &Path,
    user: &str,
    holding: Holding,
    format: OutputFormat,
) -> Result<String> {
    let store = open_storage(db_path)?;
    let rt = runtime()?;
    let summary = format!("{} ({}) x {}", holding.name, holding.symbol, holding.quantity);
    let json = serde_json::json!({ "user_id": user, "holding": holding });
    rt.block_on(store.add_holding(user, holding))?;

    match format {
        OutputFormat::Text => Ok(format!("Added holding for {user}: {summary}\n")),
        OutputFormat::Json | OutputFormat::Ndjson => Ok(format.to_json(&json)),
    }
}

fn cmd_init_prompts(dir: Option<&Path>, format: OutputFormat) -> Result<String> {
    let target_dir = dir
        .map(Path::to_path_buf)
        .or_else(PromptSet::default_dir)
        .ok_or_else(|| {
            CommandError::ExecutionFailed(
                "Could not determine home directory for default prompt path".to_string(),
            )
        })?;

    let written = PromptSet::write_defaults(&target_dir).map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to write prompt templates: {e}"))
    })?;

    match format {
        OutputFormat::Text => {
            if written.is_empty() {
                Ok(format!(
                    "All prompt templates already exist in: {}\n",
                    target_dir.display()
                ))
            } else {
                let mut output = format!(
                    "Wrote {} prompt template(s) to: {}\n",
                    written.len(),
                    target_dir.display()
                );
                for path in &written {
                    output.push_str(&format!(
                        "  {}\n",
                        path.file_name()
                            .and_then(|n| n.to_str())
                            .unwrap_or("unknown")
                    ));
                }
                output.push_str("\nEdit these files to customize agent system prompts.\n");
                Ok(output)
            }
        }
        OutputFormat::Json | OutputFormat::Ndjson => {
            let json = serde_json::json!({
                "directory": target_dir.to_string_lossy(),
                "written": written.iter().map(|p| p.to_string_lossy().into_owned()).collect::<Vec<_>>(),
                "count": written.len()
            });
            Ok(format.to_json(&json))
        }
    }
}
