//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Default database location, relative to the working directory.
pub const DEFAULT_DB_PATH: &str = ".insight/insight.db";

/// insight-rs: multi-agent research assistant for investment questions.
///
/// Classifies each question, gathers evidence from document, news, graph
/// and web collaborators, and writes a report tailored to the user's
/// profile and holdings.
#[derive(Parser, Debug)]
#[command(name = "insight-rs")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the database file.
    ///
    /// Defaults to `.insight/insight.db` in the current directory.
    #[arg(short, long, env = "INSIGHT_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json, ndjson).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Database path, falling back to [`DEFAULT_DB_PATH`].
    #[must_use]
    pub fn get_db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH))
    }
}

/// Options shared by `ask` and `stream`.
#[derive(clap::Args, Debug, Clone)]
pub struct QueryArgs {
    /// The question.
    pub query: String,

    /// User the question belongs to.
    #[arg(short, long, default_value = "default")]
    pub user: String,

    /// Conversation session.
    #[arg(short, long, default_value = "cli")]
    pub session: String,

    /// LLM provider (openai, offline). Defaults to `INSIGHT_PROVIDER`,
    /// then to `openai` when an API key is set.
    #[arg(long)]
    pub provider: Option<String>,

    /// Ceiling on plan → retrieve → critic cycles.
    #[arg(long)]
    pub max_iterations: Option<u32>,

    /// Directory containing prompt template files.
    #[arg(long)]
    pub prompt_dir: Option<PathBuf>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize the database.
    ///
    /// Creates the database file and schema if they don't exist.
    #[command(after_help = r#"Examples:
  insight-rs init                    # Initialize in current directory
  insight-rs init --force            # Re-initialize (destroys existing data)
  insight-rs --db-path ./my.db init  # Initialize with custom path
"#)]
    Init {
        /// Force re-initialization (destroys existing data).
        #[arg(short, long)]
        force: bool,
    },

    /// Answer a question and print the report.
    #[command(after_help = r#"Examples:
  insight-rs ask "삼성전자 투자해도 될까요?"
  insight-rs ask "반도체 업황 전망" --user alice --session s1
  insight-rs --format json ask "LG전자 실적" | jq '.metadata'
"#)]
    Ask(QueryArgs),

    /// Answer a question, printing progress events as they happen.
    #[command(after_help = r#"Examples:
  insight-rs stream "삼성전자 투자해도 될까요?"
  insight-rs --format ndjson stream "반도체 전망" | jq -c 'select(.status != "processing")'
"#)]
    Stream(QueryArgs),

    /// Show conversation history, newest first.
    History {
        /// User whose history to show.
        #[arg(short, long, default_value = "default")]
        user: String,

        /// Restrict to one session.
        #[arg(short, long)]
        session: Option<String>,

        /// Maximum messages.
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },

    /// List stored insights, search them, or show one.
    #[command(after_help = r#"Examples:
  insight-rs insights --user alice
  insight-rs insights --user alice --query "삼성전자 실적"
  insight-rs insights --user alice --id 3
"#)]
    Insights {
        /// User whose insights to list.
        #[arg(short, long, default_value = "default")]
        user: String,

        /// Rank by similarity to this text instead of recency.
        #[arg(short, long)]
        query: Option<String>,

        /// Show one insight in full.
        #[arg(long, conflicts_with = "query")]
        id: Option<i64>,

        /// Maximum insights.
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },

    /// Investment profile operations (set, show).
    #[command(subcommand)]
    Profile(ProfileCommands),

    /// Portfolio operations (add).
    #[command(subcommand)]
    Holding(HoldingCommands),

    /// Write the default prompt templates for customization.
    InitPrompts {
        /// Target directory (defaults to `~/.config/insight-rs/prompts`).
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
}

/// Profile subcommands.
#[derive(Subcommand, Debug)]
pub enum ProfileCommands {
    /// Create or update a profile; omitted fields keep their value.
    Set {
        /// Profile owner.
        #[arg(short, long, default_value = "default")]
        user: String,

        /// Risk tolerance (e.g. conservative, moderate, aggressive).
        #[arg(long)]
        risk_tolerance: Option<String>,

        /// Investment goal.
        #[arg(long)]
        investment_goal: Option<String>,

        /// Experience level (e.g. beginner, intermediate, expert).
        #[arg(long)]
        experience_level: Option<String>,

        /// Preferred sectors, comma separated.
        #[arg(long, value_delimiter = ',')]
        sectors: Vec<String>,

        /// Interests to record, comma separated.
        #[arg(long, value_delimiter = ',')]
        interests: Vec<String>,
    },

    /// Show the stored profile with holdings and interests.
    Show {
        /// Profile owner.
        #[arg(short, long, default_value = "default")]
        user: String,
    },
}

/// Holding subcommands.
#[derive(Subcommand, Debug)]
pub enum HoldingCommands {
    /// Add a position, replacing one with the same symbol.
    #[command(after_help = r#"Examples:
  insight-rs holding add 005930 --name 삼성전자 --quantity 10 --avg-price 71000
"#)]
    Add {
        /// Ticker or company code.
        symbol: String,

        /// Position owner.
        #[arg(short, long, default_value = "default")]
        user: String,

        /// Display name (defaults to the symbol).
        #[arg(long)]
        name: Option<String>,

        /// Units held.
        #[arg(short, long)]
        quantity: f64,

        /// Average purchase price.
        #[arg(long)]
        avg_price: Option<f64>,
    },
}
