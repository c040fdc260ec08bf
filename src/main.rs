//! Binary entry point for kbase.
//!
//! This binary provides the CLI interface for the knowledge base.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

mod commands;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use kbase::KbConfig;
use kbase::config::CONFIG_PATH_ENV;
use kbase::observability;

use commands::{OutputFormat, ScopeArgs};

/// kbase - Scoped knowledge base for AI agent conversations.
#[derive(Parser)]
#[command(name = "kbase")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Add an entry.
    Add {
        #[command(flatten)]
        scope: ScopeArgs,

        /// Entry name (unique within the scope).
        name: String,

        /// Entry text. Read from --file when omitted.
        content: Option<String>,

        /// Read the entry text from a file.
        #[arg(short, long, conflicts_with = "content")]
        file: Option<PathBuf>,

        /// Short description.
        #[arg(short, long)]
        description: Option<String>,

        /// When the entry is used: always, on_request or contextual.
        #[arg(short, long, default_value = "always")]
        usage: String,
    },

    /// List the entries of a scope.
    List {
        #[command(flatten)]
        scope: ScopeArgs,

        /// Include deactivated entries.
        #[arg(long)]
        all: bool,

        /// Output format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,

        /// List from a running server instead of the local database.
        #[arg(long, env = "KBASE_SERVER_URL")]
        server: Option<String>,
    },

    /// Show one entry.
    Show {
        /// Entry ID.
        id: String,

        /// Output format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Update an entry. Only the given fields change.
    Update {
        /// Entry ID.
        id: String,

        /// New name.
        #[arg(long)]
        name: Option<String>,

        /// New description; an empty string clears it.
        #[arg(long)]
        description: Option<String>,

        /// New text.
        #[arg(long)]
        content: Option<String>,

        /// New usage context.
        #[arg(long)]
        usage: Option<String>,

        /// Reactivate the entry.
        #[arg(long, conflicts_with = "deactivate")]
        activate: bool,

        /// Deactivate the entry.
        #[arg(long)]
        deactivate: bool,
    },

    /// Delete an entry.
    Delete {
        /// Entry ID.
        id: String,
    },

    /// Delete every entry of a scope, or of a whole account.
    Purge {
        #[command(flatten)]
        scope: ScopeArgs,

        /// Delete everything the account owns, in every scope.
        #[arg(long)]
        everything: bool,

        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,
    },

    /// Upload a document and turn it into an entry.
    Upload {
        #[command(flatten)]
        scope: ScopeArgs,

        /// File to upload.
        file: PathBuf,

        /// MIME type; guessed from the extension when omitted.
        #[arg(long)]
        mime_type: Option<String>,

        /// Short description.
        #[arg(short, long)]
        description: Option<String>,

        /// When the entry is used: always, on_request or contextual.
        #[arg(short, long, default_value = "always")]
        usage: String,
    },

    /// List the upload jobs of a scope.
    Jobs {
        #[command(flatten)]
        scope: ScopeArgs,
    },

    /// Delete an uploaded document, renamed copies included, and its jobs.
    Forget {
        #[command(flatten)]
        scope: ScopeArgs,

        /// Uploaded file name.
        filename: String,
    },

    /// Print assembled context.
    ///
    /// Without --scope-only, prints the combined global, thread and agent
    /// context (requires --account and --thread).
    Context {
        #[command(flatten)]
        scope: ScopeArgs,

        /// Print only the selected scope's block.
        #[arg(long)]
        scope_only: bool,

        /// Token budget.
        #[arg(short, long)]
        max_tokens: Option<usize>,
    },

    /// Search entries for text.
    Query {
        #[command(flatten)]
        scope: ScopeArgs,

        /// The query text.
        query: String,

        /// Maximum number of chunks.
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Show entry counts and token totals of a scope.
    Stats {
        #[command(flatten)]
        scope: ScopeArgs,
    },

    /// Run the REST server.
    Serve {
        /// Bind address.
        #[arg(long)]
        host: Option<String>,

        /// Bind port.
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show the effective configuration.
    Config,

    /// Generate shell completions.
    Completions {
        /// Target shell.
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Main entry point.
fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    if let Err(e) = observability::init_from_settings(&config.logging, cli.verbose) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run_command(cli, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command.
fn run_command(cli: Cli, mut config: KbConfig) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Add {
            scope,
            name,
            content,
            file,
            description,
            usage,
        } => commands::cmd_add(&config, &scope, name, content, file, description, &usage),

        Commands::List {
            scope,
            all,
            format,
            server,
        } => commands::cmd_list(&config, &scope, all, format, server.as_deref()),

        Commands::Show { id, format } => commands::cmd_show(&config, &id, format),

        Commands::Update {
            id,
            name,
            description,
            content,
            usage,
            activate,
            deactivate,
        } => {
            let is_active = match (activate, deactivate) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            commands::cmd_update(
                &config,
                &id,
                name,
                description,
                content,
                usage.as_deref(),
                is_active,
            )
        },

        Commands::Delete { id } => commands::cmd_delete(&config, &id),

        Commands::Purge {
            scope,
            everything,
            yes,
        } => commands::cmd_purge(&config, &scope, everything, yes),

        Commands::Upload {
            scope,
            file,
            mime_type,
            description,
            usage,
        } => commands::cmd_upload(&config, &scope, &file, mime_type, description, &usage),

        Commands::Jobs { scope } => commands::cmd_jobs(&config, &scope),

        Commands::Forget { scope, filename } => commands::cmd_forget(&config, &scope, &filename),

        Commands::Context {
            scope,
            scope_only,
            max_tokens,
        } => commands::cmd_context(&config, &scope, scope_only, max_tokens),

        Commands::Query {
            scope,
            query,
            limit,
            format,
        } => commands::cmd_query(&config, &scope, query, limit, format),

        Commands::Stats { scope } => commands::cmd_stats(&config, &scope),

        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            kbase::http::serve(&config).map_err(Into::into)
        },

        Commands::Config => commands::cmd_config(&config),

        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "kbase", &mut std::io::stdout());
            Ok(())
        },
    }
}

/// Loads configuration: explicit path, then `KBASE_CONFIG_PATH`, then the
/// default locations. Environment overrides apply last.
fn load_config(path: Option<&str>) -> Result<KbConfig, Box<dyn std::error::Error>> {
    if let Some(config_path) = path {
        return Ok(KbConfig::load_from_file(Path::new(config_path))?.with_env_overrides());
    }

    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV)
        && !config_path.trim().is_empty()
    {
        return Ok(KbConfig::load_from_file(Path::new(&config_path))?.with_env_overrides());
    }

    Ok(KbConfig::load_default().with_env_overrides())
}
