//! Command handlers module.
//!
//! - `entries.rs`: entry CRUD, purge and stats
//! - `documents.rs`: uploads and their jobs
//! - `context.rs`: context assembly and free-text query
//! - `config.rs`: configuration display

mod config;
mod context;
mod documents;
mod entries;

use clap::{Args, ValueEnum};
use kbase::{Error, KbConfig, KnowledgeBase, Result, Scope, ScopeKey, UsageContext};

pub use config::cmd_config;
pub use context::{cmd_context, cmd_query};
pub use documents::{cmd_forget, cmd_jobs, cmd_upload};
pub use entries::{cmd_add, cmd_delete, cmd_list, cmd_purge, cmd_show, cmd_stats, cmd_update};

/// Result type of command handlers.
pub type CmdResult = std::result::Result<(), Box<dyn std::error::Error>>;

/// Output format for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text.
    Table,
    /// Pretty-printed JSON.
    Json,
}

/// Scope selection shared by commands.
///
/// With neither `--thread` nor `--agent` the account's global scope is used.
#[derive(Debug, Clone, Args)]
pub struct ScopeArgs {
    /// Account owning the entries.
    #[arg(short, long, env = "KBASE_ACCOUNT_ID")]
    pub account: Option<String>,

    /// Conversation thread. Takes precedence over --agent when selecting one scope.
    #[arg(short, long)]
    pub thread: Option<String>,

    /// Agent.
    #[arg(short = 'g', long)]
    pub agent: Option<String>,
}

impl ScopeArgs {
    /// The full scope, for creating entries.
    pub fn scope(&self) -> Result<Scope> {
        let account = self.account_id()?;
        Ok(match (&self.thread, &self.agent) {
            (Some(thread), _) => Scope::thread(account, thread.as_str()),
            (None, Some(agent)) => Scope::agent(account, agent.as_str()),
            (None, None) => Scope::global(account),
        })
    }

    /// The lookup key, for reading entries. Only global scopes need the account.
    pub fn key(&self) -> Result<ScopeKey> {
        match (&self.thread, &self.agent) {
            (Some(thread), _) => Ok(ScopeKey::thread(thread.as_str())),
            (None, Some(agent)) => Ok(ScopeKey::agent(agent.as_str())),
            (None, None) => Ok(ScopeKey::global(self.account_id()?)),
        }
    }

    /// The account id, required.
    pub fn account_id(&self) -> Result<&str> {
        self.account
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .ok_or_else(|| {
                Error::InvalidInput("--account (or KBASE_ACCOUNT_ID) is required".to_string())
            })
    }
}

/// Opens the configured knowledge base.
pub fn open(config: &KbConfig) -> Result<KnowledgeBase> {
    KnowledgeBase::open(config)
}

/// Parses a usage context argument.
pub fn parse_usage(value: &str) -> Result<UsageContext> {
    UsageContext::parse(value).ok_or_else(|| {
        Error::InvalidInput(format!(
            "unknown usage context '{value}' (expected always, on_request or contextual)"
        ))
    })
}

/// Prints a value as pretty JSON.
pub fn print_json<T: serde::Serialize>(value: &T) -> CmdResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbase::ScopeKind;

    fn args(account: Option<&str>, thread: Option<&str>, agent: Option<&str>) -> ScopeArgs {
        ScopeArgs {
            account: account.map(str::to_string),
            thread: thread.map(str::to_string),
            agent: agent.map(str::to_string),
        }
    }

    #[test]
    fn test_scope_selection() {
        assert_eq!(
            args(Some("acct"), None, None).scope().unwrap(),
            Scope::global("acct")
        );
        assert_eq!(
            args(Some("acct"), Some("t1"), None).scope().unwrap(),
            Scope::thread("acct", "t1")
        );
        assert_eq!(
            args(Some("acct"), None, Some("bot")).key().unwrap().kind,
            ScopeKind::Agent
        );
    }

    #[test]
    fn test_account_only_needed_for_global_keys() {
        assert!(args(None, Some("t1"), None).key().is_ok());
        assert!(args(None, None, None).key().is_err());
        assert!(args(None, Some("t1"), None).scope().is_err());
    }

    #[test]
    fn test_parse_usage() {
        assert_eq!(parse_usage("on_request").unwrap(), UsageContext::OnRequest);
        assert!(parse_usage("sometimes").is_err());
    }
}
