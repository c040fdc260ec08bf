//! Entry command handlers: add, list, show, update, delete, purge, stats.

use std::path::PathBuf;

use kbase::http::KbClient;
use kbase::{EntryId, EntryListing, EntryUpdate, Error, KbConfig, KnowledgeEntry, NewEntry};

use super::{CmdResult, OutputFormat, ScopeArgs, open, parse_usage, print_json};

/// Add command.
pub fn cmd_add(
    config: &KbConfig,
    scope: &ScopeArgs,
    name: String,
    content: Option<String>,
    file: Option<PathBuf>,
    description: Option<String>,
    usage: &str,
) -> CmdResult {
    let content = match (content, file) {
        (Some(content), _) => content,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .map_err(|e| Error::failed("read_content_file", format!("{}: {e}", path.display())))?,
        (None, None) => {
            return Err(Error::InvalidInput("content or --file is required".to_string()).into());
        },
    };

    let mut entry = NewEntry::new(scope.scope()?, name, content)
        .with_usage_context(parse_usage(usage)?);
    entry.description = description;

    let kb = open(config)?;
    let created = kb.entries().create(entry)?;

    println!("Entry created:");
    println!("  ID: {}", created.id);
    println!("  Name: {}", created.name);
    println!("  Tokens: {}", created.content_tokens.unwrap_or_default());
    Ok(())
}

/// List command.
///
/// With `server`, the listing comes from a running kbase server and is empty
/// if that server cannot be reached.
pub fn cmd_list(
    config: &KbConfig,
    scope: &ScopeArgs,
    include_inactive: bool,
    format: OutputFormat,
    server: Option<&str>,
) -> CmdResult {
    let key = scope.key()?;
    let listing = match server {
        Some(url) => KbClient::new(url)?.list(&key, include_inactive),
        None => open(config)?.entries().list(&key, include_inactive)?,
    };

    match format {
        OutputFormat::Json => print_json(&listing),
        OutputFormat::Table => {
            print_listing(&listing);
            Ok(())
        },
    }
}

fn print_listing(listing: &EntryListing) {
    if listing.entries.is_empty() {
        println!("No entries.");
        return;
    }

    for entry in &listing.entries {
        let state = if entry.is_active { "" } else { " [inactive]" };
        println!(
            "{}  {}  ({} tokens, {}){state}",
            entry.id,
            entry.name,
            entry.content_tokens.unwrap_or_default(),
            entry.usage_context
        );
    }
    println!();
    println!(
        "{} entries, {} tokens",
        listing.total_count, listing.total_tokens
    );
}

/// Show command.
pub fn cmd_show(config: &KbConfig, id: &str, format: OutputFormat) -> CmdResult {
    let kb = open(config)?;
    let entry = kb.entries().get(&EntryId::new(id))?;

    match format {
        OutputFormat::Json => print_json(&entry),
        OutputFormat::Table => {
            print_entry(&entry);
            Ok(())
        },
    }
}

fn print_entry(entry: &KnowledgeEntry) {
    println!("ID: {}", entry.id);
    println!("Name: {}", entry.name);
    println!("Scope: {}", entry.scope.key());
    if let Some(description) = entry.description_text() {
        println!("Description: {description}");
    }
    println!("Usage: {}", entry.usage_context);
    println!("Active: {}", entry.is_active);
    println!("Source: {}", entry.source_type);
    println!("Tokens: {}", entry.content_tokens.unwrap_or_default());
    println!("Created: {}", entry.created_at.to_rfc3339());
    println!("Updated: {}", entry.updated_at.to_rfc3339());
    if let Some(accessed) = entry.last_accessed_at {
        println!("Last accessed: {}", accessed.to_rfc3339());
    }
    println!();
    println!("{}", entry.content);
}

/// Update command.
pub fn cmd_update(
    config: &KbConfig,
    id: &str,
    name: Option<String>,
    description: Option<String>,
    content: Option<String>,
    usage: Option<&str>,
    is_active: Option<bool>,
) -> CmdResult {
    let update = EntryUpdate {
        name,
        description,
        content,
        usage_context: usage.map(parse_usage).transpose()?,
        is_active,
    };

    let kb = open(config)?;
    let entry = kb.entries().update(None, &EntryId::new(id), update)?;
    println!("Entry updated: {} ({})", entry.name, entry.id);
    Ok(())
}

/// Delete command.
pub fn cmd_delete(config: &KbConfig, id: &str) -> CmdResult {
    let kb = open(config)?;
    kb.entries().delete(None, &EntryId::new(id))?;
    println!("Entry deleted: {id}");
    Ok(())
}

/// Purge command.
pub fn cmd_purge(config: &KbConfig, scope: &ScopeArgs, everything: bool, yes: bool) -> CmdResult {
    if !yes {
        return Err(Error::InvalidInput("purge deletes entries permanently; pass --yes".to_string()).into());
    }

    let kb = open(config)?;
    let removed = if everything {
        kb.entries().delete_account(scope.account_id()?)?
    } else {
        kb.entries().delete_scope(&scope.key()?)?
    };
    println!("Deleted {removed} entries.");
    Ok(())
}

/// Stats command.
pub fn cmd_stats(config: &KbConfig, scope: &ScopeArgs) -> CmdResult {
    let key = scope.key()?;
    let kb = open(config)?;
    let stats = kb.entries().stats(&key)?;

    println!("Scope: {key}");
    println!("  Entries: {}", stats.total_entries);
    println!("  Active: {}", stats.active_entries);
    println!("  Assembled automatically: {}", stats.assembled_entries);
    println!("  Active tokens: {}", stats.active_tokens);
    Ok(())
}
