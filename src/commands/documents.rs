//! Document command handlers: upload, jobs and forget.

use std::path::Path;

use kbase::{Error, KbConfig, UploadRequest};

use super::{CmdResult, ScopeArgs, open, parse_usage};

/// Upload command. Extraction runs in the foreground.
pub fn cmd_upload(
    config: &KbConfig,
    scope: &ScopeArgs,
    file: &Path,
    mime_type: Option<String>,
    description: Option<String>,
    usage: &str,
) -> CmdResult {
    let bytes = std::fs::read(file)
        .map_err(|e| Error::failed("read_upload", format!("{}: {e}", file.display())))?;
    let filename = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut request =
        UploadRequest::new(scope.scope()?, filename).with_usage_context(parse_usage(usage)?);
    request.mime_type = mime_type;
    request.description = description;

    let kb = open(config)?;
    let outcome = kb.uploads().upload(&request, &bytes)?;

    println!("Upload processed:");
    println!("  Job: {} ({})", outcome.job.id, outcome.job.status);
    println!("  Entry: {} ({})", outcome.entry.id, outcome.entry.name);
    println!("  Type: {}", outcome.job.mime_type);
    println!("  Tokens: {}", outcome.entry.content_tokens.unwrap_or_default());
    if let Some(error) = &outcome.job.error_message {
        println!("  Extraction failed: {error}");
    }
    Ok(())
}

/// Jobs command.
pub fn cmd_jobs(config: &KbConfig, scope: &ScopeArgs) -> CmdResult {
    let key = scope.key()?;
    let kb = open(config)?;
    let jobs = kb.uploads().jobs(&key)?;

    if jobs.is_empty() {
        println!("No upload jobs.");
        return Ok(());
    }

    for job in jobs {
        println!(
            "{}  {}  {}  {} bytes  {}",
            job.id,
            job.status,
            job.filename,
            job.file_size,
            job.created_at.to_rfc3339()
        );
        if let Some(error) = job.error_message {
            println!("    {error}");
        }
    }
    Ok(())
}

/// Forget command: deletes an uploaded document and its jobs.
pub fn cmd_forget(config: &KbConfig, scope: &ScopeArgs, filename: &str) -> CmdResult {
    let scope = scope.scope()?;
    let kb = open(config)?;
    let removal = kb.entries().delete_document(&scope, filename)?;

    if removal.is_empty() {
        println!("No upload named '{}' in {}.", removal.filename, scope.key());
    } else {
        println!(
            "Deleted '{}': {} entries, {} jobs.",
            removal.filename, removal.entries_deleted, removal.jobs_deleted
        );
    }
    Ok(())
}
