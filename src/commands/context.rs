//! Context and query command handlers.

use kbase::{KbConfig, QueryRequest};

use super::{CmdResult, OutputFormat, ScopeArgs, open, print_json};

/// Context command.
pub fn cmd_context(
    config: &KbConfig,
    scope: &ScopeArgs,
    scope_only: bool,
    max_tokens: Option<usize>,
) -> CmdResult {
    let max_tokens = max_tokens.unwrap_or(config.context.default_max_tokens);
    let kb = open(config)?;

    let context = if scope_only {
        kb.context()
            .scope_context(&scope.key()?, max_tokens)?
            .unwrap_or_default()
    } else {
        let thread = scope.thread.as_deref().ok_or_else(|| {
            kbase::Error::InvalidInput("--thread is required for combined context".to_string())
        })?;
        kb.context().combined_context(
            scope.account_id()?,
            thread,
            scope.agent.as_deref(),
            max_tokens,
        )?
    };

    if context.is_empty() {
        eprintln!("No knowledge fits the budget.");
    } else {
        println!("{context}");
    }
    Ok(())
}

/// Query command.
pub fn cmd_query(
    config: &KbConfig,
    scope: &ScopeArgs,
    query: String,
    limit: Option<usize>,
    format: OutputFormat,
) -> CmdResult {
    let request = QueryRequest {
        query,
        account_id: scope.account_id()?.to_string(),
        thread_id: scope.thread.clone(),
        agent_id: scope.agent.clone(),
        max_chunks: limit.unwrap_or(config.query.max_chunks),
    };

    let kb = open(config)?;
    let result = kb.query().query(&request)?;

    if format == OutputFormat::Json {
        return print_json(&result);
    }

    if !result.relevant {
        println!("Nothing relevant found.");
        return Ok(());
    }
    for hit in &result.chunks {
        println!(
            "[{:.2}] {} ({}, chunk {})",
            hit.score, hit.entry_name, hit.scope, hit.chunk_index
        );
        println!("    {}", hit.text);
    }
    Ok(())
}
