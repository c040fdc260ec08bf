//! Context builder service.
//!
//! Renders the knowledge entries of a scope into a text block for prompt
//! injection, and combines the global, thread and agent blocks under one
//! token budget.
//!
//! # Per-scope selection
//!
//! Active entries whose usage context is `always` or `contextual` are taken
//! newest first. A running total of their token estimates is kept and the
//! walk stops at the first entry that would overflow the budget; later,
//! smaller entries are not considered.
//!
//! # Combined budget
//!
//! | Scope  | Budget                          |
//! |--------|---------------------------------|
//! | global | `max_tokens / 4`                |
//! | thread | half of what remains            |
//! | agent  | everything that remains         |
//!
//! After each block, the remaining budget is reduced by the estimate of the
//! rendered text (banner and headings included), not by the sum of the entry
//! estimates.

use std::sync::Arc;

use tracing::instrument;

use crate::Result;
use crate::models::{KnowledgeEntry, ScopeKey, ScopeKind};
use crate::services::estimate_tokens;
use crate::storage::KnowledgeStore;

/// Service for assembling knowledge context.
pub struct ContextBuilderService {
    store: Arc<dyn KnowledgeStore>,
}

impl ContextBuilderService {
    /// Creates a context builder over a store.
    #[must_use]
    pub fn new(store: Arc<dyn KnowledgeStore>) -> Self {
        Self { store }
    }

    /// Builds the context block for one scope.
    ///
    /// Returns `None` if no entry fits (or the scope has no eligible entries).
    ///
    /// # Errors
    ///
    /// Returns an error if the entries cannot be loaded.
    #[instrument(skip(self), fields(scope = %scope))]
    pub fn scope_context(&self, scope: &ScopeKey, max_tokens: usize) -> Result<Option<String>> {
        let entries = self.store.list(scope, false)?;
        let block = render_scope_block(scope.kind, &entries, max_tokens);

        metrics::counter!(
            "context_blocks_total",
            "scope" => scope.kind.as_str(),
            "empty" => if block.is_some() { "false" } else { "true" }
        )
        .increment(1);

        Ok(block)
    }

    /// Builds the combined context for a conversation.
    ///
    /// Returns an empty string when no scope produced a block.
    ///
    /// # Errors
    ///
    /// Returns an error if any scope's entries cannot be loaded.
    #[instrument(skip(self))]
    pub fn combined_context(
        &self,
        account_id: &str,
        thread_id: &str,
        agent_id: Option<&str>,
        max_tokens: usize,
    ) -> Result<String> {
        let mut blocks: Vec<String> = Vec::with_capacity(3);
        let mut remaining = max_tokens;

        let global = self.scope_context(&ScopeKey::global(account_id), max_tokens / 4)?;
        if let Some(block) = global {
            remaining = remaining.saturating_sub(estimate_tokens(&block));
            blocks.push(block);
        }

        let thread = self.scope_context(&ScopeKey::thread(thread_id), remaining / 2)?;
        if let Some(block) = thread {
            remaining = remaining.saturating_sub(estimate_tokens(&block));
            blocks.push(block);
        }

        if let Some(agent_id) = agent_id
            && let Some(block) = self.scope_context(&ScopeKey::agent(agent_id), remaining)?
        {
            blocks.push(block);
        }

        tracing::debug!(
            blocks = blocks.len(),
            max_tokens,
            remaining,
            "Assembled combined context"
        );

        Ok(blocks.join("\n\n"))
    }
}

/// Banner line opening a scope's block.
#[must_use]
pub const fn scope_banner(kind: ScopeKind) -> &'static str {
    match kind {
        ScopeKind::Global => "# GLOBAL KNOWLEDGE BASE",
        ScopeKind::Thread => "# THREAD KNOWLEDGE BASE",
        ScopeKind::Agent => "# AGENT KNOWLEDGE BASE",
    }
}

/// Introduction sentence following the banner.
#[must_use]
pub const fn scope_introduction(kind: ScopeKind) -> &'static str {
    match kind {
        ScopeKind::Global => {
            "The following reference material applies to every conversation in this account."
        },
        ScopeKind::Thread => "The following reference material is specific to this conversation.",
        ScopeKind::Agent => "The following reference material is specific to this agent.",
    }
}

/// Selects entries for a block: eligible entries in the given (newest first)
/// order, stopping at the first one that would exceed `max_tokens`.
#[must_use]
pub fn select_entries(entries: &[KnowledgeEntry], max_tokens: usize) -> Vec<&KnowledgeEntry> {
    let mut selected = Vec::new();
    let mut used = 0usize;

    for entry in entries
        .iter()
        .filter(|e| e.is_active && e.usage_context.is_auto_assembled())
    {
        let cost = entry
            .content_tokens
            .unwrap_or_else(|| estimate_tokens(&entry.content));
        if used.saturating_add(cost) > max_tokens {
            break;
        }
        used += cost;
        selected.push(entry);
    }

    selected
}

/// Renders a scope block from entries ordered newest first.
///
/// Returns `None` when no entry is selected.
#[must_use]
pub fn render_scope_block(
    kind: ScopeKind,
    entries: &[KnowledgeEntry],
    max_tokens: usize,
) -> Option<String> {
    let selected = select_entries(entries, max_tokens);
    if selected.is_empty() {
        return None;
    }

    let mut parts: Vec<&str> = vec![scope_banner(kind), scope_introduction(kind)];
    let headings: Vec<String> = selected.iter().map(|e| format!("## {}", e.name.trim())).collect();

    for (entry, heading) in selected.iter().zip(&headings) {
        parts.push(heading);
        if let Some(description) = entry.description_text() {
            parts.push(description);
        }
        parts.push(entry.content.trim());
    }

    Some(parts.join("\n\n"))
}
