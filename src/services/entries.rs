//! Entry service.
//!
//! Validates and normalizes requests before they reach the store, resolves
//! name conflicts by renaming, and enforces scope membership for lookups.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::instrument;

use crate::config::DEFAULT_NAME_RETRY_ATTEMPTS;
use crate::models::{
    DocumentRemoval, EntryId, EntryListing, EntryUpdate, KnowledgeEntry, MAX_NAME_LENGTH,
    NewEntry, Scope, ScopeKey, ScopeStats,
};
use crate::storage::KnowledgeStore;
use crate::{Error, Result};

/// Service for creating, reading, updating and deleting knowledge entries.
pub struct EntryService {
    store: Arc<dyn KnowledgeStore>,
    name_retry_attempts: u32,
}

impl EntryService {
    /// Creates an entry service over a store.
    #[must_use]
    pub fn new(store: Arc<dyn KnowledgeStore>) -> Self {
        Self {
            store,
            name_retry_attempts: DEFAULT_NAME_RETRY_ATTEMPTS,
        }
    }

    /// Sets how many renamed attempts follow a name conflict.
    #[must_use]
    pub const fn with_name_retry_attempts(mut self, attempts: u32) -> Self {
        self.name_retry_attempts = attempts;
        self
    }

    /// Lists the entries of a scope, newest first, with totals.
    ///
    /// # Errors
    ///
    /// Returns an error if the scope id is blank or the store fails.
    #[instrument(skip(self), fields(scope = %scope))]
    pub fn list(&self, scope: &ScopeKey, include_inactive: bool) -> Result<EntryListing> {
        validate_scope_key(scope)?;
        let entries = self.store.list(scope, include_inactive)?;
        Ok(EntryListing::from_entries(entries))
    }

    /// Creates an entry.
    ///
    /// If the name is already taken in the scope, the entry is retried under
    /// `"{name} ({yyyymmddHHMMSSmmm})"`, with a `-{attempt}` counter on later
    /// attempts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for invalid requests and
    /// [`Error::Conflict`] once every renamed attempt also collided.
    #[instrument(skip(self, entry), fields(scope = %entry.scope.key(), name = %entry.name))]
    pub fn create(&self, entry: NewEntry) -> Result<KnowledgeEntry> {
        let entry = normalize_new_entry(entry)?;
        let base_name = entry.name.clone();
        let mut candidate = entry;
        let mut attempt = 0u32;

        loop {
            match self.store.insert(&candidate) {
                Ok(created) => {
                    metrics::counter!("entries_created_total", "scope" => created.scope.kind().as_str())
                        .increment(1);
                    tracing::info!(entry_id = %created.id, name = %created.name, "Created knowledge entry");
                    return Ok(created);
                },
                Err(Error::Conflict(cause)) if attempt < self.name_retry_attempts => {
                    attempt += 1;
                    candidate.name = suffixed_name(&base_name, Utc::now(), attempt);
                    tracing::warn!(
                        cause = %cause,
                        attempt,
                        renamed = %candidate.name,
                        "Entry name taken, retrying with suffix"
                    );
                },
                Err(Error::Conflict(_)) => {
                    return Err(Error::Conflict(format!(
                        "entry name '{base_name}' is still taken after {attempt} renamed attempts"
                    )));
                },
                Err(e) => return Err(e),
            }
        }
    }

    /// Retrieves an entry by ID.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the entry does not exist.
    pub fn get(&self, id: &EntryId) -> Result<KnowledgeEntry> {
        self.store
            .get(id)?
            .ok_or_else(|| Error::entry_not_found(id.as_str()))
    }

    /// Retrieves an entry, requiring it to belong to `scope`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the entry does not exist or belongs to
    /// another scope.
    pub fn get_in_scope(&self, scope: &ScopeKey, id: &EntryId) -> Result<KnowledgeEntry> {
        let entry = self.get(id)?;
        if entry.scope.key() != *scope {
            return Err(Error::entry_not_found(id.as_str()));
        }
        Ok(entry)
    }

    /// Applies a partial update.
    ///
    /// When `scope` is given the entry must belong to it. Token estimate and
    /// `updated_at` are refreshed by the store.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for invalid fields, [`Error::NotFound`]
    /// if the entry is absent (or in another scope), and [`Error::Conflict`] if
    /// a rename collides.
    #[instrument(skip(self, update), fields(entry_id = %id))]
    pub fn update(
        &self,
        scope: Option<&ScopeKey>,
        id: &EntryId,
        update: EntryUpdate,
    ) -> Result<KnowledgeEntry> {
        let update = normalize_update(update)?;
        if let Some(scope) = scope {
            self.get_in_scope(scope, id)?;
        }

        self.store
            .update(id, &update)?
            .ok_or_else(|| Error::entry_not_found(id.as_str()))
    }

    /// Deletes an entry.
    ///
    /// When `scope` is given the entry must belong to it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the entry is absent (or in another scope).
    #[instrument(skip(self), fields(entry_id = %id))]
    pub fn delete(&self, scope: Option<&ScopeKey>, id: &EntryId) -> Result<()> {
        if let Some(scope) = scope {
            self.get_in_scope(scope, id)?;
        }

        if self.store.delete(id)? {
            tracing::info!(entry_id = %id, "Deleted knowledge entry");
            Ok(())
        } else {
            Err(Error::entry_not_found(id.as_str()))
        }
    }

    /// Deletes every entry of a scope. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the scope id is blank or the store fails.
    pub fn delete_scope(&self, scope: &ScopeKey) -> Result<usize> {
        validate_scope_key(scope)?;
        let removed = self.store.delete_scope(scope)?;
        tracing::info!(scope = %scope, removed, "Purged scope");
        Ok(removed)
    }

    /// Deletes every entry owned by an account. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the account id is blank or the store fails.
    pub fn delete_account(&self, account_id: &str) -> Result<usize> {
        require_id("account_id", account_id)?;
        let removed = self.store.delete_account(account_id)?;
        tracing::info!(account_id, removed, "Purged account");
        Ok(removed)
    }

    /// Deletes an uploaded document from a scope.
    ///
    /// Removes every entry created from uploads of `filename`, renamed
    /// duplicates included, and their processing jobs. Finding nothing is
    /// not an error; the returned counts are zero.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a blank scope id or filename, and
    /// an error if the store fails.
    #[instrument(skip(self), fields(scope = %scope.key()))]
    pub fn delete_document(&self, scope: &Scope, filename: &str) -> Result<DocumentRemoval> {
        validate_scope(scope)?;
        let filename = filename.trim();
        require_id("filename", filename)?;

        let removal = self.store.delete_document(scope, filename)?;
        tracing::info!(
            filename,
            entries = removal.entries_deleted,
            jobs = removal.jobs_deleted,
            "Deleted document"
        );
        Ok(removal)
    }

    /// Returns aggregate counts for a scope.
    ///
    /// # Errors
    ///
    /// Returns an error if the scope id is blank or the store fails.
    pub fn stats(&self, scope: &ScopeKey) -> Result<ScopeStats> {
        validate_scope_key(scope)?;
        self.store.stats(scope)
    }
}

/// Builds the renamed candidate for a conflicting name.
///
/// The base name is shortened if needed so the result stays within
/// [`MAX_NAME_LENGTH`] characters.
#[must_use]
pub fn suffixed_name(name: &str, now: DateTime<Utc>, attempt: u32) -> String {
    let stamp = now.format("%Y%m%d%H%M%S%3f");
    let suffix = if attempt <= 1 {
        format!(" ({stamp})")
    } else {
        format!(" ({stamp}-{attempt})")
    };
    let room = MAX_NAME_LENGTH.saturating_sub(suffix.chars().count());
    let base: String = name.chars().take(room).collect();
    format!("{}{suffix}", base.trim_end())
}

pub(crate) fn require_id(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::InvalidInput(format!("{field} is required")));
    }
    Ok(())
}

pub(crate) fn validate_scope_key(scope: &ScopeKey) -> Result<()> {
    require_id(&format!("{}_id", scope_id_label(scope)), &scope.id)
}

const fn scope_id_label(scope: &ScopeKey) -> &'static str {
    match scope.kind {
        crate::models::ScopeKind::Global => "account",
        crate::models::ScopeKind::Thread => "thread",
        crate::models::ScopeKind::Agent => "agent",
    }
}

pub(crate) fn validate_scope(scope: &Scope) -> Result<()> {
    require_id("account_id", scope.account_id())?;
    match scope {
        Scope::Global { .. } => Ok(()),
        Scope::Thread { thread_id, .. } => require_id("thread_id", thread_id),
        Scope::Agent { agent_id, .. } => require_id("agent_id", agent_id),
    }
}

fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::InvalidInput("name cannot be empty".to_string()));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(Error::InvalidInput(format!(
            "name cannot exceed {MAX_NAME_LENGTH} characters"
        )));
    }
    Ok(name.to_string())
}

fn validate_content(content: &str) -> Result<()> {
    if content.trim().is_empty() {
        return Err(Error::InvalidInput("content cannot be empty".to_string()));
    }
    Ok(())
}

fn normalize_new_entry(mut entry: NewEntry) -> Result<NewEntry> {
    validate_scope(&entry.scope)?;
    entry.name = validate_name(&entry.name)?;
    validate_content(&entry.content)?;
    entry.description = entry
        .description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());
    Ok(entry)
}

fn normalize_update(mut update: EntryUpdate) -> Result<EntryUpdate> {
    if let Some(name) = &update.name {
        update.name = Some(validate_name(name)?);
    }
    if let Some(content) = &update.content {
        validate_content(content)?;
    }
    // An empty description is kept as `Some("")`: the store clears it.
    update.description = update.description.map(|d| d.trim().to_string());
    Ok(update)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UsageContext;
    use crate::storage::SqliteKnowledgeStore;
    use chrono::TimeZone;

    fn service() -> EntryService {
        let store = Arc::new(SqliteKnowledgeStore::in_memory().unwrap());
        EntryService::new(store)
    }

    #[test]
    fn test_suffixed_name_format() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
            + chrono::Duration::milliseconds(42);
        assert_eq!(suffixed_name("Notes", now, 1), "Notes (20240309140507042)");
        assert_eq!(suffixed_name("Notes", now, 3), "Notes (20240309140507042-3)");
    }

    #[test]
    fn test_suffixed_name_respects_max_length() {
        let long = "n".repeat(MAX_NAME_LENGTH);
        let renamed = suffixed_name(&long, Utc::now(), 2);
        assert_eq!(renamed.chars().count(), MAX_NAME_LENGTH);
    }

    #[test]
    fn test_same_name_twice_gets_suffix() {
        let service = service();
        let scope = Scope::thread("acct", "t1");
        let first = service
            .create(NewEntry::new(scope.clone(), "Notes", "one"))
            .unwrap();
        let second = service
            .create(NewEntry::new(scope, "Notes", "two"))
            .unwrap();

        assert_eq!(first.name, "Notes");
        assert_ne!(second.name, first.name);
        assert!(second.name.starts_with("Notes ("));
    }

    #[test]
    fn test_conflict_after_retries_exhausted() {
        let store = Arc::new(SqliteKnowledgeStore::in_memory().unwrap());
        let service = EntryService::new(store).with_name_retry_attempts(0);
        let scope = Scope::global("acct");
        service
            .create(NewEntry::new(scope.clone(), "Notes", "one"))
            .unwrap();

        let result = service.create(NewEntry::new(scope, "Notes", "two"));
        assert!(matches!(result, Err(Error::Conflict(_))));
    }

    #[test]
    fn test_validation() {
        let service = service();
        let blank_content = service.create(NewEntry::new(Scope::global("acct"), "N", " \n "));
        assert!(matches!(blank_content, Err(Error::InvalidInput(_))));

        let blank_name = service.create(NewEntry::new(Scope::global("acct"), "  ", "body"));
        assert!(matches!(blank_name, Err(Error::InvalidInput(_))));

        let long_name = service.create(NewEntry::new(
            Scope::global("acct"),
            "x".repeat(MAX_NAME_LENGTH + 1),
            "body",
        ));
        assert!(matches!(long_name, Err(Error::InvalidInput(_))));

        let missing_thread = service.create(NewEntry::new(Scope::thread("acct", ""), "N", "body"));
        assert!(matches!(missing_thread, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_scope_checked_lookup_and_delete() {
        let service = service();
        let entry = service
            .create(NewEntry::new(Scope::agent("acct", "bot"), "Persona", "Friendly."))
            .unwrap();

        assert!(service.get_in_scope(&ScopeKey::agent("bot"), &entry.id).is_ok());
        assert!(matches!(
            service.get_in_scope(&ScopeKey::agent("other"), &entry.id),
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(
            service.delete(Some(&ScopeKey::thread("bot")), &entry.id),
            Err(Error::NotFound { .. })
        ));

        service.delete(Some(&ScopeKey::agent("bot")), &entry.id).unwrap();
        assert!(matches!(
            service.delete(None, &entry.id),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_update_validates_and_applies() {
        let service = service();
        let entry = service
            .create(NewEntry::new(Scope::global("acct"), "Doc", "body"))
            .unwrap();

        let bad = EntryUpdate {
            content: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            service.update(None, &entry.id, bad),
            Err(Error::InvalidInput(_))
        ));

        let good = EntryUpdate {
            usage_context: Some(UsageContext::Contextual),
            ..Default::default()
        };
        let updated = service
            .update(Some(&ScopeKey::global("acct")), &entry.id, good)
            .unwrap();
        assert_eq!(updated.usage_context, UsageContext::Contextual);

        let missing = service.update(None, &EntryId::new("nope"), EntryUpdate::default());
        assert!(matches!(missing, Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_listing_totals() {
        let service = service();
        let scope = Scope::global("acct");
        service
            .create(NewEntry::new(scope.clone(), "A", "a".repeat(40)))
            .unwrap();
        service
            .create(NewEntry::new(scope.clone(), "B", "b".repeat(8)))
            .unwrap();

        let listing = service.list(&scope.key(), false).unwrap();
        assert_eq!(listing.total_count, 2);
        assert_eq!(listing.total_tokens, 12);
        assert_eq!(listing.entries[0].name, "B");
    }

    #[test]
    fn test_delete_document_validates_and_reports_counts() {
        let service = service();
        let scope = Scope::agent("acct", "bot");
        assert!(matches!(
            service.delete_document(&scope, "  "),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            service.delete_document(&Scope::agent("acct", " "), "a.txt"),
            Err(Error::InvalidInput(_))
        ));

        service
            .create(
                NewEntry::new(scope.clone(), "a.txt", "text")
                    .with_source_type(crate::models::SourceType::FileUpload)
                    .with_source_metadata(serde_json::json!({ "filename": "a.txt" })),
            )
            .unwrap();
        let removal = service.delete_document(&scope, " a.txt ").unwrap();
        assert_eq!(removal.filename, "a.txt");
        assert_eq!(removal.entries_deleted, 1);
        assert!(service.delete_document(&scope, "a.txt").unwrap().is_empty());
    }
}
