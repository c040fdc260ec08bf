//! Knowledge entry storage trait.

use crate::Result;
use crate::models::{
    DocumentRemoval, EntryId, EntryUpdate, KnowledgeEntry, NewEntry, Scope, ScopeKey, ScopeStats,
};

/// Trait for knowledge entry storage backends.
///
/// Backends are the single source of truth for entries. Every mutation is one
/// atomic statement or transaction; concurrent writers follow last-writer-wins.
/// Token estimates and `updated_at` are maintained by the backend, never by
/// callers.
pub trait KnowledgeStore: Send + Sync {
    /// Inserts a new entry and returns it as stored.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Conflict`] if the scope already holds an entry
    /// with the same name.
    fn insert(&self, entry: &NewEntry) -> Result<KnowledgeEntry>;

    /// Retrieves an entry by ID.
    fn get(&self, id: &EntryId) -> Result<Option<KnowledgeEntry>>;

    /// Lists the entries of a scope, newest first.
    ///
    /// Ties on `created_at` are broken by insertion order, newest insert first.
    fn list(&self, scope: &ScopeKey, include_inactive: bool) -> Result<Vec<KnowledgeEntry>>;

    /// Applies a partial update. Returns `None` if the entry does not exist.
    ///
    /// An empty description clears the stored description.
    fn update(&self, id: &EntryId, update: &EntryUpdate) -> Result<Option<KnowledgeEntry>>;

    /// Deletes an entry. Returns true if it existed.
    fn delete(&self, id: &EntryId) -> Result<bool>;

    /// Deletes every entry and processing job of a scope.
    ///
    /// Returns the number of entries removed.
    fn delete_scope(&self, scope: &ScopeKey) -> Result<usize>;

    /// Deletes every entry, processing job and query log owned by an account.
    ///
    /// Returns the number of entries removed.
    fn delete_account(&self, account_id: &str) -> Result<usize>;

    /// Deletes the entries created from uploads of `filename` in a scope,
    /// renamed duplicates included, together with their processing jobs.
    fn delete_document(&self, scope: &Scope, filename: &str) -> Result<DocumentRemoval>;

    /// Marks entries as accessed now. Does not change `updated_at`.
    fn touch(&self, ids: &[EntryId]) -> Result<()>;

    /// Returns aggregate counts for a scope.
    fn stats(&self, scope: &ScopeKey) -> Result<ScopeStats>;

    /// Checks if an entry exists.
    fn exists(&self, id: &EntryId) -> Result<bool> {
        Ok(self.get(id)?.is_some())
    }
}
