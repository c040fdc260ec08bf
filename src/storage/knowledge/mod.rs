//! Knowledge entry storage backends.
//!
//! Entries for all scopes (global, thread, agent) and the processing jobs of
//! uploaded documents are stored in one `SQLite` database, by default
//! `{data_dir}/kbase.db`.

mod sqlite;

pub use sqlite::SqliteKnowledgeStore;

use crate::config::KbConfig;
use crate::{Error, Result};
use std::sync::Arc;

/// Factory for creating the knowledge store.
pub struct KnowledgeStoreFactory;

impl KnowledgeStoreFactory {
    /// Creates the store configured in `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if no database path can be determined or the
    /// database cannot be initialized.
    pub fn create(config: &KbConfig) -> Result<Arc<SqliteKnowledgeStore>> {
        let path = config.database_path().ok_or_else(|| {
            Error::failed("create_knowledge_store", "could not determine database path")
        })?;
        tracing::debug!(path = %path.display(), "Opening knowledge store");
        Ok(Arc::new(SqliteKnowledgeStore::new(path)?))
    }

    /// Creates an in-memory store (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn create_in_memory() -> Result<Arc<SqliteKnowledgeStore>> {
        Ok(Arc::new(SqliteKnowledgeStore::in_memory()?))
    }
}
