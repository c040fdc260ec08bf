//! Service container.
//!
//! ```text
//! KnowledgeBase
//!   ├── entries()  → EntryService
//!   ├── context()  → ContextBuilderService
//!   ├── uploads()  → UploadService
//!   └── query()    → QueryService
//! ```
//!
//! All services share one [`SqliteKnowledgeStore`].

use std::sync::Arc;

use crate::Result;
use crate::config::KbConfig;
use crate::services::{
    ContextBuilderService, DocumentProcessor, EntryService, QueryService, UploadService,
};
use crate::storage::{KnowledgeStoreFactory, SqliteKnowledgeStore};

/// The knowledge base: configuration, store and services.
pub struct KnowledgeBase {
    config: KbConfig,
    store: Arc<SqliteKnowledgeStore>,
    entries: Arc<EntryService>,
    context: ContextBuilderService,
    uploads: UploadService,
    query: QueryService,
}

impl KnowledgeBase {
    /// Opens the database configured in `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(config: &KbConfig) -> Result<Self> {
        let store = KnowledgeStoreFactory::create(config)?;
        Ok(Self::with_store(config.clone(), store))
    }

    /// Creates a knowledge base over an in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self> {
        Self::in_memory_with(KbConfig::new())
    }

    /// Creates a knowledge base over an in-memory database with explicit settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory_with(config: KbConfig) -> Result<Self> {
        let store = KnowledgeStoreFactory::create_in_memory()?;
        Ok(Self::with_store(config, store))
    }

    fn with_store(config: KbConfig, store: Arc<SqliteKnowledgeStore>) -> Self {
        let processor = DocumentProcessor::from_settings(&config.extraction);
        let entries = Arc::new(
            EntryService::new(store.clone())
                .with_name_retry_attempts(config.entries.name_retry_attempts),
        );
        let uploads = UploadService::new(store.clone(), entries.clone(), processor)
            .with_max_upload_bytes(config.extraction.max_upload_bytes);

        Self {
            context: ContextBuilderService::new(store.clone()),
            query: QueryService::new(store.clone(), store.clone(), processor),
            uploads,
            entries,
            store,
            config,
        }
    }

    /// Entry CRUD.
    #[must_use]
    pub fn entries(&self) -> &EntryService {
        &self.entries
    }

    /// Context assembly.
    #[must_use]
    pub const fn context(&self) -> &ContextBuilderService {
        &self.context
    }

    /// Document uploads.
    #[must_use]
    pub const fn uploads(&self) -> &UploadService {
        &self.uploads
    }

    /// Free-text queries.
    #[must_use]
    pub const fn query(&self) -> &QueryService {
        &self.query
    }

    /// The effective configuration.
    #[must_use]
    pub const fn config(&self) -> &KbConfig {
        &self.config
    }

    /// The underlying store.
    #[must_use]
    pub const fn store(&self) -> &Arc<SqliteKnowledgeStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewEntry, Scope, ScopeKey};

    #[test]
    fn test_services_share_one_store() {
        let kb = KnowledgeBase::in_memory().unwrap();
        kb.entries()
            .create(NewEntry::new(Scope::global("acct"), "Policy", "Refunds within 30 days."))
            .unwrap();

        let context = kb.context().scope_context(&ScopeKey::global("acct"), 100).unwrap();
        assert!(context.unwrap().contains("Refunds within 30 days."));
        assert_eq!(kb.store().db_path(), None);
    }

    #[test]
    fn test_settings_flow_into_services() {
        let mut config = KbConfig::new();
        config.entries.name_retry_attempts = 0;
        let kb = KnowledgeBase::in_memory_with(config).unwrap();

        let entry = NewEntry::new(Scope::global("acct"), "Dup", "one");
        kb.entries().create(entry.clone()).unwrap();
        assert!(kb.entries().create(entry).is_err());
        assert_eq!(kb.config().entries.name_retry_attempts, 0);
    }
}
