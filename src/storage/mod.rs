//! Storage layer.
//!
//! - [`traits`]: the [`KnowledgeStore`], [`ProcessingStore`] and [`QueryLogStore`] seams
//! - [`knowledge`]: the `SQLite` implementation and its factory
//! - [`sqlite`]: shared connection, schema, row and metrics helpers

// Allow significant_drop_tightening - dropping database connections slightly early
// provides no meaningful benefit.
#![allow(clippy::significant_drop_tightening)]
// Allow cast_possible_wrap for i64 <-> u64 conversions of sizes.
#![allow(clippy::cast_possible_wrap)]

pub mod knowledge;
pub mod sqlite;
pub mod traits;

pub use knowledge::{KnowledgeStoreFactory, SqliteKnowledgeStore};
pub use traits::{KnowledgeStore, ProcessingStore, QueryLogStore};
