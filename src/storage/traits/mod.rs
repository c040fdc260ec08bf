//! Storage backend traits.

mod knowledge;
mod processing;
mod query_log;

pub use knowledge::KnowledgeStore;
pub use processing::ProcessingStore;
pub use query_log::QueryLogStore;
