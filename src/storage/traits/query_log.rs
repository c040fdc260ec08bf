//! Query log storage trait.

use crate::Result;
use crate::models::QueryLogEntry;

/// Trait for recording answered queries.
pub trait QueryLogStore: Send + Sync {
    /// Records one query.
    fn record_query(&self, entry: &QueryLogEntry) -> Result<()>;

    /// Lists an account's most recent queries, newest first.
    fn recent_queries(&self, account_id: &str, limit: usize) -> Result<Vec<QueryLogEntry>>;
}
