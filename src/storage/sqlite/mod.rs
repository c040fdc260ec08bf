//! Shared `SQLite` infrastructure for the knowledge store.
//!
//! - [`connection`]: lock acquisition and connection pragmas
//! - [`schema`]: tables, indexes and the token/timestamp triggers
//! - [`rows`]: row conversion for entries, processing jobs and query logs
//! - [`metrics`]: operation metrics

mod connection;
mod metrics;
mod rows;
mod schema;

pub use connection::{BUSY_TIMEOUT_MS, acquire_lock, configure_connection};
pub use metrics::{record_operation_metrics, status_label};
pub use rows::{
    ENTRY_COLUMNS, EntryRow, JOB_COLUMNS, JobRow, QUERY_LOG_COLUMNS, QueryLogRow,
    millis_to_datetime,
};
pub use schema::{SCHEMA_SQL, SCHEMA_VERSION, initialize_schema};
