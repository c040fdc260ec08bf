//! Connection handling for the `SQLite` store.
//!
//! A single `Mutex<Connection>` per store, poison recovery on lock, and the
//! pragmas the store relies on (WAL, busy timeout, foreign keys).

use crate::{Error, Result};
use rusqlite::Connection;
use std::sync::{Mutex, MutexGuard};

/// Busy timeout applied to every connection, in milliseconds.
pub const BUSY_TIMEOUT_MS: u32 = 5000;

/// Acquires a mutex, recovering the inner value if a previous holder panicked.
///
/// A panic inside a critical section leaves the `SQLite` connection itself in
/// a usable state (any open transaction was rolled back on drop), so the
/// guard is handed out again with a warning instead of cascading the panic.
pub fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("SQLite mutex was poisoned, recovering");
            metrics::counter!("sqlite_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// Configures a connection for concurrent use.
///
/// - **WAL mode**: concurrent readers with a single writer (file databases only)
/// - **NORMAL synchronous**: durability/performance balance
/// - **`busy_timeout`**: wait for locks instead of failing with `SQLITE_BUSY`
/// - **`foreign_keys`**: processing jobs reference entries
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if foreign key enforcement cannot be enabled.
pub fn configure_connection(conn: &Connection) -> Result<()> {
    // journal_mode returns a row ("wal" or "memory"), so the result is ignored.
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    let _ = conn.pragma_update(None, "busy_timeout", BUSY_TIMEOUT_MS);

    conn.pragma_update(None, "foreign_keys", "ON")
        .map_err(|e| Error::failed("enable_foreign_keys", e))?;

    Ok(())
}
