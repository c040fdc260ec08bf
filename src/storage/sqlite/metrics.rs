//! Storage operation metrics.

use std::time::Instant;

/// Records the count and latency of one storage operation.
///
/// Emits `storage_operations_total` (counter) and
/// `storage_operation_duration_ms` (histogram), both labelled by backend,
/// operation and status (`"success"` or `"error"`).
pub fn record_operation_metrics(
    backend: &'static str,
    operation: &'static str,
    start: Instant,
    status: &'static str,
) {
    metrics::counter!(
        "storage_operations_total",
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "storage_operation_duration_ms",
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .record(start.elapsed().as_secs_f64() * 1000.0);
}

/// Maps a result to the status label used by [`record_operation_metrics`].
pub const fn status_label<T, E>(result: &std::result::Result<T, E>) -> &'static str {
    if result.is_ok() { "success" } else { "error" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_without_recorder_is_noop() {
        // No recorder is installed in tests; the facade must swallow the calls.
        let start = Instant::now();
        record_operation_metrics("sqlite", "insert", start, "success");
        record_operation_metrics("sqlite", "list", start, "error");
    }

    #[test]
    fn test_status_label() {
        let ok: std::result::Result<(), ()> = Ok(());
        let err: std::result::Result<(), ()> = Err(());
        assert_eq!(status_label(&ok), "success");
        assert_eq!(status_label(&err), "error");
    }
}
