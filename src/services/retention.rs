use crate::client::{StoreClientError, TelemetryStore};
use chrono::{DateTime, Duration, Utc};
use log::{info, warn};

/// Delete every history record whose timestamp is at or before
/// `now - retention`.
///
/// Per-key delete failures are tolerated and the sweep continues; it is
/// safely re-runnable since deleting an already-absent key is a no-op on
/// the store side. Returns the number of records actually deleted.
pub fn sweep<S: TelemetryStore>(
    store: &S,
    now: DateTime<Utc>,
    retention: Duration,
) -> Result<usize, StoreClientError> {
    let cutoff_millis = (now - retention).timestamp_millis();
    let expired = store.expired_event_keys(cutoff_millis)?;
    if expired.is_empty() {
        info!("Retention sweep: nothing to delete (cutoff {})", cutoff_millis);
        return Ok(0);
    }

    let mut deleted = 0usize;
    for key in &expired {
        match store.delete_event(key) {
            Ok(()) => deleted += 1,
            Err(e) => warn!("Retention sweep: delete of {} failed: {}", key, e),
        }
    }
    info!(
        "Retention sweep: deleted {} of {} expired record(s)",
        deleted,
        expired.len()
    );
    Ok(deleted)
}
