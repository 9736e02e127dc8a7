//! The background monitoring worker: poll, detect, record, sweep.

use crate::client::{StoreClientError, TelemetryStore};
use crate::config::Config;
use crate::models::history::HistoryEvent;
use crate::services::retention;
use crate::tracker::TransitionDetector;
use chrono::Utc;
use log::{debug, error, info, warn};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Cooperative stop signal shared between a worker and its owner.
///
/// Cancelling wakes a worker blocked in [`ShutdownToken::wait`] immediately,
/// instead of being noticed only at the next loop head.
#[derive(Clone, Default)]
pub struct ShutdownToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let (flag, signal) = &*self.inner;
        let mut cancelled = flag.lock().unwrap_or_else(|e| e.into_inner());
        *cancelled = true;
        signal.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        let (flag, _) = &*self.inner;
        *flag.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Block for up to `timeout`, waking early on cancellation. Returns true
    /// once cancellation has been requested.
    pub fn wait(&self, timeout: Duration) -> bool {
        let (flag, signal) = &*self.inner;
        let mut cancelled = flag.lock().unwrap_or_else(|e| e.into_inner());
        let deadline = Instant::now() + timeout;
        while !*cancelled {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            cancelled = match signal.wait_timeout(cancelled, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        *cancelled
    }
}

/// Handle to a monitoring worker running on its own thread.
pub struct Monitor {
    token: ShutdownToken,
    handle: JoinHandle<()>,
}

impl Monitor {
    /// Spawn the worker. The store and a fresh detector move into the
    /// thread; nothing else shares them, so the detector needs no locking.
    pub fn spawn<S>(store: S, cfg: Config) -> std::io::Result<Monitor>
    where
        S: TelemetryStore + Send + 'static,
    {
        let token = ShutdownToken::new();
        let worker_token = token.clone();
        let handle = thread::Builder::new()
            .name("pumpwatch-monitor".to_string())
            .spawn(move || run_loop(&store, &cfg, &worker_token))?;
        Ok(Monitor { token, handle })
    }

    pub fn token(&self) -> ShutdownToken {
        self.token.clone()
    }

    /// Request a stop and wait for the worker to exit. The wait between
    /// cycles is interrupted; in-flight store I/O is not.
    pub fn stop(self) {
        self.token.cancel();
        if self.handle.join().is_err() {
            error!("Monitor thread terminated by panic");
        }
    }
}

/// Run detection cycles until the token is cancelled. The loop never dies on
/// its own: transport failures, bad cycles, even panicking cycles are logged
/// and the loop resumes after the normal sleep.
pub fn run_loop<S: TelemetryStore>(store: &S, cfg: &Config, token: &ShutdownToken) {
    let mut detector = TransitionDetector::new();
    let mut last_sweep: Option<Instant> = None;

    info!(
        "Monitoring loop started (poll every {}s, sweep every {}s, retention {} days)",
        cfg.poll_interval.as_secs(),
        cfg.sweep_interval.as_secs(),
        cfg.retention_days
    );

    while !token.is_cancelled() {
        match panic::catch_unwind(AssertUnwindSafe(|| run_cycle(store, &mut detector))) {
            Ok(Ok(recorded)) => {
                if recorded > 0 {
                    debug!("Cycle complete: {} event(s) recorded", recorded);
                }
            }
            Ok(Err(e)) => warn!("Cycle skipped: {}", e),
            Err(_) => error!("Cycle panicked; state kept, resuming next cycle"),
        }

        if last_sweep.is_none_or(|at| at.elapsed() >= cfg.sweep_interval) {
            if let Err(e) = retention::sweep(store, Utc::now(), chrono::Duration::days(cfg.retention_days)) {
                warn!("Retention sweep failed: {}", e);
            }
            // A failed sweep still waits out a full interval before retrying.
            last_sweep = Some(Instant::now());
        }

        if token.wait(cfg.poll_interval) {
            break;
        }
    }

    info!("Monitoring loop stopped");
}

/// One detection cycle: fetch the latest snapshot, detect transitions,
/// append one history record per transition. Append failures are lossy by
/// design; the detector state is already updated, so a dropped record is
/// never re-emitted.
fn run_cycle<S: TelemetryStore>(
    store: &S,
    detector: &mut TransitionDetector,
) -> Result<usize, StoreClientError> {
    let Some(snapshot) = store.latest_snapshot()? else {
        debug!("No live telemetry yet; nothing to compare");
        return Ok(0);
    };

    let mut recorded = 0usize;
    for transition in detector.observe(&snapshot) {
        let event = HistoryEvent::from_transition(transition, Utc::now());
        match store.append_event(&event) {
            Ok(()) => {
                info!(
                    "Recorded Event: [{}] {}: {}",
                    event.date_formatted, event.pump_name, event.message
                );
                recorded += 1;
            }
            Err(e) => warn!("Failed to record event for {}: {}", event.pump_name, e),
        }
    }
    Ok(recorded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::history::EventKind;
    use crate::models::telemetry::LiveSnapshot;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// In-memory stand-in for the remote store. Snapshots are consumed in
    /// order, one per cycle.
    #[derive(Default)]
    struct MemStore {
        snapshots: Mutex<VecDeque<LiveSnapshot>>,
        appended: Mutex<Vec<HistoryEvent>>,
        fail_appends: AtomicBool,
    }

    impl MemStore {
        fn with_snapshots(snapshots: impl IntoIterator<Item = LiveSnapshot>) -> Self {
            MemStore {
                snapshots: Mutex::new(snapshots.into_iter().collect()),
                ..Default::default()
            }
        }

        fn appended(&self) -> Vec<HistoryEvent> {
            self.appended.lock().unwrap().clone()
        }
    }

    impl TelemetryStore for MemStore {
        fn latest_snapshot(&self) -> Result<Option<LiveSnapshot>, StoreClientError> {
            Ok(self.snapshots.lock().unwrap().pop_front())
        }

        fn append_event(&self, event: &HistoryEvent) -> Result<(), StoreClientError> {
            if self.fail_appends.load(Ordering::SeqCst) {
                return Err(StoreClientError::Transport("connection reset".to_string()));
            }
            self.appended.lock().unwrap().push(event.clone());
            Ok(())
        }

        fn expired_event_keys(&self, _cutoff_millis: i64) -> Result<Vec<String>, StoreClientError> {
            Ok(Vec::new())
        }

        fn delete_event(&self, _key: &str) -> Result<(), StoreClientError> {
            Ok(())
        }
    }

    fn water(level: f64) -> LiveSnapshot {
        LiveSnapshot { water_level: Some(level), ..Default::default() }
    }

    #[test]
    fn cycle_records_detected_transitions() {
        let store = MemStore::with_snapshots([water(100.0), water(80.0)]);
        let mut detector = TransitionDetector::new();

        assert_eq!(run_cycle(&store, &mut detector).unwrap(), 0);
        assert_eq!(run_cycle(&store, &mut detector).unwrap(), 1);

        let events = store.appended();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].pump_name, "Water tank");
        assert_eq!(events[0].event_type, EventKind::Alarm);
    }

    #[test]
    fn empty_store_is_a_quiet_cycle() {
        let store = MemStore::default();
        let mut detector = TransitionDetector::new();
        assert_eq!(run_cycle(&store, &mut detector).unwrap(), 0);
        assert!(store.appended().is_empty());
    }

    #[test]
    fn failed_append_is_not_reemitted_next_cycle() {
        let store = MemStore::with_snapshots([water(100.0), water(80.0), water(80.0)]);
        let mut detector = TransitionDetector::new();

        run_cycle(&store, &mut detector).unwrap(); // seed

        store.fail_appends.store(true, Ordering::SeqCst);
        assert_eq!(run_cycle(&store, &mut detector).unwrap(), 0); // transition dropped

        store.fail_appends.store(false, Ordering::SeqCst);
        assert_eq!(run_cycle(&store, &mut detector).unwrap(), 0); // no duplicate
        assert!(store.appended().is_empty());
    }

    #[test]
    fn wait_returns_early_on_cancel() {
        let token = ShutdownToken::new();
        let waker = token.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            waker.cancel();
        });

        let started = Instant::now();
        assert!(token.wait(Duration::from_secs(5)));
        assert!(started.elapsed() < Duration::from_secs(2));
        handle.join().unwrap();
    }

    #[test]
    fn wait_times_out_without_cancel() {
        let token = ShutdownToken::new();
        assert!(!token.wait(Duration::from_millis(10)));
        assert!(!token.is_cancelled());
    }

    #[test]
    fn spawned_monitor_stops_promptly() {
        let cfg = Config {
            store_url: "mem://".to_string(),
            poll_interval: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(3600),
            retention_days: 30,
            request_timeout: Duration::from_secs(1),
        };
        let monitor = Monitor::spawn(MemStore::default(), cfg).unwrap();
        thread::sleep(Duration::from_millis(50));
        assert!(!monitor.token().is_cancelled());
        let started = Instant::now();
        monitor.stop();
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
