//! Status poller
//!
//! Owns the repeating "fetch run status" loop for one run. The first fetch
//! is issued immediately on start, then once per interval. On every
//! successful fetch the snapshot is published to the subscriber; observing
//! the terminal status stops the loop while leaving the last snapshot
//! readable. A failed fetch is fatal: a stale monitor must not keep polling
//! a dead run forever, so the poller stops and surfaces the error instead
//! of retrying.

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::client::{ClientError, RunClient};
use crate::run::RunSnapshot;

use super::poll::{fetch_failure_is_fatal, PollCell, PollState, PollerPhase, TickSchedule};

/// Events emitted by a `StatusPoller`
///
/// Called synchronously on the poller thread; implementations must not
/// block.
pub trait StatusEvents: Send + Sync {
    /// A status fetch succeeded
    fn on_run_snapshot(&self, snapshot: &RunSnapshot);

    /// A status fetch failed and the poller has stopped
    fn on_status_failure(&self, error: ClientError);
}

/// State shared between the poller object, its thread, and its handles
#[derive(Debug)]
struct StatusShared {
    cell: PollCell,
    latest: Mutex<Option<RunSnapshot>>,
}

/// Cloneable control handle for a status poller
///
/// Lets subscriber callbacks stop the poller without holding a reference to
/// the poller object itself.
#[derive(Clone)]
pub struct StatusHandle {
    shared: Arc<StatusShared>,
}

impl StatusHandle {
    /// Stop the poller. Idempotent; never interrupts an in-flight fetch,
    /// whose result will be discarded when it resolves.
    pub fn stop(&self) {
        self.shared.cell.stop();
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> PollerPhase {
        self.shared.cell.phase()
    }

    /// Latest snapshot observed, if any. Remains readable after stop.
    pub fn latest_snapshot(&self) -> Option<RunSnapshot> {
        self.shared
            .latest
            .lock()
            .map(|latest| latest.clone())
            .unwrap_or(None)
    }
}

/// Repeatedly fetches a run's status until the run turns terminal, a fetch
/// fails, or the poller is stopped
pub struct StatusPoller {
    client: Arc<dyn RunClient>,
    interval: Duration,
    shared: Arc<StatusShared>,
    /// Owned poll-loop thread, created on start() and released on stop()
    handle: Option<JoinHandle<()>>,
}

impl StatusPoller {
    /// Create a poller; no fetch is issued until start()
    pub fn new(client: Arc<dyn RunClient>, interval: Duration) -> Self {
        Self {
            client,
            interval,
            shared: Arc::new(StatusShared {
                cell: PollCell::new(),
                latest: Mutex::new(None),
            }),
            handle: None,
        }
    }

    /// Get a cloneable control handle
    pub fn handle(&self) -> StatusHandle {
        StatusHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Current request state
    pub fn poll_state(&self) -> PollState {
        self.shared.cell.state()
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> PollerPhase {
        self.shared.cell.phase()
    }

    /// Latest snapshot observed, if any
    pub fn latest_snapshot(&self) -> Option<RunSnapshot> {
        self.handle().latest_snapshot()
    }

    /// Begin polling the given run. Calling start on a poller that is
    /// already polling (or already stopped) is a no-op.
    pub fn start(&mut self, run_id: &str, events: Arc<dyn StatusEvents>) {
        if !self.shared.cell.begin_polling() {
            tracing::debug!(run_id, "status poller already started; start ignored");
            return;
        }

        let shared = Arc::clone(&self.shared);
        let client = Arc::clone(&self.client);
        let interval = self.interval;
        let run_id = run_id.to_string();

        self.handle = Some(std::thread::spawn(move || {
            Self::poll_loop(shared, client, run_id, interval, events);
        }));
    }

    /// Stop polling. Idempotent; safe before start().
    ///
    /// Releases the poll-loop thread without waiting for it: an in-flight
    /// fetch is never interrupted, and the loop winds down on its own once
    /// it observes the stop.
    pub fn stop(&mut self) {
        self.shared.cell.stop();
        self.handle.take();
    }

    fn poll_loop(
        shared: Arc<StatusShared>,
        client: Arc<dyn RunClient>,
        run_id: String,
        interval: Duration,
        events: Arc<dyn StatusEvents>,
    ) {
        let mut schedule = TickSchedule::new(interval);

        loop {
            if !schedule.wait_until_due(&shared.cell) {
                break;
            }

            if !shared.cell.try_begin_fetch() {
                // Previous fetch still outstanding: skip this tick entirely.
                schedule.advance();
                continue;
            }

            let result = client.fetch_run(&run_id);

            if !shared.cell.finish_fetch() {
                // stop() landed while the fetch was in flight.
                tracing::debug!(%run_id, "discarding stale status response");
                break;
            }

            match result {
                Ok(snapshot) => {
                    let terminal = snapshot.is_terminal();
                    if let Ok(mut latest) = shared.latest.lock() {
                        *latest = Some(snapshot.clone());
                    }
                    events.on_run_snapshot(&snapshot);

                    if terminal {
                        tracing::debug!(
                            %run_id,
                            status = %snapshot.status,
                            "run reached terminal status; status polling stops"
                        );
                        shared.cell.stop();
                        break;
                    }
                }
                Err(error) => {
                    if fetch_failure_is_fatal(&error) {
                        tracing::warn!(%run_id, %error, "status fetch failed; stopping poller");
                        shared.cell.stop();
                        events.on_status_failure(error);
                        break;
                    }
                }
            }

            schedule.advance();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockRunClient;
    use crate::run::RunStatus;

    #[derive(Default)]
    struct RecordingSink {
        snapshots: Mutex<Vec<RunSnapshot>>,
        failures: Mutex<Vec<ClientError>>,
    }

    impl StatusEvents for RecordingSink {
        fn on_run_snapshot(&self, snapshot: &RunSnapshot) {
            self.snapshots.lock().unwrap().push(snapshot.clone());
        }

        fn on_status_failure(&self, error: ClientError) {
            self.failures.lock().unwrap().push(error);
        }
    }

    fn snapshot(status: RunStatus) -> RunSnapshot {
        RunSnapshot::new("run-1", status)
    }

    #[test]
    fn test_poller_emits_until_terminal_then_stops() {
        let client = Arc::new(MockRunClient::new());
        client.script_statuses(vec![
            snapshot(RunStatus::Running),
            snapshot(RunStatus::Running),
            snapshot(RunStatus::Running),
            snapshot(RunStatus::Stopped),
        ]);

        let sink = Arc::new(RecordingSink::default());
        let mut poller = StatusPoller::new(client.clone(), Duration::from_millis(10));
        poller.start("run-1", sink.clone());

        std::thread::sleep(Duration::from_millis(200));

        let snapshots = sink.snapshots.lock().unwrap().clone();
        assert_eq!(snapshots.len(), 4, "one snapshot per scripted fetch");
        assert_eq!(snapshots[3].status, RunStatus::Stopped);
        assert_eq!(poller.phase(), PollerPhase::Stopped);

        // Terminal convergence: no further fetches after STOPPED.
        let calls = client.run_call_count();
        assert_eq!(calls, 4);
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(client.run_call_count(), calls);
    }

    #[test]
    fn test_last_snapshot_readable_after_stop() {
        let client = Arc::new(MockRunClient::new());
        client.script_statuses(vec![snapshot(RunStatus::Stopped)]);

        let sink = Arc::new(RecordingSink::default());
        let mut poller = StatusPoller::new(client, Duration::from_millis(10));
        poller.start("run-1", sink);

        std::thread::sleep(Duration::from_millis(100));

        assert_eq!(poller.phase(), PollerPhase::Stopped);
        let latest = poller.latest_snapshot().unwrap();
        assert_eq!(latest.status, RunStatus::Stopped);
    }

    #[test]
    fn test_fetch_failure_is_fatal_and_emitted_once() {
        let client = Arc::new(MockRunClient::new());
        client.script_statuses(vec![snapshot(RunStatus::Running)]);
        client.fail_runs_after(1, ClientError::Transport("boom".to_string()));

        let sink = Arc::new(RecordingSink::default());
        let mut poller = StatusPoller::new(client.clone(), Duration::from_millis(10));
        poller.start("run-1", sink.clone());

        std::thread::sleep(Duration::from_millis(150));

        assert_eq!(sink.snapshots.lock().unwrap().len(), 1);
        assert_eq!(sink.failures.lock().unwrap().len(), 1);
        assert_eq!(poller.phase(), PollerPhase::Stopped);

        // No retry after the failure.
        assert_eq!(client.run_call_count(), 2);
    }

    #[test]
    fn test_stop_is_idempotent_and_start_after_stop_is_noop() {
        let client = Arc::new(MockRunClient::new());
        let sink = Arc::new(RecordingSink::default());

        let mut poller = StatusPoller::new(client.clone(), Duration::from_millis(10));
        poller.stop();
        poller.stop();
        assert_eq!(poller.phase(), PollerPhase::Stopped);

        // A stopped poller never starts polling again.
        poller.start("run-1", sink);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(client.run_call_count(), 0);
    }

    #[test]
    fn test_slow_fetch_skips_ticks_instead_of_overlapping() {
        let client = Arc::new(MockRunClient::new());
        client.script_statuses(vec![snapshot(RunStatus::Running)]);
        client.set_run_delay(Duration::from_millis(50));

        let sink = Arc::new(RecordingSink::default());
        let mut poller = StatusPoller::new(client.clone(), Duration::from_millis(10));
        poller.start("run-1", sink);

        std::thread::sleep(Duration::from_millis(120));
        poller.stop();

        // With a 50ms fetch and a 10ms interval, overlapping requests would
        // have produced ~12 calls; skip-if-in-flight caps it near 3.
        assert!(client.run_call_count() <= 4);
    }
}
