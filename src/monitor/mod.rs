//! Run monitor
//!
//! Composes a status poller and a log tailer into one lifecycle bound to a
//! run identifier. `attach()` starts both pollers concurrently — neither
//! waits for the other's first response. `detach()` stops both
//! unconditionally. Both calls are idempotent: UI lifecycles produce double
//! mounts and repeated unmounts routinely, and neither may fault.
//!
//! Coordination policy:
//! - a terminal snapshot does not stop the tailer immediately; the monitor
//!   grants it a bounded number of drain cycles so output produced just
//!   before termination is still retrieved, then stops it
//! - either poller's fatal error stops both pollers and produces exactly
//!   one notification per monitor instance; later errors are suppressed

mod log_tailer;
mod poll;
mod status_poller;

pub use log_tailer::{LogTailer, TailEvents, TailHandle};
pub use poll::{PollState, PollerPhase};
pub use status_poller::{StatusEvents, StatusHandle, StatusPoller};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::client::{ClientError, Notifier, RunClient};
use crate::config::MonitorConfig;
use crate::run::RunSnapshot;

/// Subscription surface for the presentation layer
///
/// Callbacks fire synchronously on the poller threads, in fetch-completion
/// order per poller; there is no cross-poller ordering. Implementations
/// receive emitted values only — never a shared mutable reference to poller
/// internals — and must not block.
pub trait RunObserver: Send + Sync {
    /// A fresh snapshot superseded the previous one
    fn on_snapshot(&self, _snapshot: &RunSnapshot) {}

    /// New log lines were appended, in order
    fn on_log_append(&self, _lines: &[String]) {}
}

/// Event fan-in shared by both pollers of one monitor
struct MonitorEvents {
    observer: Arc<dyn RunObserver>,
    notifier: Arc<dyn Notifier>,
    status: StatusHandle,
    tail: TailHandle,
    drain_cycles: u32,
    fatal_reported: AtomicBool,
    detached: AtomicBool,
}

impl MonitorEvents {
    /// Stop everything and surface the error, at most once per monitor
    fn fatal(&self, error: ClientError) {
        if self.detached.load(Ordering::SeqCst) {
            return;
        }
        if self.fatal_reported.swap(true, Ordering::SeqCst) {
            tracing::debug!(%error, "suppressing additional fatal error");
            return;
        }

        self.status.stop();
        self.tail.stop();
        self.notifier.notify_fatal(&error.to_string());
    }
}

impl StatusEvents for MonitorEvents {
    fn on_run_snapshot(&self, snapshot: &RunSnapshot) {
        if self.detached.load(Ordering::SeqCst) {
            return;
        }
        self.observer.on_snapshot(snapshot);

        if snapshot.is_terminal() {
            // Log output may lag the status transition; let the tailer run
            // its drain budget before stopping it.
            self.tail.stop_after(self.drain_cycles);
        }
    }

    fn on_status_failure(&self, error: ClientError) {
        self.fatal(error);
    }
}

impl TailEvents for MonitorEvents {
    fn on_log_append(&self, lines: &[String]) {
        if self.detached.load(Ordering::SeqCst) {
            return;
        }
        self.observer.on_log_append(lines);
    }

    fn on_tail_failure(&self, error: ClientError) {
        self.fatal(error);
    }
}

/// One attached run: both pollers plus their shared event fan-in
struct Attached {
    run_id: String,
    status: StatusPoller,
    tailer: LogTailer,
    events: Arc<MonitorEvents>,
}

/// Watches one run until it finishes, the monitor is detached, or a fetch
/// fails
pub struct RunMonitor {
    client: Arc<dyn RunClient>,
    config: MonitorConfig,
    attached: Option<Attached>,
}

impl RunMonitor {
    /// Create a monitor; nothing is fetched until attach()
    pub fn new(client: Arc<dyn RunClient>, config: MonitorConfig) -> Self {
        Self {
            client,
            config,
            attached: None,
        }
    }

    /// Start watching `run_id`, forwarding observations to `observer` and
    /// fatal errors to `notifier`.
    ///
    /// Attaching while already attached is a no-op; detach first to watch a
    /// different run.
    pub fn attach(
        &mut self,
        run_id: &str,
        observer: Arc<dyn RunObserver>,
        notifier: Arc<dyn Notifier>,
    ) {
        if let Some(attached) = &self.attached {
            tracing::debug!(
                run_id,
                watching = %attached.run_id,
                "monitor already attached; attach ignored"
            );
            return;
        }

        let mut status = StatusPoller::new(Arc::clone(&self.client), self.config.status_interval);
        let mut tailer = LogTailer::new(Arc::clone(&self.client), self.config.log_interval);

        let events = Arc::new(MonitorEvents {
            observer,
            notifier,
            status: status.handle(),
            tail: tailer.handle(),
            drain_cycles: self.config.drain_cycles,
            fatal_reported: AtomicBool::new(false),
            detached: AtomicBool::new(false),
        });

        tracing::debug!(run_id, "attaching run monitor");
        status.start(run_id, Arc::clone(&events) as Arc<dyn StatusEvents>);
        tailer.start(run_id, Arc::clone(&events) as Arc<dyn TailEvents>);

        self.attached = Some(Attached {
            run_id: run_id.to_string(),
            status,
            tailer,
            events,
        });
    }

    /// Stop both pollers and release the attachment. Idempotent; safe
    /// before any fetch has resolved. A fetch already in flight is not
    /// interrupted, but its result is discarded when it lands.
    pub fn detach(&mut self) {
        if let Some(mut attached) = self.attached.take() {
            tracing::debug!(run_id = %attached.run_id, "detaching run monitor");
            attached.events.detached.store(true, Ordering::SeqCst);
            attached.status.stop();
            attached.tailer.stop();
        }
    }

    /// Run currently being watched, if any
    pub fn run_id(&self) -> Option<&str> {
        self.attached.as_ref().map(|a| a.run_id.as_str())
    }

    /// Check whether the monitor is attached
    pub fn is_attached(&self) -> bool {
        self.attached.is_some()
    }

    /// Latest snapshot observed for the attached run
    pub fn latest_snapshot(&self) -> Option<RunSnapshot> {
        self.attached.as_ref().and_then(|a| a.status.latest_snapshot())
    }

    /// Copy of all log lines received so far for the attached run
    pub fn log_lines(&self) -> Vec<String> {
        self.attached
            .as_ref()
            .map(|a| a.tailer.lines())
            .unwrap_or_default()
    }

    /// Lifecycle phase of the status poller
    pub fn status_phase(&self) -> Option<PollerPhase> {
        self.attached.as_ref().map(|a| a.status.phase())
    }

    /// Lifecycle phase of the log tailer
    pub fn tail_phase(&self) -> Option<PollerPhase> {
        self.attached.as_ref().map(|a| a.tailer.phase())
    }
}

impl Drop for RunMonitor {
    fn drop(&mut self) {
        self.detach();
    }
}
