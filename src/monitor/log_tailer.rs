//! Log tailer
//!
//! Owns the repeating "fetch next log chunk" loop for one run, threading a
//! cursor so previously-fetched lines are never re-fetched. The cursor is
//! owned exclusively by the tail loop: it advances only forward (an empty
//! chunk still confirms the position), never rewinds, and is never reused
//! across runs.
//!
//! Unlike the status poller, the tailer has no intrinsic notion of
//! "finished" — log output may lag the run's status transition by one or
//! more intervals, so the run monitor stops the tailer from outside, after
//! allowing a bounded number of drain cycles.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::client::{ClientError, RunClient};

use super::poll::{fetch_failure_is_fatal, PollCell, PollState, PollerPhase, TickSchedule};

/// Sentinel for "no drain limit armed": the tailer keeps polling until
/// stopped or told how many cycles remain.
const DRAIN_UNARMED: i64 = -1;

/// Events emitted by a `LogTailer`
///
/// Called synchronously on the tailer thread; implementations must not
/// block.
pub trait TailEvents: Send + Sync {
    /// New lines were appended to the log buffer, in order
    fn on_log_append(&self, lines: &[String]);

    /// A log fetch failed and the tailer has stopped
    fn on_tail_failure(&self, error: ClientError);
}

/// State shared between the tailer object, its thread, and its handles
#[derive(Debug)]
struct TailShared {
    cell: PollCell,
    buffer: Mutex<Vec<String>>,
    /// Completed fetches left before the tailer stops; DRAIN_UNARMED until
    /// the monitor arms draining on a terminal status
    drain_remaining: AtomicI64,
}

/// Cloneable control handle for a log tailer
#[derive(Clone)]
pub struct TailHandle {
    shared: Arc<TailShared>,
}

impl TailHandle {
    /// Stop the tailer. Idempotent; never interrupts an in-flight fetch,
    /// whose result will be discarded when it resolves.
    pub fn stop(&self) {
        self.shared.cell.stop();
    }

    /// Allow `cycles` more completed fetches, then stop.
    ///
    /// Arms at most once; later calls are ignored so the first terminal
    /// observation fixes the drain budget. `cycles == 0` stops immediately.
    pub fn stop_after(&self, cycles: u32) {
        let armed = self
            .shared
            .drain_remaining
            .compare_exchange(
                DRAIN_UNARMED,
                i64::from(cycles),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();

        if armed && cycles == 0 {
            self.shared.cell.stop();
        }
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> PollerPhase {
        self.shared.cell.phase()
    }

    /// Copy of all lines received so far, in arrival order
    pub fn lines(&self) -> Vec<String> {
        self.shared
            .buffer
            .lock()
            .map(|buffer| buffer.clone())
            .unwrap_or_default()
    }

    /// Number of lines received so far
    pub fn line_count(&self) -> usize {
        self.shared.buffer.lock().map(|b| b.len()).unwrap_or(0)
    }
}

/// Repeatedly fetches a run's log feed until stopped
pub struct LogTailer {
    client: Arc<dyn RunClient>,
    interval: Duration,
    shared: Arc<TailShared>,
    /// Owned tail-loop thread, created on start() and released on stop()
    handle: Option<JoinHandle<()>>,
}

impl LogTailer {
    /// Create a tailer; no fetch is issued until start()
    pub fn new(client: Arc<dyn RunClient>, interval: Duration) -> Self {
        Self {
            client,
            interval,
            shared: Arc::new(TailShared {
                cell: PollCell::new(),
                buffer: Mutex::new(Vec::new()),
                drain_remaining: AtomicI64::new(DRAIN_UNARMED),
            }),
            handle: None,
        }
    }

    /// Get a cloneable control handle
    pub fn handle(&self) -> TailHandle {
        TailHandle {
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

    /// Copy of all lines received so far, in arrival order
    pub fn lines(&self) -> Vec<String> {
        self.handle().lines()
    }

    /// Begin tailing the given run from the start of its log. Calling start
    /// on a tailer that is already polling (or already stopped) is a no-op.
    pub fn start(&mut self, run_id: &str, events: Arc<dyn TailEvents>) {
        if !self.shared.cell.begin_polling() {
            tracing::debug!(run_id, "log tailer already started; start ignored");
            return;
        }

        let shared = Arc::clone(&self.shared);
        let client = Arc::clone(&self.client);
        let interval = self.interval;
        let run_id = run_id.to_string();

        self.handle = Some(std::thread::spawn(move || {
            Self::tail_loop(shared, client, run_id, interval, events);
        }));
    }

    /// Stop tailing. Idempotent; safe before start().
    ///
    /// Releases the tail-loop thread without waiting for it: an in-flight
    /// fetch is never interrupted, and the loop winds down on its own once
    /// it observes the stop.
    pub fn stop(&mut self) {
        self.shared.cell.stop();
        self.handle.take();
    }

    fn tail_loop(
        shared: Arc<TailShared>,
        client: Arc<dyn RunClient>,
        run_id: String,
        interval: Duration,
        events: Arc<dyn TailEvents>,
    ) {
        let mut schedule = TickSchedule::new(interval);
        // Owned exclusively by this loop; None = start of the log.
        let mut cursor: Option<String> = None;

        loop {
            if !schedule.wait_until_due(&shared.cell) {
                break;
            }

            if !shared.cell.try_begin_fetch() {
                // Previous fetch still outstanding: skip this tick entirely.
                schedule.advance();
                continue;
            }

            let result = client.fetch_logs(&run_id, cursor.as_deref());

            if !shared.cell.finish_fetch() {
                // stop() landed while the fetch was in flight.
                tracing::debug!(%run_id, "discarding stale log response");
                break;
            }

            match result {
                Ok(chunk) => {
                    if chunk.has_lines() {
                        if let Ok(mut buffer) = shared.buffer.lock() {
                            buffer.extend(chunk.lines.iter().cloned());
                        }
                        events.on_log_append(&chunk.lines);
                    }

                    // Replace the cursor even for an empty chunk so the next
                    // fetch never re-reads seen lines. A chunk without a
                    // cursor never rewinds the tail to the beginning.
                    if chunk.next_cursor.is_some() {
                        cursor = chunk.next_cursor;
                    }

                    if Self::consume_drain_cycle(&shared) {
                        tracing::debug!(%run_id, "log tail drained; stopping");
                        shared.cell.stop();
                        break;
                    }
                }
                Err(error) => {
                    if fetch_failure_is_fatal(&error) {
                        tracing::warn!(%run_id, %error, "log fetch failed; stopping tailer");
                        shared.cell.stop();
                        events.on_tail_failure(error);
                        break;
                    }
                }
            }

            schedule.advance();
        }
    }

    /// Count one completed fetch against the drain budget, if armed.
    /// Returns true when the budget is exhausted and the tailer must stop.
    fn consume_drain_cycle(shared: &TailShared) -> bool {
        if shared.drain_remaining.load(Ordering::SeqCst) == DRAIN_UNARMED {
            return false;
        }
        shared.drain_remaining.fetch_sub(1, Ordering::SeqCst) <= 1
    }
}
