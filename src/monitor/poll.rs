//! Poll state and tick scheduling shared by both pollers
//!
//! Each poller owns exactly one background thread, created on `start()` and
//! released on `stop()`; there is no process-wide timer registry. The thread
//! runs a deadline-based tick loop: fetch, publish, advance the deadline by
//! the fixed interval, sleep until due. A fetch that overruns its interval
//! consumes the ticks it covered — missed deadlines are skipped, never
//! queued, so a slow network degrades polling frequency instead of piling
//! up requests.
//!
//! The `PollCell` is the mutual-exclusion mechanism: IDLE → IN_FLIGHT is a
//! non-blocking try-lock, so a tick that would overlap an in-flight fetch
//! skips instead. `stop()` moves the cell to STOPPED at any time; an
//! in-flight fetch is never interrupted, but its completion handler observes
//! STOPPED and discards the result.

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use crate::client::ClientError;

/// Sleep granularity while waiting for the next tick. Short enough that
/// stop() takes effect promptly, long enough not to busy-wait.
const WAIT_SLICE: Duration = Duration::from_millis(20);

const STATE_NOT_STARTED: u8 = 0;
const STATE_IDLE: u8 = 1;
const STATE_IN_FLIGHT: u8 = 2;
const STATE_STOPPED: u8 = 3;

/// Per-poller request state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    /// No request outstanding
    Idle,
    /// A fetch has been issued and has not resolved yet
    InFlight,
    /// The poller has stopped; no further fetches will be issued
    Stopped,
}

/// Poller lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerPhase {
    /// start() has not been called
    NotStarted,
    /// The poll loop is running
    Polling,
    /// The poll loop has stopped; terminal, no restart
    Stopped,
}

/// Atomic state cell for one poller
#[derive(Debug)]
pub(crate) struct PollCell {
    state: AtomicU8,
}

impl PollCell {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(STATE_NOT_STARTED),
        }
    }

    /// Move NOT_STARTED → IDLE. Returns false if the poller was already
    /// started (or already stopped), in which case start() is a no-op.
    pub(crate) fn begin_polling(&self) -> bool {
        self.state
            .compare_exchange(
                STATE_NOT_STARTED,
                STATE_IDLE,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    /// Try to move IDLE → IN_FLIGHT. Returns false when a fetch is already
    /// outstanding (skip this tick) or the poller has stopped.
    pub(crate) fn try_begin_fetch(&self) -> bool {
        self.state
            .compare_exchange(
                STATE_IDLE,
                STATE_IN_FLIGHT,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    /// Resolve the in-flight fetch, IN_FLIGHT → IDLE.
    ///
    /// Returns false when the poller was stopped while the fetch was in
    /// flight; the caller must discard the result without publishing it.
    pub(crate) fn finish_fetch(&self) -> bool {
        self.state
            .compare_exchange(
                STATE_IN_FLIGHT,
                STATE_IDLE,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    /// Move to STOPPED from any state. Idempotent.
    pub(crate) fn stop(&self) {
        self.state.store(STATE_STOPPED, Ordering::SeqCst);
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.state.load(Ordering::SeqCst) == STATE_STOPPED
    }

    /// Current request state
    pub(crate) fn state(&self) -> PollState {
        match self.state.load(Ordering::SeqCst) {
            STATE_IN_FLIGHT => PollState::InFlight,
            STATE_STOPPED => PollState::Stopped,
            _ => PollState::Idle,
        }
    }

    /// Current lifecycle phase
    pub(crate) fn phase(&self) -> PollerPhase {
        match self.state.load(Ordering::SeqCst) {
            STATE_NOT_STARTED => PollerPhase::NotStarted,
            STATE_STOPPED => PollerPhase::Stopped,
            _ => PollerPhase::Polling,
        }
    }
}

/// Deadline-based tick schedule for one poller
///
/// The first tick is due immediately, so a freshly started poller issues
/// its first fetch without waiting a full interval.
#[derive(Debug)]
pub(crate) struct TickSchedule {
    interval: Duration,
    deadline: Instant,
}

impl TickSchedule {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            deadline: Instant::now(),
        }
    }

    /// Advance to the next future deadline.
    ///
    /// Deadlines that passed while the previous fetch was in flight are
    /// dropped, not fired back-to-back.
    pub(crate) fn advance(&mut self) {
        self.deadline += self.interval;
        let now = Instant::now();
        while self.deadline <= now {
            self.deadline += self.interval;
        }
    }

    /// Sleep until the current deadline is due or the poller stops.
    ///
    /// Returns false when the poller stopped while waiting; an
    /// already-scheduled tick must never fire after stop().
    pub(crate) fn wait_until_due(&self, cell: &PollCell) -> bool {
        loop {
            if cell.is_stopped() {
                return false;
            }
            let now = Instant::now();
            if now >= self.deadline {
                return true;
            }
            std::thread::sleep((self.deadline - now).min(WAIT_SLICE));
        }
    }
}

/// Single decision point for failed fetches.
///
/// Every failure is currently fatal: the poller stops and the error
/// surfaces exactly once, rather than silently hiding a broken monitor
/// behind retries. A bounded retry budget would slot in here without
/// touching either poller.
pub(crate) fn fetch_failure_is_fatal(_err: &ClientError) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_starts_once() {
        let cell = PollCell::new();
        assert_eq!(cell.phase(), PollerPhase::NotStarted);

        assert!(cell.begin_polling());
        assert_eq!(cell.phase(), PollerPhase::Polling);

        // Second start is refused.
        assert!(!cell.begin_polling());
    }

    #[test]
    fn test_fetch_is_a_try_lock() {
        let cell = PollCell::new();
        cell.begin_polling();

        assert!(cell.try_begin_fetch());
        assert_eq!(cell.state(), PollState::InFlight);

        // A second fetch while one is outstanding is refused.
        assert!(!cell.try_begin_fetch());

        assert!(cell.finish_fetch());
        assert_eq!(cell.state(), PollState::Idle);
        assert!(cell.try_begin_fetch());
    }

    #[test]
    fn test_stop_while_in_flight_discards_result() {
        let cell = PollCell::new();
        cell.begin_polling();
        assert!(cell.try_begin_fetch());

        cell.stop();

        // The completion handler sees the stop and must discard.
        assert!(!cell.finish_fetch());
        assert_eq!(cell.state(), PollState::Stopped);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let cell = PollCell::new();
        cell.begin_polling();
        cell.stop();
        cell.stop();
        assert_eq!(cell.phase(), PollerPhase::Stopped);

        // No restart from STOPPED.
        assert!(!cell.begin_polling());
        assert!(!cell.try_begin_fetch());
    }

    #[test]
    fn test_stop_before_start() {
        let cell = PollCell::new();
        cell.stop();
        assert_eq!(cell.phase(), PollerPhase::Stopped);
        assert!(!cell.begin_polling());
    }

    #[test]
    fn test_schedule_first_tick_is_immediate() {
        let cell = PollCell::new();
        cell.begin_polling();

        let schedule = TickSchedule::new(Duration::from_secs(60));
        let waited = Instant::now();
        assert!(schedule.wait_until_due(&cell));
        assert!(waited.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn test_schedule_skips_missed_deadlines() {
        let mut schedule = TickSchedule::new(Duration::from_millis(10));

        // Simulate a fetch that overran several intervals.
        std::thread::sleep(Duration::from_millis(45));
        schedule.advance();

        // The next deadline is in the future, not a backlog of past ticks.
        assert!(schedule.deadline > Instant::now());
    }

    #[test]
    fn test_wait_aborts_on_stop() {
        let cell = PollCell::new();
        cell.begin_polling();

        let mut schedule = TickSchedule::new(Duration::from_secs(30));
        schedule.advance();

        cell.stop();
        let waited = Instant::now();
        assert!(!schedule.wait_until_due(&cell));
        assert!(waited.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_every_failure_is_fatal() {
        assert!(fetch_failure_is_fatal(&ClientError::Transport(
            "connection reset".to_string()
        )));
        assert!(fetch_failure_is_fatal(&ClientError::RunNotFound {
            run_id: "run-1".to_string()
        }));
    }
}
