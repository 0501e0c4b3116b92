//! taskdeck - live run monitoring for a remote task-execution console
//!
//! This crate implements the monitoring core of an operator console: given
//! the identifier of a run executing on a remote platform, it polls the
//! run's status at a fixed cadence until the run turns terminal, tails the
//! run's log output through an opaque cursor so lines are fetched exactly
//! once, and coordinates the two loops across the run's lifecycle and the
//! console's own attach/detach lifecycle.

pub mod client;
pub mod config;
pub mod mock;
pub mod monitor;
pub mod run;

pub use client::{ClientError, ClientResult, LogChunk, Notifier, RunClient};
pub use config::{ConfigError, MonitorConfig};
pub use mock::MockRunClient;
pub use monitor::{LogTailer, PollState, PollerPhase, RunMonitor, RunObserver, StatusPoller};
pub use run::{generate_run_id, RunSnapshot, RunStatus};
