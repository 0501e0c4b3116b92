//! Remote API capabilities consumed by the monitoring core
//!
//! The console talks to the platform through a `RunClient`: one call to read
//! a run's current state, one call to read the next chunk of its log output.
//! The transport (HTTP, auth, request bounding) and the normalization of
//! transport failures into `ClientError` live behind the trait; this crate
//! only consumes the contract. The scriptable implementation used by tests
//! lives in `crate::mock`.

use serde::{Deserialize, Serialize};

use crate::run::RunSnapshot;

/// Errors surfaced by a `RunClient`
///
/// The classification is rich enough to tell "the run does not exist" from
/// "the platform is unreachable", but the monitoring core treats every
/// variant as fatal: polling stops on the first failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    /// The platform does not know this run
    #[error("run not found: {run_id}")]
    RunNotFound { run_id: String },

    /// The platform answered with a non-success status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The request never produced a response
    #[error("transport error: {0}")]
    Transport(String),

    /// The response arrived but is missing expected fields
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ClientError {
    /// Check whether this error means the run does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::RunNotFound { .. })
    }
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// One page of log output
///
/// `lines` are in server generation order. `next_cursor` marks the point up
/// to which output has been retrieved and must be passed to the next fetch;
/// an empty chunk still carries a cursor so the tail keeps its position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogChunk {
    /// New log lines since the requested cursor
    pub lines: Vec<String>,

    /// Cursor to pass to the next fetch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

impl LogChunk {
    /// Create a chunk with lines and a following cursor
    pub fn new(lines: Vec<String>, next_cursor: Option<String>) -> Self {
        Self { lines, next_cursor }
    }

    /// Create an empty chunk that confirms an existing cursor
    pub fn empty(cursor: Option<String>) -> Self {
        Self {
            lines: Vec::new(),
            next_cursor: cursor,
        }
    }

    /// Check whether the chunk carries any lines
    pub fn has_lines(&self) -> bool {
        !self.lines.is_empty()
    }
}

/// Client capability for reading a run and its log feed
///
/// Implementations must bound request duration themselves; the monitoring
/// core issues blocking calls from its poller threads and relies on the
/// client to eventually return, successfully or not.
pub trait RunClient: Send + Sync {
    /// Fetch the current state of a run
    fn fetch_run(&self, run_id: &str) -> ClientResult<RunSnapshot>;

    /// Fetch log output after `cursor` (`None` = from the beginning)
    fn fetch_logs(&self, run_id: &str, cursor: Option<&str>) -> ClientResult<LogChunk>;
}

/// Capability for surfacing a fatal, user-visible error
///
/// Called at most once per monitor instance, on the poller thread that hit
/// the failure. Implementations render the message however the surrounding
/// console does (notice, popup, log line) and must not block.
pub trait Notifier: Send + Sync {
    /// Surface a fatal error to the operator
    fn notify_fatal(&self, message: &str);
}
