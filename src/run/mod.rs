//! Run data model
//!
//! Run statuses: QUEUED → PENDING → RUNNING → STOPPED, with NEEDS_RETRY
//! as a platform-driven detour back into the queue. STOPPED is the only
//! terminal status; once a run reports it, no further state changes occur.
//!
//! A `RunSnapshot` is the latest known state of one run as reported by the
//! platform. Snapshots are superseded, never mutated: each successful status
//! fetch produces a fresh value and consumers always read the most recent.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Run status enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// Run is queued, waiting for the platform to pick it up
    Queued,
    /// Run is being placed on an execution host
    Pending,
    /// Run is actively executing
    Running,
    /// Run hit a retryable platform condition and will be re-queued
    NeedsRetry,
    /// Run has finished; no further state changes occur
    Stopped,
}

impl RunStatus {
    /// Check whether this status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Stopped)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Queued => write!(f, "QUEUED"),
            RunStatus::Pending => write!(f, "PENDING"),
            RunStatus::Running => write!(f, "RUNNING"),
            RunStatus::NeedsRetry => write!(f, "NEEDS_RETRY"),
            RunStatus::Stopped => write!(f, "STOPPED"),
        }
    }
}

/// The latest known state of a run, as returned by one status fetch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    /// Run identifier (opaque, immutable for the life of a monitor)
    pub run_id: String,

    /// Task definition this run was launched from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition_id: Option<String>,

    /// Cluster the run was placed on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,

    /// Current status
    pub status: RunStatus,

    /// When the run started executing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// When the run finished
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// Exit code of the run's process, once finished
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i64>,
}

impl RunSnapshot {
    /// Create a snapshot with only identity and status populated
    pub fn new(run_id: impl Into<String>, status: RunStatus) -> Self {
        Self {
            run_id: run_id.into(),
            definition_id: None,
            cluster: None,
            status,
            started_at: None,
            finished_at: None,
            exit_code: None,
        }
    }

    /// Check whether the run has reached its terminal status
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Wall-clock duration of the run as of `now`
    ///
    /// `None` until the run has started. While the run is executing the
    /// duration keeps growing; once `finished_at` is known it is fixed.
    pub fn duration_as_of(&self, now: DateTime<Utc>) -> Option<Duration> {
        let started = self.started_at?;
        Some(self.finished_at.unwrap_or(now) - started)
    }

    /// Wall-clock duration of the run as of the current instant
    pub fn duration(&self) -> Option<Duration> {
        self.duration_as_of(Utc::now())
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Generate a new run_id using ULID (sortable, filesystem-safe)
pub fn generate_run_id() -> String {
    ulid::Ulid::new().to_string().to_lowercase()
}
