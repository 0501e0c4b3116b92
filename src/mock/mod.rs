//! Scriptable mock run client
//!
//! Configurable `RunClient` for exercising the monitoring core without a
//! platform. Tests script a sequence of snapshots and log chunks, optionally
//! inject failures or latency, and inspect recorded calls afterwards.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::client::{ClientError, ClientResult, LogChunk, RunClient};
use crate::run::RunSnapshot;

/// Failure injection for one operation
#[derive(Debug, Clone)]
pub struct MockFailure {
    /// Error to return
    pub error: ClientError,
    /// Number of calls served normally before failing
    pub after_calls: u32,
}

/// Mutable mock state (wrapped for interior mutability)
#[derive(Debug, Default)]
struct MockClientState {
    /// Scripted status responses; when exhausted the last served snapshot
    /// repeats, like a platform whose run state has settled
    statuses: VecDeque<RunSnapshot>,
    last_status: Option<RunSnapshot>,

    /// Scripted log responses; when exhausted an empty chunk echoing the
    /// requested cursor is served (no new output yet)
    chunks: VecDeque<LogChunk>,

    run_calls: u32,
    log_calls: u32,

    /// Operation names in call order
    calls: Vec<String>,
    /// Cursor passed to each fetch_logs call, in order
    cursors_seen: Vec<Option<String>>,

    run_failure: Option<MockFailure>,
    log_failure: Option<MockFailure>,

    run_delay: Option<Duration>,
    log_delay: Option<Duration>,
}

/// Configurable mock client for testing
#[derive(Debug, Default)]
pub struct MockRunClient {
    state: Mutex<MockClientState>,
}

impl MockRunClient {
    /// Create a mock with nothing scripted; fetch_run answers RunNotFound
    /// and fetch_logs answers empty chunks until scripted
    pub fn new() -> Self {
        Self::default()
    }

    // === Scripting API ===

    /// Replace the scripted status sequence
    pub fn script_statuses(&self, statuses: Vec<RunSnapshot>) {
        let mut state = self.state.lock().unwrap();
        state.statuses = statuses.into();
    }

    /// Append one scripted status response
    pub fn push_status(&self, snapshot: RunSnapshot) {
        self.state.lock().unwrap().statuses.push_back(snapshot);
    }

    /// Replace the scripted log-chunk sequence
    pub fn script_log_chunks(&self, chunks: Vec<LogChunk>) {
        let mut state = self.state.lock().unwrap();
        state.chunks = chunks.into();
    }

    /// Append one scripted log chunk
    pub fn push_log_chunk(&self, chunk: LogChunk) {
        self.state.lock().unwrap().chunks.push_back(chunk);
    }

    /// Fail fetch_run calls after `after_calls` have been served normally
    pub fn fail_runs_after(&self, after_calls: u32, error: ClientError) {
        self.state.lock().unwrap().run_failure = Some(MockFailure { error, after_calls });
    }

    /// Fail fetch_logs calls after `after_calls` have been served normally
    pub fn fail_logs_after(&self, after_calls: u32, error: ClientError) {
        self.state.lock().unwrap().log_failure = Some(MockFailure { error, after_calls });
    }

    /// Delay every fetch_run response
    pub fn set_run_delay(&self, delay: Duration) {
        self.state.lock().unwrap().run_delay = Some(delay);
    }

    /// Delay every fetch_logs response
    pub fn set_log_delay(&self, delay: Duration) {
        self.state.lock().unwrap().log_delay = Some(delay);
    }

    // === Inspection API ===

    /// Number of fetch_run calls received
    pub fn run_call_count(&self) -> u32 {
        self.state.lock().unwrap().run_calls
    }

    /// Number of fetch_logs calls received
    pub fn log_call_count(&self) -> u32 {
        self.state.lock().unwrap().log_calls
    }

    /// Operation names in call order
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Cursor passed to each fetch_logs call, in order
    pub fn log_cursors_seen(&self) -> Vec<Option<String>> {
        self.state.lock().unwrap().cursors_seen.clone()
    }
}

impl RunClient for MockRunClient {
    fn fetch_run(&self, run_id: &str) -> ClientResult<RunSnapshot> {
        let (delay, result) = {
            let mut state = self.state.lock().unwrap();
            state.run_calls += 1;
            state.calls.push("fetch_run".to_string());

            let failed = state
                .run_failure
                .as_ref()
                .filter(|f| state.run_calls > f.after_calls)
                .map(|f| f.error.clone());

            let result = match failed {
                Some(error) => Err(error),
                None => match state.statuses.pop_front() {
                    Some(snapshot) => {
                        state.last_status = Some(snapshot.clone());
                        Ok(snapshot)
                    }
                    None => state.last_status.clone().ok_or(ClientError::RunNotFound {
                        run_id: run_id.to_string(),
                    }),
                },
            };

            (state.run_delay, result)
        };

        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        result
    }

    fn fetch_logs(&self, _run_id: &str, cursor: Option<&str>) -> ClientResult<LogChunk> {
        let (delay, result) = {
            let mut state = self.state.lock().unwrap();
            state.log_calls += 1;
            state.calls.push("fetch_logs".to_string());
            state.cursors_seen.push(cursor.map(String::from));

            let failed = state
                .log_failure
                .as_ref()
                .filter(|f| state.log_calls > f.after_calls)
                .map(|f| f.error.clone());

            let result = match failed {
                Some(error) => Err(error),
                None => match state.chunks.pop_front() {
                    Some(chunk) => Ok(chunk),
                    // No new output yet: confirm the caller's position.
                    None => Ok(LogChunk::empty(cursor.map(String::from))),
                },
            };

            (state.log_delay, result)
        };

        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::RunStatus;

    #[test]
    fn test_unscripted_run_is_not_found() {
        let client = MockRunClient::new();
        let err = client.fetch_run("run-1").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_last_scripted_status_repeats() {
        let client = MockRunClient::new();
        client.script_statuses(vec![
            RunSnapshot::new("run-1", RunStatus::Queued),
            RunSnapshot::new("run-1", RunStatus::Running),
        ]);

        assert_eq!(client.fetch_run("run-1").unwrap().status, RunStatus::Queued);
        assert_eq!(client.fetch_run("run-1").unwrap().status, RunStatus::Running);
        // Exhausted: the platform keeps reporting the settled state.
        assert_eq!(client.fetch_run("run-1").unwrap().status, RunStatus::Running);
        assert_eq!(client.run_call_count(), 3);
    }

    #[test]
    fn test_failure_injection_after_n_calls() {
        let client = MockRunClient::new();
        client.script_statuses(vec![RunSnapshot::new("run-1", RunStatus::Running)]);
        client.fail_runs_after(1, ClientError::Transport("down".to_string()));

        assert!(client.fetch_run("run-1").is_ok());
        assert!(client.fetch_run("run-1").is_err());
        assert!(client.fetch_run("run-1").is_err());
    }

    #[test]
    fn test_exhausted_log_script_echoes_cursor() {
        let client = MockRunClient::new();
        client.script_log_chunks(vec![LogChunk::new(
            vec!["a".to_string()],
            Some("c1".to_string()),
        )]);

        let first = client.fetch_logs("run-1", None).unwrap();
        assert_eq!(first.lines, vec!["a".to_string()]);

        let second = client.fetch_logs("run-1", Some("c1")).unwrap();
        assert!(!second.has_lines());
        assert_eq!(second.next_cursor.as_deref(), Some("c1"));

        assert_eq!(
            client.log_cursors_seen(),
            vec![None, Some("c1".to_string())]
        );
    }

    #[test]
    fn test_calls_are_recorded_in_order() {
        let client = MockRunClient::new();
        client.script_statuses(vec![RunSnapshot::new("run-1", RunStatus::Running)]);

        let _ = client.fetch_run("run-1");
        let _ = client.fetch_logs("run-1", None);
        let _ = client.fetch_run("run-1");

        assert_eq!(client.calls(), vec!["fetch_run", "fetch_logs", "fetch_run"]);
    }
}
