//! Server-side task records and the wait-for-completion loop.
//!
//! # Design
//! Every write to the search service is asynchronous: the server answers with
//! an enqueued `Task` and processes it later. The client never changes a
//! task's status itself; it only re-fetches the task and observes what the
//! server reports.
//!
//! `poll_task` is written against a fetch closure instead of the HTTP layer,
//! so the loop's timing and termination are tested with in-memory sources.
//! Polls are strictly sequential: the next fetch starts only after the
//! previous one returned.

use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ApiError, MeiliError, Result};
use crate::types::TypoTolerance;

/// Lifecycle status reported by the server.
///
/// Statuses this client does not know deserialize to `Unknown` and are
/// treated as still in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Enqueued,
    Processing,
    Succeeded,
    Failed,
    #[serde(alias = "canceled")]
    Cancelled,
    #[serde(other)]
    Unknown,
}

/// Operation-specific counters and the settings a task applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Details {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_documents: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexed_documents: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_documents: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ranking_rules: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub searchable_attributes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub displayed_attributes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filterable_attributes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sortable_attributes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_words: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synonyms: Option<std::collections::BTreeMap<String, Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distinct_attribute: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typo_tolerance: Option<TypoTolerance>,
}

/// An asynchronous operation tracked by the server.
///
/// The identifier is `taskUid` on the wire; task lookups answer with `uid`,
/// which is accepted as an alias.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(alias = "uid")]
    pub task_uid: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_uid: Option<String>,
    pub status: TaskStatus,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enqueued_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Details>,
}

impl Task {
    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Succeeded
    }

    pub fn is_failure(&self) -> bool {
        self.status == TaskStatus::Failed
    }
}

/// Budget for [`poll_task`].
#[derive(Debug, Clone)]
pub struct WaitOptions {
    /// Total time allowed before giving up. Default 5000 ms.
    pub timeout: Duration,
    /// Pause between two polls. Default 50 ms.
    pub interval: Duration,
    /// Stop on `cancelled` as well as `succeeded`/`failed`. Off by default:
    /// a cancelled task then polls until the timeout.
    pub cancelled_is_terminal: bool,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(5000),
            interval: Duration::from_millis(50),
            cancelled_is_terminal: false,
        }
    }
}

impl WaitOptions {
    pub fn is_terminal(&self, status: TaskStatus) -> bool {
        match status {
            TaskStatus::Succeeded | TaskStatus::Failed => true,
            TaskStatus::Cancelled => self.cancelled_is_terminal,
            TaskStatus::Enqueued | TaskStatus::Processing | TaskStatus::Unknown => false,
        }
    }
}

/// Re-fetch a task until it reaches a terminal status or the budget runs out.
///
/// The first fetch happens immediately. Performs at most
/// `ceil(timeout / interval) + 1` fetches, assuming `fetch` itself returns.
/// Fetch errors are returned as-is; a failed task is returned as `Ok`.
pub fn poll_task<F>(task_uid: u64, options: &WaitOptions, mut fetch: F) -> Result<Task>
where
    F: FnMut() -> Result<Task>,
{
    let start = Instant::now();
    let mut elapsed = Duration::ZERO;
    loop {
        if elapsed >= options.timeout {
            warn!(task_uid, timeout_ms = options.timeout.as_millis() as u64, "task wait timed out");
            return Err(MeiliError::Timeout {
                task_uid,
                timeout: options.timeout,
            });
        }

        let task = fetch()?;
        debug!(task_uid, status = ?task.status, elapsed_ms = elapsed.as_millis() as u64, "polled task");
        if options.is_terminal(task.status) {
            return Ok(task);
        }

        thread::sleep(options.interval);
        elapsed = start.elapsed();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    fn task(status: TaskStatus) -> Task {
        Task {
            task_uid: 1,
            index_uid: Some("movies".to_string()),
            status,
            task_type: Some("documentAdditionOrUpdate".to_string()),
            duration: None,
            enqueued_at: None,
            started_at: None,
            finished_at: None,
            error: None,
            details: None,
        }
    }

    fn options(interval_ms: u64, timeout_ms: u64) -> WaitOptions {
        WaitOptions {
            timeout: Duration::from_millis(timeout_ms),
            interval: Duration::from_millis(interval_ms),
            cancelled_is_terminal: false,
        }
    }

    #[test]
    fn returns_after_processing_then_succeeded() {
        let fetches = Cell::new(0);
        let started = Instant::now();
        let result = poll_task(1, &options(10, 1000), || {
            fetches.set(fetches.get() + 1);
            if fetches.get() <= 3 {
                Ok(task(TaskStatus::Processing))
            } else {
                Ok(task(TaskStatus::Succeeded))
            }
        })
        .unwrap();
        assert_eq!(result.status, TaskStatus::Succeeded);
        assert_eq!(fetches.get(), 4);
        assert!(started.elapsed() < Duration::from_millis(1000));
    }

    #[test]
    fn times_out_when_never_terminal() {
        let fetches = Cell::new(0u32);
        let err = poll_task(9, &options(10, 50), || {
            fetches.set(fetches.get() + 1);
            Ok(task(TaskStatus::Processing))
        })
        .unwrap_err();
        assert!(matches!(err, MeiliError::Timeout { task_uid: 9, .. }));
        assert!(fetches.get() >= 1);
        assert!(fetches.get() <= 50 / 10 + 2, "fetched {} times", fetches.get());
    }

    #[test]
    fn failed_is_terminal() {
        let result = poll_task(1, &options(10, 1000), || Ok(task(TaskStatus::Failed))).unwrap();
        assert!(result.is_failure());
    }

    #[test]
    fn cancelled_keeps_polling_unless_configured() {
        let err = poll_task(1, &options(10, 40), || Ok(task(TaskStatus::Cancelled))).unwrap_err();
        assert!(err.is_timeout());

        let opts = WaitOptions {
            cancelled_is_terminal: true,
            ..options(10, 40)
        };
        let result = poll_task(1, &opts, || Ok(task(TaskStatus::Cancelled))).unwrap();
        assert_eq!(result.status, TaskStatus::Cancelled);
    }

    #[test]
    fn fetch_errors_propagate_immediately() {
        let fetches = Cell::new(0);
        let err = poll_task(1, &options(10, 1000), || {
            fetches.set(fetches.get() + 1);
            Err(MeiliError::Transport("connection reset".to_string()))
        })
        .unwrap_err();
        assert!(matches!(err, MeiliError::Transport(_)));
        assert_eq!(fetches.get(), 1);
    }

    #[test]
    fn zero_timeout_fails_without_fetching() {
        let fetches = Cell::new(0);
        let err = poll_task(3, &options(10, 0), || {
            fetches.set(fetches.get() + 1);
            Ok(task(TaskStatus::Succeeded))
        })
        .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(fetches.get(), 0);
    }

    #[test]
    fn unknown_and_legacy_statuses_decode() {
        let t: Task = serde_json::from_str(r#"{"uid":4,"status":"paused"}"#).unwrap();
        assert_eq!(t.task_uid, 4);
        assert_eq!(t.status, TaskStatus::Unknown);
        assert!(!WaitOptions::default().is_terminal(t.status));

        let t: Task = serde_json::from_str(r#"{"taskUid":5,"status":"canceled"}"#).unwrap();
        assert_eq!(t.status, TaskStatus::Cancelled);
    }

    #[test]
    fn failed_task_carries_error_and_details() {
        let t: Task = serde_json::from_str(
            r#"{"uid":2,"indexUid":"movies","status":"failed","type":"indexCreation",
                "error":{"message":"Index `movies` already exists.","code":"index_already_exists","type":"invalid_request","link":"https://docs.meilisearch.com/errors#index_already_exists"},
                "details":{"primaryKey":"id"}}"#,
        )
        .unwrap();
        assert_eq!(t.error.as_ref().map(|e| e.code.as_str()), Some("index_already_exists"));
        assert_eq!(t.details.and_then(|d| d.primary_key).as_deref(), Some("id"));
    }
}
