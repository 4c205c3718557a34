//! Monitor log - captured request/response exchanges.

use crate::http::{HttpRequest, HttpResponse};
use crate::predicate::CompiledRequestMatch;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

/// Re-check interval for blocking waits over the log.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// One observed exchange, captured when a monitor rule matched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoredNetworkRequest {
    pub timestamp: DateTime<Utc>,
    /// Wall-clock seconds from interception to completion.
    pub request_time_secs: f64,
    /// The request as originally issued by the application.
    pub original_request: HttpRequest,
    /// The request as forwarded, after any rewrite or cookie stripping.
    pub request: HttpRequest,
    /// Absent when the exchange ended in a transport-level failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<HttpResponse>,
    pub is_stubbed: bool,
    pub is_rewritten: bool,
}

impl MonitoredNetworkRequest {
    /// Post-hoc evaluation against a compiled match: request side against the
    /// original request, response-header conditions against the captured
    /// response.
    pub fn matches(&self, spec: &CompiledRequestMatch) -> bool {
        spec.matches_request(&self.original_request)
            && spec.matches_response_headers(self.response.as_ref().map(|r| &r.headers))
    }
}

/// Append-only log of monitored exchanges.
///
/// Appends race with flushes from the command channel; both are serialized
/// through one mutex so a flush never loses an in-flight append nor delivers
/// an entry twice.
#[derive(Default)]
pub struct MonitorLog {
    entries: Mutex<Vec<MonitoredNetworkRequest>>,
}

impl MonitorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, entry: MonitoredNetworkRequest) {
        self.entries.lock().push(entry);
    }

    /// Snapshot copy, leaving the log intact.
    pub fn peek_all(&self) -> Vec<MonitoredNetworkRequest> {
        self.entries.lock().clone()
    }

    /// Atomically take every entry, leaving the log empty.
    pub fn flush_all(&self) -> Vec<MonitoredNetworkRequest> {
        let flushed = std::mem::take(&mut *self.entries.lock());
        debug!(count = flushed.len(), "monitor log flushed");
        flushed
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Block (poll at a bounded interval) until at least `iterations` logged
    /// entries match `spec`, or until `timeout` elapses. Returns whether the
    /// wait was satisfied - a timed-out wait is `false`, never an error.
    pub async fn wait_for_match(
        &self,
        spec: &CompiledRequestMatch,
        timeout: Duration,
        iterations: u64,
    ) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let matched = self
                .entries
                .lock()
                .iter()
                .filter(|e| e.matches(spec))
                .count() as u64;
            if matched >= iterations.max(1) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                debug!(matched, iterations, "wait for monitored requests timed out");
                return false;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}
