use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use crate::clock::Clock;

pub const DEFAULT_FAILURE_RATE: f64 = 0.7;
const RECENT_LOGS: usize = 10;

// Errors the unreliable endpoint picks from when it fails
pub const SIMULATED_FAILURES: [(u16, &str); 4] = [
    (500, "Internal Server Error"),
    (503, "Service Unavailable"),
    (429, "Too Many Requests"),
    (408, "Request Timeout"),
];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryLog {
    pub timestamp: DateTime<Utc>,
    pub attempt: u32,
    pub request_id: String,
    pub status: u16,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    Success { total_requests: u64 },
    Failure { status: u16, message: &'static str },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryStats {
    pub total_requests: usize,
    pub successful: usize,
    pub failed: usize,
    pub success_rate: f64,
    pub recent_logs: Vec<RetryLog>,
}

/// Endpoint that fails on purpose so clients can practise retrying.
pub struct UnreliableApi {
    request_count: AtomicU64,
    logs: Mutex<Vec<RetryLog>>,
    clock: Arc<dyn Clock>,
}

impl UnreliableApi {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            request_count: AtomicU64::new(0),
            logs: Mutex::new(Vec::new()),
            clock,
        }
    }

    pub fn call(&self, attempt: u32, failure_rate: f64, request_id: Option<String>) -> CallOutcome {
        self.call_with(&mut rand::thread_rng(), attempt, failure_rate, request_id)
    }

    pub fn call_with<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        attempt: u32,
        failure_rate: f64,
        request_id: Option<String>,
    ) -> CallOutcome {
        let total_requests = self.request_count.fetch_add(1, Ordering::Relaxed) + 1;
        let now = self.clock.now();
        let request_id =
            request_id.unwrap_or_else(|| format!("req-{}", now.timestamp_millis()));

        let failure_rate = if failure_rate.is_finite() {
            failure_rate.clamp(0.0, 1.0)
        } else {
            DEFAULT_FAILURE_RATE
        };

        let outcome = if rng.r#gen::<f64>() < failure_rate {
            let (status, message) = SIMULATED_FAILURES[rng.gen_range(0..SIMULATED_FAILURES.len())];
            CallOutcome::Failure { status, message }
        } else {
            CallOutcome::Success { total_requests }
        };

        let (status, success, error) = match &outcome {
            CallOutcome::Success { .. } => (200, true, None),
            CallOutcome::Failure { status, message } => (*status, false, Some(message.to_string())),
        };

        self.logs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RetryLog {
                timestamp: now,
                attempt,
                request_id,
                status,
                success,
                error,
            });

        outcome
    }

    pub fn stats(&self) -> RetryStats {
        let logs = self.logs.lock().unwrap_or_else(|e| e.into_inner());
        let successful = logs.iter().filter(|log| log.success).count();
        let total = logs.len();
        let success_rate = if total > 0 {
            (successful as f64 / total as f64 * 10_000.0).round() / 100.0
        } else {
            0.0
        };

        RetryStats {
            total_requests: total,
            successful,
            failed: total - successful,
            success_rate,
            recent_logs: logs.iter().skip(total.saturating_sub(RECENT_LOGS)).cloned().collect(),
        }
    }

    pub fn reset(&self) {
        self.request_count.store(0, Ordering::Relaxed);
        self.logs.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}
