//! User-facing alerts and the request attempt counter.

use std::collections::HashMap;
use std::sync::Mutex;

/// Shows a message to the user. Implementations decide how (modal, toast, log line).
pub trait Notifier: Send + Sync {
    fn alert(&self, title: &str, message: &str);
}

/// Counts dispatch attempts. Fire-and-forget; never affects dispatch.
pub trait StatsCounter: Send + Sync {
    fn record_attempt(&self, request_id: &str);
}

/// Notifier for headless use: alerts become warnings in the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn alert(&self, title: &str, message: &str) {
        tracing::warn!(title, "{message}");
    }
}

/// In-memory attempt counter, per request.
#[derive(Debug, Default)]
pub struct RequestStats {
    attempts: Mutex<HashMap<String, u64>>,
}

impl RequestStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self, request_id: &str) -> u64 {
        let attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        attempts.get(request_id).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        let attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        attempts.values().sum()
    }
}

impl StatsCounter for RequestStats {
    fn record_attempt(&self, request_id: &str) {
        let mut attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        *attempts.entry(request_id.to_string()).or_insert(0) += 1;
    }
}
