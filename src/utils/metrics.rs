//! Observability and Metrics
//!
//! Counters for the client and dispatcher paths. All counters are atomics so
//! concurrent calls never contend on a lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// Global metrics collector for invocation traffic
#[derive(Debug)]
pub struct Metrics {
    /// Requests posted by the client
    pub requests_sent: AtomicU64,
    /// Requests that failed before a response arrived
    pub requests_failed: AtomicU64,
    /// Calls at or above the slow-call threshold
    pub slow_calls: AtomicU64,
    /// Total bytes sent
    pub bytes_sent: AtomicU64,
    /// Total bytes received
    pub bytes_received: AtomicU64,
    /// Requests executed by the dispatcher
    pub dispatched: AtomicU64,
    /// Privileged requests refused by an authorization check
    pub authorization_denials: AtomicU64,
    /// Handlers that returned an error
    pub handler_failures: AtomicU64,
    /// Payloads rejected by the codec
    pub protocol_errors: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            requests_sent: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            slow_calls: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            dispatched: AtomicU64::new(0),
            authorization_denials: AtomicU64::new(0),
            handler_failures: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a posted request and its body size
    pub fn request_sent(&self, byte_count: u64) {
        self.requests_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    /// Record a received response body
    pub fn response_received(&self, byte_count: u64) {
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn request_failed(&self) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn slow_call(&self) {
        self.slow_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dispatch(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn authorization_denied(&self) {
        self.authorization_denials.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handler_failure(&self) {
        self.handler_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_sent: self.requests_sent.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            slow_calls: self.slow_calls.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            authorization_denials: self.authorization_denials.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            requests_sent = snapshot.requests_sent,
            requests_failed = snapshot.requests_failed,
            slow_calls = snapshot.slow_calls,
            bytes_sent = snapshot.bytes_sent,
            bytes_received = snapshot.bytes_received,
            dispatched = snapshot.dispatched,
            authorization_denials = snapshot.authorization_denials,
            handler_failures = snapshot.handler_failures,
            protocol_errors = snapshot.protocol_errors,
            uptime_seconds = snapshot.uptime_seconds,
            "Invocation metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub requests_sent: u64,
    pub requests_failed: u64,
    pub slow_calls: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub dispatched: u64,
    pub authorization_denials: u64,
    pub handler_failures: u64,
    pub protocol_errors: u64,
    pub uptime_seconds: u64,
}

static METRICS: once_cell::sync::Lazy<Metrics> = once_cell::sync::Lazy::new(Metrics::new);

/// Get the global metrics instance
pub fn global_metrics() -> &'static Metrics {
    &METRICS
}

/// Timer for measuring operation duration
pub struct Timer {
    start: Instant,
    operation: &'static str,
}

impl Timer {
    /// Start timing an operation
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        debug!(
            operation = self.operation,
            duration_ms = duration.as_millis(),
            "Operation completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = Metrics::new();
        metrics.request_sent(120);
        metrics.request_sent(30);
        metrics.response_received(64);
        metrics.authorization_denied();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests_sent, 2);
        assert_eq!(snapshot.bytes_sent, 150);
        assert_eq!(snapshot.bytes_received, 64);
        assert_eq!(snapshot.authorization_denials, 1);
        assert_eq!(snapshot.handler_failures, 0);
    }
}
