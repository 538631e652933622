//! Metrics instrumentation for tinytld.
//!
//! All metrics are prefixed with `tinytld.`

use metrics::{counter, gauge, histogram};
use std::time::Instant;

/// Record a DNS query.
pub fn record_query(class: QueryKind, result: QueryResult, duration: std::time::Duration) {
    let result_str = match result {
        QueryResult::Answered => "answered",
        QueryResult::Empty => "empty",
        QueryResult::Registered => "registered",
    };

    counter!("tinytld.query.count", "class" => class.as_str(), "result" => result_str)
        .increment(1);
    histogram!("tinytld.query.duration.seconds", "class" => class.as_str())
        .record(duration.as_secs_f64());
}

/// Which resolver class a query fell into.
#[derive(Debug, Clone, Copy)]
pub enum QueryKind {
    /// `<host>.<marker>.<tld>`
    Registration,
    /// `<host>.<tld>`
    Lookup,
    /// Anything else.
    Other,
}

impl QueryKind {
    fn as_str(self) -> &'static str {
        match self {
            QueryKind::Registration => "registration",
            QueryKind::Lookup => "lookup",
            QueryKind::Other => "other",
        }
    }
}

/// Query result type for metrics.
#[derive(Debug, Clone, Copy)]
pub enum QueryResult {
    /// An address record was returned.
    Answered,
    /// The reply carried no records.
    Empty,
    /// A registration was recorded.
    Registered,
}

/// Record a registration by the front end that received it.
pub fn record_registration(source: RegistrationSource) {
    let source_str = match source {
        RegistrationSource::Dns => "dns",
        RegistrationSource::Http => "http",
    };

    counter!("tinytld.registration.count", "source" => source_str).increment(1);
}

/// Front ends that can register hosts.
#[derive(Debug, Clone, Copy)]
pub enum RegistrationSource {
    /// Registration query.
    Dns,
    /// Registration form.
    Http,
}

/// Record a registration that fell back to the sentinel address.
pub fn record_sentinel_fallback() {
    counter!("tinytld.registration.sentinel.count").increment(1);
}

/// Record a hosts file operation.
pub fn record_store_op(op: StoreOp, result: StoreResult) {
    let op_str = match op {
        StoreOp::Load => "load",
        StoreOp::Save => "save",
    };
    let result_str = match result {
        StoreResult::Success => "success",
        StoreResult::Error => "error",
    };

    counter!("tinytld.store.op.count", "op" => op_str, "result" => result_str).increment(1);
}

/// Hosts file operations.
#[derive(Debug, Clone, Copy)]
pub enum StoreOp {
    /// Read at startup.
    Load,
    /// Write-through or final flush.
    Save,
}

/// Hosts file operation outcome.
#[derive(Debug, Clone, Copy)]
pub enum StoreResult {
    /// Completed.
    Success,
    /// Failed and was logged.
    Error,
}

/// Record the number of registered hosts.
pub fn record_registry_size(hosts: usize) {
    gauge!("tinytld.registry.hosts.count").set(hosts as f64);
}

/// Helper for timing operations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration since timer start.
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}
