//! Domain counters recorded through the `metrics` facade.
//!
//! HTTP request metrics come from `service_core::middleware::metrics_middleware`;
//! everything here is specific to sessions, approval and backend calls.

use metrics::counter;

pub fn record_auth_event(event: &'static str) {
    counter!("auth_events_total", "event" => event).increment(1);
}

/// `outcome` is one of `approved`, `pending`, `failed`, `stale`.
pub fn record_approval_check(outcome: &'static str) {
    counter!("approval_checks_total", "outcome" => outcome).increment(1);
}

pub fn record_backend_call(operation: &'static str, success: bool) {
    let outcome = if success { "ok" } else { "error" };
    counter!(
        "backend_requests_total",
        "operation" => operation,
        "outcome" => outcome
    )
    .increment(1);
}

pub fn set_active_contexts(count: usize) {
    metrics::gauge!("client_contexts_active").set(count as f64);
}
