pub mod logging;
pub mod metrics;
pub mod trace_context;

pub use logging::{TelemetryError, init_tracing};
pub use metrics::{MetricsHandle, install_metrics_recorder};
pub use trace_context::{
    REQUEST_ID_HEADER, TRACEPARENT_HEADER, TRACESTATE_HEADER, TracedClientExt, TracedRequest,
    current_request_id, inject_trace_context, outbound_headers, with_request_id,
};
