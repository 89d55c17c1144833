pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;
pub mod views;

use service_core::observability::MetricsHandle;
use services::context::ContextRegistry;
use std::sync::Arc;
use std::time::Duration;
use views::editor::EditorFields;

/// Shared application state: the client-context registry plus render settings.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ContextRegistry>,
    pub editor_fields: EditorFields,
    /// How long a gated request waits for the access gate to settle.
    pub gate_wait: Duration,
    pub metrics: MetricsHandle,
}

impl AppState {
    pub fn new(
        registry: Arc<ContextRegistry>,
        editor_fields: EditorFields,
        gate_wait: Duration,
        metrics: MetricsHandle,
    ) -> Self {
        Self {
            registry,
            editor_fields,
            gate_wait,
            metrics,
        }
    }
}
