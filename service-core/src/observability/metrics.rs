//! Prometheus exposition for the `metrics` facade.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Cloneable handle used by the `/metrics` route to render the current snapshot.
#[derive(Clone)]
pub struct MetricsHandle(PrometheusHandle);

impl MetricsHandle {
    /// A handle backed by a recorder that is not installed globally.
    ///
    /// Facade macros do not reach it; it exists so routers can be built in tests.
    pub fn detached() -> Self {
        Self(PrometheusBuilder::new().build_recorder().handle())
    }

    pub fn render(&self) -> String {
        self.0.render()
    }
}

/// Install the process-wide Prometheus recorder.
///
/// Must be called at most once per process; later calls fail with `BuildError`.
pub fn install_metrics_recorder() -> Result<MetricsHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    Ok(MetricsHandle(handle))
}
