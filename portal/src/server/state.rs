//! Application state for the portal HTTP server.

use crate::app::PortalServices;
use records_runtime::metrics::MetricsRecorder;

/// State shared by every handler.
///
/// Cloned per request; every field is reference counted.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Portal services over the shared entity store
    pub services: PortalServices,
    /// Prometheus recorder, when metrics are installed
    pub metrics: Option<MetricsRecorder>,
}

impl AppState {
    /// State without a metrics endpoint
    #[must_use]
    pub const fn new(services: PortalServices) -> Self {
        Self {
            services,
            metrics: None,
        }
    }

    /// Serve `recorder` on `/metrics`
    #[must_use]
    pub fn with_metrics(mut self, recorder: MetricsRecorder) -> Self {
        self.metrics = Some(recorder);
        self
    }
}
