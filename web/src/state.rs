//! Application state for Axum handlers.

use crate::auth::TokenService;
use metrics_exporter_prometheus::PrometheusHandle;
use rentwise_core::UserRecord;
use rentwise_core::store::DocumentStore;
use rentwise_runtime::Coordinator;
use std::sync::Arc;

/// Application state shared across all HTTP handlers.
///
/// Cheap to clone; every field is a shared handle.
#[derive(Clone)]
pub struct AppState {
    /// The rental lifecycle coordinator.
    pub coordinator: Coordinator,
    /// User lookups for login and websocket sessions.
    pub users: Arc<dyn DocumentStore<UserRecord>>,
    /// Bearer token table.
    pub tokens: Arc<TokenService>,
    /// Prometheus renderer, when metrics are enabled.
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Assemble the state.
    #[must_use]
    pub fn new(
        coordinator: Coordinator,
        users: Arc<dyn DocumentStore<UserRecord>>,
        tokens: Arc<TokenService>,
    ) -> Self {
        Self {
            coordinator,
            users,
            tokens,
            metrics: None,
        }
    }

    /// Serve `GET /metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_is_clone() {
        // Axum requires Clone state
        fn assert_clone<T: Clone + Send + Sync>() {}
        assert_clone::<AppState>();
    }
}
