//! Prometheus metrics for the coordinator.
//!
//! This module describes and records every coordinator metric:
//! - Rental transitions and rejections
//! - Notification deliveries and failures
//! - Event publishes and publish failures
//! - Inconsistency faults
//! - Live websocket connections
//!
//! # Example
//!
//! ```rust,no_run
//! use rentwise_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new();
//! server.start()?;
//!
//! // Serve `server.render()` from `GET /metrics`
//! # Ok(())
//! # }
//! ```

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use rentwise_core::{ErrorKind, RentalStatus, Topic};
use thiserror::Error;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus recorder whose output is served by the HTTP layer.
#[derive(Default)]
pub struct MetricsServer {
    handle: Option<PrometheusHandle>,
}

impl std::fmt::Debug for MetricsServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsServer")
            .field("installed", &self.handle.is_some())
            .finish()
    }
}

impl MetricsServer {
    /// Create an unstarted server.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Describe all metrics and install the global Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Install`] if the recorder cannot be installed
    /// for a reason other than one already being present.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g., in tests) this logs a warning
    /// and succeeds without a handle; [`MetricsServer::render`] then returns
    /// `None`.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!("Metrics recorder installed");
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus text format.
    ///
    /// Returns `None` if the recorder hasn't been installed by this server.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    describe_counter!(
        "rental_transitions_total",
        "Committed rental status changes, labelled by target status"
    );
    describe_counter!(
        "rental_rejections_total",
        "Rejected rental operations, labelled by error kind"
    );
    describe_counter!(
        "notifications_delivered_total",
        "Notifications accepted by a live connection"
    );
    describe_counter!(
        "notifications_failed_total",
        "Notifications dropped because a connection was slow or closed"
    );
    describe_counter!(
        "events_published_total",
        "Domain events acknowledged by the event log, labelled by topic"
    );
    describe_counter!(
        "events_publish_failed_total",
        "Domain events dropped or rejected, labelled by topic"
    );
    describe_counter!(
        "inconsistency_faults_total",
        "Vehicle availability writes that failed after the rental committed"
    );
    describe_gauge!("ws_connections_active", "Registered websocket connections");
}

/// Rental state machine metrics recorder.
pub struct RentalMetrics;

impl RentalMetrics {
    /// Record a committed transition into `to`.
    pub fn record_transition(to: RentalStatus) {
        counter!("rental_transitions_total", "to" => to.as_str()).increment(1);
    }

    /// Record a rejected operation.
    pub fn record_rejection(kind: ErrorKind) {
        counter!("rental_rejections_total", "kind" => kind.code()).increment(1);
    }

    /// Record an inconsistency fault.
    pub fn record_inconsistency() {
        counter!("inconsistency_faults_total").increment(1);
    }
}

/// Notification fan-out metrics recorder.
pub struct NotificationMetrics;

impl NotificationMetrics {
    /// Record `count` successful deliveries.
    pub fn record_delivered(count: usize) {
        counter!("notifications_delivered_total").increment(count as u64);
    }

    /// Record `count` failed deliveries.
    pub fn record_failed(count: usize) {
        counter!("notifications_failed_total").increment(count as u64);
    }

    /// Set the number of registered connections.
    #[allow(clippy::cast_precision_loss)] // Connection counts stay far below 2^52
    pub fn set_active_connections(count: usize) {
        gauge!("ws_connections_active").set(count as f64);
    }
}

/// Event publisher metrics recorder.
pub struct PublisherMetrics;

impl PublisherMetrics {
    /// Record an acknowledged publish.
    pub fn record_published(topic: Topic) {
        counter!("events_published_total", "topic" => topic.name()).increment(1);
    }

    /// Record a dropped or rejected publish.
    pub fn record_failed(topic: Topic) {
        counter!("events_publish_failed_total", "topic" => topic.name()).increment(1);
    }
}
