//! # Rentwise Runtime
//!
//! The rental lifecycle coordinator.
//!
//! ## Core Components
//!
//! - **Rental State Machine** ([`machine`]): validates and commits rental
//!   transitions, then triggers the side effects below
//! - **Availability Synchronizer**: the only rental-driven writer of vehicle
//!   availability; reachable only through the state machine
//! - **Connection Registry** ([`registry`]) and **Role Cache** ([`role_cache`]):
//!   the process's only shared mutable state
//! - **Notification Fan-out** ([`notify`]): bounded, concurrent, best-effort
//!   delivery to live connections
//! - **Event Publisher** ([`publisher`]): ordered, fire-and-forget submission to
//!   the durable event log
//! - **Vehicle Catalog** ([`catalog`]): vehicle search and whitelisted edits,
//!   serialized with approvals on the vehicle id
//!
//! ## Example
//!
//! ```ignore
//! use rentwise_runtime::{Coordinator, CoordinatorConfig, Stores};
//!
//! let coordinator = Coordinator::new(stores, event_log, clock, CoordinatorConfig::default());
//! let rental = coordinator.machine().create_rental(request).await?;
//! coordinator.machine().transition_status(&rental.rental_id, RentalStatus::Approved).await?;
//! coordinator.shutdown().await;
//! ```

use crate::locks::KeyedLocks;
use rentwise_core::environment::Clock;
use rentwise_core::event_log::EventLog;
use rentwise_core::store::DocumentStore;
use rentwise_core::{RentalRecord, UserRecord, VehicleRecord};
use std::sync::Arc;
use std::time::Duration;

pub mod catalog;
pub mod locks;
pub mod machine;
/// Prometheus metrics for observability
pub mod metrics;
pub mod notify;
pub mod publisher;
pub mod registry;
pub mod role_cache;
mod sync;

pub use catalog::VehicleCatalog;
pub use machine::{NewRental, RentalStateMachine};
pub use metrics::MetricsServer;
pub use notify::{DeliveryReport, Notifier};
pub use publisher::EventPublisher;
pub use registry::{ConnectionHandle, ConnectionRegistry};

/// Configuration for a [`Coordinator`].
///
/// # Example
///
/// ```
/// use rentwise_runtime::CoordinatorConfig;
/// use std::time::Duration;
///
/// let config = CoordinatorConfig::default()
///     .with_notify_timeout(Duration::from_millis(500))
///     .with_publish_queue_capacity(4096);
/// assert_eq!(config.connection_buffer, 64);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Per-recipient bound on one notification send
    pub notify_timeout: Duration,
    /// Outbound messages that may queue per connection
    pub connection_buffer: usize,
    /// Events that may wait for the publisher worker
    pub publish_queue_capacity: usize,
}

impl CoordinatorConfig {
    /// Set the per-recipient notification timeout
    #[must_use]
    pub const fn with_notify_timeout(mut self, timeout: Duration) -> Self {
        self.notify_timeout = timeout;
        self
    }

    /// Set the per-connection outbound buffer
    #[must_use]
    pub const fn with_connection_buffer(mut self, buffer: usize) -> Self {
        self.connection_buffer = buffer;
        self
    }

    /// Set the publisher queue capacity
    #[must_use]
    pub const fn with_publish_queue_capacity(mut self, capacity: usize) -> Self {
        self.publish_queue_capacity = capacity;
        self
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            notify_timeout: Duration::from_millis(2000),
            connection_buffer: 64,
            publish_queue_capacity: 1024,
        }
    }
}

/// The document store collections the coordinator reads and writes.
#[derive(Clone)]
pub struct Stores {
    /// `users`
    pub users: Arc<dyn DocumentStore<UserRecord>>,
    /// `vehicles`
    pub vehicles: Arc<dyn DocumentStore<VehicleRecord>>,
    /// `rentals`
    pub rentals: Arc<dyn DocumentStore<RentalRecord>>,
}

/// The wired-up coordinator. Cheap to clone.
#[derive(Clone)]
pub struct Coordinator {
    config: CoordinatorConfig,
    registry: Arc<ConnectionRegistry>,
    notifier: Notifier,
    publisher: Arc<EventPublisher>,
    machine: Arc<RentalStateMachine>,
    catalog: Arc<VehicleCatalog>,
}

impl Coordinator {
    /// Wire the components and start the publisher worker.
    ///
    /// Must be called within a Tokio runtime.
    #[must_use]
    pub fn new(
        stores: Stores,
        event_log: Arc<dyn EventLog>,
        clock: Arc<dyn Clock>,
        config: CoordinatorConfig,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let notifier = Notifier::new(Arc::clone(&registry), config.notify_timeout);
        let publisher = Arc::new(EventPublisher::spawn(
            event_log,
            Arc::clone(&clock),
            config.publish_queue_capacity,
        ));
        let vehicle_locks = Arc::new(KeyedLocks::new());
        let catalog = Arc::new(VehicleCatalog::new(
            Arc::clone(&stores.vehicles),
            Arc::clone(&publisher),
            notifier.clone(),
            Arc::clone(&vehicle_locks),
        ));
        let machine = Arc::new(RentalStateMachine::new(
            stores,
            notifier.clone(),
            Arc::clone(&publisher),
            clock,
            vehicle_locks,
        ));

        tracing::info!(
            notify_timeout_ms = config.notify_timeout.as_millis(),
            publish_queue_capacity = config.publish_queue_capacity,
            "Coordinator started"
        );
        Self {
            config,
            registry,
            notifier,
            publisher,
            machine,
            catalog,
        }
    }

    /// Configuration in effect.
    #[must_use]
    pub const fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// The rental state machine.
    #[must_use]
    pub fn machine(&self) -> &RentalStateMachine {
        &self.machine
    }

    /// The vehicle catalog.
    #[must_use]
    pub fn catalog(&self) -> &VehicleCatalog {
        &self.catalog
    }

    /// The connection registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// The notification fan-out.
    #[must_use]
    pub const fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// The event publisher.
    #[must_use]
    pub fn publisher(&self) -> &EventPublisher {
        &self.publisher
    }

    /// A fresh connection handle sized by the configured buffer, plus the
    /// receiver its session drains. Not yet registered.
    #[must_use]
    pub fn open_connection(
        &self,
    ) -> (ConnectionHandle, tokio::sync::mpsc::Receiver<rentwise_core::Notification>) {
        ConnectionHandle::channel(self.config.connection_buffer)
    }

    /// Drain and stop the publisher.
    pub async fn shutdown(&self) {
        self.publisher.shutdown().await;
        tracing::info!("Coordinator stopped");
    }
}
