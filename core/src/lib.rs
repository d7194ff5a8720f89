//! # Rentwise Core
//!
//! Domain records, domain events and collaborator traits for the Rentwise
//! rental lifecycle coordinator.
//!
//! This crate performs no I/O. It defines:
//!
//! - **Records**: users, vehicles, branches and rentals as they live in the
//!   document store ([`model`])
//! - **Status graphs**: the rental transition graph and vehicle availability
//!   states ([`model::RentalStatus`], [`model::AvailabilityStatus`])
//! - **Domain events**: immutable facts emitted to the durable event log
//!   ([`event`])
//! - **Collaborators**: the [`store::DocumentStore`] and
//!   [`event_log::EventLog`] traits implemented by the adapter crates
//! - **Partial updates**: compile-time field whitelists ([`patch`])
//! - **Errors**: the caller-visible error taxonomy and the log-only side-effect
//!   faults ([`error`])
//! - **Notifications**: outbound real-time messages ([`notification`])
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────┐
//! │  rentwise-web (axum shell)   │
//! └──────────────┬───────────────┘
//!                │
//!                ▼
//! ┌──────────────────────────────┐
//! │ rentwise-runtime             │
//! │  RentalStateMachine          │
//! │   ├─ AvailabilitySynchronizer│
//! │   ├─ Notifier ── Registry    │
//! │   └─ EventPublisher          │
//! └──────┬───────────────┬───────┘
//!        │               │
//!        ▼               ▼
//!  DocumentStore      EventLog
//!  (postgres/memory)  (redpanda/memory)
//! ```

pub mod error;
pub mod event;
pub mod event_log;
pub mod ids;
pub mod model;
pub mod notification;
pub mod patch;
pub mod store;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use error::{ErrorKind, RentalError, StoreError};
pub use event::{DomainEvent, EventType, Topic};
pub use ids::{BranchId, RentalId, UserId, VehicleId};
pub use model::{
    AvailabilityStatus, BranchRecord, Identity, RentalRecord, RentalStatus, UserRecord, UserRole,
    VehicleRecord,
};
pub use notification::Notification;

/// Environment module - injected dependencies that are not collaborators.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// Event timestamps and notification timestamps are read from a `Clock` so
    /// tests can pin them.
    ///
    /// # Examples
    ///
    /// ```
    /// use rentwise_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let first = clock.now();
    /// assert!(clock.now() >= first);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by [`Utc::now`].
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
