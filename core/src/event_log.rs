//! Durable event log abstraction.
//!
//! This module provides the [`EventLog`] trait for appending [`DomainEvent`]s to
//! named topics. The log is an external collaborator with at-least-once
//! delivery, ordered per partition key.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │ State machine   │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │  1. Persist to  │
//! │  document store │◄─── Source of truth
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ 2. Enqueue on   │
//! │ EventPublisher  │◄─── Fire-and-forget
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ 3. EventLog     │◄─── At-least-once, keyed
//! │    (Redpanda)   │
//! └─────────────────┘
//! ```
//!
//! Steps 1 and 2 are not transactional. A crash between them leaves the state
//! change without its event and nothing replays it.
//!
//! # Implementations
//!
//! - `RecordingEventLog` (in `rentwise-testing`) - records events, optional failure injection
//! - `RedpandaEventLog` (in `rentwise-redpanda`) - Kafka-compatible production log

use crate::event::{DomainEvent, Topic};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during event log operations.
#[derive(Error, Debug, Clone)]
pub enum EventLogError {
    /// Failed to connect to the broker
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to encode the event envelope
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// The broker did not acknowledge the event
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// A topic could not be created
    #[error("Provisioning failed for topic '{topic}': {reason}")]
    ProvisioningFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to subscribe to topics
    #[error("Subscription failed for topics {topics:?}: {reason}")]
    SubscriptionFailed {
        /// The topics that failed to subscribe
        topics: Vec<String>,
        /// The reason for failure
        reason: String,
    },

    /// A consumed message could not be decoded
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    /// Network or transport error
    #[error("Transport error: {0}")]
    TransportError(String),
}

/// Trait for durable event log implementations.
///
/// # Ordering
///
/// Implementations must route every event with the same [`DomainEvent::key`]
/// to the same partition, so consumers observe same-key events in the order
/// `publish` was called.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync`; the publisher worker owns an
/// `Arc<dyn EventLog>`.
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// to enable trait object usage (`Arc<dyn EventLog>`).
pub trait EventLog: Send + Sync {
    /// Append an event to its topic, keyed by the event's key.
    ///
    /// Resolves once the log has acknowledged (or rejected) the event.
    ///
    /// # Errors
    ///
    /// Returns [`EventLogError::PublishFailed`] if the log rejects the event,
    /// [`EventLogError::SerializationFailed`] if it cannot be encoded.
    fn publish(
        &self,
        event: &DomainEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventLogError>> + Send + '_>>;

    /// Create any of `topics` that do not exist yet.
    ///
    /// Idempotent: topics that already exist are left as they are and are not
    /// an error.
    ///
    /// # Errors
    ///
    /// Returns [`EventLogError::ProvisioningFailed`] for the first topic that
    /// could not be created for any other reason.
    fn ensure_topics(
        &self,
        topics: &[Topic],
    ) -> Pin<Box<dyn Future<Output = Result<(), EventLogError>> + Send + '_>>;
}
