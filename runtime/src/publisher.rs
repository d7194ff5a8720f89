//! Event publisher.
//!
//! Wraps payloads into [`DomainEvent`]s and hands them to a single background
//! worker through a bounded queue. The worker submits to the [`EventLog`] in
//! enqueue order, so events sharing a key reach the log in emission order.
//!
//! Callers never wait for the log. A full or closed queue drops the event and
//! is logged as a [`DeliveryFailure`]; a log rejection is logged by the worker.
//! Nothing is retried.
//!
//! # Example
//!
//! ```ignore
//! let publisher = EventPublisher::spawn(log, clock, 1024);
//! publisher.publish(EventType::RentalDeleted, "R1", serde_json::Value::Null);
//! publisher.shutdown().await;
//! ```

use crate::metrics::PublisherMetrics;
use rentwise_core::environment::Clock;
use rentwise_core::error::DeliveryFailure;
use rentwise_core::event::{DomainEvent, EventType};
use rentwise_core::event_log::EventLog;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;

enum Command {
    Publish(DomainEvent),
    Flush(oneshot::Sender<()>),
    Shutdown,
}

/// Fire-and-forget publisher backed by one ordered worker task.
pub struct EventPublisher {
    sender: mpsc::Sender<Command>,
    clock: Arc<dyn Clock>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPublisher")
            .field("capacity", &self.sender.max_capacity())
            .field("closed", &self.sender.is_closed())
            .finish_non_exhaustive()
    }
}

impl EventPublisher {
    /// Start the worker. Must be called within a Tokio runtime.
    #[must_use]
    pub fn spawn(log: Arc<dyn EventLog>, clock: Arc<dyn Clock>, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(run_worker(log, receiver));
        Self {
            sender,
            clock,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Build an event stamped with the current time and enqueue it.
    ///
    /// The topic is the one `event_type` belongs to; `fields` is merged into
    /// the payload next to `"id": key`. Failures are logged and counted, never
    /// returned.
    pub fn publish(&self, event_type: EventType, key: impl Into<String>, fields: Value) {
        let event = DomainEvent::new(event_type.topic(), event_type, key, fields, self.clock.now());
        if let Err(failure) = self.enqueue(event) {
            tracing::error!(event_type = %event_type, reason = %failure, "Event dropped");
        }
    }

    /// Enqueue a prebuilt event without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryFailure::QueueFull`] or
    /// [`DeliveryFailure::PublisherStopped`]; the event is dropped either way.
    pub fn enqueue(&self, event: DomainEvent) -> Result<(), DeliveryFailure> {
        let topic = event.topic();
        match self.sender.try_send(Command::Publish(event)) {
            Ok(()) => Ok(()),
            Err(err) => {
                PublisherMetrics::record_failed(topic);
                let (stopped, command) = match err {
                    TrySendError::Full(command) => (false, command),
                    TrySendError::Closed(command) => (true, command),
                };
                let (event_type, key) = match command {
                    Command::Publish(event) => (event.event_type().to_string(), event.key().to_string()),
                    Command::Flush(_) | Command::Shutdown => (String::new(), String::new()),
                };
                Err(if stopped {
                    DeliveryFailure::PublisherStopped { event_type, key }
                } else {
                    DeliveryFailure::QueueFull { event_type, key }
                })
            },
        }
    }

    /// Wait until every event enqueued before this call has been submitted.
    ///
    /// Returns immediately once the publisher has shut down.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.sender.send(Command::Flush(done)).await.is_ok() {
            let _ = wait.await;
        }
    }

    /// Submit everything already enqueued, then stop the worker.
    ///
    /// Later `publish` calls are dropped as [`DeliveryFailure::PublisherStopped`].
    /// Idempotent.
    pub async fn shutdown(&self) {
        let _ = self.sender.send(Command::Shutdown).await;
        if let Some(worker) = self.worker.lock().await.take() {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "Event publisher worker panicked");
            }
            tracing::info!("Event publisher stopped");
        }
    }
}

async fn run_worker(log: Arc<dyn EventLog>, mut receiver: mpsc::Receiver<Command>) {
    while let Some(command) = receiver.recv().await {
        match command {
            Command::Publish(event) => submit(log.as_ref(), &event).await,
            Command::Flush(done) => {
                let _ = done.send(());
            },
            Command::Shutdown => break,
        }
    }
}

async fn submit(log: &dyn EventLog, event: &DomainEvent) {
    match log.publish(event).await {
        Ok(()) => {
            PublisherMetrics::record_published(event.topic());
            tracing::debug!(
                topic = %event.topic(),
                event_type = %event.event_type(),
                key = event.key(),
                "Event published"
            );
        },
        Err(e) => {
            PublisherMetrics::record_failed(event.topic());
            let failure = DeliveryFailure::Rejected {
                event_type: event.event_type().to_string(),
                key: event.key().to_string(),
                reason: e.to_string(),
            };
            tracing::error!(
                topic = %event.topic(),
                event_type = %event.event_type(),
                key = event.key(),
                reason = %failure,
                "Event publish failed"
            );
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use rentwise_core::Topic;
    use rentwise_testing::{RecordingEventLog, test_clock};
    use serde_json::json;

    fn publisher(log: &RecordingEventLog, capacity: usize) -> EventPublisher {
        EventPublisher::spawn(Arc::new(log.clone()), Arc::new(test_clock()), capacity)
    }

    #[tokio::test]
    async fn preserves_enqueue_order_per_key() {
        let log = RecordingEventLog::new();
        let publisher = publisher(&log, 16);

        publisher.publish(EventType::RentalCreated, "R1", json!({"rental_data": {}}));
        publisher.publish(EventType::RentalApproved, "R1", json!({"new_status": "APPROVED"}));
        publisher.publish(EventType::RentalCompleted, "R1", json!({"new_status": "COMPLETED"}));
        publisher.flush().await;

        assert_eq!(
            log.event_types_for_key("R1"),
            [
                EventType::RentalCreated,
                EventType::RentalApproved,
                EventType::RentalCompleted
            ]
        );
    }

    #[tokio::test]
    async fn events_carry_clock_time_and_topic() {
        let log = RecordingEventLog::new();
        let publisher = publisher(&log, 4);

        publisher.publish(EventType::VehicleStatusChanged, "V1", json!({"status": "RENTED"}));
        publisher.flush().await;

        let events = log.events();
        assert_eq!(events[0].topic(), Topic::Vehicle);
        assert_eq!(events[0].timestamp(), test_clock().now());
        assert_eq!(events[0].data(), &json!({"id": "V1", "status": "RENTED"}));
    }

    #[tokio::test]
    async fn log_rejections_are_swallowed() {
        let log = RecordingEventLog::new();
        log.fail_publishes(true);
        let publisher = publisher(&log, 4);

        publisher.publish(EventType::RentalDeleted, "R1", Value::Null);
        publisher.flush().await;

        assert!(log.events().is_empty());
    }

    #[tokio::test]
    async fn enqueue_after_shutdown_is_stopped() {
        let log = RecordingEventLog::new();
        let publisher = publisher(&log, 4);
        publisher.publish(EventType::RentalDeleted, "R1", Value::Null);
        publisher.shutdown().await;
        publisher.shutdown().await;

        assert_eq!(log.events().len(), 1);
        let late = DomainEvent::new(
            Topic::Rental,
            EventType::RentalDeleted,
            "R2",
            Value::Null,
            test_clock().now(),
        );
        assert!(matches!(
            publisher.enqueue(late),
            Err(DeliveryFailure::PublisherStopped { .. })
        ));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn full_queue_drops_event() {
        let log = RecordingEventLog::new();
        let publisher = publisher(&log, 1);
        let event = |key: &str| {
            DomainEvent::new(Topic::Rental, EventType::RentalDeleted, key, Value::Null, test_clock().now())
        };

        // The worker cannot run until this task yields, so the second send
        // finds the single slot taken.
        assert!(publisher.enqueue(event("R1")).is_ok());
        assert!(matches!(
            publisher.enqueue(event("R2")),
            Err(DeliveryFailure::QueueFull { .. })
        ));
        publisher.flush().await;
        assert_eq!(log.events().len(), 1);
    }
}
