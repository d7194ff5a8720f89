//! Recording event log.
//!
//! [`RecordingEventLog`] keeps every published [`DomainEvent`] in publish
//! order and can be told to reject publishes, standing in for a broker in
//! tests.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use rentwise_core::event::{DomainEvent, EventType, Topic};
use rentwise_core::event_log::{EventLog, EventLogError};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// An [`EventLog`] that records instead of publishing.
#[derive(Debug, Clone, Default)]
pub struct RecordingEventLog {
    events: Arc<Mutex<Vec<DomainEvent>>>,
    topics: Arc<Mutex<Vec<Topic>>>,
    fail_publishes: Arc<AtomicBool>,
    published: Arc<Notify>,
}

impl RecordingEventLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every subsequent publish with [`EventLogError::PublishFailed`].
    pub fn fail_publishes(&self, fail: bool) {
        self.fail_publishes.store(fail, Ordering::SeqCst);
    }

    /// All recorded events, in publish order.
    #[must_use]
    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Recorded events for one partition key, in publish order.
    #[must_use]
    pub fn events_for_key(&self, key: &str) -> Vec<DomainEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.key() == key)
            .cloned()
            .collect()
    }

    /// Event types recorded for one partition key, in publish order.
    #[must_use]
    pub fn event_types_for_key(&self, key: &str) -> Vec<EventType> {
        self.events_for_key(key)
            .iter()
            .map(DomainEvent::event_type)
            .collect()
    }

    /// Topics provisioned so far, without duplicates.
    #[must_use]
    pub fn provisioned_topics(&self) -> Vec<Topic> {
        self.topics.lock().unwrap().clone()
    }

    /// Wait until at least `count` events are recorded, or `timeout` elapses.
    ///
    /// Returns whether the count was reached.
    pub async fn wait_for_events(&self, count: usize, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.published.notified();
                if self.events.lock().unwrap().len() >= count {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }
}

impl EventLog for RecordingEventLog {
    fn publish(
        &self,
        event: &DomainEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventLogError>> + Send + '_>> {
        let event = event.clone();
        Box::pin(async move {
            if self.fail_publishes.load(Ordering::SeqCst) {
                return Err(EventLogError::PublishFailed {
                    topic: event.topic().to_string(),
                    reason: "injected publish failure".to_string(),
                });
            }
            self.events.lock().unwrap().push(event);
            self.published.notify_waiters();
            Ok(())
        })
    }

    fn ensure_topics(
        &self,
        topics: &[Topic],
    ) -> Pin<Box<dyn Future<Output = Result<(), EventLogError>> + Send + '_>> {
        let topics = topics.to_vec();
        Box::pin(async move {
            let mut known = self.topics.lock().unwrap();
            for topic in topics {
                if !known.contains(&topic) {
                    known.push(topic);
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::Value;

    fn event(key: &str) -> DomainEvent {
        DomainEvent::new(
            Topic::Rental,
            EventType::RentalDeleted,
            key,
            Value::Null,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn records_in_publish_order() {
        let log = RecordingEventLog::new();
        log.publish(&event("R1")).await.unwrap();
        log.publish(&event("R2")).await.unwrap();
        log.publish(&event("R1")).await.unwrap();
        assert_eq!(log.events().len(), 3);
        assert_eq!(log.events_for_key("R1").len(), 2);
    }

    #[tokio::test]
    async fn injected_failures_record_nothing() {
        let log = RecordingEventLog::new();
        log.fail_publishes(true);
        assert!(log.publish(&event("R1")).await.is_err());
        assert!(log.events().is_empty());
    }

    #[tokio::test]
    async fn provisioning_is_idempotent() {
        let log = RecordingEventLog::new();
        log.ensure_topics(&Topic::ALL).await.unwrap();
        log.ensure_topics(&[Topic::Rental]).await.unwrap();
        assert_eq!(log.provisioned_topics(), Topic::ALL.to_vec());
    }

    #[tokio::test]
    async fn wait_for_events_times_out() {
        let log = RecordingEventLog::new();
        assert!(!log.wait_for_events(1, Duration::from_millis(20)).await);
        log.publish(&event("R1")).await.unwrap();
        assert!(log.wait_for_events(1, Duration::from_millis(20)).await);
    }
}
