//! Integration tests for [`RedpandaEventLog`] against a real Kafka broker.
//!
//! Marked `#[ignore]`: they need Docker and take tens of seconds to start
//! the broker.
//!
//! ```bash
//! cargo test -p rentwise-redpanda --test integration_tests -- --ignored
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use chrono::Utc;
use futures::StreamExt;
use rentwise_core::event_log::EventLog;
use rentwise_core::{DomainEvent, EventType, Topic};
use rentwise_redpanda::{EventStream, RedpandaEventLog};
use serde_json::json;
use std::time::Duration;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::kafka::{KAFKA_PORT, Kafka};

// ============================================================================
// Setup
// ============================================================================

async fn start_broker() -> (ContainerAsync<Kafka>, String) {
    let kafka = Kafka::default()
        .with_env_var("KAFKA_AUTO_CREATE_TOPICS_ENABLE", "false")
        .start()
        .await
        .expect("Failed to start Kafka container");
    let host = kafka.get_host().await.expect("Failed to get host");
    let port = kafka
        .get_host_port_ipv4(KAFKA_PORT)
        .await
        .expect("Failed to get port");
    (kafka, format!("{host}:{port}"))
}

/// Build a log and retry topic creation until the broker answers.
async fn ready_log(brokers: &str, group: &str) -> RedpandaEventLog {
    let log = RedpandaEventLog::builder()
        .brokers(brokers)
        .consumer_group(group)
        .auto_offset_reset("earliest")
        .build()
        .expect("Failed to build event log");

    for attempt in 1..=60 {
        if log.ensure_topics(&Topic::ALL).await.is_ok() {
            return log;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(attempt != 60, "Broker never became ready");
    }
    log
}

fn rental_event(event_type: EventType, rental_id: &str) -> DomainEvent {
    DomainEvent::new(
        Topic::Rental,
        event_type,
        rental_id,
        json!({"vehicle_id": "V1"}),
        Utc::now(),
    )
}

async fn take(stream: &mut EventStream, count: usize) -> Vec<DomainEvent> {
    let mut received = Vec::new();
    tokio::time::timeout(Duration::from_secs(30), async {
        while received.len() < count {
            match stream.next().await {
                Some(event) => received.push(event.expect("Failed to decode event")),
                None => break,
            }
        }
    })
    .await
    .expect("Timed out waiting for events");
    received
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_published_events_reach_subscribers() {
    let (_kafka, brokers) = start_broker().await;
    let log = ready_log(&brokers, "round-trip").await;

    let created = rental_event(EventType::RentalCreated, "R1");
    log.publish(&created).await.expect("Failed to publish");
    let mut stream = log.subscribe(&[Topic::Rental]).expect("Failed to subscribe");

    let received = take(&mut stream, 1).await;
    assert_eq!(received[0].topic(), Topic::Rental);
    assert_eq!(received[0].event_type(), EventType::RentalCreated);
    assert_eq!(received[0].key(), "R1");
    assert_eq!(received[0].data()["vehicle_id"], "V1");
    assert_eq!(received[0].data()["id"], "R1");
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_events_for_one_key_stay_ordered() {
    let (_kafka, brokers) = start_broker().await;
    let log = ready_log(&brokers, "ordering").await;

    let lifecycle = [
        EventType::RentalCreated,
        EventType::RentalApproved,
        EventType::RentalCompleted,
    ];
    for event_type in lifecycle {
        log.publish(&rental_event(event_type, "R7")).await.unwrap();
    }
    let mut stream = log.subscribe(&[Topic::Rental]).unwrap();

    let received: Vec<EventType> = take(&mut stream, 3)
        .await
        .iter()
        .map(DomainEvent::event_type)
        .collect();
    assert_eq!(received, lifecycle);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_subscription_filters_by_topic() {
    let (_kafka, brokers) = start_broker().await;
    let log = ready_log(&brokers, "filtering").await;

    let vehicle = DomainEvent::new(
        Topic::Vehicle,
        EventType::VehicleUpdated,
        "V1",
        json!({"updated_fields": {"location": "Airport"}}),
        Utc::now(),
    );
    log.publish(&vehicle).await.unwrap();
    log.publish(&rental_event(EventType::RentalRejected, "R2"))
        .await
        .unwrap();
    let mut stream = log.subscribe(&[Topic::Vehicle]).unwrap();

    let received = take(&mut stream, 1).await;
    assert_eq!(received[0].event_type(), EventType::VehicleUpdated);
    assert_eq!(received[0].data()["updated_fields"]["location"], "Airport");
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_ensure_topics_is_idempotent() {
    let (_kafka, brokers) = start_broker().await;
    let log = ready_log(&brokers, "idempotent").await;

    log.ensure_topics(&Topic::ALL)
        .await
        .expect("Existing topics must not be an error");
}
