//! Redpanda event log for Rentwise.
//!
//! This crate provides a Kafka-compatible implementation of the [`EventLog`]
//! trait from `rentwise-core`, built on rdkafka. It works against Redpanda,
//! Apache Kafka or any other broker speaking the Kafka protocol.
//!
//! # Wire Format
//!
//! Every event is one message on its topic (`vehicle_events`, `rental_events`,
//! `user_events` or `branch_events`):
//!
//! - **key**: the subject entity id, so one entity's events share a partition
//! - **payload**: the JSON envelope `{"timestamp", "event_type", "data"}`
//!
//! # Delivery Semantics
//!
//! **At-least-once**, ordered per key. [`EventLog::publish`] resolves once the
//! broker acknowledges (or rejects) the message. Consumers started through
//! [`RedpandaEventLog::subscribe`] commit offsets only after an event has been
//! handed to the stream, so a crash re-delivers rather than loses.
//!
//! # Example
//!
//! ```no_run
//! use rentwise_redpanda::RedpandaEventLog;
//! use rentwise_core::event_log::EventLog;
//! use rentwise_core::Topic;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let log = RedpandaEventLog::builder()
//!     .brokers("localhost:9092")
//!     .producer_acks("all")
//!     .build()?;
//!
//! log.ensure_topics(&Topic::ALL).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use futures::Stream;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::RDKafkaErrorCode;
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rentwise_core::event::{DomainEvent, EventEnvelope, Topic};
use rentwise_core::event_log::{EventLog, EventLogError};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Stream of decoded events from a subscription.
///
/// Undecodable messages surface as `Err` items; the stream keeps going.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<DomainEvent, EventLogError>> + Send>>;

/// Redpanda event log.
///
/// # Configuration
///
/// - **Broker addresses**: bootstrap servers (required)
/// - **Producer settings**: acks, compression, delivery timeout
/// - **Provisioning**: partitions and replication factor for new topics
/// - **Consumer settings**: group id, buffer size, offset reset policy
///
/// # Example
///
/// ```no_run
/// use rentwise_redpanda::RedpandaEventLog;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let log = RedpandaEventLog::builder()
///     .brokers("localhost:9092,localhost:9093")
///     .compression("lz4")
///     .timeout(Duration::from_secs(10))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct RedpandaEventLog {
    producer: FutureProducer,
    admin: AdminClient<DefaultClientContext>,
    brokers: String,
    timeout: Duration,
    partitions: i32,
    replication_factor: i32,
    consumer_group: Option<String>,
    buffer_size: usize,
    auto_offset_reset: String,
}

impl RedpandaEventLog {
    /// Create an event log with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EventLogError::ConnectionFailed`] if the clients cannot be
    /// created from the given broker list.
    pub fn new(brokers: &str) -> Result<Self, EventLogError> {
        Self::builder().brokers(brokers).build()
    }

    /// Create a new builder.
    #[must_use]
    pub fn builder() -> RedpandaEventLogBuilder {
        RedpandaEventLogBuilder::default()
    }

    /// The bootstrap broker list.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }

    /// Subscribe to `topics` and stream decoded events.
    ///
    /// The consumer runs on its own task until the stream is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`EventLogError::SubscriptionFailed`] if the consumer cannot be
    /// created or subscribed.
    pub fn subscribe(&self, topics: &[Topic]) -> Result<EventStream, EventLogError> {
        let names: Vec<String> = topics.iter().map(|t| t.name().to_string()).collect();
        let consumer_group = self
            .consumer_group
            .clone()
            .unwrap_or_else(|| "rentwise-event-tail".to_string());

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &consumer_group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", &self.auto_offset_reset)
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| EventLogError::SubscriptionFailed {
                topics: names.clone(),
                reason: format!("Failed to create consumer: {e}"),
            })?;

        let topic_refs: Vec<&str> = names.iter().map(String::as_str).collect();
        consumer
            .subscribe(&topic_refs)
            .map_err(|e| EventLogError::SubscriptionFailed {
                topics: names.clone(),
                reason: format!("Failed to subscribe to topics: {e}"),
            })?;

        tracing::info!(
            topics = ?names,
            consumer_group = %consumer_group,
            auto_offset_reset = %self.auto_offset_reset,
            "Subscribed to topics"
        );

        let (tx, mut rx) = tokio::sync::mpsc::channel(self.buffer_size);
        tokio::spawn(async move {
            use futures::StreamExt;
            use rdkafka::consumer::CommitMode;

            let mut stream = consumer.stream();
            while let Some(received) = stream.next().await {
                match received {
                    Ok(message) => {
                        let decoded = decode(&message);
                        if tx.send(decoded).await.is_err() {
                            break;
                        }
                        if let Err(e) = consumer.commit_message(&message, CommitMode::Async) {
                            tracing::warn!(
                                topic = message.topic(),
                                partition = message.partition(),
                                offset = message.offset(),
                                error = %e,
                                "Failed to commit offset (message may be redelivered)"
                            );
                        }
                    },
                    Err(e) => {
                        let err = EventLogError::TransportError(format!("Failed to receive message: {e}"));
                        if tx.send(Err(err)).await.is_err() {
                            break;
                        }
                    },
                }
            }
            tracing::debug!("Consumer task exiting");
        });

        let stream = async_stream::stream! {
            while let Some(item) = rx.recv().await {
                yield item;
            }
        };
        Ok(Box::pin(stream))
    }
}

fn decode(message: &BorrowedMessage<'_>) -> Result<DomainEvent, EventLogError> {
    let topic = Topic::from_name(message.topic()).ok_or_else(|| {
        EventLogError::DeserializationFailed(format!("Unknown topic {}", message.topic()))
    })?;
    let key = message
        .key()
        .and_then(|bytes| std::str::from_utf8(bytes).ok())
        .ok_or_else(|| EventLogError::DeserializationFailed("Message has no UTF-8 key".to_string()))?;
    let payload = message
        .payload()
        .ok_or_else(|| EventLogError::DeserializationFailed("Message has no payload".to_string()))?;
    decode_parts(topic, key, payload)
}

fn decode_parts(topic: Topic, key: &str, payload: &[u8]) -> Result<DomainEvent, EventLogError> {
    let envelope = EventEnvelope::from_bytes(payload)
        .map_err(|e| EventLogError::DeserializationFailed(format!("Invalid envelope: {e}")))?;
    let event_type = envelope.event_type.clone();
    envelope
        .into_domain_event(topic, key)
        .ok_or_else(|| EventLogError::DeserializationFailed(format!("Unknown event type {event_type}")))
}

/// Builder for configuring a [`RedpandaEventLog`].
#[derive(Default)]
pub struct RedpandaEventLogBuilder {
    brokers: Option<String>,
    producer_acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
    partitions: Option<i32>,
    replication_factor: Option<i32>,
    consumer_group: Option<String>,
    buffer_size: Option<usize>,
    auto_offset_reset: Option<String>,
}

impl RedpandaEventLogBuilder {
    /// Set the broker addresses (comma-separated).
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the producer acknowledgment mode: `"0"`, `"1"` or `"all"`.
    ///
    /// Default: `"1"`
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Set the compression codec: `"none"`, `"gzip"`, `"snappy"`, `"lz4"`, `"zstd"`.
    ///
    /// Default: `"none"`
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Set the delivery timeout.
    ///
    /// Default: 5 seconds
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Partitions for topics created by `ensure_topics`.
    ///
    /// Default: 1
    #[must_use]
    pub const fn partitions(mut self, partitions: i32) -> Self {
        self.partitions = Some(partitions);
        self
    }

    /// Replication factor for topics created by `ensure_topics`.
    ///
    /// Default: 1
    #[must_use]
    pub const fn replication_factor(mut self, replication_factor: i32) -> Self {
        self.replication_factor = Some(replication_factor);
        self
    }

    /// Consumer group for subscriptions.
    ///
    /// Default: `"rentwise-event-tail"`
    #[must_use]
    pub fn consumer_group(mut self, consumer_group: impl Into<String>) -> Self {
        self.consumer_group = Some(consumer_group.into());
        self
    }

    /// Events buffered between the consumer task and the stream. Zero is
    /// treated as one.
    ///
    /// Default: 1000
    #[must_use]
    pub const fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = Some(buffer_size);
        self
    }

    /// Where new consumer groups start: `"earliest"` or `"latest"`.
    ///
    /// Default: `"earliest"`
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Build the [`RedpandaEventLog`].
    ///
    /// # Errors
    ///
    /// Returns [`EventLogError::ConnectionFailed`] if brokers are not set or
    /// the producer or admin client cannot be created.
    pub fn build(self) -> Result<RedpandaEventLog, EventLogError> {
        let brokers = self
            .brokers
            .ok_or_else(|| EventLogError::ConnectionFailed("Brokers not configured".to_string()))?;
        let timeout = self.timeout.unwrap_or(Duration::from_secs(5));
        let acks = self.producer_acks.as_deref().unwrap_or("1");
        let compression = self.compression.as_deref().unwrap_or("none");

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", timeout.as_millis().to_string())
            .set("acks", acks)
            .set("compression.type", compression)
            .create()
            .map_err(|e| EventLogError::ConnectionFailed(format!("Failed to create producer: {e}")))?;

        let admin: AdminClient<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .create()
            .map_err(|e| EventLogError::ConnectionFailed(format!("Failed to create admin client: {e}")))?;

        let auto_offset_reset = self
            .auto_offset_reset
            .unwrap_or_else(|| "earliest".to_string());
        tracing::info!(
            brokers = %brokers,
            acks,
            compression,
            auto_offset_reset = %auto_offset_reset,
            "RedpandaEventLog created"
        );

        Ok(RedpandaEventLog {
            producer,
            admin,
            brokers,
            timeout,
            partitions: self.partitions.unwrap_or(1),
            replication_factor: self.replication_factor.unwrap_or(1),
            consumer_group: self.consumer_group,
            buffer_size: self.buffer_size.unwrap_or(1000).max(1),
            auto_offset_reset,
        })
    }
}

impl EventLog for RedpandaEventLog {
    fn publish(
        &self,
        event: &DomainEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventLogError>> + Send + '_>> {
        let event = event.clone();
        let timeout = self.timeout;

        Box::pin(async move {
            let topic = event.topic().name();
            let payload = event
                .envelope()
                .to_bytes()
                .map_err(|e| EventLogError::SerializationFailed(e.to_string()))?;

            let record = FutureRecord::to(topic).payload(&payload).key(event.key());
            match self.producer.send(record, Timeout::After(timeout)).await {
                Ok((partition, offset)) => {
                    tracing::debug!(
                        topic,
                        partition,
                        offset,
                        key = event.key(),
                        event_type = %event.event_type(),
                        "Event published"
                    );
                    Ok(())
                },
                Err((kafka_error, _)) => {
                    tracing::error!(
                        topic,
                        key = event.key(),
                        event_type = %event.event_type(),
                        error = %kafka_error,
                        "Failed to publish event"
                    );
                    Err(EventLogError::PublishFailed {
                        topic: topic.to_string(),
                        reason: kafka_error.to_string(),
                    })
                },
            }
        })
    }

    fn ensure_topics(
        &self,
        topics: &[Topic],
    ) -> Pin<Box<dyn Future<Output = Result<(), EventLogError>> + Send + '_>> {
        let topics = topics.to_vec();

        Box::pin(async move {
            let new_topics: Vec<NewTopic<'_>> = topics
                .iter()
                .map(|topic| {
                    NewTopic::new(
                        topic.name(),
                        self.partitions,
                        TopicReplication::Fixed(self.replication_factor),
                    )
                })
                .collect();

            let results = self
                .admin
                .create_topics(&new_topics, &AdminOptions::new())
                .await
                .map_err(|e| EventLogError::ConnectionFailed(format!("Admin request failed: {e}")))?;

            for result in results {
                match result {
                    Ok(name) => tracing::info!(topic = %name, "Topic created"),
                    Err((name, RDKafkaErrorCode::TopicAlreadyExists)) => {
                        tracing::debug!(topic = %name, "Topic already exists");
                    },
                    Err((name, code)) => {
                        tracing::error!(topic = %name, error = %code, "Topic provisioning failed");
                        return Err(EventLogError::ProvisioningFailed {
                            topic: name,
                            reason: code.to_string(),
                        });
                    },
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use chrono::Utc;
    use rentwise_core::EventType;

    #[test]
    fn redpanda_event_log_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<RedpandaEventLog>();
        assert_sync::<RedpandaEventLog>();
    }

    #[test]
    fn builder_requires_brokers() {
        assert!(matches!(
            RedpandaEventLog::builder().build(),
            Err(EventLogError::ConnectionFailed(_))
        ));
    }

    #[test]
    fn decodes_wire_envelope() {
        let payload = br#"{"timestamp":"2025-01-01T00:00:00Z","event_type":"RENTAL_APPROVED","data":{"id":"R1","new_status":"APPROVED"}}"#;
        let event = decode_parts(Topic::Rental, "R1", payload).unwrap();
        assert_eq!(event.event_type(), EventType::RentalApproved);
        assert_eq!(event.key(), "R1");
        assert_eq!(event.data()["new_status"], "APPROVED");
    }

    #[test]
    fn published_bytes_decode_to_same_event() {
        let event = DomainEvent::new(
            Topic::Vehicle,
            EventType::VehicleStatusChanged,
            "V1",
            serde_json::json!({"status": "RENTED"}),
            Utc::now(),
        );
        let bytes = event.envelope().to_bytes().unwrap();
        assert_eq!(decode_parts(Topic::Vehicle, "V1", &bytes).unwrap(), event);
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        let payload = br#"{"timestamp":"2025-01-01T00:00:00Z","event_type":"NOPE","data":{}}"#;
        assert!(matches!(
            decode_parts(Topic::Rental, "R1", payload),
            Err(EventLogError::DeserializationFailed(_))
        ));
    }
}
