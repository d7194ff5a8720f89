//! Domain events emitted to the durable event log.
//!
//! Events are immutable facts about state changes, appended to one of four
//! topics and keyed by the subject entity's id so consumers see per-entity
//! order.
//!
//! # Wire Format
//!
//! Each log message is a JSON envelope, keyed by [`DomainEvent::key`]:
//!
//! ```json
//! {
//!   "timestamp": "2024-05-01T09:00:00Z",
//!   "event_type": "RENTAL_APPROVED",
//!   "data": { "id": "R1", "new_status": "APPROVED" }
//! }
//! ```
//!
//! `data.id` always equals the message key.
//!
//! # Example
//!
//! ```
//! use rentwise_core::event::{DomainEvent, EventType, Topic};
//! use chrono::Utc;
//! use serde_json::json;
//!
//! let event = DomainEvent::new(
//!     Topic::Rental,
//!     EventType::RentalApproved,
//!     "R1",
//!     json!({ "new_status": "APPROVED" }),
//!     Utc::now(),
//! );
//! assert_eq!(event.data()["id"], "R1");
//! ```

use crate::model::RentalStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Event log topics, one per entity family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    /// `vehicle_events`
    #[serde(rename = "vehicle_events")]
    Vehicle,
    /// `rental_events`
    #[serde(rename = "rental_events")]
    Rental,
    /// `user_events`
    #[serde(rename = "user_events")]
    User,
    /// `branch_events`
    #[serde(rename = "branch_events")]
    Branch,
}

impl Topic {
    /// Every topic, in provisioning order.
    pub const ALL: [Self; 4] = [Self::Vehicle, Self::Rental, Self::User, Self::Branch];

    /// Topic name on the broker.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Vehicle => "vehicle_events",
            Self::Rental => "rental_events",
            Self::User => "user_events",
            Self::Branch => "branch_events",
        }
    }

    /// Resolve a broker topic name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|topic| topic.name() == name)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Event-type tag carried in every envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(missing_docs)]
pub enum EventType {
    VehicleCreated,
    VehicleUpdated,
    VehicleDeleted,
    VehicleStatusChanged,
    RentalCreated,
    RentalApproved,
    RentalRejected,
    RentalCompleted,
    RentalDeleted,
    UserCreated,
    UserUpdated,
    UserDeleted,
    BranchCreated,
    BranchUpdated,
    BranchDeleted,
}

impl EventType {
    /// Wire tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::VehicleCreated => "VEHICLE_CREATED",
            Self::VehicleUpdated => "VEHICLE_UPDATED",
            Self::VehicleDeleted => "VEHICLE_DELETED",
            Self::VehicleStatusChanged => "VEHICLE_STATUS_CHANGED",
            Self::RentalCreated => "RENTAL_CREATED",
            Self::RentalApproved => "RENTAL_APPROVED",
            Self::RentalRejected => "RENTAL_REJECTED",
            Self::RentalCompleted => "RENTAL_COMPLETED",
            Self::RentalDeleted => "RENTAL_DELETED",
            Self::UserCreated => "USER_CREATED",
            Self::UserUpdated => "USER_UPDATED",
            Self::UserDeleted => "USER_DELETED",
            Self::BranchCreated => "BRANCH_CREATED",
            Self::BranchUpdated => "BRANCH_UPDATED",
            Self::BranchDeleted => "BRANCH_DELETED",
        }
    }

    /// The topic this event type belongs to.
    #[must_use]
    pub const fn topic(self) -> Topic {
        match self {
            Self::VehicleCreated
            | Self::VehicleUpdated
            | Self::VehicleDeleted
            | Self::VehicleStatusChanged => Topic::Vehicle,
            Self::RentalCreated
            | Self::RentalApproved
            | Self::RentalRejected
            | Self::RentalCompleted
            | Self::RentalDeleted => Topic::Rental,
            Self::UserCreated | Self::UserUpdated | Self::UserDeleted => Topic::User,
            Self::BranchCreated | Self::BranchUpdated | Self::BranchDeleted => Topic::Branch,
        }
    }

    /// The event recording a rental's entry into `status`.
    ///
    /// `PENDING` is only ever entered at creation, which emits
    /// [`EventType::RentalCreated`] instead.
    #[must_use]
    pub const fn for_rental_status(status: RentalStatus) -> Option<Self> {
        match status {
            RentalStatus::Pending => None,
            RentalStatus::Approved => Some(Self::RentalApproved),
            RentalStatus::Rejected => Some(Self::RentalRejected),
            RentalStatus::Completed => Some(Self::RentalCompleted),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable domain event.
///
/// Fields are private; once built an event is only read.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainEvent {
    topic: Topic,
    event_type: EventType,
    key: String,
    data: Value,
    timestamp: DateTime<Utc>,
}

impl DomainEvent {
    /// Build an event.
    ///
    /// `fields` is merged into the payload object alongside `"id": key`. A
    /// non-object `fields` value is stored under `"value"`.
    #[must_use]
    pub fn new(
        topic: Topic,
        event_type: EventType,
        key: impl Into<String>,
        fields: Value,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let key = key.into();
        let mut data = serde_json::Map::new();
        data.insert("id".to_string(), Value::String(key.clone()));
        match fields {
            Value::Object(map) => {
                for (name, value) in map {
                    if name != "id" {
                        data.insert(name, value);
                    }
                }
            },
            Value::Null => {},
            other => {
                data.insert("value".to_string(), other);
            },
        }

        Self {
            topic,
            event_type,
            key,
            data: Value::Object(data),
            timestamp,
        }
    }

    /// Destination topic.
    #[must_use]
    pub const fn topic(&self) -> Topic {
        self.topic
    }

    /// Event-type tag.
    #[must_use]
    pub const fn event_type(&self) -> EventType {
        self.event_type
    }

    /// Partition key (subject entity id).
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Payload object.
    #[must_use]
    pub const fn data(&self) -> &Value {
        &self.data
    }

    /// Emission time.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// The wire envelope for this event.
    #[must_use]
    pub fn envelope(&self) -> EventEnvelope {
        EventEnvelope {
            timestamp: self.timestamp,
            event_type: self.event_type.as_str().to_string(),
            data: self.data.clone(),
        }
    }
}

/// The JSON message body written to the log.
///
/// `event_type` is a free string on the wire so consumers tolerate tags this
/// build does not know.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Emission time, ISO-8601.
    pub timestamp: DateTime<Utc>,
    /// Event-type tag.
    pub event_type: String,
    /// Payload.
    pub data: Value,
}

impl EventEnvelope {
    /// Encode as JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns the serializer error; cannot happen for well-formed payloads.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decode from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns the deserializer error for malformed messages.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Rebuild the domain event, given the topic and key it was read from.
    ///
    /// Returns `None` for unknown event-type tags.
    #[must_use]
    pub fn into_domain_event(self, topic: Topic, key: impl Into<String>) -> Option<DomainEvent> {
        let event_type: EventType =
            serde_json::from_value(Value::String(self.event_type)).ok()?;
        Some(DomainEvent::new(topic, event_type, key, self.data, self.timestamp))
    }
}
