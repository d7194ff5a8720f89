//! Vehicle availability synchronizer.
//!
//! The only writer of `availability_status` for rental-driven changes. It is
//! crate-private: request handlers cannot reach it, only the state machine's
//! transition path does.

use crate::publisher::EventPublisher;
use rentwise_core::store::{DocumentStore, FieldSet};
use rentwise_core::{
    AvailabilityStatus, EventType, Notification, StoreError, VehicleId, VehicleRecord,
};
use serde_json::{Value, json};
use std::sync::Arc;

pub(crate) struct AvailabilitySynchronizer {
    vehicles: Arc<dyn DocumentStore<VehicleRecord>>,
    publisher: Arc<EventPublisher>,
}

impl AvailabilitySynchronizer {
    pub(crate) fn new(
        vehicles: Arc<dyn DocumentStore<VehicleRecord>>,
        publisher: Arc<EventPublisher>,
    ) -> Self {
        Self {
            vehicles,
            publisher,
        }
    }

    /// Write the vehicle's availability, then emit `VEHICLE_STATUS_CHANGED`.
    ///
    /// Returns the employee notification for the caller to send once its
    /// locks are released. Nothing is emitted when the write fails.
    pub(crate) async fn set_availability(
        &self,
        vehicle_id: &VehicleId,
        status: AvailabilityStatus,
    ) -> Result<Notification, StoreError> {
        let mut fields = FieldSet::new();
        fields.insert(
            "availability_status".to_string(),
            Value::String(status.as_str().to_string()),
        );
        self.vehicles
            .partial_update(vehicle_id.as_str(), fields)
            .await?;

        tracing::info!(vehicle_id = %vehicle_id, status = %status, "Vehicle availability updated");
        self.publisher.publish(
            EventType::VehicleStatusChanged,
            vehicle_id.as_str(),
            json!({ "status": status }),
        );
        Ok(Notification::VehicleStatusUpdate {
            vehicle_id: vehicle_id.clone(),
            new_status: status,
        })
    }
}
