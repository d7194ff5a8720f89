//! Vehicle catalog: reads and whitelisted edits.
//!
//! Edits take the same per-vehicle lock as rental approvals, so an approval's
//! availability check cannot interleave with an employee changing the
//! vehicle.

use crate::locks::KeyedLocks;
use crate::notify::Notifier;
use crate::publisher::EventPublisher;
use rentwise_core::model::VehicleSearch;
use rentwise_core::patch::apply_patch;
use rentwise_core::store::{DocumentStore, FieldSet};
use rentwise_core::{EventType, Notification, RentalError, UserRole, VehicleId, VehicleRecord};
use serde_json::{Value, json};
use std::sync::Arc;

/// Vehicle reads and partial updates.
pub struct VehicleCatalog {
    vehicles: Arc<dyn DocumentStore<VehicleRecord>>,
    publisher: Arc<EventPublisher>,
    notifier: Notifier,
    locks: Arc<KeyedLocks>,
}

impl VehicleCatalog {
    pub(crate) fn new(
        vehicles: Arc<dyn DocumentStore<VehicleRecord>>,
        publisher: Arc<EventPublisher>,
        notifier: Notifier,
        locks: Arc<KeyedLocks>,
    ) -> Self {
        Self {
            vehicles,
            publisher,
            notifier,
            locks,
        }
    }

    /// Load one vehicle.
    ///
    /// # Errors
    ///
    /// Returns [`RentalError::NotFound`] if the vehicle does not exist.
    pub async fn get_vehicle(&self, vehicle_id: &VehicleId) -> Result<VehicleRecord, RentalError> {
        self.vehicles
            .find_by_key(vehicle_id.as_str())
            .await?
            .ok_or_else(|| RentalError::vehicle_not_found(vehicle_id))
    }

    /// Vehicles matching every set criterion.
    ///
    /// # Errors
    ///
    /// Returns [`RentalError::Store`] if the store fails.
    pub async fn search(&self, search: &VehicleSearch) -> Result<Vec<VehicleRecord>, RentalError> {
        Ok(self.vehicles.find(&search.to_filter()).await?)
    }

    /// Apply a whitelisted partial update and emit `VEHICLE_UPDATED`.
    ///
    /// A change of `availability_status` is also pushed to employees.
    ///
    /// # Errors
    ///
    /// - [`RentalError::NotFound`] if the vehicle does not exist
    /// - [`RentalError::Validation`] if the patch is empty, names a field that
    ///   may not change, or yields an invalid vehicle
    /// - [`RentalError::Store`] if the store fails
    #[tracing::instrument(skip_all, fields(vehicle_id = %vehicle_id))]
    pub async fn update_vehicle(
        &self,
        vehicle_id: &VehicleId,
        fields: FieldSet,
    ) -> Result<VehicleRecord, RentalError> {
        let (previous, updated) = {
            let _guard = self.locks.lock(vehicle_id.as_str()).await;
            let previous = self.get_vehicle(vehicle_id).await?;
            let updated = apply_patch(&previous, &fields)?;
            self.vehicles.replace(updated.clone()).await?;

            let changed: Vec<&String> = fields.keys().collect();
            tracing::info!(vehicle_id = %vehicle_id, fields = ?changed, "Vehicle updated");
            self.publisher.publish(
                EventType::VehicleUpdated,
                vehicle_id.as_str(),
                json!({ "updated_fields": Value::Object(fields) }),
            );
            (previous, updated)
        };

        if previous.availability_status != updated.availability_status {
            self.notifier
                .broadcast_by_role(
                    UserRole::Employee,
                    &Notification::VehicleStatusUpdate {
                        vehicle_id: vehicle_id.clone(),
                        new_status: updated.availability_status,
                    },
                )
                .await;
        }
        Ok(updated)
    }
}
