//! Outbound real-time messages.
//!
//! Every message serializes to a JSON object with a `type` discriminator:
//!
//! ```json
//! {"type":"rental_status_update","rental_id":"R1","new_status":"APPROVED","timestamp":"..."}
//! ```

use crate::ids::{RentalId, UserId, VehicleId};
use crate::model::{AvailabilityStatus, RentalRecord, RentalStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message pushed to live connections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// A customer requested a rental. Sent to employees.
    NewRentalRequest {
        /// The new rental.
        rental_id: RentalId,
        /// Who requested it.
        customer_id: UserId,
        /// The requested vehicle.
        vehicle_id: VehicleId,
        /// Always `PENDING`.
        status: RentalStatus,
        /// When the request was recorded.
        timestamp: DateTime<Utc>,
    },

    /// A rental changed status. Sent to employees and the owning customer.
    RentalStatusUpdate {
        /// The rental.
        rental_id: RentalId,
        /// Its new status.
        new_status: RentalStatus,
        /// When the transition committed.
        timestamp: DateTime<Utc>,
    },

    /// A vehicle's availability changed. Sent to employees.
    VehicleStatusUpdate {
        /// The vehicle.
        vehicle_id: VehicleId,
        /// Its new availability.
        new_status: AvailabilityStatus,
    },
}

impl Notification {
    /// Announce a freshly created rental.
    #[must_use]
    pub fn new_rental_request(rental: &RentalRecord, timestamp: DateTime<Utc>) -> Self {
        Self::NewRentalRequest {
            rental_id: rental.rental_id.clone(),
            customer_id: rental.customer_id.clone(),
            vehicle_id: rental.vehicle_id.clone(),
            status: rental.status(),
            timestamp,
        }
    }

    /// The `type` tag.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NewRentalRequest { .. } => "new_rental_request",
            Self::RentalStatusUpdate { .. } => "rental_status_update",
            Self::VehicleStatusUpdate { .. } => "vehicle_status_update",
        }
    }

    /// Encode as a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns the serializer error; cannot happen for these variants.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
