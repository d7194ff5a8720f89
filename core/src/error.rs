//! Error taxonomy.
//!
//! Two families live here:
//!
//! - **Surfaced** errors ([`RentalError`], [`AuthError`]) are returned to the
//!   caller before any state change, each with a stable [`ErrorKind`].
//! - **Logged** faults ([`DeliveryFailure`], [`InconsistencyFault`]) describe
//!   best-effort side effects that went wrong after the primary mutation. They
//!   are never returned to the caller.

use crate::ids::{RentalId, UserId, VehicleId};
use crate::model::{AvailabilityStatus, RentalStatus, UserRole};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Stable, machine-readable error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Referenced entity absent.
    NotFound,
    /// Duplicate identity on create.
    Conflict,
    /// Illegal status change.
    InvalidTransition,
    /// Vehicle cannot be rented right now.
    VehicleUnavailable,
    /// Missing, unknown or expired credential.
    Unauthenticated,
    /// Authenticated but lacking the required role.
    Forbidden,
    /// Input rejected by validation.
    Validation,
    /// Collaborator failure on the primary mutation.
    Internal,
}

impl ErrorKind {
    /// Wire code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::InvalidTransition => "INVALID_TRANSITION",
            Self::VehicleUnavailable => "VEHICLE_UNAVAILABLE",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::Forbidden => "FORBIDDEN",
            Self::Validation => "VALIDATION_ERROR",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Errors reported by the document store collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No document under the key.
    #[error("{collection}/{key} not found")]
    NotFound {
        /// Collection name.
        collection: &'static str,
        /// Document key.
        key: String,
    },

    /// A document already exists under the key.
    #[error("{collection}/{key} already exists")]
    DuplicateKey {
        /// Collection name.
        collection: &'static str,
        /// Document key.
        key: String,
    },

    /// A document could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Transport or database failure.
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Caller-visible errors of the rental lifecycle operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RentalError {
    /// A referenced entity does not exist.
    #[error("{entity} with id {id} not found")]
    NotFound {
        /// `"Rental"`, `"Vehicle"` or `"Customer"`.
        entity: &'static str,
        /// The missing key.
        id: String,
    },

    /// The supplied rental id is already taken.
    #[error("Rental ID {0} already exists")]
    Conflict(RentalId),

    /// The requested status is not a successor of the current one.
    #[error("Rental {rental_id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// The rental.
        rental_id: RentalId,
        /// Current status.
        from: RentalStatus,
        /// Requested status.
        to: RentalStatus,
    },

    /// The vehicle is not AVAILABLE.
    #[error("Vehicle {vehicle_id} is not available for rent (currently {status})")]
    VehicleUnavailable {
        /// The vehicle.
        vehicle_id: VehicleId,
        /// Its current availability.
        status: AvailabilityStatus,
    },

    /// Request input failed validation.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The store failed while performing the primary mutation.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RentalError {
    /// The stable kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::VehicleUnavailable { .. } => ErrorKind::VehicleUnavailable,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Store(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: impl fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// A missing rental.
    #[must_use]
    pub fn rental_not_found(id: &RentalId) -> Self {
        Self::not_found("Rental", id)
    }

    /// A missing vehicle.
    #[must_use]
    pub fn vehicle_not_found(id: &VehicleId) -> Self {
        Self::not_found("Vehicle", id)
    }

    /// A missing customer.
    #[must_use]
    pub fn customer_not_found(id: &UserId) -> Self {
        Self::not_found("Customer", id)
    }
}

/// Access-control failures, raised before any mutation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Missing, unknown or expired credential.
    #[error("Could not validate credentials: {0}")]
    Unauthenticated(String),

    /// The identity lacks the required role.
    #[error("Only {required} identities can perform this operation")]
    Forbidden {
        /// Role the operation requires.
        required: UserRole,
    },
}

impl AuthError {
    /// The stable kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthenticated(_) => ErrorKind::Unauthenticated,
            Self::Forbidden { .. } => ErrorKind::Forbidden,
        }
    }
}

/// A best-effort delivery that did not complete. Logged and counted only.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryFailure {
    /// The connection did not accept the message within the bound.
    #[error("connection {connection} of {identity} timed out after {timeout:?}")]
    Timeout {
        /// Recipient identity.
        identity: UserId,
        /// Connection id.
        connection: u64,
        /// Per-recipient bound.
        timeout: Duration,
    },

    /// The connection's session has already gone away.
    #[error("connection {connection} of {identity} is closed")]
    Closed {
        /// Recipient identity.
        identity: UserId,
        /// Connection id.
        connection: u64,
    },

    /// The publisher queue had no room; the event was dropped.
    #[error("event queue full, dropped {event_type} for key {key}")]
    QueueFull {
        /// Event-type tag.
        event_type: String,
        /// Partition key.
        key: String,
    },

    /// The publisher has shut down; the event was dropped.
    #[error("event publisher stopped, dropped {event_type} for key {key}")]
    PublisherStopped {
        /// Event-type tag.
        event_type: String,
        /// Partition key.
        key: String,
    },

    /// The event log rejected the event.
    #[error("event log rejected {event_type} for key {key}: {reason}")]
    Rejected {
        /// Event-type tag.
        event_type: String,
        /// Partition key.
        key: String,
        /// Log error.
        reason: String,
    },
}

/// A side-effect mutation failed after the primary rental mutation committed.
///
/// The rental keeps its new status. The vehicle is left in its previous
/// availability and must be reconciled out of band.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "rental {rental_id} is {rental_status} but vehicle {vehicle_id} could not be set to {intended}: {cause}"
)]
pub struct InconsistencyFault {
    /// The rental whose transition committed.
    pub rental_id: RentalId,
    /// Its committed status.
    pub rental_status: RentalStatus,
    /// The vehicle that was not synchronized.
    pub vehicle_id: VehicleId,
    /// The availability it should have.
    pub intended: AvailabilityStatus,
    /// The store failure.
    pub cause: StoreError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rental_errors_have_stable_kinds() {
        let err = RentalError::rental_not_found(&RentalId::new("R1"));
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "Rental with id R1 not found");

        let err = RentalError::InvalidTransition {
            rental_id: RentalId::new("R1"),
            from: RentalStatus::Completed,
            to: RentalStatus::Approved,
        };
        assert_eq!(err.kind().code(), "INVALID_TRANSITION");
        assert_eq!(err.to_string(), "Rental R1 cannot move from COMPLETED to APPROVED");
    }

    #[test]
    fn store_failures_surface_as_internal() {
        let err = RentalError::from(StoreError::Backend("down".to_string()));
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn auth_errors_have_stable_kinds() {
        let err = AuthError::Forbidden {
            required: UserRole::Employee,
        };
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(
            err.to_string(),
            "Only EMPLOYEE identities can perform this operation"
        );
    }
}
