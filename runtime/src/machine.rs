//! Rental state machine.
//!
//! The single mutation path for rentals. Every operation validates against
//! the store before writing, so a rejected call changes nothing. After the
//! rental write commits, side effects run in a fixed order:
//!
//! 1. vehicle availability, for approvals and completions
//! 2. the rental's domain event
//! 3. notifications to live connections
//!
//! Side-effect failures never reach the caller. A failed availability write
//! is an [`InconsistencyFault`]: logged as fatal and counted, with the rental
//! left in its new status.
//!
//! # Concurrency
//!
//! Operations on one rental are serialized by a keyed lock on the rental id.
//! Approvals and completions also lock the vehicle id (always after the
//! rental), and an approval re-checks that the vehicle is still `AVAILABLE`,
//! so two pending rentals for one vehicle cannot both be approved.
//! Locks are released before notifications go out.

use crate::locks::KeyedLocks;
use crate::metrics::RentalMetrics;
use crate::notify::Notifier;
use crate::publisher::EventPublisher;
use crate::sync::AvailabilitySynchronizer;
use crate::Stores;
use rentwise_core::environment::Clock;
use rentwise_core::error::InconsistencyFault;
use rentwise_core::store::{DocumentStore, Filter};
use rentwise_core::{
    DateTime, EventType, Notification, RentalError, RentalId, RentalRecord, RentalStatus,
    StoreError, UserId, UserRecord, UserRole, Utc, VehicleId, VehicleRecord,
};
use serde_json::{Value, json};
use std::sync::Arc;

/// A customer's rental request.
///
/// There is no status field: new rentals are always `PENDING`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRental {
    /// Requested key; a UUID v4 is generated when absent.
    pub rental_id: Option<RentalId>,
    /// The vehicle to rent.
    pub vehicle_id: VehicleId,
    /// The requesting customer.
    pub customer_id: UserId,
    /// Start of the rental period.
    pub rental_start_date: DateTime<Utc>,
    /// End of the rental period.
    pub rental_end_date: DateTime<Utc>,
}

/// Advances rentals through their lifecycle.
pub struct RentalStateMachine {
    users: Arc<dyn DocumentStore<UserRecord>>,
    vehicles: Arc<dyn DocumentStore<VehicleRecord>>,
    rentals: Arc<dyn DocumentStore<RentalRecord>>,
    synchronizer: AvailabilitySynchronizer,
    notifier: Notifier,
    publisher: Arc<EventPublisher>,
    clock: Arc<dyn Clock>,
    rental_locks: KeyedLocks,
    vehicle_locks: Arc<KeyedLocks>,
}

impl RentalStateMachine {
    pub(crate) fn new(
        stores: Stores,
        notifier: Notifier,
        publisher: Arc<EventPublisher>,
        clock: Arc<dyn Clock>,
        vehicle_locks: Arc<KeyedLocks>,
    ) -> Self {
        let synchronizer = AvailabilitySynchronizer::new(
            Arc::clone(&stores.vehicles),
            Arc::clone(&publisher),
        );
        Self {
            users: stores.users,
            vehicles: stores.vehicles,
            rentals: stores.rentals,
            synchronizer,
            notifier,
            publisher,
            clock,
            rental_locks: KeyedLocks::new(),
            vehicle_locks,
        }
    }

    /// Record a new `PENDING` rental.
    ///
    /// Checks, in order: the rental id is free, the vehicle exists and is
    /// `AVAILABLE`, the customer exists. Availability is not reserved.
    ///
    /// # Errors
    ///
    /// - [`RentalError::Conflict`] if the rental id is taken
    /// - [`RentalError::NotFound`] if the vehicle or customer is missing
    /// - [`RentalError::VehicleUnavailable`] if the vehicle is not `AVAILABLE`
    /// - [`RentalError::Store`] if the store fails
    #[tracing::instrument(skip_all, fields(vehicle_id = %request.vehicle_id))]
    pub async fn create_rental(&self, request: NewRental) -> Result<RentalRecord, RentalError> {
        let rental = observe("create_rental", self.try_create(request).await)?;

        let message = Notification::new_rental_request(&rental, self.clock.now());
        self.notifier
            .broadcast_by_role(UserRole::Employee, &message)
            .await;
        Ok(rental)
    }

    async fn try_create(&self, request: NewRental) -> Result<RentalRecord, RentalError> {
        let rental_id = request.rental_id.unwrap_or_else(RentalId::generate);
        let _rental_guard = self.rental_locks.lock(rental_id.as_str()).await;

        if self.rentals.find_by_key(rental_id.as_str()).await?.is_some() {
            return Err(RentalError::Conflict(rental_id));
        }

        let vehicle = self
            .vehicles
            .find_by_key(request.vehicle_id.as_str())
            .await?
            .ok_or_else(|| RentalError::vehicle_not_found(&request.vehicle_id))?;
        if !vehicle.is_available() {
            return Err(RentalError::VehicleUnavailable {
                vehicle_id: vehicle.vehicle_id,
                status: vehicle.availability_status,
            });
        }

        if self
            .users
            .find_by_key(request.customer_id.as_str())
            .await?
            .is_none()
        {
            return Err(RentalError::customer_not_found(&request.customer_id));
        }

        let rental = RentalRecord::pending(
            rental_id,
            &vehicle,
            request.customer_id,
            request.rental_start_date,
            request.rental_end_date,
        );
        match self.rentals.insert(rental.clone()).await {
            Ok(()) => {},
            Err(StoreError::DuplicateKey { .. }) => {
                return Err(RentalError::Conflict(rental.rental_id));
            },
            Err(e) => return Err(e.into()),
        }

        RentalMetrics::record_transition(RentalStatus::Pending);
        tracing::info!(
            rental_id = %rental.rental_id,
            vehicle_id = %rental.vehicle_id,
            customer_id = %rental.customer_id,
            total_cost = rental.total_cost(),
            "Rental created"
        );
        self.publisher.publish(
            EventType::RentalCreated,
            rental.rental_id.as_str(),
            json!({ "rental_data": rental }),
        );
        Ok(rental)
    }

    /// Move a rental to `next`.
    ///
    /// `APPROVED` sets the vehicle `RENTED`; `COMPLETED` sets it `AVAILABLE`.
    /// The status event is emitted, then employees and the owning customer
    /// are notified.
    ///
    /// # Errors
    ///
    /// - [`RentalError::NotFound`] if the rental (or, on approval, its vehicle) is missing
    /// - [`RentalError::InvalidTransition`] if `next` is not a successor of the current status
    /// - [`RentalError::VehicleUnavailable`] if an approval finds the vehicle not `AVAILABLE`
    /// - [`RentalError::Store`] if the rental write fails
    #[tracing::instrument(skip_all, fields(rental_id = %rental_id, to = %next))]
    pub async fn transition_status(
        &self,
        rental_id: &RentalId,
        next: RentalStatus,
    ) -> Result<RentalRecord, RentalError> {
        let (rental, vehicle_update) =
            observe("transition_status", self.try_transition(rental_id, next).await)?;

        if let Some(vehicle_update) = vehicle_update {
            self.notifier
                .broadcast_by_role(UserRole::Employee, &vehicle_update)
                .await;
        }
        let message = Notification::RentalStatusUpdate {
            rental_id: rental.rental_id.clone(),
            new_status: next,
            timestamp: self.clock.now(),
        };
        futures::join!(
            self.notifier.broadcast_by_role(UserRole::Employee, &message),
            self.notifier.send_to_identity(&rental.customer_id, &message),
        );
        Ok(rental)
    }

    /// Runs under the locks. Returns the committed rental and, when the
    /// vehicle changed, the employee notification to send after release.
    async fn try_transition(
        &self,
        rental_id: &RentalId,
        next: RentalStatus,
    ) -> Result<(RentalRecord, Option<Notification>), RentalError> {
        let _rental_guard = self.rental_locks.lock(rental_id.as_str()).await;

        let mut rental = self
            .rentals
            .find_by_key(rental_id.as_str())
            .await?
            .ok_or_else(|| RentalError::rental_not_found(rental_id))?;
        let from = rental
            .advance(next)
            .map_err(|illegal| RentalError::InvalidTransition {
                rental_id: rental_id.clone(),
                from: illegal.from,
                to: illegal.to,
            })?;

        let side_effect = next.vehicle_side_effect();
        let _vehicle_guard = match side_effect {
            Some(_) => Some(self.vehicle_locks.lock(rental.vehicle_id.as_str()).await),
            None => None,
        };
        if next == RentalStatus::Approved {
            let vehicle = self
                .vehicles
                .find_by_key(rental.vehicle_id.as_str())
                .await?
                .ok_or_else(|| RentalError::vehicle_not_found(&rental.vehicle_id))?;
            if !vehicle.is_available() {
                return Err(RentalError::VehicleUnavailable {
                    vehicle_id: vehicle.vehicle_id,
                    status: vehicle.availability_status,
                });
            }
        }

        self.rentals.replace(rental.clone()).await?;
        RentalMetrics::record_transition(next);
        tracing::info!(rental_id = %rental_id, from = %from, to = %next, "Rental transitioned");

        let mut vehicle_update = None;
        if let Some(intended) = side_effect {
            match self
                .synchronizer
                .set_availability(&rental.vehicle_id, intended)
                .await
            {
                Ok(notification) => vehicle_update = Some(notification),
                Err(cause) => report_inconsistency(&InconsistencyFault {
                    rental_id: rental_id.clone(),
                    rental_status: next,
                    vehicle_id: rental.vehicle_id.clone(),
                    intended,
                    cause,
                }),
            }
        }

        if let Some(event_type) = EventType::for_rental_status(next) {
            self.publisher.publish(
                event_type,
                rental_id.as_str(),
                json!({ "new_status": next }),
            );
        }
        Ok((rental, vehicle_update))
    }

    /// Remove a rental regardless of status and emit `RENTAL_DELETED`.
    ///
    /// The vehicle's availability is left as it is.
    ///
    /// # Errors
    ///
    /// Returns [`RentalError::NotFound`] if the rental does not exist.
    #[tracing::instrument(skip_all, fields(rental_id = %rental_id))]
    pub async fn delete_rental(&self, rental_id: &RentalId) -> Result<(), RentalError> {
        observe("delete_rental", self.try_delete(rental_id).await)
    }

    async fn try_delete(&self, rental_id: &RentalId) -> Result<(), RentalError> {
        let _rental_guard = self.rental_locks.lock(rental_id.as_str()).await;
        match self.rentals.delete(rental_id.as_str()).await {
            Ok(()) => {},
            Err(StoreError::NotFound { .. }) => return Err(RentalError::rental_not_found(rental_id)),
            Err(e) => return Err(e.into()),
        }
        tracing::info!(rental_id = %rental_id, "Rental deleted");
        self.publisher
            .publish(EventType::RentalDeleted, rental_id.as_str(), Value::Null);
        Ok(())
    }

    /// Load one rental.
    ///
    /// # Errors
    ///
    /// Returns [`RentalError::NotFound`] if the rental does not exist.
    pub async fn get_rental(&self, rental_id: &RentalId) -> Result<RentalRecord, RentalError> {
        self.rentals
            .find_by_key(rental_id.as_str())
            .await?
            .ok_or_else(|| RentalError::rental_not_found(rental_id))
    }

    /// Every rental.
    ///
    /// # Errors
    ///
    /// Returns [`RentalError::Store`] if the store fails.
    pub async fn list_rentals(&self) -> Result<Vec<RentalRecord>, RentalError> {
        Ok(self.rentals.find(&Filter::new()).await?)
    }

    /// Completed rentals of one vehicle.
    ///
    /// # Errors
    ///
    /// Returns [`RentalError::NotFound`] if the vehicle does not exist.
    pub async fn vehicle_rental_history(
        &self,
        vehicle_id: &VehicleId,
    ) -> Result<Vec<RentalRecord>, RentalError> {
        if self.vehicles.find_by_key(vehicle_id.as_str()).await?.is_none() {
            return Err(RentalError::vehicle_not_found(vehicle_id));
        }
        let filter = Filter::new()
            .where_eq("vehicle_id", vehicle_id.as_str())
            .where_eq("rental_status", RentalStatus::Completed.as_str());
        Ok(self.rentals.find(&filter).await?)
    }
}

fn observe<T>(operation: &'static str, result: Result<T, RentalError>) -> Result<T, RentalError> {
    if let Err(e) = &result {
        RentalMetrics::record_rejection(e.kind());
        match e {
            RentalError::Store(_) => tracing::error!(operation, error = %e, "Rental operation failed"),
            _ => tracing::warn!(operation, kind = %e.kind(), reason = %e, "Rental operation rejected"),
        }
    }
    result
}

fn report_inconsistency(fault: &InconsistencyFault) {
    RentalMetrics::record_inconsistency();
    tracing::error!(
        fatal = true,
        rental_id = %fault.rental_id,
        rental_status = %fault.rental_status,
        vehicle_id = %fault.vehicle_id,
        intended_status = %fault.intended,
        cause = %fault.cause,
        "Vehicle availability out of sync with rental; reconcile manually"
    );
}
