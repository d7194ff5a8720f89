//! Domain records as persisted in the document store.
//!
//! Every record serializes its key under `_id` and its enums as upper-case
//! strings, matching the documents written by earlier versions of the system.
//!
//! # Rental lifecycle
//!
//! ```text
//!            ┌──────────► APPROVED ──────► COMPLETED
//!  PENDING ──┤
//!            └──────────► REJECTED
//! ```
//!
//! `REJECTED` and `COMPLETED` are terminal. A [`RentalRecord`] can only change
//! status through [`RentalRecord::advance`], which enforces the graph.

use crate::ids::{BranchId, RentalId, UserId, VehicleId};
use crate::store::{Document, Filter};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Role of an authenticated identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    /// Rents vehicles; initiates rental requests.
    Customer,
    /// Staff; approves, rejects and completes rentals.
    Employee,
}

impl UserRole {
    /// Wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Customer => "CUSTOMER",
            Self::Employee => "EMPLOYEE",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An authenticated principal. Immutable for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// The user's key.
    pub id: UserId,
    /// The user's role at authentication time.
    pub role: UserRole,
}

impl Identity {
    /// Create an identity.
    #[must_use]
    pub const fn new(id: UserId, role: UserRole) -> Self {
        Self { id, role }
    }

    /// Whether this identity holds `role`.
    #[must_use]
    pub fn has_role(&self, role: UserRole) -> bool {
        self.role == role
    }
}

/// A registered user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Document key.
    #[serde(rename = "_id")]
    pub user_id: UserId,
    /// Display name.
    pub name: String,
    /// Login email, unique per user.
    pub email: String,
    /// Hex SHA-256 digest of the password.
    pub password_hash: String,
    /// Role.
    pub role: UserRole,
}

impl UserRecord {
    /// The identity this user authenticates as.
    #[must_use]
    pub fn identity(&self) -> Identity {
        Identity::new(self.user_id.clone(), self.role)
    }
}

impl Document for UserRecord {
    const COLLECTION: &'static str = "users";

    fn key(&self) -> &str {
        self.user_id.as_str()
    }
}

/// Kind of vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(missing_docs)]
pub enum VehicleType {
    Car,
    Truck,
    Suv,
    Van,
    Motorcycle,
}

impl VehicleType {
    /// Wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Car => "CAR",
            Self::Truck => "TRUCK",
            Self::Suv => "SUV",
            Self::Van => "VAN",
            Self::Motorcycle => "MOTORCYCLE",
        }
    }
}

/// Rentability of a vehicle. Exactly one holds at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AvailabilityStatus {
    /// Can be requested.
    Available,
    /// Held by an approved rental.
    Rented,
    /// Withdrawn by staff.
    Maintenance,
}

impl AvailabilityStatus {
    /// Wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Available => "AVAILABLE",
            Self::Rented => "RENTED",
            Self::Maintenance => "MAINTENANCE",
        }
    }
}

impl fmt::Display for AvailabilityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rentable vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleRecord {
    /// Document key.
    #[serde(rename = "_id")]
    pub vehicle_id: VehicleId,
    /// Display name.
    pub name: String,
    /// Model designation.
    pub model: String,
    /// Kind of vehicle.
    pub vehicle_type: VehicleType,
    /// Daily price; always positive.
    pub rental_price_per_day: f64,
    /// Current availability.
    pub availability_status: AvailabilityStatus,
    /// Branch location name.
    pub location: String,
}

impl VehicleRecord {
    /// Whether a new rental may be requested against this vehicle.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.availability_status == AvailabilityStatus::Available
    }
}

impl Document for VehicleRecord {
    const COLLECTION: &'static str = "vehicles";

    fn key(&self) -> &str {
        self.vehicle_id.as_str()
    }
}

/// Search parameters for vehicles. Unset fields do not constrain the result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleSearch {
    /// Exact vehicle type.
    pub vehicle_type: Option<VehicleType>,
    /// Inclusive lower bound on the daily price.
    pub min_price: Option<f64>,
    /// Inclusive upper bound on the daily price.
    pub max_price: Option<f64>,
    /// Exact location.
    pub location: Option<String>,
    /// Exact availability.
    pub availability_status: Option<AvailabilityStatus>,
}

impl VehicleSearch {
    /// Translate into a store filter.
    #[must_use]
    pub fn to_filter(&self) -> Filter {
        let mut filter = Filter::new();
        if let Some(status) = self.availability_status {
            filter = filter.where_eq("availability_status", status.as_str());
        }
        if let Some(vehicle_type) = self.vehicle_type {
            filter = filter.where_eq("vehicle_type", vehicle_type.as_str());
        }
        if let Some(location) = &self.location {
            filter = filter.where_eq("location", location.as_str());
        }
        if let Some(min) = self.min_price {
            filter = filter.where_gte("rental_price_per_day", min);
        }
        if let Some(max) = self.max_price {
            filter = filter.where_lte("rental_price_per_day", max);
        }
        filter
    }
}

/// A branch office.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchRecord {
    /// Document key.
    #[serde(rename = "_id")]
    pub branch_id: BranchId,
    /// Display name.
    pub name: String,
    /// Address or area.
    pub location: String,
    /// Phone number.
    pub contact_number: String,
}

impl Document for BranchRecord {
    const COLLECTION: &'static str = "branches";

    fn key(&self) -> &str {
        self.branch_id.as_str()
    }
}

/// Lifecycle stage of a rental request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RentalStatus {
    /// Requested by a customer, awaiting an employee decision.
    Pending,
    /// Accepted; the vehicle is rented.
    Approved,
    /// Declined. Terminal.
    Rejected,
    /// Vehicle returned. Terminal.
    Completed,
}

impl RentalStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [Self; 4] = [Self::Pending, Self::Approved, Self::Rejected, Self::Completed];

    /// The legal successors of this status.
    #[must_use]
    pub const fn successors(self) -> &'static [Self] {
        match self {
            Self::Pending => &[Self::Approved, Self::Rejected],
            Self::Approved => &[Self::Completed],
            Self::Rejected | Self::Completed => &[],
        }
    }

    /// Whether `next` is a legal successor.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        self.successors().contains(&next)
    }

    /// Whether no transition leaves this status.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        self.successors().is_empty()
    }

    /// The vehicle availability a transition into this status imposes, if any.
    #[must_use]
    pub const fn vehicle_side_effect(self) -> Option<AvailabilityStatus> {
        match self {
            Self::Approved => Some(AvailabilityStatus::Rented),
            Self::Completed => Some(AvailabilityStatus::Available),
            Self::Pending | Self::Rejected => None,
        }
    }

    /// Wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for RentalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A requested transition that is not an edge of the rental graph.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("illegal rental transition {from} -> {to}")]
pub struct IllegalTransition {
    /// Current status.
    pub from: RentalStatus,
    /// Requested status.
    pub to: RentalStatus,
}

/// A rental request.
///
/// Status and cost are private: cost is derived at creation, and status only
/// moves along the transition graph via [`RentalRecord::advance`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RentalRecord {
    /// Document key.
    #[serde(rename = "_id")]
    pub rental_id: RentalId,
    /// The rented vehicle.
    pub vehicle_id: VehicleId,
    /// The requesting customer.
    pub customer_id: UserId,
    /// Start of the rental period.
    pub rental_start_date: DateTime<Utc>,
    /// End of the rental period.
    pub rental_end_date: DateTime<Utc>,
    total_cost: f64,
    rental_status: RentalStatus,
}

impl RentalRecord {
    /// Build a new `PENDING` rental, deriving its total cost from the
    /// vehicle's daily price.
    #[must_use]
    pub fn pending(
        rental_id: RentalId,
        vehicle: &VehicleRecord,
        customer_id: UserId,
        rental_start_date: DateTime<Utc>,
        rental_end_date: DateTime<Utc>,
    ) -> Self {
        Self {
            rental_id,
            vehicle_id: vehicle.vehicle_id.clone(),
            customer_id,
            rental_start_date,
            rental_end_date,
            total_cost: total_cost(vehicle.rental_price_per_day, rental_start_date, rental_end_date),
            rental_status: RentalStatus::Pending,
        }
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> RentalStatus {
        self.rental_status
    }

    /// Derived total cost.
    #[must_use]
    pub const fn total_cost(&self) -> f64 {
        self.total_cost
    }

    /// Move to `next`, returning the previous status.
    ///
    /// # Errors
    ///
    /// Returns [`IllegalTransition`] and leaves the record untouched when
    /// `next` is not a successor of the current status.
    pub fn advance(&mut self, next: RentalStatus) -> Result<RentalStatus, IllegalTransition> {
        let from = self.rental_status;
        if !from.can_transition_to(next) {
            return Err(IllegalTransition { from, to: next });
        }
        self.rental_status = next;
        Ok(from)
    }
}

impl Document for RentalRecord {
    const COLLECTION: &'static str = "rentals";

    fn key(&self) -> &str {
        self.rental_id.as_str()
    }
}

/// `price_per_day × max(0, whole days between start and end)`.
#[must_use]
#[allow(clippy::cast_precision_loss)] // Rental spans are far below 2^52 days
pub fn total_cost(price_per_day: f64, start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let days = (end - start).num_days().max(0);
    price_per_day * days as f64
}
