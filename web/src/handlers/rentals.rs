//! Rental routes.
//!
//! Thin wrappers over the rental state machine. Role checks run before any
//! call into the coordinator, so a forbidden request mutates nothing.

use crate::auth::require_role;
use crate::error::AppError;
use crate::extractors::CurrentIdentity;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use rentwise_core::{DateTime, RentalId, RentalRecord, RentalStatus, UserRole, Utc, VehicleId};
use rentwise_runtime::NewRental;
use serde::Deserialize;

/// Body of `POST /rentals`.
///
/// The customer is the caller; any status supplied is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRentalRequest {
    /// Optional client-chosen key.
    #[serde(default, alias = "_id")]
    pub rental_id: Option<RentalId>,
    /// The vehicle to rent.
    pub vehicle_id: VehicleId,
    /// Start of the rental period.
    pub rental_start_date: DateTime<Utc>,
    /// End of the rental period.
    pub rental_end_date: DateTime<Utc>,
}

/// Body of `PUT /rentals/:id/rental_status`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct StatusChange {
    /// Target status.
    pub rental_status: RentalStatus,
}

/// Request a rental. Customers only.
///
/// # Endpoint
///
/// ```text
/// POST /rentals
/// ```
///
/// # Errors
///
/// `403` for non-customers, then any [`rentwise_core::RentalError`] from creation.
pub async fn create_rental(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Json(request): Json<CreateRentalRequest>,
) -> Result<(StatusCode, Json<RentalRecord>), AppError> {
    require_role(&identity, UserRole::Customer)?;
    let rental = state
        .coordinator
        .machine()
        .create_rental(NewRental {
            rental_id: request.rental_id,
            vehicle_id: request.vehicle_id,
            customer_id: identity.id,
            rental_start_date: request.rental_start_date,
            rental_end_date: request.rental_end_date,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(rental)))
}

/// Every rental. Employees only.
///
/// # Endpoint
///
/// ```text
/// GET /rentals
/// ```
///
/// # Errors
///
/// `403` for non-employees.
pub async fn list_rentals(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
) -> Result<Json<Vec<RentalRecord>>, AppError> {
    require_role(&identity, UserRole::Employee)?;
    Ok(Json(state.coordinator.machine().list_rentals().await?))
}

/// One rental.
///
/// # Endpoint
///
/// ```text
/// GET /rentals/:id
/// ```
///
/// # Errors
///
/// `404` if the rental does not exist.
pub async fn get_rental(
    State(state): State<AppState>,
    CurrentIdentity(_identity): CurrentIdentity,
    Path(rental_id): Path<RentalId>,
) -> Result<Json<RentalRecord>, AppError> {
    Ok(Json(state.coordinator.machine().get_rental(&rental_id).await?))
}

/// Approve, reject or complete a rental. Employees only.
///
/// # Endpoint
///
/// ```text
/// PUT /rentals/:id/rental_status
/// ```
///
/// # Errors
///
/// `403` for non-employees, `404`, `409 VEHICLE_UNAVAILABLE` or
/// `422 INVALID_TRANSITION`.
pub async fn update_rental_status(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(rental_id): Path<RentalId>,
    Json(change): Json<StatusChange>,
) -> Result<Json<RentalRecord>, AppError> {
    require_role(&identity, UserRole::Employee)?;
    let rental = state
        .coordinator
        .machine()
        .transition_status(&rental_id, change.rental_status)
        .await?;
    Ok(Json(rental))
}

/// Delete a rental. Employees only.
///
/// # Endpoint
///
/// ```text
/// DELETE /rentals/:id
/// ```
///
/// # Errors
///
/// `403` for non-employees, `404` if the rental does not exist.
pub async fn delete_rental(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(rental_id): Path<RentalId>,
) -> Result<StatusCode, AppError> {
    require_role(&identity, UserRole::Employee)?;
    state.coordinator.machine().delete_rental(&rental_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
