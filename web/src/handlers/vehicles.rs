//! Vehicle routes.

use crate::auth::require_role;
use crate::error::AppError;
use crate::extractors::CurrentIdentity;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
};
use rentwise_core::model::VehicleSearch;
use rentwise_core::store::FieldSet;
use rentwise_core::{RentalRecord, UserRole, VehicleId, VehicleRecord};

/// Search vehicles by type, price range, location and availability.
///
/// # Endpoint
///
/// ```text
/// GET /vehicles?vehicle_type=SUV&min_price=40&max_price=90&availability_status=AVAILABLE
/// ```
///
/// # Errors
///
/// `401` without a valid token.
pub async fn search_vehicles(
    State(state): State<AppState>,
    CurrentIdentity(_identity): CurrentIdentity,
    Query(search): Query<VehicleSearch>,
) -> Result<Json<Vec<VehicleRecord>>, AppError> {
    Ok(Json(state.coordinator.catalog().search(&search).await?))
}

/// One vehicle.
///
/// # Endpoint
///
/// ```text
/// GET /vehicles/:id
/// ```
///
/// # Errors
///
/// `404` if the vehicle does not exist.
pub async fn get_vehicle(
    State(state): State<AppState>,
    CurrentIdentity(_identity): CurrentIdentity,
    Path(vehicle_id): Path<VehicleId>,
) -> Result<Json<VehicleRecord>, AppError> {
    Ok(Json(state.coordinator.catalog().get_vehicle(&vehicle_id).await?))
}

/// Partially update a vehicle. Employees only.
///
/// # Endpoint
///
/// ```text
/// PATCH /vehicles/:id
/// ```
///
/// # Errors
///
/// `403` for non-employees, `404`, or `422 VALIDATION_ERROR` for empty
/// patches, non-whitelisted fields and invalid results.
pub async fn update_vehicle(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(vehicle_id): Path<VehicleId>,
    Json(fields): Json<FieldSet>,
) -> Result<Json<VehicleRecord>, AppError> {
    require_role(&identity, UserRole::Employee)?;
    let vehicle = state
        .coordinator
        .catalog()
        .update_vehicle(&vehicle_id, fields)
        .await?;
    Ok(Json(vehicle))
}

/// Completed rentals of a vehicle.
///
/// # Endpoint
///
/// ```text
/// GET /vehicles/:id/rental_history
/// ```
///
/// # Errors
///
/// `404` if the vehicle does not exist.
pub async fn rental_history(
    State(state): State<AppState>,
    CurrentIdentity(_identity): CurrentIdentity,
    Path(vehicle_id): Path<VehicleId>,
) -> Result<Json<Vec<RentalRecord>>, AppError> {
    let history = state
        .coordinator
        .machine()
        .vehicle_rental_history(&vehicle_id)
        .await?;
    Ok(Json(history))
}
