//! HTTP surface tests over in-memory collaborators.
//!
//! Each test logs in through `POST /auth/token` and drives the routes the way
//! a client would.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use axum::http::StatusCode;
use axum_test::TestServer;
use rentwise_core::{
    AvailabilityStatus, RentalRecord, RentalStatus, UserRecord, VehicleRecord,
};
use rentwise_runtime::{Coordinator, CoordinatorConfig, Stores};
use rentwise_testing::{InMemoryDocumentStore, RecordingEventLog, fixtures, test_clock};
use rentwise_web::{AppState, TokenService, router};
use serde_json::{Value, json};
use std::sync::Arc;

// ============================================================================
// Setup
// ============================================================================

struct Api {
    server: TestServer,
    vehicles: InMemoryDocumentStore<VehicleRecord>,
    rentals: InMemoryDocumentStore<RentalRecord>,
}

fn api() -> Api {
    rentwise_testing::init_test_tracing();
    let users: InMemoryDocumentStore<UserRecord> = InMemoryDocumentStore::with_documents([
        fixtures::customer("C1"),
        fixtures::employee("E1"),
    ]);
    let vehicles = InMemoryDocumentStore::with_documents([
        fixtures::vehicle("V1", 50.0),
        fixtures::vehicle("V2", 80.0),
    ]);
    let rentals = InMemoryDocumentStore::new();
    let clock = Arc::new(test_clock());

    let coordinator = Coordinator::new(
        Stores {
            users: Arc::new(users.clone()),
            vehicles: Arc::new(vehicles.clone()),
            rentals: Arc::new(rentals.clone()),
        },
        Arc::new(RecordingEventLog::new()),
        clock.clone(),
        CoordinatorConfig::default(),
    );
    let tokens = Arc::new(TokenService::new(chrono::Duration::minutes(30), clock));
    let state = AppState::new(coordinator, Arc::new(users), tokens);

    Api {
        server: TestServer::new(router(state)).unwrap(),
        vehicles,
        rentals,
    }
}

impl Api {
    async fn login(&self, email: &str) -> String {
        let response = self
            .server
            .post("/auth/token")
            .json(&json!({"email": email, "password": "secret"}))
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["token_type"], "bearer");
        body["access_token"].as_str().unwrap().to_string()
    }

    async fn request_rental(&self, token: &str, rental_id: &str, vehicle_id: &str) -> axum_test::TestResponse {
        self.server
            .post("/rentals")
            .authorization_bearer(token)
            .json(&json!({
                "rental_id": rental_id,
                "vehicle_id": vehicle_id,
                "rental_start_date": "2025-01-01T00:00:00Z",
                "rental_end_date": "2025-01-04T00:00:00Z",
            }))
            .await
    }
}

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn test_health() {
    let api = api();
    let response = api.server.get("/health").await;
    response.assert_status_ok();
    response.assert_text("ok");
}

#[tokio::test]
async fn test_wrong_password_is_unauthorized() {
    let api = api();
    let response = api
        .server
        .post("/auth/token")
        .json(&json!({"email": "c1@example.com", "password": "guess"}))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["code"], "UNAUTHENTICATED");
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let api = api();
    let response = api.server.get("/rentals/R1").await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_employee_cannot_request_rental() {
    let api = api();
    let token = api.login("e1@example.com").await;

    let response = api.request_rental(&token, "R1", "V1").await;

    response.assert_status(StatusCode::FORBIDDEN);
    assert!(api.rentals.is_empty());
}

// ============================================================================
// Rental lifecycle
// ============================================================================

#[tokio::test]
async fn test_customer_requests_and_employee_approves() {
    let api = api();
    let customer = api.login("c1@example.com").await;
    let employee = api.login("e1@example.com").await;

    let response = api.request_rental(&customer, "R1", "V1").await;
    response.assert_status(StatusCode::CREATED);
    let created: Value = response.json();
    assert_eq!(created["_id"], "R1");
    assert_eq!(created["customer_id"], "C1");
    assert_eq!(created["rental_status"], "PENDING");
    assert_eq!(created["total_cost"], 150.0);

    let response = api
        .server
        .put("/rentals/R1/rental_status")
        .authorization_bearer(&employee)
        .json(&json!({"rental_status": "APPROVED"}))
        .await;
    response.assert_status_ok();
    let approved: Value = response.json();
    assert_eq!(approved["rental_status"], "APPROVED");
    assert_eq!(
        api.vehicles.get("V1").unwrap().availability_status,
        AvailabilityStatus::Rented
    );

    let response = api.server.get("/rentals/R1").authorization_bearer(&customer).await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["rental_status"], "APPROVED");
}

#[tokio::test]
async fn test_customer_cannot_change_status() {
    let api = api();
    let customer = api.login("c1@example.com").await;
    api.request_rental(&customer, "R1", "V1")
        .await
        .assert_status(StatusCode::CREATED);

    let response = api
        .server
        .put("/rentals/R1/rental_status")
        .authorization_bearer(&customer)
        .json(&json!({"rental_status": "APPROVED"}))
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
    assert_eq!(api.rentals.get("R1").unwrap().status(), RentalStatus::Pending);
}

#[tokio::test]
async fn test_illegal_transition_is_unprocessable() {
    let api = api();
    let customer = api.login("c1@example.com").await;
    let employee = api.login("e1@example.com").await;
    api.request_rental(&customer, "R1", "V1")
        .await
        .assert_status(StatusCode::CREATED);

    let response = api
        .server
        .put("/rentals/R1/rental_status")
        .authorization_bearer(&employee)
        .json(&json!({"rental_status": "COMPLETED"}))
        .await;

    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.json::<Value>()["code"], "INVALID_TRANSITION");
}

#[tokio::test]
async fn test_duplicate_rental_id_conflicts() {
    let api = api();
    let customer = api.login("c1@example.com").await;
    api.request_rental(&customer, "R1", "V1")
        .await
        .assert_status(StatusCode::CREATED);

    let response = api.request_rental(&customer, "R1", "V2").await;

    response.assert_status(StatusCode::CONFLICT);
    assert_eq!(response.json::<Value>()["code"], "CONFLICT");
}

#[tokio::test]
async fn test_unknown_vehicle_is_not_found() {
    let api = api();
    let customer = api.login("c1@example.com").await;

    let response = api.request_rental(&customer, "R1", "V404").await;

    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["code"], "NOT_FOUND");
    assert_eq!(body["message"], "Vehicle with id V404 not found");
}

#[tokio::test]
async fn test_delete_and_list_rentals() {
    let api = api();
    let customer = api.login("c1@example.com").await;
    let employee = api.login("e1@example.com").await;
    api.request_rental(&customer, "R1", "V1")
        .await
        .assert_status(StatusCode::CREATED);
    api.request_rental(&customer, "R2", "V2")
        .await
        .assert_status(StatusCode::CREATED);

    api.server
        .get("/rentals")
        .authorization_bearer(&customer)
        .await
        .assert_status(StatusCode::FORBIDDEN);

    api.server
        .delete("/rentals/R1")
        .authorization_bearer(&employee)
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let response = api.server.get("/rentals").authorization_bearer(&employee).await;
    response.assert_status_ok();
    let rentals: Vec<Value> = response.json();
    assert_eq!(rentals.len(), 1);
    assert_eq!(rentals[0]["_id"], "R2");
}

// ============================================================================
// Vehicles
// ============================================================================

#[tokio::test]
async fn test_vehicle_patch_is_whitelisted() {
    let api = api();
    let employee = api.login("e1@example.com").await;

    let response = api
        .server
        .patch("/vehicles/V1")
        .authorization_bearer(&employee)
        .json(&json!({"_id": "V9"}))
        .await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.json::<Value>()["code"], "VALIDATION_ERROR");

    let response = api
        .server
        .patch("/vehicles/V1")
        .authorization_bearer(&employee)
        .json(&json!({"location": "Airport"}))
        .await;
    response.assert_status_ok();
    assert_eq!(api.vehicles.get("V1").unwrap().location, "Airport");
}

#[tokio::test]
async fn test_vehicle_search_by_price() {
    let api = api();
    let customer = api.login("c1@example.com").await;

    let response = api
        .server
        .get("/vehicles")
        .add_query_param("min_price", 60)
        .authorization_bearer(&customer)
        .await;

    response.assert_status_ok();
    let vehicles: Vec<Value> = response.json();
    assert_eq!(vehicles.len(), 1);
    assert_eq!(vehicles[0]["_id"], "V2");
}

#[tokio::test]
async fn test_rental_history_lists_completed_only() {
    let api = api();
    let customer = api.login("c1@example.com").await;
    let employee = api.login("e1@example.com").await;
    api.request_rental(&customer, "R1", "V1")
        .await
        .assert_status(StatusCode::CREATED);
    for status in ["APPROVED", "COMPLETED"] {
        api.server
            .put("/rentals/R1/rental_status")
            .authorization_bearer(&employee)
            .json(&json!({"rental_status": status}))
            .await
            .assert_status_ok();
    }
    api.request_rental(&customer, "R2", "V1")
        .await
        .assert_status(StatusCode::CREATED);

    let response = api
        .server
        .get("/vehicles/V1/rental_history")
        .authorization_bearer(&customer)
        .await;

    response.assert_status_ok();
    let history: Vec<Value> = response.json();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["_id"], "R1");
    assert_eq!(
        api.vehicles.get("V1").unwrap().availability_status,
        AvailabilityStatus::Available
    );
}

#[tokio::test]
async fn test_metrics_disabled_is_not_found() {
    let api = api();
    api.server
        .get("/metrics")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}
