//! Integration tests for vehicle search and whitelisted vehicle edits

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic
#![allow(clippy::float_cmp)]

use rentwise_core::model::VehicleSearch;
use rentwise_core::store::FieldSet;
use rentwise_core::{
    AvailabilityStatus, ErrorKind, EventType, Identity, Notification, RentalRecord, UserId,
    UserRecord, UserRole, VehicleId, VehicleRecord,
};
use rentwise_runtime::{Coordinator, CoordinatorConfig, Stores};
use rentwise_testing::{InMemoryDocumentStore, RecordingEventLog, fixtures, test_clock};
use serde_json::json;
use std::sync::Arc;

fn setup() -> (Coordinator, InMemoryDocumentStore<VehicleRecord>, RecordingEventLog) {
    rentwise_testing::init_test_tracing();
    let users: InMemoryDocumentStore<UserRecord> =
        InMemoryDocumentStore::with_documents([fixtures::employee("E1")]);
    let vehicles = InMemoryDocumentStore::with_documents([
        fixtures::vehicle("V1", 30.0),
        fixtures::vehicle("V2", 60.0),
        fixtures::vehicle("V3", 90.0),
    ]);
    let rentals: InMemoryDocumentStore<RentalRecord> = InMemoryDocumentStore::new();
    let log = RecordingEventLog::new();

    let coordinator = Coordinator::new(
        Stores {
            users: Arc::new(users),
            vehicles: Arc::new(vehicles.clone()),
            rentals: Arc::new(rentals),
        },
        Arc::new(log.clone()),
        Arc::new(test_clock()),
        CoordinatorConfig::default(),
    );
    (coordinator, vehicles, log)
}

fn fields(value: serde_json::Value) -> FieldSet {
    value.as_object().cloned().unwrap()
}

#[tokio::test]
async fn search_combines_price_range_and_status() {
    let (coordinator, _vehicles, _log) = setup();
    coordinator
        .catalog()
        .update_vehicle(&VehicleId::new("V2"), fields(json!({"availability_status": "RENTED"})))
        .await
        .unwrap();

    let found = coordinator
        .catalog()
        .search(&VehicleSearch {
            min_price: Some(20.0),
            max_price: Some(70.0),
            availability_status: Some(AvailabilityStatus::Available),
            ..VehicleSearch::default()
        })
        .await
        .unwrap();

    let ids: Vec<&str> = found.iter().map(|v| v.vehicle_id.as_str()).collect();
    assert_eq!(ids, ["V1"]);
}

#[tokio::test]
async fn update_writes_whitelisted_fields_and_emits_event() {
    let (coordinator, vehicles, log) = setup();

    let updated = coordinator
        .catalog()
        .update_vehicle(
            &VehicleId::new("V1"),
            fields(json!({"rental_price_per_day": 35.5, "location": "Airport"})),
        )
        .await
        .unwrap();

    assert_eq!(updated.rental_price_per_day, 35.5);
    assert_eq!(vehicles.get("V1").unwrap().location, "Airport");

    coordinator.publisher().flush().await;
    let events = log.events_for_key("V1");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type(), EventType::VehicleUpdated);
    assert_eq!(events[0].data()["updated_fields"]["location"], "Airport");
}

#[tokio::test]
async fn update_rejects_fields_outside_whitelist() {
    let (coordinator, vehicles, log) = setup();

    let err = coordinator
        .catalog()
        .update_vehicle(&VehicleId::new("V1"), fields(json!({"_id": "V9", "color": "red"})))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains("_id, color"));
    assert_eq!(vehicles.get("V1").unwrap(), fixtures::vehicle("V1", 30.0));
    coordinator.publisher().flush().await;
    assert!(log.events().is_empty());
}

#[tokio::test]
async fn update_of_missing_vehicle_is_not_found() {
    let (coordinator, _vehicles, _log) = setup();

    let err = coordinator
        .catalog()
        .update_vehicle(&VehicleId::new("V404"), fields(json!({"name": "Ghost"})))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.to_string(), "Vehicle with id V404 not found");
}

#[tokio::test]
async fn availability_change_is_pushed_to_employees() {
    let (coordinator, _vehicles, _log) = setup();
    let (handle, mut receiver) = coordinator.open_connection();
    coordinator
        .registry()
        .register(&Identity::new(UserId::new("E1"), UserRole::Employee), handle)
        .await;

    coordinator
        .catalog()
        .update_vehicle(
            &VehicleId::new("V3"),
            fields(json!({"availability_status": "MAINTENANCE"})),
        )
        .await
        .unwrap();

    assert_eq!(
        receiver.try_recv().unwrap(),
        Notification::VehicleStatusUpdate {
            vehicle_id: VehicleId::new("V3"),
            new_status: AvailabilityStatus::Maintenance,
        }
    );
}
