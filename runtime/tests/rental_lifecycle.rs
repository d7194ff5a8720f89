//! Integration tests for the rental lifecycle coordinator
//!
//! Drives the state machine over in-memory collaborators and checks the
//! store, the recorded events and what live connections receive.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic
#![allow(clippy::float_cmp)]

use rentwise_core::{
    AvailabilityStatus, ErrorKind, EventType, Identity, Notification, RentalError, RentalId,
    RentalRecord, RentalStatus, UserId, UserRecord, UserRole, VehicleId, VehicleRecord,
};
use rentwise_core::store::FieldSet;
use rentwise_runtime::{ConnectionHandle, Coordinator, CoordinatorConfig, NewRental, Stores};
use rentwise_testing::{InMemoryDocumentStore, RecordingEventLog, fixtures, test_clock};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::Receiver;

// ============================================================================
// Test Fixtures
// ============================================================================

struct Harness {
    coordinator: Coordinator,
    vehicles: InMemoryDocumentStore<VehicleRecord>,
    rentals: InMemoryDocumentStore<RentalRecord>,
    log: RecordingEventLog,
}

fn harness() -> Harness {
    harness_with(CoordinatorConfig::default().with_notify_timeout(Duration::from_millis(100)))
}

fn harness_with(config: CoordinatorConfig) -> Harness {
    rentwise_testing::init_test_tracing();
    let users: InMemoryDocumentStore<UserRecord> = InMemoryDocumentStore::with_documents([
        fixtures::customer("C1"),
        fixtures::customer("C2"),
        fixtures::employee("E1"),
    ]);
    let vehicles = InMemoryDocumentStore::with_documents([
        fixtures::vehicle("V1", 50.0),
        fixtures::vehicle("V2", 80.0),
    ]);
    let rentals = InMemoryDocumentStore::new();
    let log = RecordingEventLog::new();

    let coordinator = Coordinator::new(
        Stores {
            users: Arc::new(users),
            vehicles: Arc::new(vehicles.clone()),
            rentals: Arc::new(rentals.clone()),
        },
        Arc::new(log.clone()),
        Arc::new(test_clock()),
        config,
    );
    Harness {
        coordinator,
        vehicles,
        rentals,
        log,
    }
}

impl Harness {
    async fn connect(&self, id: &str, role: UserRole) -> Receiver<Notification> {
        let (handle, receiver) = self.coordinator.open_connection();
        self.coordinator
            .registry()
            .register(&Identity::new(UserId::new(id), role), handle)
            .await;
        receiver
    }

    async fn create(&self, rental_id: &str, vehicle_id: &str, customer_id: &str) -> Result<RentalRecord, RentalError> {
        self.coordinator
            .machine()
            .create_rental(NewRental {
                rental_id: Some(RentalId::new(rental_id)),
                vehicle_id: VehicleId::new(vehicle_id),
                customer_id: UserId::new(customer_id),
                rental_start_date: fixtures::day(0),
                rental_end_date: fixtures::day(3),
            })
            .await
    }

    async fn transition(&self, rental_id: &str, next: RentalStatus) -> Result<RentalRecord, RentalError> {
        self.coordinator
            .machine()
            .transition_status(&RentalId::new(rental_id), next)
            .await
    }

    fn availability(&self, vehicle_id: &str) -> AvailabilityStatus {
        self.vehicles.get(vehicle_id).unwrap().availability_status
    }

    async fn events_for(&self, key: &str) -> Vec<EventType> {
        self.coordinator.publisher().flush().await;
        self.log.event_types_for_key(key)
    }
}

async fn set_vehicle_fields(h: &Harness, vehicle_id: &str, value: serde_json::Value) {
    let fields: FieldSet = value.as_object().cloned().unwrap();
    h.coordinator
        .catalog()
        .update_vehicle(&VehicleId::new(vehicle_id), fields)
        .await
        .unwrap();
}

fn drain(receiver: &mut Receiver<Notification>) -> Vec<Notification> {
    let mut messages = Vec::new();
    while let Ok(message) = receiver.try_recv() {
        messages.push(message);
    }
    messages
}

fn status_updates(messages: &[Notification]) -> Vec<RentalStatus> {
    messages
        .iter()
        .filter_map(|message| match message {
            Notification::RentalStatusUpdate { new_status, .. } => Some(*new_status),
            _ => None,
        })
        .collect()
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn full_lifecycle_keeps_vehicle_in_step() {
    let h = harness();
    let mut employee = h.connect("E1", UserRole::Employee).await;
    let mut customer = h.connect("C1", UserRole::Customer).await;

    let rental = h.create("R1", "V1", "C1").await.unwrap();
    assert_eq!(rental.total_cost(), 150.0);
    assert_eq!(rental.status(), RentalStatus::Pending);
    assert_eq!(h.availability("V1"), AvailabilityStatus::Available);

    let to_employee = drain(&mut employee);
    assert!(matches!(
        to_employee.as_slice(),
        [Notification::NewRentalRequest { status: RentalStatus::Pending, .. }]
    ));
    assert!(drain(&mut customer).is_empty());

    h.transition("R1", RentalStatus::Approved).await.unwrap();
    assert_eq!(h.availability("V1"), AvailabilityStatus::Rented);
    assert_eq!(status_updates(&drain(&mut customer)), [RentalStatus::Approved]);
    let to_employee = drain(&mut employee);
    assert_eq!(status_updates(&to_employee), [RentalStatus::Approved]);
    assert!(to_employee.iter().any(|m| matches!(
        m,
        Notification::VehicleStatusUpdate { new_status: AvailabilityStatus::Rented, .. }
    )));

    h.transition("R1", RentalStatus::Completed).await.unwrap();
    assert_eq!(h.availability("V1"), AvailabilityStatus::Available);

    let err = h.transition("R1", RentalStatus::Approved).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    assert_eq!(
        h.rentals.get("R1").unwrap().status(),
        RentalStatus::Completed
    );
}

#[tokio::test]
async fn rental_key_sees_three_ordered_events() {
    let h = harness();
    h.create("R1", "V1", "C1").await.unwrap();
    h.transition("R1", RentalStatus::Approved).await.unwrap();
    h.transition("R1", RentalStatus::Completed).await.unwrap();

    assert_eq!(
        h.events_for("R1").await,
        [
            EventType::RentalCreated,
            EventType::RentalApproved,
            EventType::RentalCompleted
        ]
    );
    assert_eq!(
        h.log.event_types_for_key("V1"),
        [EventType::VehicleStatusChanged, EventType::VehicleStatusChanged]
    );
}

#[tokio::test]
async fn event_payloads_match_wire_contract() {
    let h = harness();
    h.create("R1", "V1", "C1").await.unwrap();
    h.transition("R1", RentalStatus::Approved).await.unwrap();
    h.coordinator.publisher().flush().await;

    let events = h.log.events_for_key("R1");
    assert_eq!(events[0].data()["id"], "R1");
    assert_eq!(events[0].data()["rental_data"]["rental_status"], "PENDING");
    assert_eq!(events[0].data()["rental_data"]["total_cost"], 150.0);
    assert_eq!(events[1].data()["new_status"], "APPROVED");

    let vehicle_events = h.log.events_for_key("V1");
    assert_eq!(vehicle_events[0].data()["status"], "RENTED");
}

#[tokio::test]
async fn rejection_leaves_vehicle_untouched() {
    let h = harness();
    h.create("R1", "V1", "C1").await.unwrap();
    h.transition("R1", RentalStatus::Rejected).await.unwrap();

    assert_eq!(h.availability("V1"), AvailabilityStatus::Available);
    assert_eq!(
        h.events_for("R1").await,
        [EventType::RentalCreated, EventType::RentalRejected]
    );
    assert!(h.log.event_types_for_key("V1").is_empty());
}

// ============================================================================
// Rejections
// ============================================================================

#[tokio::test]
async fn create_against_rented_vehicle_is_unavailable() {
    let h = harness();
    h.create("R1", "V1", "C1").await.unwrap();
    h.transition("R1", RentalStatus::Approved).await.unwrap();

    let err = h.create("R2", "V1", "C2").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::VehicleUnavailable);
    assert!(h.rentals.get("R2").is_none());
    assert!(h.events_for("R2").await.is_empty());
}

#[tokio::test]
async fn create_checks_references_in_order() {
    let h = harness();
    h.create("R1", "V1", "C1").await.unwrap();

    let err = h.create("R1", "missing", "missing").await.unwrap_err();
    assert_eq!(err, RentalError::Conflict(RentalId::new("R1")));

    let err = h.create("R2", "missing", "missing").await.unwrap_err();
    assert_eq!(err.to_string(), "Vehicle with id missing not found");

    let err = h.create("R2", "V2", "missing").await.unwrap_err();
    assert_eq!(err.to_string(), "Customer with id missing not found");
    assert_eq!(h.rentals.len(), 1);
}

#[tokio::test]
async fn create_without_id_generates_one() {
    let h = harness();
    let rental = h
        .coordinator
        .machine()
        .create_rental(NewRental {
            rental_id: None,
            vehicle_id: VehicleId::new("V1"),
            customer_id: UserId::new("C1"),
            rental_start_date: fixtures::day(0),
            rental_end_date: fixtures::day(1),
        })
        .await
        .unwrap();
    assert_eq!(rental.rental_id.as_str().len(), 36);
    assert!(h.rentals.get(rental.rental_id.as_str()).is_some());
}

#[tokio::test]
async fn illegal_transition_changes_nothing() {
    let h = harness();
    h.create("R1", "V1", "C1").await.unwrap();

    let err = h.transition("R1", RentalStatus::Completed).await.unwrap_err();
    assert_eq!(
        err,
        RentalError::InvalidTransition {
            rental_id: RentalId::new("R1"),
            from: RentalStatus::Pending,
            to: RentalStatus::Completed,
        }
    );
    assert_eq!(h.rentals.get("R1").unwrap().status(), RentalStatus::Pending);
    assert_eq!(h.availability("V1"), AvailabilityStatus::Available);
    assert_eq!(h.events_for("R1").await, [EventType::RentalCreated]);
}

#[tokio::test]
async fn unknown_rental_is_not_found() {
    let h = harness();
    let err = h.transition("nope", RentalStatus::Approved).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = h
        .coordinator
        .machine()
        .delete_rental(&RentalId::new("nope"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

// ============================================================================
// Competing rentals for one vehicle
// ============================================================================

#[tokio::test]
async fn second_approval_for_same_vehicle_is_refused() {
    let h = harness();
    h.create("R1", "V1", "C1").await.unwrap();
    h.create("R2", "V1", "C2").await.unwrap();

    h.transition("R1", RentalStatus::Approved).await.unwrap();
    let err = h.transition("R2", RentalStatus::Approved).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::VehicleUnavailable);
    assert_eq!(h.rentals.get("R2").unwrap().status(), RentalStatus::Pending);
    h.transition("R2", RentalStatus::Rejected).await.unwrap();
}

#[tokio::test]
async fn maintenance_vehicle_cannot_be_requested() {
    let h = harness();
    set_vehicle_fields(&h, "V1", json!({"availability_status": "MAINTENANCE"})).await;

    let err = h.create("R1", "V1", "C1").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::VehicleUnavailable);
    assert!(h.rentals.get("R1").is_none());
    assert!(h.events_for("R1").await.is_empty());
}

#[tokio::test]
async fn approval_refused_after_vehicle_goes_to_maintenance() {
    let h = harness();
    h.create("R1", "V1", "C1").await.unwrap();
    set_vehicle_fields(&h, "V1", json!({"availability_status": "MAINTENANCE"})).await;

    let err = h.transition("R1", RentalStatus::Approved).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::VehicleUnavailable);
    assert_eq!(h.rentals.get("R1").unwrap().status(), RentalStatus::Pending);
    assert_eq!(h.availability("V1"), AvailabilityStatus::Maintenance);
    assert_eq!(h.events_for("R1").await, [EventType::RentalCreated]);
}

#[tokio::test]
async fn concurrent_approvals_admit_exactly_one() {
    let h = harness();
    h.create("R1", "V1", "C1").await.unwrap();
    h.create("R2", "V1", "C2").await.unwrap();

    let (first, second) = tokio::join!(
        h.transition("R1", RentalStatus::Approved),
        h.transition("R2", RentalStatus::Approved),
    );

    assert_eq!(
        usize::from(first.is_ok()) + usize::from(second.is_ok()),
        1
    );
    assert_eq!(h.availability("V1"), AvailabilityStatus::Rented);
}

// ============================================================================
// Side-effect failures
// ============================================================================

#[tokio::test]
async fn failed_vehicle_write_keeps_rental_transition() {
    let h = harness();
    h.create("R1", "V1", "C1").await.unwrap();
    h.vehicles.fail_writes(true);

    let rental = h.transition("R1", RentalStatus::Approved).await.unwrap();

    assert_eq!(rental.status(), RentalStatus::Approved);
    assert_eq!(h.rentals.get("R1").unwrap().status(), RentalStatus::Approved);
    assert_eq!(h.availability("V1"), AvailabilityStatus::Available);
    assert_eq!(
        h.events_for("R1").await,
        [EventType::RentalCreated, EventType::RentalApproved]
    );
    assert!(h.log.event_types_for_key("V1").is_empty());
}

#[tokio::test]
async fn publish_failures_are_invisible_to_callers() {
    let h = harness();
    h.log.fail_publishes(true);

    h.create("R1", "V1", "C1").await.unwrap();
    h.transition("R1", RentalStatus::Approved).await.unwrap();

    assert!(h.events_for("R1").await.is_empty());
    assert_eq!(h.availability("V1"), AvailabilityStatus::Rented);
}

#[tokio::test]
async fn slow_employee_does_not_hold_vehicle_lock() {
    let h = harness_with(CoordinatorConfig::default().with_notify_timeout(Duration::from_millis(500)));
    h.create("R1", "V1", "C1").await.unwrap();

    // A stalled session: one-slot buffer, filled and never drained
    let (stalled, _receiver) = ConnectionHandle::channel(1);
    h.coordinator
        .registry()
        .register(&Identity::new(UserId::new("E1"), UserRole::Employee), stalled)
        .await;
    set_vehicle_fields(&h, "V2", json!({"availability_status": "MAINTENANCE"})).await;

    let coordinator = h.coordinator.clone();
    let approval = tokio::spawn(async move {
        coordinator
            .machine()
            .transition_status(&RentalId::new("R1"), RentalStatus::Approved)
            .await
    });
    while h.availability("V1") != AvailabilityStatus::Rented {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let started = tokio::time::Instant::now();
    set_vehicle_fields(&h, "V1", json!({"location": "Airport"})).await;
    assert!(
        started.elapsed() < Duration::from_millis(200),
        "vehicle edit waited {:?}",
        started.elapsed()
    );

    assert!(approval.await.unwrap().is_ok());
    assert_eq!(h.vehicles.get("V1").unwrap().location, "Airport");
}

#[tokio::test]
async fn dead_connection_does_not_fail_transition() {
    let h = harness();
    let dead = h.connect("E1", UserRole::Employee).await;
    drop(dead);

    h.create("R1", "V1", "C1").await.unwrap();
    assert!(h.transition("R1", RentalStatus::Approved).await.is_ok());
}

// ============================================================================
// Delete and queries
// ============================================================================

#[tokio::test]
async fn delete_is_unconditional_and_keeps_vehicle_status() {
    let h = harness();
    h.create("R1", "V1", "C1").await.unwrap();
    h.transition("R1", RentalStatus::Approved).await.unwrap();

    h.coordinator
        .machine()
        .delete_rental(&RentalId::new("R1"))
        .await
        .unwrap();

    assert!(h.rentals.get("R1").is_none());
    assert_eq!(h.availability("V1"), AvailabilityStatus::Rented);
    assert_eq!(
        h.events_for("R1").await.last(),
        Some(&EventType::RentalDeleted)
    );
}

#[tokio::test]
async fn history_lists_completed_rentals_of_vehicle() {
    let h = harness();
    h.create("R1", "V1", "C1").await.unwrap();
    h.transition("R1", RentalStatus::Approved).await.unwrap();
    h.transition("R1", RentalStatus::Completed).await.unwrap();
    h.create("R2", "V1", "C2").await.unwrap();
    h.create("R3", "V2", "C2").await.unwrap();

    let machine = h.coordinator.machine();
    let history = machine
        .vehicle_rental_history(&VehicleId::new("V1"))
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].rental_id, RentalId::new("R1"));

    assert_eq!(machine.list_rentals().await.unwrap().len(), 3);
    assert_eq!(
        machine.get_rental(&RentalId::new("R2")).await.unwrap().status(),
        RentalStatus::Pending
    );
    assert_eq!(
        machine
            .vehicle_rental_history(&VehicleId::new("nope"))
            .await
            .unwrap_err()
            .kind(),
        ErrorKind::NotFound
    );
}

#[tokio::test]
async fn disconnected_identity_receives_no_broadcast() {
    let h = harness();
    let (handle, mut receiver) = h.coordinator.open_connection();
    let connection_id = handle.id();
    let employee = Identity::new(UserId::new("E1"), UserRole::Employee);
    h.coordinator.registry().register(&employee, handle).await;
    h.coordinator
        .registry()
        .unregister(&employee.id, connection_id)
        .await;

    h.create("R1", "V1", "C1").await.unwrap();
    assert!(drain(&mut receiver).is_empty());

    h.coordinator.shutdown().await;
}
