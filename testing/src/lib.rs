//! # Rentwise Testing
//!
//! Testing utilities for the Rentwise rental coordinator.
//!
//! This crate provides:
//! - [`InMemoryDocumentStore`]: `HashMap`-backed document store with write-failure injection
//! - [`RecordingEventLog`]: event log that records instead of publishing
//! - [`FixedClock`]: deterministic time
//! - [`fixtures`]: ready-made users, vehicles and rental periods
//!
//! ## Example
//!
//! ```ignore
//! use rentwise_testing::{InMemoryDocumentStore, RecordingEventLog, fixtures, test_clock};
//!
//! #[tokio::test]
//! async fn approve_rents_the_vehicle() {
//!     let vehicles = InMemoryDocumentStore::with_documents([fixtures::vehicle("V1", 50.0)]);
//!     let log = RecordingEventLog::new();
//!     // build a coordinator over these collaborators ...
//! }
//! ```

use chrono::{DateTime, Utc};
use rentwise_core::environment::Clock;

mod event_log_mocks;
mod store_mocks;

pub use event_log_mocks::RecordingEventLog;
pub use store_mocks::InMemoryDocumentStore;

/// Mock implementations of environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use rentwise_testing::mocks::FixedClock;
    /// use rentwise_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(super::fixtures::day0())
    }
}

/// Ready-made records.
///
/// Passwords of fixture users are `"secret"`.
pub mod fixtures {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use rentwise_core::ids::{UserId, VehicleId};
    use rentwise_core::model::{
        AvailabilityStatus, UserRecord, UserRole, VehicleRecord, VehicleType,
    };

    use std::sync::LazyLock;

    /// Plain-text password of every fixture user.
    pub const SECRET: &str = "secret";

    /// bcrypt hash of [`SECRET`] at the minimum cost, computed once per
    /// process.
    #[must_use]
    #[allow(clippy::expect_used)] // Cost 4 is always valid
    pub fn secret_hash() -> &'static str {
        static HASH: LazyLock<String> =
            LazyLock::new(|| bcrypt::hash(SECRET, 4).expect("bcrypt cost 4 is valid"));
        &HASH
    }

    /// 2025-01-01 00:00:00 UTC.
    #[must_use]
    pub fn day0() -> DateTime<Utc> {
        Utc.timestamp_opt(1_735_689_600, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    /// `day0 + days`.
    #[must_use]
    pub fn day(days: i64) -> DateTime<Utc> {
        day0() + Duration::days(days)
    }

    /// An AVAILABLE car at `price` per day.
    #[must_use]
    pub fn vehicle(id: &str, price: f64) -> VehicleRecord {
        VehicleRecord {
            vehicle_id: VehicleId::new(id),
            name: format!("Vehicle {id}"),
            model: "2024".to_string(),
            vehicle_type: VehicleType::Car,
            rental_price_per_day: price,
            availability_status: AvailabilityStatus::Available,
            location: "Downtown".to_string(),
        }
    }

    /// A user with the given role and password `"secret"`.
    #[must_use]
    pub fn user(id: &str, role: UserRole) -> UserRecord {
        UserRecord {
            user_id: UserId::new(id),
            name: format!("User {id}"),
            email: format!("{}@example.com", id.to_lowercase()),
            password_hash: secret_hash().to_string(),
            role,
        }
    }

    /// A customer with password `"secret"`.
    #[must_use]
    pub fn customer(id: &str) -> UserRecord {
        user(id, UserRole::Customer)
    }

    /// An employee with password `"secret"`.
    #[must_use]
    pub fn employee(id: &str) -> UserRecord {
        user(id, UserRole::Employee)
    }
}

/// Install a test-writer tracing subscriber once per process.
///
/// Honours `RUST_LOG`; later calls are no-ops.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use mocks::{FixedClock, test_clock};
