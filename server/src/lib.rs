//! Rentwise server wiring.
//!
//! The binaries in this crate load [`config::Config`] from the environment,
//! connect `PostgreSQL` and Redpanda, and hand the collaborators to the
//! coordinator and the Axum router.

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]

pub mod config;

pub use config::Config;

/// Install the `fmt` subscriber.
///
/// `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,rentwise=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
