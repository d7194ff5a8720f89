//! Axum surface for Rentwise.
//!
//! A thin shell over the rental coordinator: handlers authenticate the
//! caller, check the role, call one coordinator operation and map the result.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │           HTTP shell (Axum)             │  ← JSON, bearer tokens
//! │  - Request parsing                      │  ← role checks before mutation
//! │  - Error mapping ({code, message})      │  ← websocket sessions
//! ├─────────────────────────────────────────┤
//! │      Coordinator (rentwise-runtime)     │
//! │  - Rental state machine                 │
//! │  - Availability sync, fan-out, events   │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use rentwise_web::{AppState, router};
//!
//! let app = router(AppState::new(coordinator, users, tokens));
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
//! axum::serve(listener, app).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod state;

use axum::{
    Router,
    routing::{get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

// Re-export key types for convenience
pub use auth::TokenService;
pub use error::AppError;
pub use extractors::CurrentIdentity;
pub use state::AppState;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;

/// Build the application router.
///
/// # Routes
///
/// | Method | Path | Role |
/// |---|---|---|
/// | `GET` | `/health` | none |
/// | `GET` | `/metrics` | none |
/// | `POST` | `/auth/token` | none |
/// | `GET` | `/ws/:user_id` | none |
/// | `POST` | `/rentals` | customer |
/// | `GET` | `/rentals` | employee |
/// | `GET` | `/rentals/:id` | any |
/// | `PUT` | `/rentals/:id/rental_status` | employee |
/// | `DELETE` | `/rentals/:id` | employee |
/// | `GET` | `/vehicles` | any |
/// | `GET` | `/vehicles/:id` | any |
/// | `PATCH` | `/vehicles/:id` | employee |
/// | `GET` | `/vehicles/:id/rental_history` | any |
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics))
        .route("/auth/token", post(handlers::login::issue_token))
        .route("/ws/:user_id", get(handlers::websocket::connect))
        .route(
            "/rentals",
            post(handlers::rentals::create_rental).get(handlers::rentals::list_rentals),
        )
        .route(
            "/rentals/:id",
            get(handlers::rentals::get_rental).delete(handlers::rentals::delete_rental),
        )
        .route(
            "/rentals/:id/rental_status",
            put(handlers::rentals::update_rental_status),
        )
        .route("/vehicles", get(handlers::vehicles::search_vehicles))
        .route(
            "/vehicles/:id",
            get(handlers::vehicles::get_vehicle).patch(handlers::vehicles::update_vehicle),
        )
        .route(
            "/vehicles/:id/rental_history",
            get(handlers::vehicles::rental_history),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
