//! HTTP request handlers.
//!
//! This module contains all HTTP handlers organized by domain.

pub mod health;
pub mod login;
pub mod rentals;
pub mod vehicles;
pub mod websocket;

pub use health::{health_check, metrics};
