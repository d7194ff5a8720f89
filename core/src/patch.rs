//! Partial updates against compile-time field whitelists.
//!
//! Each patchable record declares the top-level fields a caller may change.
//! [`apply_patch`] rejects anything outside that set, merges the rest into the
//! serialized record and re-validates the merged result, so a patch can never
//! produce a record that could not have been created directly.
//!
//! [`RentalRecord`](crate::model::RentalRecord) is deliberately absent: its
//! status only moves through the state machine and its cost is derived.

use crate::error::RentalError;
use crate::model::{BranchRecord, UserRecord, VehicleRecord};
use crate::store::FieldSet;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// Why a patch was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    /// No fields were supplied.
    #[error("No fields to update")]
    Empty,

    /// Fields outside the whitelist, sorted.
    #[error("Cannot update fields: {}", .0.join(", "))]
    UnknownFields(Vec<String>),

    /// The merged record failed to decode or validate.
    #[error("Invalid update: {0}")]
    Invalid(String),
}

impl From<PatchError> for RentalError {
    fn from(error: PatchError) -> Self {
        Self::Validation(error.to_string())
    }
}

/// A record that accepts partial updates.
pub trait Patchable: Serialize + DeserializeOwned {
    /// Top-level fields a patch may set.
    const MUTABLE_FIELDS: &'static [&'static str];

    /// Record-level invariants, checked after every merge.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason for the first violated invariant.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Merge `fields` into `record`, returning the validated result.
///
/// `record` is not modified.
///
/// # Errors
///
/// See [`PatchError`].
pub fn apply_patch<T: Patchable>(record: &T, fields: &FieldSet) -> Result<T, PatchError> {
    if fields.is_empty() {
        return Err(PatchError::Empty);
    }

    let mut unknown: Vec<String> = fields
        .keys()
        .filter(|name| !T::MUTABLE_FIELDS.contains(&name.as_str()))
        .cloned()
        .collect();
    if !unknown.is_empty() {
        unknown.sort();
        return Err(PatchError::UnknownFields(unknown));
    }

    let mut merged = match serde_json::to_value(record) {
        Ok(Value::Object(map)) => map,
        Ok(_) => return Err(PatchError::Invalid("record is not an object".to_string())),
        Err(e) => return Err(PatchError::Invalid(e.to_string())),
    };
    for (name, value) in fields {
        merged.insert(name.clone(), value.clone());
    }

    let patched: T = serde_json::from_value(Value::Object(merged))
        .map_err(|e| PatchError::Invalid(e.to_string()))?;
    patched.validate().map_err(PatchError::Invalid)?;
    Ok(patched)
}

fn require_non_blank(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{field} must not be blank"))
    } else {
        Ok(())
    }
}

impl Patchable for UserRecord {
    const MUTABLE_FIELDS: &'static [&'static str] = &["name", "email", "role"];

    fn validate(&self) -> Result<(), String> {
        require_non_blank("name", &self.name)?;
        if !self.email.contains('@') {
            return Err(format!("{} is not an email address", self.email));
        }
        Ok(())
    }
}

impl Patchable for VehicleRecord {
    const MUTABLE_FIELDS: &'static [&'static str] = &[
        "name",
        "model",
        "vehicle_type",
        "rental_price_per_day",
        "availability_status",
        "location",
    ];

    fn validate(&self) -> Result<(), String> {
        require_non_blank("name", &self.name)?;
        if self.rental_price_per_day.is_finite() && self.rental_price_per_day > 0.0 {
            Ok(())
        } else {
            Err("rental_price_per_day must be greater than 0".to_string())
        }
    }
}

impl Patchable for BranchRecord {
    const MUTABLE_FIELDS: &'static [&'static str] = &["name", "location", "contact_number"];

    fn validate(&self) -> Result<(), String> {
        require_non_blank("name", &self.name)
    }
}
