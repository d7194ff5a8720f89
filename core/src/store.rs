//! Document store collaborator.
//!
//! The store is an external collaborator: it provides atomic single-document
//! read/write/delete by key plus filtered enumeration. Nothing here offers
//! transactions across documents, and the coordinator does not assume any.
//!
//! # Implementations
//!
//! - `PostgresDocumentStore` (in `rentwise-postgres`): JSONB documents, one table per collection
//! - `InMemoryDocumentStore` (in `rentwise-testing`): `HashMap`-backed, with write-failure injection
//!
//! # Example
//!
//! ```no_run
//! use rentwise_core::model::{VehicleRecord, VehicleSearch, AvailabilityStatus};
//! use rentwise_core::store::DocumentStore;
//! use rentwise_core::StoreError;
//!
//! async fn available_vehicles(
//!     store: &dyn DocumentStore<VehicleRecord>,
//! ) -> Result<Vec<VehicleRecord>, StoreError> {
//!     let search = VehicleSearch {
//!         availability_status: Some(AvailabilityStatus::Available),
//!         ..VehicleSearch::default()
//!     };
//!     store.find(&search.to_filter()).await
//! }
//! ```

use crate::error::StoreError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;

/// A set of top-level field assignments applied by a partial update.
pub type FieldSet = serde_json::Map<String, Value>;

/// A record that lives in a named collection under a string key.
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Collection (table) name.
    const COLLECTION: &'static str;

    /// The document key.
    fn key(&self) -> &str;
}

/// One predicate over a top-level document field.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Field equals the given JSON value.
    Eq {
        /// Field name.
        field: String,
        /// Expected value.
        value: Value,
    },
    /// Numeric field is at least `bound`.
    Gte {
        /// Field name.
        field: String,
        /// Inclusive lower bound.
        bound: f64,
    },
    /// Numeric field is at most `bound`.
    Lte {
        /// Field name.
        field: String,
        /// Inclusive upper bound.
        bound: f64,
    },
}

impl Predicate {
    /// The field this predicate constrains.
    #[must_use]
    pub fn field(&self) -> &str {
        match self {
            Self::Eq { field, .. } | Self::Gte { field, .. } | Self::Lte { field, .. } => field,
        }
    }

    fn matches(&self, document: &serde_json::Map<String, Value>) -> bool {
        let actual = document.get(self.field());
        match self {
            Self::Eq { value, .. } => actual == Some(value),
            Self::Gte { bound, .. } => actual.and_then(Value::as_f64).is_some_and(|v| v >= *bound),
            Self::Lte { bound, .. } => actual.and_then(Value::as_f64).is_some_and(|v| v <= *bound),
        }
    }
}

/// Conjunction of predicates. The empty filter matches every document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    predicates: Vec<Predicate>,
}

impl Filter {
    /// The empty filter.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            predicates: Vec::new(),
        }
    }

    /// Add an equality predicate.
    #[must_use]
    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.predicates.push(Predicate::Eq {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Add an inclusive lower bound.
    #[must_use]
    pub fn where_gte(mut self, field: impl Into<String>, bound: f64) -> Self {
        self.predicates.push(Predicate::Gte {
            field: field.into(),
            bound,
        });
        self
    }

    /// Add an inclusive upper bound.
    #[must_use]
    pub fn where_lte(mut self, field: impl Into<String>, bound: f64) -> Self {
        self.predicates.push(Predicate::Lte {
            field: field.into(),
            bound,
        });
        self
    }

    /// The predicates, in insertion order.
    #[must_use]
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Evaluate against a serialized document. Non-objects never match.
    #[must_use]
    pub fn matches(&self, document: &Value) -> bool {
        document
            .as_object()
            .is_some_and(|fields| self.predicates.iter().all(|p| p.matches(fields)))
    }
}

/// Document store abstraction, one instance per collection.
///
/// Every operation is atomic for the single document it touches and nothing
/// more. Writes are last-write-wins.
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// so coordinators can hold `Arc<dyn DocumentStore<D>>`.
pub trait DocumentStore<D: Document>: Send + Sync {
    /// Load a document by key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] or [`StoreError::Serialization`] on
    /// transport or decoding failure. An absent key is `Ok(None)`.
    fn find_by_key(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<D>, StoreError>> + Send + '_>>;

    /// Insert a new document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateKey`] if the key already exists.
    fn insert(&self, document: D) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>>;

    /// Replace an existing document wholesale.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the key does not exist.
    fn replace(&self, document: D) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>>;

    /// Overwrite the given top-level fields of an existing document.
    ///
    /// The store does not validate the field set; callers go through
    /// [`crate::patch::apply_patch`] or write fields they own.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the key does not exist.
    fn partial_update(
        &self,
        key: &str,
        fields: FieldSet,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>>;

    /// Delete a document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the key does not exist.
    fn delete(&self, key: &str) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>>;

    /// Enumerate documents matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] or [`StoreError::Serialization`].
    fn find(&self, filter: &Filter) -> Pin<Box<dyn Future<Output = Result<Vec<D>, StoreError>> + Send + '_>>;
}
