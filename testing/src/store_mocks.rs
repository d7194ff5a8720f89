//! In-memory document store for fast, deterministic tests.
//!
//! [`InMemoryDocumentStore`] keeps documents in a `HashMap` keyed by document
//! key and evaluates [`Filter`]s against the serialized JSON form, exactly as
//! the PostgreSQL store evaluates them against JSONB.
//!
//! Writes can be made to fail on demand to exercise partial-failure paths.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Lock poisoning only follows a test panic

use rentwise_core::StoreError;
use rentwise_core::store::{Document, DocumentStore, FieldSet, Filter};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

/// `HashMap`-backed [`DocumentStore`].
///
/// Clones share the same underlying map, so a test can keep a handle for
/// assertions while the coordinator owns another.
///
/// # Example
///
/// ```
/// use rentwise_testing::{InMemoryDocumentStore, fixtures};
/// use rentwise_core::store::DocumentStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let vehicles = InMemoryDocumentStore::with_documents([fixtures::vehicle("V1", 50.0)]);
/// assert!(vehicles.find_by_key("V1").await?.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct InMemoryDocumentStore<D> {
    documents: Arc<RwLock<HashMap<String, D>>>,
    fail_writes: Arc<AtomicBool>,
    writes: Arc<AtomicUsize>,
}

impl<D> Clone for InMemoryDocumentStore<D> {
    fn clone(&self) -> Self {
        Self {
            documents: Arc::clone(&self.documents),
            fail_writes: Arc::clone(&self.fail_writes),
            writes: Arc::clone(&self.writes),
        }
    }
}

impl<D: Document> InMemoryDocumentStore<D> {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            documents: Arc::new(RwLock::new(HashMap::new())),
            fail_writes: Arc::new(AtomicBool::new(false)),
            writes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create a store seeded with `documents`.
    #[must_use]
    pub fn with_documents(documents: impl IntoIterator<Item = D>) -> Self {
        let store = Self::new();
        {
            let mut map = store.documents.write().unwrap();
            for document in documents {
                map.insert(document.key().to_string(), document);
            }
        }
        store
    }

    /// Make every subsequent write fail with [`StoreError::Backend`].
    ///
    /// Reads keep working.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Synchronous snapshot of one document.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<D> {
        self.documents.read().unwrap().get(key).cloned()
    }

    /// Number of stored documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.read().unwrap().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.read().unwrap().is_empty()
    }

    /// Number of successful writes so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(StoreError::Backend(format!(
                "injected write failure on {}",
                D::COLLECTION
            )))
        } else {
            Ok(())
        }
    }

    fn not_found(key: &str) -> StoreError {
        StoreError::NotFound {
            collection: D::COLLECTION,
            key: key.to_string(),
        }
    }

    fn insert_now(&self, document: D) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut map = self.documents.write().unwrap();
        let key = document.key().to_string();
        if map.contains_key(&key) {
            return Err(StoreError::DuplicateKey {
                collection: D::COLLECTION,
                key,
            });
        }
        map.insert(key, document);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn replace_now(&self, document: D) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut map = self.documents.write().unwrap();
        let key = document.key().to_string();
        match map.get_mut(&key) {
            Some(slot) => {
                *slot = document;
                self.writes.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            None => Err(Self::not_found(&key)),
        }
    }

    fn partial_update_now(&self, key: &str, fields: FieldSet) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut map = self.documents.write().unwrap();
        let slot = map.get_mut(key).ok_or_else(|| Self::not_found(key))?;

        let mut merged = match serde_json::to_value(&*slot) {
            Ok(Value::Object(merged)) => merged,
            Ok(_) => return Err(StoreError::Serialization("document is not an object".into())),
            Err(e) => return Err(StoreError::Serialization(e.to_string())),
        };
        merged.extend(fields);
        *slot = serde_json::from_value(Value::Object(merged))
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn delete_now(&self, key: &str) -> Result<(), StoreError> {
        self.check_writable()?;
        let removed = self.documents.write().unwrap().remove(key);
        if removed.is_some() {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        } else {
            Err(Self::not_found(key))
        }
    }

    fn find_now(&self, filter: &Filter) -> Result<Vec<D>, StoreError> {
        let map = self.documents.read().unwrap();
        let mut found = Vec::new();
        for document in map.values() {
            let json =
                serde_json::to_value(document).map_err(|e| StoreError::Serialization(e.to_string()))?;
            if filter.matches(&json) {
                found.push(document.clone());
            }
        }
        found.sort_by(|a, b| a.key().cmp(b.key()));
        Ok(found)
    }
}

impl<D: Document> Default for InMemoryDocumentStore<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Document> DocumentStore<D> for InMemoryDocumentStore<D> {
    fn find_by_key(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<D>, StoreError>> + Send + '_>> {
        let found = self.get(key);
        Box::pin(async move { Ok(found) })
    }

    fn insert(&self, document: D) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        Box::pin(async move { self.insert_now(document) })
    }

    fn replace(&self, document: D) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        Box::pin(async move { self.replace_now(document) })
    }

    fn partial_update(
        &self,
        key: &str,
        fields: FieldSet,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move { self.partial_update_now(&key, fields) })
    }

    fn delete(&self, key: &str) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move { self.delete_now(&key) })
    }

    fn find(&self, filter: &Filter) -> Pin<Box<dyn Future<Output = Result<Vec<D>, StoreError>> + Send + '_>> {
        let result = self.find_now(filter);
        Box::pin(async move { result })
    }
}
