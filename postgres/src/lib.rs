//! `PostgreSQL` document store for Rentwise.
//!
//! This crate implements the `DocumentStore` trait from `rentwise-core` on top
//! of sqlx. Each collection is a table of JSONB documents:
//!
//! ```sql
//! CREATE TABLE rentals (id TEXT PRIMARY KEY, doc JSONB NOT NULL);
//! ```
//!
//! - Single-document operations are single statements, so each is atomic
//! - Partial updates merge top-level fields with `doc || $fields`
//! - Filters translate to JSONB predicates evaluated by the database
//!
//! # Example
//!
//! ```ignore
//! use rentwise_postgres::{PostgresDocumentStore, migrate};
//! use rentwise_core::RentalRecord;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = sqlx::PgPool::connect("postgres://localhost/rentwise").await?;
//!     migrate(&pool).await?;
//!     let rentals = PostgresDocumentStore::<RentalRecord>::from_pool(pool);
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use rentwise_core::StoreError;
use rentwise_core::model::{BranchRecord, RentalRecord, UserRecord, VehicleRecord};
use rentwise_core::store::{Document, DocumentStore, FieldSet, Filter, Predicate};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;

/// Collections created by [`migrate`].
pub const COLLECTIONS: [&str; 4] = [
    UserRecord::COLLECTION,
    VehicleRecord::COLLECTION,
    BranchRecord::COLLECTION,
    RentalRecord::COLLECTION,
];

/// Create the collection tables if they do not exist.
///
/// # Errors
///
/// Returns [`StoreError::Backend`] if a statement fails.
pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    for collection in COLLECTIONS {
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {collection} (id TEXT PRIMARY KEY, doc JSONB NOT NULL)"
        ))
        .execute(pool)
        .await
        .map_err(backend)?;
    }
    tracing::info!(collections = ?COLLECTIONS, "Document store schema ready");
    Ok(())
}

/// `PostgreSQL`-backed store for one collection.
///
/// Cloning shares the underlying connection pool.
///
/// # Example
///
/// ```no_run
/// use rentwise_postgres::PostgresDocumentStore;
/// use rentwise_core::VehicleRecord;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let vehicles = PostgresDocumentStore::<VehicleRecord>::new("postgres://localhost/rentwise").await?;
/// # Ok(())
/// # }
/// ```
pub struct PostgresDocumentStore<D> {
    pool: PgPool,
    _document: PhantomData<fn() -> D>,
}

impl<D> Clone for PostgresDocumentStore<D> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            _document: PhantomData,
        }
    }
}

impl<D: Document> PostgresDocumentStore<D> {
    /// Connect to `database_url` with a fresh pool.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the connection fails.
    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url).await.map_err(backend)?;
        Ok(Self::from_pool(pool))
    }

    /// Use an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            _document: PhantomData,
        }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn not_found(key: &str) -> StoreError {
        StoreError::NotFound {
            collection: D::COLLECTION,
            key: key.to_string(),
        }
    }
}

fn backend(error: sqlx::Error) -> StoreError {
    metrics::counter!("document_store.errors").increment(1);
    StoreError::Backend(error.to_string())
}

fn encode<D: Document>(document: &D) -> Result<Value, StoreError> {
    serde_json::to_value(document).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode<D: Document>(value: Value) -> Result<D, StoreError> {
    serde_json::from_value(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Append `filter` as a `WHERE` clause. Field names are bound, never spliced.
fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &Filter) {
    for (i, predicate) in filter.predicates().iter().enumerate() {
        builder.push(if i == 0 { " WHERE " } else { " AND " });
        match predicate {
            Predicate::Eq { field, value } => {
                builder.push("doc -> ");
                builder.push_bind(field.clone());
                builder.push(" = ");
                builder.push_bind(Json(value.clone()));
            },
            Predicate::Gte { field, bound } | Predicate::Lte { field, bound } => {
                let op = if matches!(predicate, Predicate::Gte { .. }) {
                    ">="
                } else {
                    "<="
                };
                builder.push("CASE WHEN jsonb_typeof(doc -> ");
                builder.push_bind(field.clone());
                builder.push(") = 'number' THEN (doc ->> ");
                builder.push_bind(field.clone());
                builder.push(format!(")::float8 {op} "));
                builder.push_bind(*bound);
                builder.push(" ELSE false END");
            },
        }
    }
}

impl<D: Document> DocumentStore<D> for PostgresDocumentStore<D> {
    fn find_by_key(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<D>, StoreError>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let row = sqlx::query(&format!("SELECT doc FROM {} WHERE id = $1", D::COLLECTION))
                .bind(&key)
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;
            match row {
                Some(row) => {
                    let Json(doc): Json<Value> = row.try_get("doc").map_err(backend)?;
                    decode(doc).map(Some)
                },
                None => Ok(None),
            }
        })
    }

    fn insert(&self, document: D) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        Box::pin(async move {
            let key = document.key().to_string();
            let doc = encode(&document)?;
            let result = sqlx::query(&format!(
                "INSERT INTO {} (id, doc) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING",
                D::COLLECTION
            ))
            .bind(&key)
            .bind(Json(doc))
            .execute(&self.pool)
            .await
            .map_err(backend)?;

            if result.rows_affected() == 0 {
                return Err(StoreError::DuplicateKey {
                    collection: D::COLLECTION,
                    key,
                });
            }
            tracing::debug!(collection = D::COLLECTION, key = %key, "Document inserted");
            Ok(())
        })
    }

    fn replace(&self, document: D) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        Box::pin(async move {
            let key = document.key().to_string();
            let doc = encode(&document)?;
            let result = sqlx::query(&format!("UPDATE {} SET doc = $2 WHERE id = $1", D::COLLECTION))
                .bind(&key)
                .bind(Json(doc))
                .execute(&self.pool)
                .await
                .map_err(backend)?;

            if result.rows_affected() == 0 {
                return Err(Self::not_found(&key));
            }
            tracing::debug!(collection = D::COLLECTION, key = %key, "Document replaced");
            Ok(())
        })
    }

    fn partial_update(
        &self,
        key: &str,
        fields: FieldSet,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let result = sqlx::query(&format!(
                "UPDATE {} SET doc = doc || $2 WHERE id = $1",
                D::COLLECTION
            ))
            .bind(&key)
            .bind(Json(Value::Object(fields)))
            .execute(&self.pool)
            .await
            .map_err(backend)?;

            if result.rows_affected() == 0 {
                return Err(Self::not_found(&key));
            }
            tracing::debug!(collection = D::COLLECTION, key = %key, "Document updated");
            Ok(())
        })
    }

    fn delete(&self, key: &str) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let result = sqlx::query(&format!("DELETE FROM {} WHERE id = $1", D::COLLECTION))
                .bind(&key)
                .execute(&self.pool)
                .await
                .map_err(backend)?;

            if result.rows_affected() == 0 {
                return Err(Self::not_found(&key));
            }
            tracing::debug!(collection = D::COLLECTION, key = %key, "Document deleted");
            Ok(())
        })
    }

    fn find(&self, filter: &Filter) -> Pin<Box<dyn Future<Output = Result<Vec<D>, StoreError>> + Send + '_>> {
        let filter = filter.clone();
        Box::pin(async move {
            let mut builder = QueryBuilder::<Postgres>::new(format!("SELECT doc FROM {}", D::COLLECTION));
            push_filter(&mut builder, &filter);
            builder.push(" ORDER BY id");

            let rows = builder.build().fetch_all(&self.pool).await.map_err(backend)?;
            rows.into_iter()
                .map(|row| {
                    let Json(doc): Json<Value> = row.try_get("doc").map_err(backend)?;
                    decode(doc)
                })
                .collect()
        })
    }
}
