//! Row store abstraction
//!
//! The gateway operates exclusively through [`RowStore`], so the same request
//! path runs against Postgres in production and [`MemoryStore`] in tests and
//! local runs. Rows are plain JSON objects; the store owns typing.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

use crate::filter::Filter;
use crate::permissions::TableSpec;
use crate::request::QueryOptions;

/// One table row as a JSON object.
pub type Row = Map<String, JsonValue>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Rejected by the store; the message is passed through verbatim.
    #[error("{0}")]
    Database(String),

    #[error("JSON object requested, multiple (or no) rows returned ({rows} rows)")]
    Cardinality { rows: usize },
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) => StoreError::Database(db.message().to_string()),
            other => StoreError::Database(other.to_string()),
        }
    }
}

/// Result page of a select.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub rows: Vec<Row>,
    /// Total matching rows, ignoring limit. Only set when a count was requested.
    pub count: Option<i64>,
}

impl Selection {
    /// Strict single-row read: exactly one row or a cardinality error.
    pub fn into_single(self) -> Result<Row, StoreError> {
        let rows = self.rows.len();
        let mut iter = self.rows.into_iter();
        match (iter.next(), iter.next()) {
            (Some(row), None) => Ok(row),
            _ => Err(StoreError::Cardinality { rows }),
        }
    }
}

/// Persistence seam for gateway operations. Each method is one round-trip.
#[async_trait]
pub trait RowStore: Send + Sync {
    async fn select(
        &self,
        table: &TableSpec,
        filters: &[Filter],
        options: &QueryOptions,
    ) -> Result<Selection, StoreError>;

    /// Write one or more rows and return them as stored.
    async fn insert(&self, table: &TableSpec, rows: &[Row]) -> Result<Vec<Row>, StoreError>;

    /// Apply `patch` to every row matching all filters; returns the updated rows.
    async fn update(
        &self,
        table: &TableSpec,
        patch: &Row,
        filters: &[Filter],
    ) -> Result<Vec<Row>, StoreError>;

    /// Insert, or replace the supplied columns on primary-key conflict.
    async fn upsert(&self, table: &TableSpec, rows: &[Row]) -> Result<Vec<Row>, StoreError>;

    /// Remove every row matching all filters; returns the removed rows.
    async fn delete(&self, table: &TableSpec, filters: &[Filter]) -> Result<Vec<Row>, StoreError>;
}
