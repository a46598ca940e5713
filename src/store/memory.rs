//! In-process row store
//!
//! Same contract as the Postgres store, evaluated over JSON rows held in
//! memory. Used by the HTTP tests and by `--in-memory` local runs. Only the
//! primary key gets a default (a v4 UUID); there is no schema.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Row, RowStore, Selection, StoreError};
use crate::filter::{compare_values, Filter};
use crate::permissions::TableSpec;
use crate::request::{OrderBy, QueryOptions};

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<HashMap<String, Vec<Row>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a table directly, bypassing the gateway. Test fixture helper.
    pub async fn seed(&self, table: &str, rows: impl IntoIterator<Item = Row>) {
        let mut tables = self.tables.write().await;
        tables.entry(table.to_string()).or_default().extend(rows);
    }

    /// Snapshot of a table's rows in storage order.
    pub async fn rows(&self, table: &str) -> Vec<Row> {
        let tables = self.tables.read().await;
        tables.get(table).cloned().unwrap_or_default()
    }
}

fn matches_all(row: &Row, filters: &[Filter]) -> bool {
    filters.iter().all(|f| f.matches(row))
}

fn key_of(table: &TableSpec, row: &Row) -> Vec<JsonValue> {
    table
        .primary_key
        .iter()
        .map(|col| row.get(*col).cloned().unwrap_or(JsonValue::Null))
        .collect()
}

fn with_default_key(table: &TableSpec, row: &Row) -> Row {
    let mut row = row.clone();
    for col in table.primary_key {
        if row.get(*col).map_or(true, JsonValue::is_null) {
            row.insert(
                (*col).to_string(),
                JsonValue::String(Uuid::new_v4().to_string()),
            );
        }
    }
    row
}

fn duplicate_key(table: &TableSpec) -> StoreError {
    StoreError::Database(format!(
        "duplicate key value violates unique constraint \"{}_pkey\"",
        table.name
    ))
}

/// Ascending puts NULLs last; descending reverses, putting them first.
fn sort_rows(rows: &mut [Row], order: &OrderBy) {
    rows.sort_by(|a, b| {
        let x = a.get(&order.column).unwrap_or(&JsonValue::Null);
        let y = b.get(&order.column).unwrap_or(&JsonValue::Null);
        let ord = match (x.is_null(), y.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => compare_values(x, y).unwrap_or(Ordering::Equal),
        };
        if order.ascending {
            ord
        } else {
            ord.reverse()
        }
    });
}

#[async_trait]
impl RowStore for MemoryStore {
    async fn select(
        &self,
        table: &TableSpec,
        filters: &[Filter],
        options: &QueryOptions,
    ) -> Result<Selection, StoreError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Row> = tables
            .get(table.name)
            .map(|rows| {
                rows.iter()
                    .filter(|row| matches_all(row, filters))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let count = options.count.map(|_| rows.len() as i64);

        if let Some(order) = &options.order {
            sort_rows(&mut rows, order);
        }
        if let Some(limit) = options.limit {
            rows.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }

        Ok(Selection { rows, count })
    }

    async fn insert(&self, table: &TableSpec, rows: &[Row]) -> Result<Vec<Row>, StoreError> {
        let mut tables = self.tables.write().await;
        let stored = tables.entry(table.name.to_string()).or_default();

        let written: Vec<Row> = rows.iter().map(|row| with_default_key(table, row)).collect();

        // All-or-nothing: reject the batch before touching storage.
        let mut keys: Vec<Vec<JsonValue>> = stored.iter().map(|r| key_of(table, r)).collect();
        for row in &written {
            let key = key_of(table, row);
            if keys.contains(&key) {
                return Err(duplicate_key(table));
            }
            keys.push(key);
        }

        stored.extend(written.iter().cloned());
        Ok(written)
    }

    async fn update(
        &self,
        table: &TableSpec,
        patch: &Row,
        filters: &[Filter],
    ) -> Result<Vec<Row>, StoreError> {
        let mut tables = self.tables.write().await;
        let Some(stored) = tables.get_mut(table.name) else {
            return Ok(Vec::new());
        };

        // Patch copies first so a key collision leaves storage untouched.
        let mut next = stored.clone();
        let mut updated = Vec::new();
        for row in next.iter_mut().filter(|row| matches_all(row, filters)) {
            for (col, value) in patch {
                row.insert(col.clone(), value.clone());
            }
            updated.push(row.clone());
        }

        if table.primary_key.iter().any(|col| patch.contains_key(*col)) {
            let mut keys: Vec<Vec<JsonValue>> = Vec::with_capacity(next.len());
            for row in &next {
                let key = key_of(table, row);
                if keys.contains(&key) {
                    return Err(duplicate_key(table));
                }
                keys.push(key);
            }
        }

        *stored = next;
        Ok(updated)
    }

    async fn upsert(&self, table: &TableSpec, rows: &[Row]) -> Result<Vec<Row>, StoreError> {
        let mut tables = self.tables.write().await;
        let stored = tables.entry(table.name.to_string()).or_default();

        let incoming: Vec<Row> = rows.iter().map(|row| with_default_key(table, row)).collect();
        let mut keys: Vec<Vec<JsonValue>> = Vec::with_capacity(incoming.len());
        for row in &incoming {
            let key = key_of(table, row);
            if keys.contains(&key) {
                return Err(StoreError::Database(
                    "ON CONFLICT DO UPDATE command cannot affect row a second time".to_string(),
                ));
            }
            keys.push(key);
        }

        let mut written = Vec::with_capacity(incoming.len());
        for (incoming, key) in incoming.into_iter().zip(keys) {
            match stored.iter_mut().find(|row| key_of(table, row) == key) {
                Some(existing) => {
                    for (col, value) in &incoming {
                        existing.insert(col.clone(), value.clone());
                    }
                    written.push(existing.clone());
                }
                None => {
                    stored.push(incoming.clone());
                    written.push(incoming);
                }
            }
        }
        Ok(written)
    }

    async fn delete(&self, table: &TableSpec, filters: &[Filter]) -> Result<Vec<Row>, StoreError> {
        let mut tables = self.tables.write().await;
        let Some(stored) = tables.get_mut(table.name) else {
            return Ok(Vec::new());
        };

        let (removed, kept): (Vec<Row>, Vec<Row>) = std::mem::take(stored)
            .into_iter()
            .partition(|row| matches_all(row, filters));
        *stored = kept;
        Ok(removed)
    }
}
