//! Postgres row store
//!
//! Column types are not known at compile time, so every operand travels as a
//! single jsonb bind and is typed server-side through the table's own row
//! type: `jsonb_populate_record(NULL::"schema"."table", $n)`. Identifiers are
//! validated upstream and always double-quoted here; values are always bound.
//!
//! Each operation is one statement. Writes run inside a `WITH written AS (...)`
//! CTE so the affected rows come back as a single jsonb array.

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder, Row as _};
use tracing::debug;

use super::{Row, RowStore, Selection, StoreError};
use crate::filter::{Filter, FilterOp};
use crate::permissions::TableSpec;
use crate::request::QueryOptions;

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    schema: String,
}

impl PgStore {
    pub fn new(pool: PgPool, schema: impl Into<String>) -> Self {
        Self {
            pool,
            schema: schema.into(),
        }
    }

    fn target(&self, table: &TableSpec) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(table.name))
    }

    async fn fetch_written(
        &self,
        mut query: QueryBuilder<'static, Postgres>,
    ) -> Result<Vec<Row>, StoreError> {
        debug!(sql = query.sql(), "executing write");
        let row = query.build().fetch_one(&self.pool).await?;
        let Json(rows): Json<Vec<Row>> = row.try_get("data")?;
        Ok(rows)
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn single_column(column: &str, value: &JsonValue) -> JsonValue {
    let mut object = Map::new();
    object.insert(column.to_string(), value.clone());
    JsonValue::Object(object)
}

/// Column names across all rows, first-seen order. Rows missing a column
/// write NULL for it.
fn column_union(rows: &[Row]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }
    columns
}

/// `(jsonb_populate_record(NULL::target, {"col": value})).col`, i.e. the
/// operand cast to the column's declared type.
fn push_typed_operand(
    query: &mut QueryBuilder<'static, Postgres>,
    target: &str,
    column: &str,
    value: &JsonValue,
) {
    query.push(format!("(jsonb_populate_record(NULL::{target}, "));
    query.push_bind(Json(single_column(column, value)));
    query.push(format!(")).{}", quote_ident(column)));
}

fn push_comparison(
    query: &mut QueryBuilder<'static, Postgres>,
    target: &str,
    lhs: &str,
    operator: &str,
    filter: &Filter,
) {
    query.push(format!("{lhs} {operator} "));
    push_typed_operand(query, target, &filter.column, &filter.value);
}

fn push_filters(
    query: &mut QueryBuilder<'static, Postgres>,
    target: &str,
    alias: Option<&str>,
    filters: &[Filter],
) {
    for (i, filter) in filters.iter().enumerate() {
        query.push(if i == 0 { " WHERE " } else { " AND " });

        let column = quote_ident(&filter.column);
        let lhs = match alias {
            Some(alias) => format!("{alias}.{column}"),
            None => column.clone(),
        };

        match filter.op {
            FilterOp::Eq => push_comparison(query, target, &lhs, "=", filter),
            FilterOp::Neq => push_comparison(query, target, &lhs, "<>", filter),
            FilterOp::Gt => push_comparison(query, target, &lhs, ">", filter),
            FilterOp::Gte => push_comparison(query, target, &lhs, ">=", filter),
            FilterOp::Lt => push_comparison(query, target, &lhs, "<", filter),
            FilterOp::Lte => push_comparison(query, target, &lhs, "<=", filter),
            FilterOp::Contains => push_comparison(query, target, &lhs, "@>", filter),
            FilterOp::ContainedBy => push_comparison(query, target, &lhs, "<@", filter),
            FilterOp::Like | FilterOp::Ilike => {
                let keyword = if filter.op == FilterOp::Like {
                    "LIKE"
                } else {
                    "ILIKE"
                };
                query.push(format!("{lhs}::text {keyword} "));
                query.push_bind(filter.value.as_str().unwrap_or_default().to_string());
            }
            FilterOp::Is => {
                query.push(lhs);
                query.push(match filter.value {
                    JsonValue::Bool(true) => " IS TRUE",
                    JsonValue::Bool(false) => " IS FALSE",
                    _ => " IS NULL",
                });
            }
            FilterOp::In => {
                let items: Vec<JsonValue> = filter
                    .value
                    .as_array()
                    .map(|items| {
                        items
                            .iter()
                            .map(|item| single_column(&filter.column, item))
                            .collect()
                    })
                    .unwrap_or_default();
                query.push(format!(
                    "{lhs} = ANY(ARRAY(SELECT {column} FROM jsonb_populate_recordset(NULL::{target}, "
                ));
                query.push_bind(Json(JsonValue::Array(items)));
                query.push(")))");
            }
        }
    }
}

fn push_written_rows(query: &mut QueryBuilder<'static, Postgres>) {
    query.push(") SELECT COALESCE(jsonb_agg(to_jsonb(written)), '[]'::jsonb) AS data FROM written");
}

fn select_query(
    target: &str,
    filters: &[Filter],
    options: &QueryOptions,
) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::new(format!("WITH matched AS (SELECT * FROM {target}"));
    push_filters(&mut query, target, None, filters);
    query.push("), page AS (SELECT * FROM matched");

    let direction = options.order.as_ref().map(|order| {
        let dir = if order.ascending { "ASC" } else { "DESC" };
        (quote_ident(&order.column), dir)
    });
    if let Some((column, dir)) = &direction {
        query.push(format!(" ORDER BY {column} {dir}"));
    }
    if let Some(limit) = options.limit {
        query.push(" LIMIT ");
        query.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
    }

    query.push(") SELECT COALESCE((SELECT jsonb_agg(to_jsonb(page)");
    if let Some((column, dir)) = &direction {
        query.push(format!(" ORDER BY page.{column} {dir}"));
    }
    query.push(") FROM page), '[]'::jsonb) AS data, ");
    query.push(if options.count.is_some() {
        "(SELECT count(*) FROM matched) AS total"
    } else {
        "NULL::bigint AS total"
    });
    query
}

fn insert_query(
    target: &str,
    rows: &[Row],
    conflict_key: Option<&[&'static str]>,
) -> QueryBuilder<'static, Postgres> {
    let columns = column_union(rows);
    let column_list = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");

    let mut query = QueryBuilder::new(format!("WITH written AS (INSERT INTO {target}"));
    query.push(format!(
        " ({column_list}) SELECT {column_list} FROM jsonb_populate_recordset(NULL::{target}, "
    ));
    query.push_bind(Json(JsonValue::Array(
        rows.iter().cloned().map(JsonValue::Object).collect(),
    )));
    query.push(")");

    if let Some(key) = conflict_key {
        let excluded = |c: &str| {
            let quoted = quote_ident(c);
            format!("{quoted} = EXCLUDED.{quoted}")
        };
        let mut assignments: Vec<String> = columns
            .iter()
            .filter(|c| !key.iter().any(|k| *k == c.as_str()))
            .map(|c| excluded(c))
            .collect();
        if assignments.is_empty() {
            // Nothing but the key was supplied; still return the existing row.
            assignments = key.iter().map(|k| excluded(k)).collect();
        }
        let key_list = key.iter().map(|k| quote_ident(k)).collect::<Vec<_>>();
        query.push(format!(
            " ON CONFLICT ({}) DO UPDATE SET {}",
            key_list.join(", "),
            assignments.join(", ")
        ));
    }

    query.push(" RETURNING *");
    push_written_rows(&mut query);
    query
}

fn update_query(target: &str, patch: &Row, filters: &[Filter]) -> QueryBuilder<'static, Postgres> {
    let assignments = patch
        .keys()
        .map(|c| {
            let quoted = quote_ident(c);
            format!("{quoted} = src.{quoted}")
        })
        .collect::<Vec<_>>()
        .join(", ");

    let mut query = QueryBuilder::new(format!(
        "WITH written AS (UPDATE {target} AS target SET {assignments} FROM jsonb_populate_record(NULL::{target}, "
    ));
    query.push_bind(Json(JsonValue::Object(patch.clone())));
    query.push(") AS src");
    push_filters(&mut query, target, Some("target"), filters);
    query.push(" RETURNING target.*");
    push_written_rows(&mut query);
    query
}

fn delete_query(target: &str, filters: &[Filter]) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::new(format!("WITH written AS (DELETE FROM {target}"));
    push_filters(&mut query, target, None, filters);
    query.push(" RETURNING *");
    push_written_rows(&mut query);
    query
}

#[async_trait]
impl RowStore for PgStore {
    async fn select(
        &self,
        table: &TableSpec,
        filters: &[Filter],
        options: &QueryOptions,
    ) -> Result<Selection, StoreError> {
        let mut query = select_query(&self.target(table), filters, options);
        debug!(sql = query.sql(), "executing select");
        let row = query.build().fetch_one(&self.pool).await?;
        let Json(rows): Json<Vec<Row>> = row.try_get("data")?;
        let count: Option<i64> = row.try_get("total")?;
        Ok(Selection { rows, count })
    }

    async fn insert(&self, table: &TableSpec, rows: &[Row]) -> Result<Vec<Row>, StoreError> {
        self.fetch_written(insert_query(&self.target(table), rows, None))
            .await
    }

    async fn update(
        &self,
        table: &TableSpec,
        patch: &Row,
        filters: &[Filter],
    ) -> Result<Vec<Row>, StoreError> {
        self.fetch_written(update_query(&self.target(table), patch, filters))
            .await
    }

    async fn upsert(&self, table: &TableSpec, rows: &[Row]) -> Result<Vec<Row>, StoreError> {
        self.fetch_written(insert_query(
            &self.target(table),
            rows,
            Some(table.primary_key),
        ))
        .await
    }

    async fn delete(&self, table: &TableSpec, filters: &[Filter]) -> Result<Vec<Row>, StoreError> {
        self.fetch_written(delete_query(&self.target(table), filters))
            .await
    }
}
