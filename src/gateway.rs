//! Request dispatch
//!
//! Maps a validated [`GatewayRequest`] onto exactly one store call and shapes
//! the result for the envelope.

use serde_json::Value as JsonValue;
use tracing::{debug, error};

use crate::error::GatewayError;
use crate::request::{GatewayRequest, Operation};
use crate::store::{Row, RowStore, StoreError};

/// Successful outcome: the envelope's `data` and optional `count`.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayOutcome {
    pub data: JsonValue,
    pub count: Option<i64>,
}

impl GatewayOutcome {
    fn rows(rows: Vec<Row>) -> Self {
        Self {
            data: JsonValue::Array(rows.into_iter().map(JsonValue::Object).collect()),
            count: None,
        }
    }
}

pub async fn dispatch(
    store: &dyn RowStore,
    request: GatewayRequest,
) -> Result<GatewayOutcome, GatewayError> {
    let table = request.table;
    let action = request.operation.action();
    debug!(table = table.name, %action, "dispatching");

    let result = match request.operation {
        Operation::Select { filters, options } => {
            store
                .select(table, &filters, &options)
                .await
                .and_then(|selection| {
                    if options.single {
                        let count = selection.count;
                        selection.into_single().map(|row| GatewayOutcome {
                            data: JsonValue::Object(row),
                            count,
                        })
                    } else {
                        Ok(GatewayOutcome {
                            data: JsonValue::Array(
                                selection.rows.into_iter().map(JsonValue::Object).collect(),
                            ),
                            count: selection.count,
                        })
                    }
                })
        }
        Operation::Insert { rows } => store.insert(table, &rows).await.map(GatewayOutcome::rows),
        Operation::Update { patch, filters } => store
            .update(table, &patch, &filters)
            .await
            .map(GatewayOutcome::rows),
        Operation::Upsert { rows } => store.upsert(table, &rows).await.map(GatewayOutcome::rows),
        Operation::Delete { filters } => store
            .delete(table, &filters)
            .await
            .map(GatewayOutcome::rows),
    };

    result.map_err(|err: StoreError| {
        error!(table = table.name, %action, error = %err, "store operation failed");
        GatewayError::from(err)
    })
}
