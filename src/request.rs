//! Request parsing and validation
//!
//! Turns a raw POST body into a typed [`GatewayRequest`]. Validation runs in a
//! fixed order and the first failure wins:
//!
//! 1. body is JSON (an object)
//! 2. `action` and `table` are present
//! 3. `table` is in the permission matrix
//! 4. `action` is permitted on that table (`upsert` needs the insert bit)
//! 5. action-specific payload checks (data present, filters present)

use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};

use crate::error::GatewayError;
use crate::filter::{is_identifier, Filter};
use crate::permissions::{table_spec, Capability, TableSpec};
use crate::store::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Select,
    Insert,
    Update,
    Upsert,
    Delete,
}

impl Action {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "select" => Some(Action::Select),
            "insert" => Some(Action::Insert),
            "update" => Some(Action::Update),
            "upsert" => Some(Action::Upsert),
            "delete" => Some(Action::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Select => "select",
            Action::Insert => "insert",
            Action::Update => "update",
            Action::Upsert => "upsert",
            Action::Delete => "delete",
        }
    }

    /// Permission bit that authorizes this action. Upsert rides on insert.
    pub fn capability(&self) -> Capability {
        match self {
            Action::Select => Capability::Select,
            Action::Insert | Action::Upsert => Capability::Insert,
            Action::Update => Capability::Update,
            Action::Delete => Capability::Delete,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CountMode {
    Exact,
    Planned,
    Estimated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub ascending: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub order: Option<OrderBy>,
    pub limit: Option<u64>,
    pub single: bool,
    pub count: Option<CountMode>,
}

/// Action-specific payload. Update and delete always carry at least one filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Select {
        filters: Vec<Filter>,
        options: QueryOptions,
    },
    Insert {
        rows: Vec<Row>,
    },
    Update {
        patch: Row,
        filters: Vec<Filter>,
    },
    Upsert {
        rows: Vec<Row>,
    },
    Delete {
        filters: Vec<Filter>,
    },
}

impl Operation {
    pub fn action(&self) -> Action {
        match self {
            Operation::Select { .. } => Action::Select,
            Operation::Insert { .. } => Action::Insert,
            Operation::Update { .. } => Action::Update,
            Operation::Upsert { .. } => Action::Upsert,
            Operation::Delete { .. } => Action::Delete,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayRequest {
    pub table: &'static TableSpec,
    pub operation: Operation,
}

#[derive(Debug, Default, Deserialize)]
struct RawPayload {
    #[serde(default)]
    data: Option<JsonValue>,
    #[serde(default)]
    filters: Option<Map<String, JsonValue>>,
    #[serde(default)]
    options: Option<RawOptions>,
}

#[derive(Debug, Default, Deserialize)]
struct RawOptions {
    #[serde(default)]
    order: Option<RawOrder>,
    #[serde(default)]
    limit: Option<u64>,
    #[serde(default)]
    single: Option<bool>,
    #[serde(default)]
    count: Option<CountMode>,
}

#[derive(Debug, Deserialize)]
struct RawOrder {
    column: String,
    #[serde(default)]
    ascending: Option<bool>,
}

impl GatewayRequest {
    pub fn parse(body: &[u8]) -> Result<Self, GatewayError> {
        let value: JsonValue = serde_json::from_slice(body)
            .map_err(|_| GatewayError::invalid_request("Invalid JSON body"))?;
        let JsonValue::Object(mut body) = value else {
            return Err(GatewayError::invalid_request(
                "Request body must be a JSON object",
            ));
        };

        let (Some(action_name), Some(table_name)) = (
            take_name(&mut body, "action"),
            take_name(&mut body, "table"),
        ) else {
            return Err(GatewayError::invalid_request(
                "Missing required fields: action and table",
            ));
        };

        let table =
            table_spec(&table_name).ok_or_else(|| GatewayError::InvalidTable(table_name.clone()))?;

        let action = Action::parse(&action_name)
            .filter(|action| table.permissions.allows(action.capability()))
            .ok_or_else(|| GatewayError::InvalidAction {
                action: action_name.clone(),
                table: table_name.clone(),
            })?;

        let raw: RawPayload = serde_json::from_value(JsonValue::Object(body))
            .map_err(|e| GatewayError::invalid_request(format!("Invalid request field: {e}")))?;

        let operation = build_operation(action, raw)?;
        Ok(Self { table, operation })
    }
}

/// Remove `key` from the body and return it as a name. Null, `false`, `0`
/// and `""` count as missing; other non-string values are rendered as JSON
/// so they fail the table or action lookup instead.
fn take_name(body: &mut Map<String, JsonValue>, key: &str) -> Option<String> {
    match body.remove(key)? {
        JsonValue::Null | JsonValue::Bool(false) => None,
        JsonValue::Number(n) if n.as_f64() == Some(0.0) => None,
        JsonValue::String(s) if s.is_empty() => None,
        JsonValue::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn build_operation(action: Action, raw: RawPayload) -> Result<Operation, GatewayError> {
    let operation = match action {
        Action::Select => Operation::Select {
            filters: parse_filters(raw.filters)?,
            options: convert_options(raw.options)?,
        },
        Action::Insert => Operation::Insert {
            rows: require_rows(raw.data, action)?,
        },
        Action::Upsert => Operation::Upsert {
            rows: require_rows(raw.data, action)?,
        },
        Action::Update => {
            let patch = require_patch(raw.data)?;
            Operation::Update {
                patch,
                filters: require_filters(raw.filters, action)?,
            }
        }
        Action::Delete => Operation::Delete {
            filters: require_filters(raw.filters, action)?,
        },
    };
    Ok(operation)
}

fn parse_filters(filters: Option<Map<String, JsonValue>>) -> Result<Vec<Filter>, GatewayError> {
    match filters {
        Some(map) => {
            Filter::parse_all(map).map_err(|e| GatewayError::invalid_request(e.to_string()))
        }
        None => Ok(Vec::new()),
    }
}

fn require_filters(
    filters: Option<Map<String, JsonValue>>,
    action: Action,
) -> Result<Vec<Filter>, GatewayError> {
    let filters = parse_filters(filters)?;
    if filters.is_empty() {
        return Err(GatewayError::invalid_request(format!(
            "Filters required for {action}"
        )));
    }
    Ok(filters)
}

fn check_columns(row: &Row) -> Result<(), GatewayError> {
    match row.keys().find(|key| !is_identifier(key)) {
        Some(bad) => Err(GatewayError::invalid_request(format!(
            "Invalid column name '{bad}'"
        ))),
        None => Ok(()),
    }
}

fn require_rows(data: Option<JsonValue>, action: Action) -> Result<Vec<Row>, GatewayError> {
    let missing = || GatewayError::invalid_request(format!("Missing data for {action}"));
    let rows = match data {
        Some(JsonValue::Object(row)) => vec![row],
        Some(JsonValue::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                JsonValue::Object(row) => Ok(row),
                _ => Err(GatewayError::invalid_request(format!(
                    "Every {action} row must be a JSON object"
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(JsonValue::Null) | None => return Err(missing()),
        Some(_) => {
            return Err(GatewayError::invalid_request(format!(
                "Data for {action} must be an object or an array of objects"
            )))
        }
    };

    if rows.is_empty() || rows.iter().any(|row| row.is_empty()) {
        return Err(missing());
    }
    for row in &rows {
        check_columns(row)?;
    }
    Ok(rows)
}

fn require_patch(data: Option<JsonValue>) -> Result<Row, GatewayError> {
    match data {
        Some(JsonValue::Object(patch)) if !patch.is_empty() => {
            check_columns(&patch)?;
            Ok(patch)
        }
        Some(JsonValue::Object(_)) | Some(JsonValue::Null) | None => {
            Err(GatewayError::invalid_request("Missing data for update"))
        }
        Some(_) => Err(GatewayError::invalid_request(
            "Data for update must be a single object",
        )),
    }
}

fn convert_options(raw: Option<RawOptions>) -> Result<QueryOptions, GatewayError> {
    let Some(raw) = raw else {
        return Ok(QueryOptions::default());
    };

    let order = match raw.order {
        Some(order) if !is_identifier(&order.column) => {
            return Err(GatewayError::invalid_request(format!(
                "Invalid order column '{}'",
                order.column
            )))
        }
        Some(order) => Some(OrderBy {
            column: order.column,
            ascending: order.ascending.unwrap_or(true),
        }),
        None => None,
    };

    Ok(QueryOptions {
        order,
        // A zero limit means "no limit".
        limit: raw.limit.filter(|n| *n > 0),
        single: raw.single.unwrap_or(false),
        count: raw.count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::filter::FilterOp;
    use crate::permissions::TABLES;
    use serde_json::json;

    fn parse(body: JsonValue) -> Result<GatewayRequest, GatewayError> {
        GatewayRequest::parse(body.to_string().as_bytes())
    }

    fn code(body: JsonValue) -> ErrorCode {
        parse(body).unwrap_err().code()
    }

    #[test]
    fn test_invalid_json() {
        let err = GatewayRequest::parse(b"{not json").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidRequest);
        assert_eq!(err.to_string(), "Invalid JSON body");
        assert_eq!(
            GatewayRequest::parse(b"[1,2]").unwrap_err().code(),
            ErrorCode::InvalidRequest
        );
    }

    #[test]
    fn test_missing_action_or_table() {
        assert_eq!(code(json!({"table": "projects"})), ErrorCode::InvalidRequest);
        assert_eq!(code(json!({"action": "select"})), ErrorCode::InvalidRequest);
        assert_eq!(
            code(json!({"action": "", "table": "projects"})),
            ErrorCode::InvalidRequest
        );
    }

    #[test]
    fn test_falsy_names_are_missing() {
        for falsy in [json!(null), json!(false), json!(0)] {
            assert_eq!(
                code(json!({"action": "select", "table": falsy})),
                ErrorCode::InvalidRequest
            );
            assert_eq!(
                code(json!({"action": falsy, "table": "projects"})),
                ErrorCode::InvalidRequest
            );
        }
    }

    #[test]
    fn test_non_string_names_fail_lookup() {
        let err = parse(json!({"action": "select", "table": 123})).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidTable);
        assert_eq!(err.to_string(), "Table '123' is not allowed");

        let err = parse(json!({"action": true, "table": "projects"})).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidAction);
        assert_eq!(
            err.to_string(),
            "Action 'true' is not allowed on table 'projects'"
        );
    }

    #[test]
    fn test_unknown_table_wins_over_bad_action() {
        for action in ["select", "insert", "update", "upsert", "delete", "truncate"] {
            assert_eq!(
                code(json!({"action": action, "table": "user_settings", "data": {"a": 1}})),
                ErrorCode::InvalidTable
            );
        }
    }

    #[test]
    fn test_every_denied_pair_is_invalid_action() {
        for table in TABLES {
            for action in [
                Action::Select,
                Action::Insert,
                Action::Update,
                Action::Upsert,
                Action::Delete,
            ] {
                let body = json!({
                    "action": action.as_str(),
                    "table": table.name,
                    "data": {"x": 1},
                    "filters": {"id": "a"},
                });
                let result = parse(body);
                if table.permissions.allows(action.capability()) {
                    assert!(result.is_ok(), "{action} on {} should pass", table.name);
                } else {
                    assert_eq!(
                        result.unwrap_err().code(),
                        ErrorCode::InvalidAction,
                        "{action} on {}",
                        table.name
                    );
                }
            }
        }
    }

    #[test]
    fn test_unknown_action_is_invalid_action() {
        let err = parse(json!({"action": "truncate", "table": "tactics"})).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidAction);
        assert_eq!(
            err.to_string(),
            "Action 'truncate' is not allowed on table 'tactics'"
        );
    }

    #[test]
    fn test_upsert_uses_insert_bit() {
        assert!(parse(json!({"action": "upsert", "table": "glossary", "data": {"english_term": "ridge"}})).is_ok());
        assert_eq!(
            code(json!({"action": "upsert", "table": "projects", "data": {"id": "p1"}})),
            ErrorCode::InvalidAction
        );
    }

    #[test]
    fn test_update_and_delete_require_filters() {
        for filters in [json!(null), json!({})] {
            let err = parse(json!({
                "action": "update", "table": "chapters",
                "data": {"status": "done"}, "filters": filters
            }))
            .unwrap_err();
            assert_eq!(err.to_string(), "Filters required for update");

            let err = parse(json!({"action": "delete", "table": "tactics", "filters": filters}))
                .unwrap_err();
            assert_eq!(err.to_string(), "Filters required for delete");
        }
        assert_eq!(
            code(json!({"action": "delete", "table": "tactics"})),
            ErrorCode::InvalidRequest
        );
    }

    #[test]
    fn test_write_actions_require_data() {
        for action in ["insert", "upsert", "update"] {
            for data in [json!(null), json!({}), json!([]), json!([{}])] {
                let err = parse(json!({
                    "action": action, "table": "tactics",
                    "data": data, "filters": {"id": "t1"}
                }))
                .unwrap_err();
                assert_eq!(err.code(), ErrorCode::InvalidRequest, "{action} {data}");
            }
        }
        assert_eq!(
            code(json!({"action": "update", "table": "tactics", "data": [{"a": 1}], "filters": {"id": "t1"}})),
            ErrorCode::InvalidRequest
        );
    }

    #[test]
    fn test_data_checked_before_filters_on_update() {
        let err = parse(json!({"action": "update", "table": "chapters"})).unwrap_err();
        assert_eq!(err.to_string(), "Missing data for update");
    }

    #[test]
    fn test_insert_accepts_object_or_array() {
        let one = parse(json!({"action": "insert", "table": "pipeline_logs", "data": {"message": "hi"}}))
            .unwrap();
        assert!(matches!(one.operation, Operation::Insert { ref rows } if rows.len() == 1));

        let many = parse(json!({
            "action": "insert", "table": "pipeline_logs",
            "data": [{"message": "a"}, {"message": "b"}]
        }))
        .unwrap();
        assert!(matches!(many.operation, Operation::Insert { ref rows } if rows.len() == 2));
    }

    #[test]
    fn test_bad_column_names_rejected() {
        assert_eq!(
            code(json!({"action": "insert", "table": "tactics", "data": {"name; --": "x"}})),
            ErrorCode::InvalidRequest
        );
        assert_eq!(
            code(json!({
                "action": "select", "table": "tactics",
                "options": {"order": {"column": "created_at desc"}}
            })),
            ErrorCode::InvalidRequest
        );
    }

    #[test]
    fn test_select_with_options() {
        let req = parse(json!({
            "action": "select",
            "table": "pipeline_logs",
            "filters": {"project_id": "p1", "phase.gte": 2},
            "options": {
                "order": {"column": "created_at", "ascending": false},
                "limit": 5,
                "count": "exact"
            }
        }))
        .unwrap();
        assert_eq!(req.table.name, "pipeline_logs");
        let Operation::Select { filters, options } = req.operation else {
            panic!("expected select");
        };
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[1].op, FilterOp::Gte);
        assert_eq!(
            options.order,
            Some(OrderBy {
                column: "created_at".into(),
                ascending: false
            })
        );
        assert_eq!(options.limit, Some(5));
        assert_eq!(options.count, Some(CountMode::Exact));
        assert!(!options.single);
    }

    #[test]
    fn test_option_defaults() {
        let req = parse(json!({
            "action": "select", "table": "chapters",
            "options": {"order": {"column": "chapter_number"}, "limit": 0}
        }))
        .unwrap();
        let Operation::Select { options, .. } = req.operation else {
            panic!("expected select");
        };
        assert!(options.order.unwrap().ascending);
        assert_eq!(options.limit, None);
    }

    #[test]
    fn test_malformed_options_rejected() {
        assert_eq!(
            code(json!({"action": "select", "table": "chapters", "options": {"limit": "ten"}})),
            ErrorCode::InvalidRequest
        );
        assert_eq!(
            code(json!({"action": "select", "table": "chapters", "options": {"count": "roughly"}})),
            ErrorCode::InvalidRequest
        );
        assert_eq!(
            code(json!({"action": "select", "table": "chapters", "filters": ["id"]})),
            ErrorCode::InvalidRequest
        );
    }

    #[test]
    fn test_unknown_filter_operator_rejected() {
        let err = parse(json!({
            "action": "select", "table": "chapters",
            "filters": {"chapter_number.between": [1, 3]}
        }))
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidRequest);
        assert!(err.to_string().contains("between"));
    }
}
