//! Admin gateway client
//!
//! Builds `{action, table, data?, filters?, options?}` payloads, sends them
//! with the shared bearer secret and turns failure envelopes into
//! [`AdminApiError::Api`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

pub type Row = Map<String, Value>;

#[derive(Debug, Error)]
pub enum AdminApiError {
    /// The gateway answered with a failure envelope.
    #[error("{code}: {message}")]
    Api { code: String, message: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl AdminApiError {
    /// Envelope error code, if the gateway produced one.
    pub fn code(&self) -> Option<&str> {
        match self {
            AdminApiError::Api { code, .. } => Some(code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, AdminApiError>;

/// Filter mapping builder. Keys are `column` or `column.operator`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Filters(Map<String, Value>);

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    fn with(mut self, column: &str, op: Option<&str>, value: Value) -> Self {
        let key = match op {
            Some(op) => format!("{column}.{op}"),
            None => column.to_string(),
        };
        self.0.insert(key, value);
        self
    }

    pub fn eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.with(column, None, value.into())
    }

    pub fn neq(self, column: &str, value: impl Into<Value>) -> Self {
        self.with(column, Some("neq"), value.into())
    }

    pub fn gt(self, column: &str, value: impl Into<Value>) -> Self {
        self.with(column, Some("gt"), value.into())
    }

    pub fn gte(self, column: &str, value: impl Into<Value>) -> Self {
        self.with(column, Some("gte"), value.into())
    }

    pub fn lt(self, column: &str, value: impl Into<Value>) -> Self {
        self.with(column, Some("lt"), value.into())
    }

    pub fn lte(self, column: &str, value: impl Into<Value>) -> Self {
        self.with(column, Some("lte"), value.into())
    }

    pub fn like(self, column: &str, pattern: &str) -> Self {
        self.with(column, Some("like"), Value::from(pattern))
    }

    pub fn ilike(self, column: &str, pattern: &str) -> Self {
        self.with(column, Some("ilike"), Value::from(pattern))
    }

    pub fn is_null(self, column: &str) -> Self {
        self.with(column, Some("is"), Value::Null)
    }

    pub fn is(self, column: &str, value: bool) -> Self {
        self.with(column, Some("is"), Value::Bool(value))
    }

    pub fn in_list<V: Into<Value>>(self, column: &str, values: impl IntoIterator<Item = V>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.with(column, Some("in"), Value::Array(values))
    }

    pub fn contains(self, column: &str, value: impl Into<Value>) -> Self {
        self.with(column, Some("contains"), value.into())
    }

    pub fn contained_by(self, column: &str, value: impl Into<Value>) -> Self {
        self.with(column, Some("containedBy"), value.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CountMode {
    Exact,
    Planned,
    Estimated,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct Order {
    column: String,
    ascending: bool,
}

/// Select options builder.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SelectOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    order: Option<Order>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<u64>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    single: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    count: Option<CountMode>,
}

impl SelectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        self.order = Some(Order {
            column: column.to_string(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn count(mut self, mode: CountMode) -> Self {
        self.count = Some(mode);
        self
    }

    fn single(mut self) -> Self {
        self.single = true;
        self
    }

    fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Rows from a select, with the total when a count was requested.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub rows: Vec<Row>,
    pub count: Option<i64>,
}

#[derive(Serialize)]
struct Payload<'a> {
    action: &'a str,
    table: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filters: Option<&'a Filters>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<&'a SelectOptions>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    count: Option<i64>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

fn into_rows(data: Value) -> Result<Vec<Row>> {
    match data {
        Value::Null => Ok(Vec::new()),
        Value::Object(row) => Ok(vec![row]),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(row) => Ok(row),
                other => Err(AdminApiError::Decode(format!("expected a row object, got {other}"))),
            })
            .collect(),
        other => Err(AdminApiError::Decode(format!("expected rows, got {other}"))),
    }
}

fn to_data<T: Serialize + ?Sized>(data: &T) -> Result<Value> {
    serde_json::to_value(data).map_err(|e| AdminApiError::Decode(format!("unserializable data: {e}")))
}

/// Client for the admin gateway.
#[derive(Clone)]
pub struct AdminApiClient {
    url: String,
    secret: String,
    client: reqwest::Client,
}

impl AdminApiClient {
    pub fn new(url: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            secret: secret.into(),
            client: reqwest::Client::new(),
        }
    }

    async fn request(&self, payload: Payload<'_>) -> Result<Envelope> {
        debug!(action = payload.action, table = payload.table, "admin api request");
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.secret)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let envelope: Envelope = response
            .json()
            .await
            .map_err(|e| AdminApiError::Decode(format!("HTTP {}: {e}", status.as_u16())))?;

        if !envelope.success {
            let error = envelope.error.unwrap_or_default();
            return Err(AdminApiError::Api {
                code: error.code.unwrap_or_else(|| "UNKNOWN_ERROR".to_string()),
                message: error
                    .message
                    .unwrap_or_else(|| "Unknown error occurred".to_string()),
            });
        }
        Ok(envelope)
    }

    /// Rows plus the total match count when `options` asks for one.
    pub async fn select_with_count(
        &self,
        table: &str,
        filters: &Filters,
        options: &SelectOptions,
    ) -> Result<Selection> {
        let envelope = self
            .request(Payload {
                action: "select",
                table,
                data: None,
                filters: (!filters.is_empty()).then_some(filters),
                options: (!options.is_empty()).then_some(options),
            })
            .await?;
        Ok(Selection {
            rows: into_rows(envelope.data)?,
            count: envelope.count,
        })
    }

    pub async fn select(
        &self,
        table: &str,
        filters: &Filters,
        options: &SelectOptions,
    ) -> Result<Vec<Row>> {
        Ok(self.select_with_count(table, filters, options).await?.rows)
    }

    /// Strict single-row read. Zero or several matches come back from the
    /// gateway as a `DATABASE_ERROR`.
    pub async fn select_single(&self, table: &str, filters: &Filters) -> Result<Option<Row>> {
        let options = SelectOptions::new().single();
        let envelope = self
            .request(Payload {
                action: "select",
                table,
                data: None,
                filters: Some(filters),
                options: Some(&options),
            })
            .await?;
        Ok(into_rows(envelope.data)?.into_iter().next())
    }

    /// Insert one row (an object) or several (an array of objects).
    pub async fn insert<T: Serialize + ?Sized>(&self, table: &str, data: &T) -> Result<Vec<Row>> {
        let envelope = self
            .request(Payload {
                action: "insert",
                table,
                data: Some(to_data(data)?),
                filters: None,
                options: None,
            })
            .await?;
        into_rows(envelope.data)
    }

    pub async fn update<T: Serialize + ?Sized>(
        &self,
        table: &str,
        patch: &T,
        filters: &Filters,
    ) -> Result<Vec<Row>> {
        let envelope = self
            .request(Payload {
                action: "update",
                table,
                data: Some(to_data(patch)?),
                filters: Some(filters),
                options: None,
            })
            .await?;
        into_rows(envelope.data)
    }

    pub async fn upsert<T: Serialize + ?Sized>(&self, table: &str, data: &T) -> Result<Vec<Row>> {
        let envelope = self
            .request(Payload {
                action: "upsert",
                table,
                data: Some(to_data(data)?),
                filters: None,
                options: None,
            })
            .await?;
        into_rows(envelope.data)
    }

    pub async fn delete(&self, table: &str, filters: &Filters) -> Result<Vec<Row>> {
        let envelope = self
            .request(Payload {
                action: "delete",
                table,
                data: None,
                filters: Some(filters),
                options: None,
            })
            .await?;
        into_rows(envelope.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_keys() {
        let filters = Filters::new()
            .eq("project_id", "p1")
            .gte("phase", 2)
            .ilike("message", "%error%")
            .is_null("chapter_id")
            .in_list("log_level", ["warn", "error"])
            .contained_by("tags", json!(["a", "b"]));
        assert_eq!(
            serde_json::to_value(&filters).unwrap(),
            json!({
                "project_id": "p1",
                "phase.gte": 2,
                "message.ilike": "%error%",
                "chapter_id.is": null,
                "log_level.in": ["warn", "error"],
                "tags.containedBy": ["a", "b"]
            })
        );
    }

    #[test]
    fn test_options_serialize_only_what_is_set() {
        assert_eq!(serde_json::to_value(SelectOptions::new()).unwrap(), json!({}));
        let options = SelectOptions::new()
            .order("created_at", false)
            .limit(5)
            .count(CountMode::Exact);
        assert_eq!(
            serde_json::to_value(&options).unwrap(),
            json!({
                "order": {"column": "created_at", "ascending": false},
                "limit": 5,
                "count": "exact"
            })
        );
        assert_eq!(
            serde_json::to_value(SelectOptions::new().single()).unwrap(),
            json!({"single": true})
        );
    }

    #[test]
    fn test_payload_omits_absent_parts() {
        let filters = Filters::new().eq("id", "t1");
        let payload = Payload {
            action: "delete",
            table: "tactics",
            data: None,
            filters: Some(&filters),
            options: None,
        };
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({"action": "delete", "table": "tactics", "filters": {"id": "t1"}})
        );
    }

    #[test]
    fn test_into_rows_accepts_object_array_or_null() {
        assert_eq!(into_rows(Value::Null).unwrap().len(), 0);
        assert_eq!(into_rows(json!({"id": "a"})).unwrap().len(), 1);
        assert_eq!(into_rows(json!([{"id": "a"}, {"id": "b"}])).unwrap().len(), 2);
        assert!(into_rows(json!([1])).is_err());
        assert!(into_rows(json!("rows")).is_err());
    }
}
