//! Warehouse access.
//!
//! [`WarehouseClient`] executes one SQL string and returns rows with column
//! metadata. Implementations must enforce [`ResultLimits`]: a result over the
//! row or byte ceiling is an [`ExecutionError::ResultTooLarge`], never a
//! silently truncated result.
//!
//! [`BigQueryClient`] talks to the BigQuery REST API (`jobs.query` for
//! execution, `tables.get` for the schema hint given to the SQL generator).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::error::{AppResult, ExecutionError, http_error, warehouse_error};

/// One result row: column name to scalar value, in column order.
pub type Row = IndexMap<String, Value>;

/// Column metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name:      String,
    pub data_type: String
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name:      name.into(),
            data_type: data_type.into()
        }
    }
}

/// Rows returned by one query execution.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub columns:   Vec<Column>,
    pub rows:      Vec<Row>,
    pub row_count: u64,
    pub duration:  Duration,
    /// Size of the response payload
    pub bytes:     u64
}

impl QueryResult {
    /// Result built from in-memory rows; column types are unknown.
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let columns = rows
            .first()
            .map(|r| r.keys().map(|k| Column::new(k.as_str(), "UNKNOWN")).collect())
            .unwrap_or_default();
        Self {
            columns,
            row_count: rows.len() as u64,
            rows,
            duration: Duration::ZERO,
            bytes: 0
        }
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }
}

/// Ceilings on a single query result
#[derive(Debug, Clone, Copy)]
pub struct ResultLimits {
    pub max_rows:  u64,
    pub max_bytes: u64
}

impl Default for ResultLimits {
    fn default() -> Self {
        Self {
            max_rows:  10_000,
            max_bytes: 16 * 1024 * 1024
        }
    }
}

impl ResultLimits {
    pub fn check_rows(&self, rows: u64) -> Result<(), ExecutionError> {
        if rows > self.max_rows {
            return Err(ExecutionError::ResultTooLarge {
                limit:  "row ceiling",
                actual: rows,
                unit:   "rows"
            });
        }
        Ok(())
    }

    pub fn check_bytes(&self, bytes: u64) -> Result<(), ExecutionError> {
        if bytes > self.max_bytes {
            return Err(ExecutionError::ResultTooLarge {
                limit:  "byte ceiling",
                actual: bytes,
                unit:   "bytes"
            });
        }
        Ok(())
    }
}

/// Executes SQL against a tabular data source.
#[async_trait]
pub trait WarehouseClient: Send + Sync {
    /// Run `sql`, waiting at most `timeout` for the result.
    async fn execute(&self, sql: &str, timeout: Duration) -> Result<QueryResult, ExecutionError>;
}

/// Table metadata used as the SQL generator's schema hint
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub table_ref: String,
    pub columns:   Vec<Column>,
    pub num_rows:  Option<u64>
}

impl TableSchema {
    /// Render for inclusion in a prompt
    pub fn to_hint(&self) -> String {
        let mut hint = format!("Table: `{}`\n\nSchema:\n", self.table_ref);
        for column in &self.columns {
            hint.push_str(&format!("  - {} ({})\n", column.name, column.data_type));
        }
        if let Some(rows) = self.num_rows {
            hint.push_str(&format!("\nApproximate row count: {}\n", rows));
        }
        hint
    }
}

/// BigQuery REST client.
pub struct BigQueryClient {
    client:       reqwest::Client,
    base_url:     String,
    project:      String,
    access_token: String,
    location:     Option<String>,
    limits:       ResultLimits
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    schema:       Option<BqSchema>,
    #[serde(default)]
    rows:         Vec<BqRow>,
    total_rows:   Option<String>
}

#[derive(Deserialize)]
struct BqSchema {
    #[serde(default)]
    fields: Vec<BqField>
}

#[derive(Deserialize)]
struct BqField {
    name:       String,
    #[serde(rename = "type")]
    field_type: String,
    mode:       Option<String>
}

#[derive(Deserialize)]
struct BqRow {
    f: Vec<BqCell>
}

#[derive(Deserialize)]
struct BqCell {
    v: Value
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableResponse {
    schema:   Option<BqSchema>,
    num_rows: Option<String>
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors:  Vec<ErrorItem>
}

#[derive(Deserialize)]
struct ErrorItem {
    #[serde(default)]
    reason: String
}

impl BigQueryClient {
    pub fn new(project: impl Into<String>, access_token: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url: String::from("https://bigquery.googleapis.com/bigquery/v2"),
            project: project.into(),
            access_token: access_token.into(),
            location: None,
            limits: ResultLimits::default()
        }
    }

    pub fn with_location(mut self, location: Option<String>) -> Self {
        self.location = location;
        self
    }

    pub fn with_limits(mut self, limits: ResultLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Point at a different API root, e.g. a local emulator
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Fetch column metadata for `dataset.table`.
    pub async fn describe_table(&self, dataset: &str, table: &str) -> AppResult<TableSchema> {
        let url = format!(
            "{}/projects/{}/datasets/{}/tables/{}",
            self.base_url, self.project, dataset, table
        );
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.access_token)
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(http_error)?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(warehouse_error(format!(
                "BigQuery tables.get error {}: {}",
                status, text
            )));
        }
        let table_info: TableResponse = response.json().await.map_err(http_error)?;
        Ok(TableSchema {
            table_ref: format!("{}.{}.{}", self.project, dataset, table),
            columns:   table_info
                .schema
                .map(|s| s.fields.iter().map(field_column).collect())
                .unwrap_or_default(),
            num_rows:  table_info.num_rows.and_then(|n| n.parse().ok())
        })
    }

    async fn read_capped(&self, mut response: reqwest::Response) -> Result<Vec<u8>, ExecutionError> {
        if let Some(len) = response.content_length() {
            self.limits.check_bytes(len)?;
        }
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(map_transport_error)? {
            body.extend_from_slice(&chunk);
            self.limits.check_bytes(body.len() as u64)?;
        }
        Ok(body)
    }
}

#[async_trait]
impl WarehouseClient for BigQueryClient {
    async fn execute(&self, sql: &str, timeout: Duration) -> Result<QueryResult, ExecutionError> {
        let started = Instant::now();
        let url = format!("{}/projects/{}/queries", self.base_url, self.project);
        let mut request = json!({
            "query": sql,
            "useLegacySql": false,
            "timeoutMs": timeout.as_millis() as u64,
            "maxResults": self.limits.max_rows + 1
        });
        if let Some(location) = &self.location {
            request["location"] = json!(location);
        }

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .timeout(timeout + Duration::from_secs(5))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ExecutionError::Timeout(timeout)
                } else {
                    map_transport_error(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_api_error(status.as_u16(), &text));
        }

        let body = self.read_capped(response).await?;
        let parsed: QueryResponse = serde_json::from_slice(&body)
            .map_err(|e| ExecutionError::Connection(format!("unreadable response: {}", e)))?;
        if !parsed.job_complete {
            return Err(ExecutionError::Timeout(timeout));
        }

        let total = parsed
            .total_rows
            .as_deref()
            .and_then(|n| n.parse::<u64>().ok())
            .unwrap_or(parsed.rows.len() as u64);
        self.limits.check_rows(total)?;
        self.limits.check_rows(parsed.rows.len() as u64)?;

        let fields = parsed.schema.map(|s| s.fields).unwrap_or_default();
        let columns: Vec<Column> = fields.iter().map(field_column).collect();
        let rows: Vec<Row> = parsed
            .rows
            .into_iter()
            .map(|row| {
                fields
                    .iter()
                    .zip(row.f)
                    .map(|(field, cell)| (field.name.clone(), convert_cell(field, cell.v)))
                    .collect()
            })
            .collect();

        debug!(rows = rows.len(), bytes = body.len(), "query complete");
        Ok(QueryResult {
            columns,
            row_count: rows.len() as u64,
            rows,
            duration: started.elapsed(),
            bytes: body.len() as u64
        })
    }
}

fn field_column(field: &BqField) -> Column {
    let data_type = match field.mode.as_deref() {
        Some("REPEATED") => format!("ARRAY<{}>", field.field_type),
        _ => field.field_type.clone()
    };
    Column::new(field.name.as_str(), data_type)
}

/// BigQuery encodes scalars as strings; restore numbers and booleans.
fn convert_cell(field: &BqField, value: Value) -> Value {
    let text = match value {
        Value::String(text) if field.mode.as_deref() != Some("REPEATED") => text,
        other => return other
    };
    match field.field_type.as_str() {
        "INTEGER" | "INT64" => text
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or(Value::String(text)),
        "FLOAT" | "FLOAT64" | "NUMERIC" | "BIGNUMERIC" => text
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::String(text)),
        "BOOLEAN" | "BOOL" => match text.as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::String(text)
        },
        _ => Value::String(text)
    }
}

fn map_transport_error(err: reqwest::Error) -> ExecutionError {
    if err.is_timeout() {
        ExecutionError::Timeout(Duration::ZERO)
    } else {
        ExecutionError::Connection(err.to_string())
    }
}

/// Map a BigQuery error response onto an execution error kind.
fn classify_api_error(status: u16, body: &str) -> ExecutionError {
    let parsed = serde_json::from_str::<ErrorEnvelope>(body).ok();
    let message = parsed
        .as_ref()
        .map(|e| e.error.message.clone())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("HTTP {}: {}", status, body));
    let reason = parsed
        .as_ref()
        .and_then(|e| e.error.errors.first())
        .map(|e| e.reason.as_str())
        .unwrap_or("");

    match reason {
        "invalidQuery" | "invalid" => ExecutionError::Syntax(message),
        "quotaExceeded" => ExecutionError::QuotaExceeded(message),
        "rateLimitExceeded" => ExecutionError::RateLimited(message),
        "responseTooLarge" => ExecutionError::ResultTooLarge {
            limit:  "warehouse response ceiling",
            actual: 0,
            unit:   "bytes"
        },
        _ if status == 429 => ExecutionError::RateLimited(message),
        _ if status >= 500 => ExecutionError::Connection(message),
        _ if status == 400 => ExecutionError::Syntax(message),
        _ => ExecutionError::Rejected(message)
    }
}
