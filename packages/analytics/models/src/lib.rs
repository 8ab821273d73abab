#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Support desk entity types, normalized row mappings, and tool
//! definitions for the analytics layer.
//!
//! The customer and ticket types mirror the tables of the backing store.
//! Nothing in this crate touches the store; it only describes what the
//! analytics tools accept and return.

use chrono::NaiveDateTime;
use serde::ser::SerializeMap as _;
use serde::{Deserialize, Serialize, Serializer};
use strum_macros::{AsRefStr, Display, EnumString};

/// Default revenue threshold for the at-risk customer query.
pub const DEFAULT_MIN_MRR: f64 = 20_000.0;

/// Subscription tier of a customer.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum SubscriptionTier {
    /// Entry-level plan.
    Starter,
    /// Mid-market plan.
    Professional,
    /// Enterprise contract.
    Enterprise,
}

/// Lifecycle status of a support ticket.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum TicketStatus {
    /// Newly filed, nobody working on it yet.
    Open,
    /// Being worked on.
    #[serde(rename = "In Progress")]
    #[strum(to_string = "In Progress", serialize = "in_progress")]
    InProgress,
    /// Fix delivered.
    Resolved,
    /// Closed out.
    Closed,
}

impl TicketStatus {
    /// Statuses that count as an unresolved ("open") ticket.
    pub const UNRESOLVED: [Self; 2] = [Self::Open, Self::InProgress];

    /// Statuses that count toward the resolution rate.
    pub const RESOLVED: [Self; 2] = [Self::Resolved, Self::Closed];

    /// Returns `true` for Open and In Progress.
    #[must_use]
    pub const fn is_unresolved(self) -> bool {
        matches!(self, Self::Open | Self::InProgress)
    }

    /// All statuses in lifecycle order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Open, Self::InProgress, Self::Resolved, Self::Closed]
    }
}

/// Priority of a support ticket.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum TicketPriority {
    /// Needs attention now.
    High,
    /// Normal.
    Medium,
    /// Can wait.
    Low,
}

impl TicketPriority {
    /// Sort rank, most severe first (High = 0).
    #[must_use]
    pub const fn severity_rank(self) -> u8 {
        match self {
            Self::High => 0,
            Self::Medium => 1,
            Self::Low => 2,
        }
    }

    /// All priorities, most severe first.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::High, Self::Medium, Self::Low]
    }
}

/// Error returned when an entity violates one of its invariants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidEntityError {
    /// Offending field.
    pub field: &'static str,
    /// What is wrong with it.
    pub reason: String,
}

impl std::fmt::Display for InvalidEntityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid {}: {}", self.field, self.reason)
    }
}

impl std::error::Error for InvalidEntityError {}

/// A customer account as stored in the `customers` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    /// Database primary key.
    pub id: i64,
    /// Company or account name.
    pub name: String,
    /// Primary contact email.
    pub email: String,
    /// Country of the account.
    pub country: String,
    /// Subscription plan.
    pub subscription_tier: SubscriptionTier,
    /// Monthly recurring revenue. Never negative.
    pub mrr: f64,
    /// When the account was created.
    pub created_at: NaiveDateTime,
}

impl Customer {
    /// Checks the MRR invariant.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidEntityError`] if `mrr` is negative or not finite.
    pub fn validate(&self) -> Result<(), InvalidEntityError> {
        if !self.mrr.is_finite() || self.mrr < 0.0 {
            return Err(InvalidEntityError {
                field: "mrr",
                reason: format!("must be a non-negative amount, got {}", self.mrr),
            });
        }
        Ok(())
    }
}

/// A support ticket as stored in the `support_tickets` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportTicket {
    /// Database primary key.
    pub id: i64,
    /// Owning customer.
    pub customer_id: i64,
    /// One-line summary.
    pub subject: String,
    /// Lifecycle status.
    pub status: TicketStatus,
    /// Priority.
    pub priority: TicketPriority,
    /// When the ticket was filed.
    pub created_at: NaiveDateTime,
    /// When the ticket was resolved, if it was.
    pub resolved_at: Option<NaiveDateTime>,
}

impl SupportTicket {
    /// Checks that `resolved_at` does not precede `created_at`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidEntityError`] if the ticket was resolved before it
    /// was created.
    pub fn validate(&self) -> Result<(), InvalidEntityError> {
        if let Some(resolved_at) = self.resolved_at
            && resolved_at < self.created_at
        {
            return Err(InvalidEntityError {
                field: "resolved_at",
                reason: format!(
                    "{resolved_at} is earlier than created_at {}",
                    self.created_at
                ),
            });
        }
        Ok(())
    }
}

/// A single column value as returned by the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    /// SQL `NULL`.
    Null,
    /// Boolean column.
    Bool(bool),
    /// Any integer column.
    Integer(i64),
    /// Any floating point or numeric column.
    Real(f64),
    /// Text column.
    Text(String),
    /// Timestamp without time zone.
    Timestamp(NaiveDateTime),
}

impl CellValue {
    /// Returns the value as an integer, if it is one.
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as a float, widening integers.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Real(v) => Some(*v),
            Self::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Returns the value as a string slice, if it is text.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Returns `true` for `NULL`.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// One result row: column names mapped to values, in the order the store
/// returned them.
///
/// Serializes as a JSON object whose keys keep that order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordRow {
    columns: Vec<(String, CellValue)>,
}

impl RecordRow {
    /// Creates an empty row.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            columns: Vec::new(),
        }
    }

    /// Appends a column.
    pub fn push(&mut self, name: impl Into<String>, value: CellValue) {
        self.columns.push((name.into(), value));
    }

    /// Looks up a column by name. Returns the first match when a name
    /// repeats.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CellValue> {
        self.columns
            .iter()
            .find(|(col, _)| col == name)
            .map(|(_, value)| value)
    }

    /// Column names in store order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    /// Iterates `(name, value)` pairs in store order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Number of columns.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns `true` if the row has no columns.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl FromIterator<(String, CellValue)> for RecordRow {
    fn from_iter<T: IntoIterator<Item = (String, CellValue)>>(iter: T) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}

impl Serialize for RecordRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, value) in &self.columns {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Parameters for the free-form read-only query tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryDatabaseParams {
    /// A single `SELECT` statement.
    pub query: String,
}

/// Parameters for looking up customers by name or email.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInfoParams {
    /// Partial, case-insensitive name or email.
    pub search: String,
}

/// Parameters for listing unresolved tickets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenTicketsParams {
    /// Optional priority filter: `High`, `Medium` or `Low`.
    pub priority: Option<String>,
}

/// Parameters for the churn-risk query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtRiskParams {
    /// Minimum monthly recurring revenue. Defaults to [`DEFAULT_MIN_MRR`].
    pub min_mrr: Option<f64>,
}

/// Parameters for scoring a single customer's health.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthScoreParams {
    /// Partial, case-insensitive customer name.
    pub customer_name: String,
}

/// The customer a health score was computed for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerRef {
    /// Database primary key.
    pub id: i64,
    /// Account name.
    pub name: String,
    /// Subscription tier as stored.
    pub subscription_tier: String,
    /// Monthly recurring revenue.
    pub mrr: f64,
}

/// Raw ticket metrics for one customer, as aggregated by the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketMetrics {
    /// Tickets ever filed.
    pub total_tickets: u64,
    /// Tickets in Resolved or Closed.
    pub resolved_tickets: u64,
    /// Unresolved High priority tickets.
    pub open_high: u64,
    /// Unresolved Medium priority tickets.
    pub open_medium: u64,
    /// Unresolved Low priority tickets.
    pub open_low: u64,
    /// Days since the account was created.
    pub tenure_days: u64,
    /// Mean days from creation to resolution over resolved tickets.
    pub avg_resolution_days: Option<f64>,
}

impl TicketMetrics {
    /// Unresolved tickets across all priorities.
    #[must_use]
    pub const fn open_tickets(&self) -> u64 {
        self.open_high
            .saturating_add(self.open_medium)
            .saturating_add(self.open_low)
    }
}

/// How each factor moved the score away from the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    /// Starting score.
    pub baseline: f64,
    /// Tickets per 30 days of tenure.
    pub ticket_velocity: f64,
    /// Deduction for ticket velocity.
    pub velocity_penalty: f64,
    /// Deduction for unresolved tickets, weighted by priority.
    pub priority_penalty: f64,
    /// Resolved tickets over total tickets, 0 when there are none.
    pub resolution_rate: f64,
    /// Bonus for a high resolution rate.
    pub resolution_bonus: f64,
    /// Bonus for account age.
    pub tenure_bonus: f64,
}

/// Coarse label for a health score.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthBand {
    /// Score of 80 or more.
    Healthy,
    /// Score of 50 up to 80.
    Watch,
    /// Score below 50.
    AtRisk,
}

impl HealthBand {
    /// Classifies a score.
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            Self::Healthy
        } else if score >= 50.0 {
            Self::Watch
        } else {
            Self::AtRisk
        }
    }
}

/// A derived customer health score. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthScoreResult {
    /// The scored customer.
    pub customer: CustomerRef,
    /// Score in `[0, 100]`.
    pub score: f64,
    /// Coarse label for [`Self::score`].
    pub band: HealthBand,
    /// Inputs the score was computed from.
    pub metrics: TicketMetrics,
    /// Contribution of each factor.
    pub breakdown: ScoreBreakdown,
}

/// A table in the current schema with size estimates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableInfo {
    /// Table name.
    pub table_name: String,
    /// Planner row estimate. Zero for never-analyzed tables.
    pub estimated_rows: i64,
    /// Total on-disk size including indexes and TOAST.
    pub total_bytes: i64,
    /// Human-readable size, e.g. `"48 kB"`.
    pub size: String,
}

/// One column of one table in the current schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    /// Owning table.
    pub table_name: String,
    /// Column name.
    pub column_name: String,
    /// SQL data type.
    pub data_type: String,
    /// Whether the column accepts `NULL`.
    pub is_nullable: bool,
}

/// Successful outcome of a tool invocation.
#[derive(Debug, Clone, Serialize)]
#[serde(
    tag = "type",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ToolResponse {
    /// Result rows of a query.
    Rows {
        /// Number of rows returned.
        row_count: usize,
        /// The rows.
        rows: Vec<RecordRow>,
    },
    /// The query ran and matched nothing.
    NotFound {
        /// Human-readable explanation.
        message: String,
    },
    /// A computed health score.
    HealthScore(HealthScoreResult),
    /// Tables in the current schema.
    Tables {
        /// The tables, by name.
        tables: Vec<TableInfo>,
    },
    /// Column catalog of the current schema.
    Schema {
        /// Columns ordered by table and position.
        columns: Vec<ColumnInfo>,
    },
}

/// Returns the tool definitions exposed to the agent.
///
/// Each entry carries a name, a description the agent uses to decide when
/// to call the tool, and a JSON Schema for its parameters.
#[must_use]
#[allow(clippy::too_many_lines)]
pub fn tool_definitions() -> Vec<serde_json::Value> {
    vec![
        serde_json::json!({
            "name": "query_database",
            "description": "Execute a single read-only SELECT statement against the customer/support database and return the rows. Statements that modify data or schema are rejected before they reach the database.",
            "parameters": {
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "SQL SELECT statement (e.g., 'SELECT * FROM customers LIMIT 5')" }
                },
                "required": ["query"]
            }
        }),
        serde_json::json!({
            "name": "get_customer_info",
            "description": "Look up customers by partial, case-insensitive name or email. Includes account details and a support ticket summary (total, open, in progress, high priority, last ticket date).",
            "parameters": {
                "type": "object",
                "properties": {
                    "search": { "type": "string", "description": "Customer name or email fragment (e.g., 'ASML', 'accenture.com')" }
                },
                "required": ["search"]
            }
        }),
        serde_json::json!({
            "name": "get_open_tickets",
            "description": "List all Open and In Progress support tickets with customer context, most severe priority first and oldest first within a priority.",
            "parameters": {
                "type": "object",
                "properties": {
                    "priority": { "type": "string", "enum": ["High", "Medium", "Low"], "description": "Only return tickets of this priority" }
                },
                "required": []
            }
        }),
        serde_json::json!({
            "name": "get_at_risk_customers",
            "description": "Identify churn risk: customers at or above a revenue threshold that currently have Open or In Progress tickets, highest revenue first.",
            "parameters": {
                "type": "object",
                "properties": {
                    "minMrr": { "type": "number", "description": "Minimum monthly recurring revenue (default 20000)" }
                },
                "required": []
            }
        }),
        serde_json::json!({
            "name": "get_customer_health_score",
            "description": "Compute a 0-100 support health score for a customer from ticket velocity, unresolved ticket priorities, resolution rate and account tenure. Returns the score and each factor's contribution.",
            "parameters": {
                "type": "object",
                "properties": {
                    "customerName": { "type": "string", "description": "Customer name fragment (e.g., 'ASML')" }
                },
                "required": ["customerName"]
            }
        }),
        serde_json::json!({
            "name": "list_tables",
            "description": "List the tables in the database with estimated row counts and on-disk sizes.",
            "parameters": { "type": "object", "properties": {}, "required": [] }
        }),
        serde_json::json!({
            "name": "describe_schema",
            "description": "List every column of every table with its data type and nullability. Use before writing a query_database statement.",
            "parameters": { "type": "object", "properties": {}, "required": [] }
        }),
    ]
}
