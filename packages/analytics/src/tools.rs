//! Tool dispatch for agent and HTTP callers.
//!
//! Maps a tool name plus JSON arguments onto one of the read-only
//! operations and wraps the outcome in a [`ToolResponse`].

use serde::de::DeserializeOwned;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use support_desk_analytics_models::{
    AtRiskParams, CustomerInfoParams, HealthScoreParams, OpenTicketsParams, QueryDatabaseParams,
    ToolResponse,
};

use crate::executor::QueryExecutor;
use crate::validator::ReadOnlyStatement;
use crate::{InsightsError, catalog, queries};

/// The operations a caller may invoke by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum Tool {
    /// Free-form validated `SELECT`.
    QueryDatabase,
    /// Customer lookup with ticket aggregates.
    GetCustomerInfo,
    /// Unresolved tickets, most urgent first.
    GetOpenTickets,
    /// High-revenue customers with unresolved tickets.
    GetAtRiskCustomers,
    /// Support health score for one customer.
    GetCustomerHealthScore,
    /// Tables in the current schema.
    ListTables,
    /// Column catalog of the current schema.
    DescribeSchema,
}

impl Tool {
    /// Looks a tool up by its wire name.
    ///
    /// # Errors
    ///
    /// Returns [`InsightsError::UnknownTool`] if no tool has this name.
    pub fn from_name(name: &str) -> Result<Self, InsightsError> {
        name.parse().map_err(|_| InsightsError::UnknownTool {
            name: name.to_string(),
        })
    }

    /// Wire name, as `&'static str`.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::QueryDatabase => "query_database",
            Self::GetCustomerInfo => "get_customer_info",
            Self::GetOpenTickets => "get_open_tickets",
            Self::GetAtRiskCustomers => "get_at_risk_customers",
            Self::GetCustomerHealthScore => "get_customer_health_score",
            Self::ListTables => "list_tables",
            Self::DescribeSchema => "describe_schema",
        }
    }
}

fn parse_params<T: DeserializeOwned>(
    tool: Tool,
    input: &serde_json::Value,
) -> Result<T, InsightsError> {
    let input = if input.is_null() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        input.clone()
    };
    serde_json::from_value(input).map_err(|source| InsightsError::InvalidParams {
        tool: tool.name(),
        source,
    })
}

/// A wrongly typed `field` is an invalid argument, not malformed params.
fn check_argument_type(
    input: &serde_json::Value,
    field: &'static str,
    expected: &str,
    accepts: fn(&serde_json::Value) -> bool,
) -> Result<(), InsightsError> {
    match input.get(field) {
        Some(value) if !value.is_null() && !accepts(value) => {
            Err(InsightsError::InvalidArgument {
                field,
                reason: format!("expected {expected}, got {value}"),
            })
        }
        _ => Ok(()),
    }
}

fn rows(rows: Vec<support_desk_analytics_models::RecordRow>) -> ToolResponse {
    ToolResponse::Rows {
        row_count: rows.len(),
        rows,
    }
}

fn not_found(search: &str) -> ToolResponse {
    ToolResponse::NotFound {
        message: format!("No customer found matching '{}'", search.trim()),
    }
}

/// Executes a single tool by name with the given parameters.
///
/// A `null` input is treated as an empty argument object.
///
/// # Errors
///
/// Returns [`InsightsError::UnknownTool`] or [`InsightsError::InvalidParams`]
/// for a bad request, a rejection for a statement that fails validation,
/// and [`InsightsError::Execution`] if the store round trip fails.
pub async fn execute_tool(
    executor: &QueryExecutor,
    name: &str,
    input: &serde_json::Value,
) -> Result<ToolResponse, InsightsError> {
    let tool = Tool::from_name(name)?;

    let result = match tool {
        Tool::QueryDatabase => {
            let params: QueryDatabaseParams = parse_params(tool, input)?;
            let stmt = ReadOnlyStatement::parse(&params.query)?;
            executor.execute(&stmt).await.map(rows)
        }
        Tool::GetCustomerInfo => {
            let params: CustomerInfoParams = parse_params(tool, input)?;
            let found = queries::customer_info(executor, &params).await?;
            if found.is_empty() {
                Ok(not_found(&params.search))
            } else {
                Ok(rows(found))
            }
        }
        Tool::GetOpenTickets => {
            check_argument_type(input, "priority", "a string", serde_json::Value::is_string)?;
            let params: OpenTicketsParams = parse_params(tool, input)?;
            queries::open_tickets(executor, &params).await.map(rows)
        }
        Tool::GetAtRiskCustomers => {
            check_argument_type(input, "minMrr", "a number", serde_json::Value::is_number)?;
            let params: AtRiskParams = parse_params(tool, input)?;
            queries::at_risk_customers(executor, &params).await.map(rows)
        }
        Tool::GetCustomerHealthScore => {
            let params: HealthScoreParams = parse_params(tool, input)?;
            Ok(queries::customer_health_score(executor, &params)
                .await?
                .map_or_else(|| not_found(&params.customer_name), ToolResponse::HealthScore))
        }
        Tool::ListTables => catalog::list_tables(executor)
            .await
            .map(|tables| ToolResponse::Tables { tables }),
        Tool::DescribeSchema => catalog::describe_schema(executor)
            .await
            .map(|columns| ToolResponse::Schema { columns }),
    };

    match &result {
        Ok(response) => log::debug!("{tool}: {}", summarize_response(response)),
        Err(e) if e.is_rejection() => log::warn!("{tool} rejected ({}): {e}", e.kind()),
        Err(e) => log::error!("{tool} failed ({}): {e}", e.kind()),
    }

    result
}

/// Creates a brief human-readable summary of a tool response.
#[must_use]
pub fn summarize_response(response: &ToolResponse) -> String {
    match response {
        ToolResponse::Rows { row_count, .. } => format!("{row_count} row(s)"),
        ToolResponse::NotFound { .. } => "no match".to_string(),
        ToolResponse::HealthScore(result) => {
            format!("score {:.1} ({})", result.score, result.band)
        }
        ToolResponse::Tables { tables } => format!("{} table(s)", tables.len()),
        ToolResponse::Schema { columns } => format!("{} column(s)", columns.len()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;
    use strum::IntoEnumIterator as _;
    use switchy_database::Database;

    use super::*;
    use crate::executor::{ConnectionError, ConnectionProvider};

    struct CountingProvider {
        db: Arc<dyn Database>,
        acquired: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ConnectionProvider for CountingProvider {
        async fn acquire(&self) -> Result<Arc<dyn Database>, ConnectionError> {
            self.acquired.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::clone(&self.db))
        }

        fn release(&self, _connection: Arc<dyn Database>) {}
    }

    fn executor() -> (QueryExecutor, Arc<CountingProvider>) {
        let path = std::env::temp_dir().join(format!("support_desk_{}.db", uuid::Uuid::new_v4()));
        let db = switchy_database_connection::init_sqlite_rusqlite(Some(path.as_path())).unwrap();
        let provider = Arc::new(CountingProvider {
            db: Arc::from(db),
            acquired: AtomicUsize::new(0),
        });
        (QueryExecutor::new(provider.clone()), provider)
    }

    #[test]
    fn tool_names_match_definitions() {
        let defined: Vec<String> = support_desk_analytics_models::tool_definitions()
            .iter()
            .filter_map(|d| d["name"].as_str().map(ToString::to_string))
            .collect();
        for tool in Tool::iter() {
            assert_eq!(tool.to_string(), tool.name());
            assert!(defined.iter().any(|d| d == tool.name()), "{tool}");
            assert_eq!(Tool::from_name(tool.name()).unwrap(), tool);
        }
        assert_eq!(defined.len(), Tool::iter().count());
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_by_name() {
        let (executor, provider) = executor();
        let err = execute_tool(&executor, "drop_everything", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            InsightsError::UnknownTool { ref name } if name == "drop_everything"
        ));
        assert_eq!(provider.acquired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejected_statement_never_acquires_a_connection() {
        let (executor, provider) = executor();
        for query in [
            "DELETE FROM customers",
            "SELECT * FROM customers; DROP TABLE customers",
            "SELECT 1; SELECT 2",
        ] {
            let err = execute_tool(&executor, "query_database", &json!({ "query": query }))
                .await
                .unwrap_err();
            assert!(err.is_rejection(), "{query}");
        }
        assert_eq!(provider.acquired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn query_database_returns_rows() {
        let (executor, provider) = executor();
        let response = execute_tool(
            &executor,
            "query_database",
            &json!({ "query": "SELECT 7 AS answer" }),
        )
        .await
        .unwrap();

        let ToolResponse::Rows { row_count, rows } = response else {
            panic!("expected rows");
        };
        assert_eq!(row_count, 1);
        assert_eq!(
            rows[0].get("answer").and_then(support_desk_analytics_models::CellValue::as_i64),
            Some(7)
        );
        assert_eq!(provider.acquired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_arguments_are_invalid_params() {
        let (executor, provider) = executor();
        let err = execute_tool(&executor, "query_database", &serde_json::Value::Null)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_params");

        let err = execute_tool(
            &executor,
            "get_customer_health_score",
            &json!({ "name": "x" }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "invalid_params");
        assert_eq!(provider.acquired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn bad_arguments_are_rejected_before_the_store() {
        let (executor, provider) = executor();
        let err = execute_tool(&executor, "get_open_tickets", &json!({ "priority": "Urgent" }))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");

        let err = execute_tool(&executor, "get_at_risk_customers", &json!({ "minMrr": -1 }))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
        assert_eq!(provider.acquired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn wrongly_typed_filters_are_invalid_arguments() {
        let (executor, provider) = executor();
        let err = execute_tool(&executor, "get_open_tickets", &json!({ "priority": 5 }))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            InsightsError::InvalidArgument { field: "priority", .. }
        ));

        let err = execute_tool(
            &executor,
            "get_at_risk_customers",
            &json!({ "minMrr": "50000" }),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            InsightsError::InvalidArgument { field: "minMrr", .. }
        ));
        assert_eq!(provider.acquired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn summarizes_responses() {
        assert_eq!(
            summarize_response(&ToolResponse::Rows {
                row_count: 3,
                rows: Vec::new()
            }),
            "3 row(s)"
        );
        assert_eq!(summarize_response(&not_found("acme")), "no match");
        assert_eq!(
            serde_json::to_value(not_found("  acme ")).unwrap(),
            json!({ "type": "notFound", "message": "No customer found matching 'acme'" })
        );
    }
}
