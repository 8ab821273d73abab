//! Statement execution against the backing store.
//!
//! The executor never opens connections itself. It borrows one from an
//! injected [`ConnectionProvider`] for the duration of a single round trip
//! and hands it back on every exit path, including failures and timeouts.

use std::sync::Arc;
use std::time::Duration;

use support_desk_analytics_models::{CellValue, RecordRow};
use switchy_database::{Database, DatabaseValue, Row};

use crate::validator::ReadOnlyStatement;
use crate::{ExecutionErrorKind, InsightsError};

/// Failure to obtain a connection from a [`ConnectionProvider`].
#[derive(Debug, thiserror::Error)]
#[error("Connection unavailable: {message}")]
pub struct ConnectionError {
    /// Description of what went wrong.
    pub message: String,
}

impl ConnectionError {
    /// Creates a connection error from anything printable.
    pub fn new(message: impl std::fmt::Display) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/// Source of store connections.
///
/// Every successful [`acquire`](Self::acquire) is paired with exactly one
/// [`release`](Self::release) of the same connection.
#[async_trait::async_trait]
pub trait ConnectionProvider: Send + Sync {
    /// Obtains a connection.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError`] if no connection can be obtained.
    async fn acquire(&self) -> Result<Arc<dyn Database>, ConnectionError>;

    /// Returns a connection obtained from [`acquire`](Self::acquire).
    fn release(&self, connection: Arc<dyn Database>);
}

/// Hands out one long-lived connection to every caller.
pub struct SharedConnection {
    db: Arc<dyn Database>,
}

impl SharedConnection {
    /// Wraps an open connection.
    #[must_use]
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl ConnectionProvider for SharedConnection {
    async fn acquire(&self) -> Result<Arc<dyn Database>, ConnectionError> {
        Ok(Arc::clone(&self.db))
    }

    fn release(&self, _connection: Arc<dyn Database>) {}
}

/// A borrowed connection, released when dropped.
struct Lease<'a> {
    provider: &'a dyn ConnectionProvider,
    db: Arc<dyn Database>,
}

impl<'a> Lease<'a> {
    async fn acquire(provider: &'a dyn ConnectionProvider) -> Result<Self, ConnectionError> {
        let db = provider.acquire().await?;
        Ok(Self { provider, db })
    }

    fn db(&self) -> &dyn Database {
        self.db.as_ref()
    }
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        self.provider.release(Arc::clone(&self.db));
    }
}

/// Runs validated statements and normalizes their rows.
#[derive(Clone)]
pub struct QueryExecutor {
    provider: Arc<dyn ConnectionProvider>,
    timeout: Option<Duration>,
}

impl QueryExecutor {
    /// Creates an executor that borrows connections from `provider`.
    #[must_use]
    pub fn new(provider: Arc<dyn ConnectionProvider>) -> Self {
        Self {
            provider,
            timeout: None,
        }
    }

    /// Limits each round trip to `timeout`.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The configured per-call time limit, if any.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Executes a statement and converts each row into a [`RecordRow`],
    /// keeping the store's column order.
    ///
    /// # Errors
    ///
    /// Returns [`InsightsError::Execution`] if no connection is available,
    /// the time limit elapses, or the store fails the statement.
    pub async fn execute(&self, stmt: &ReadOnlyStatement) -> Result<Vec<RecordRow>, InsightsError> {
        let rows = self.fetch_rows(stmt).await?;
        Ok(rows.iter().map(record_row).collect())
    }

    /// Executes a statement and returns the store's rows untouched.
    ///
    /// # Errors
    ///
    /// Same as [`Self::execute`].
    pub(crate) async fn fetch_rows(
        &self,
        stmt: &ReadOnlyStatement,
    ) -> Result<Vec<Row>, InsightsError> {
        let lease = Lease::acquire(self.provider.as_ref())
            .await
            .map_err(|e| execution_error(stmt, ExecutionErrorKind::Connectivity, &e))?;

        let query = lease.db().query_raw_params(stmt.sql(), stmt.params());

        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, query).await.map_err(|_| {
                execution_error(
                    stmt,
                    ExecutionErrorKind::Timeout,
                    &format!("no response within {}ms", limit.as_millis()),
                )
            })?,
            None => query.await,
        };

        let rows = result.map_err(|e| {
            let cause = e.to_string();
            execution_error(stmt, classify(&cause), &cause)
        })?;

        log::debug!("{} returned {} row(s)", stmt.operation(), rows.len());
        Ok(rows)
    }
}

fn execution_error(
    stmt: &ReadOnlyStatement,
    kind: ExecutionErrorKind,
    cause: &dyn std::fmt::Display,
) -> InsightsError {
    InsightsError::Execution {
        operation: stmt.operation(),
        summary: stmt.summary().to_string(),
        kind,
        cause: cause.to_string(),
    }
}

/// Sorts a store error message into a failure category.
fn classify(message: &str) -> ExecutionErrorKind {
    let message = message.to_lowercase();

    if message.contains("statement timeout")
        || message.contains("canceling statement")
        || message.contains("timed out")
    {
        ExecutionErrorKind::Timeout
    } else if message.contains("connection")
        && ["closed", "refused", "reset", "broken"]
            .iter()
            .any(|word| message.contains(word))
    {
        ExecutionErrorKind::Connectivity
    } else {
        ExecutionErrorKind::Store
    }
}

/// Converts a store row into a [`RecordRow`].
#[must_use]
pub fn record_row(row: &Row) -> RecordRow {
    row.columns
        .iter()
        .map(|(name, value)| (name.clone(), cell_value(value)))
        .collect()
}

fn cell_value(value: &DatabaseValue) -> CellValue {
    match value {
        DatabaseValue::Null => CellValue::Null,
        DatabaseValue::Bool(b) => CellValue::Bool(*b),
        DatabaseValue::BoolOpt(b) => b.map_or(CellValue::Null, CellValue::Bool),
        DatabaseValue::Int8(n) => CellValue::Integer(i64::from(*n)),
        DatabaseValue::Int8Opt(n) => n.map_or(CellValue::Null, |n| CellValue::Integer(n.into())),
        DatabaseValue::Int16(n) => CellValue::Integer(i64::from(*n)),
        DatabaseValue::Int16Opt(n) => n.map_or(CellValue::Null, |n| CellValue::Integer(n.into())),
        DatabaseValue::Int32(n) => CellValue::Integer(i64::from(*n)),
        DatabaseValue::Int32Opt(n) => n.map_or(CellValue::Null, |n| CellValue::Integer(n.into())),
        DatabaseValue::Int64(n) => CellValue::Integer(*n),
        DatabaseValue::Int64Opt(n) => n.map_or(CellValue::Null, CellValue::Integer),
        DatabaseValue::UInt8(n) => CellValue::Integer(i64::from(*n)),
        DatabaseValue::UInt8Opt(n) => n.map_or(CellValue::Null, |n| CellValue::Integer(n.into())),
        DatabaseValue::UInt16(n) => CellValue::Integer(i64::from(*n)),
        DatabaseValue::UInt16Opt(n) => n.map_or(CellValue::Null, |n| CellValue::Integer(n.into())),
        DatabaseValue::UInt32(n) => CellValue::Integer(i64::from(*n)),
        DatabaseValue::UInt32Opt(n) => n.map_or(CellValue::Null, |n| CellValue::Integer(n.into())),
        DatabaseValue::UInt64(n) => unsigned_cell(*n),
        DatabaseValue::UInt64Opt(n) => n.map_or(CellValue::Null, unsigned_cell),
        DatabaseValue::Real32(n) => CellValue::Real(f64::from(*n)),
        DatabaseValue::Real32Opt(n) => n.map_or(CellValue::Null, |n| CellValue::Real(n.into())),
        DatabaseValue::Real64(n) => CellValue::Real(*n),
        DatabaseValue::Real64Opt(n) => n.map_or(CellValue::Null, CellValue::Real),
        DatabaseValue::String(s) => CellValue::Text(s.clone()),
        DatabaseValue::StringOpt(s) => s.clone().map_or(CellValue::Null, CellValue::Text),
        DatabaseValue::DateTime(dt) => CellValue::Timestamp(*dt),
        // Server-side expressions such as `NOW()`; never returned as row data.
        other => CellValue::Text(format!("{other:?}")),
    }
}

/// Values past `i64::MAX` lose precision rather than wrapping.
#[allow(clippy::cast_precision_loss)]
fn unsigned_cell(n: u64) -> CellValue {
    i64::try_from(n).map_or(CellValue::Real(n as f64), CellValue::Integer)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Counts acquisitions and releases around a real connection.
    struct CountingProvider {
        db: Option<Arc<dyn Database>>,
        acquired: AtomicUsize,
        released: AtomicUsize,
    }

    impl CountingProvider {
        fn new(db: Option<Arc<dyn Database>>) -> Self {
            Self {
                db,
                acquired: AtomicUsize::new(0),
                released: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl ConnectionProvider for CountingProvider {
        async fn acquire(&self) -> Result<Arc<dyn Database>, ConnectionError> {
            let db = self
                .db
                .clone()
                .ok_or_else(|| ConnectionError::new("store unreachable"))?;
            self.acquired.fetch_add(1, Ordering::SeqCst);
            Ok(db)
        }

        fn release(&self, _connection: Arc<dyn Database>) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn scratch_db() -> Arc<dyn Database> {
        let path = std::env::temp_dir().join(format!("support_desk_{}.db", uuid::Uuid::new_v4()));
        let db = switchy_database_connection::init_sqlite_rusqlite(Some(path.as_path())).unwrap();
        Arc::from(db)
    }

    #[tokio::test]
    async fn converts_rows_in_column_order() {
        let provider = Arc::new(CountingProvider::new(Some(scratch_db())));
        let executor = QueryExecutor::new(provider.clone());
        let stmt = ReadOnlyStatement::parse(
            "SELECT 'ASML Holding' AS name, 42 AS tickets, NULL AS resolved_at",
        )
        .unwrap();

        let rows = executor.execute(&stmt).await.unwrap();

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(
            row.column_names().collect::<Vec<_>>(),
            ["name", "tickets", "resolved_at"]
        );
        assert_eq!(row.get("name").and_then(CellValue::as_str), Some("ASML Holding"));
        assert_eq!(row.get("tickets").and_then(CellValue::as_f64), Some(42.0));
        assert!(row.get("resolved_at").is_some_and(CellValue::is_null));
        assert_eq!(provider.acquired.load(Ordering::SeqCst), 1);
        assert_eq!(provider.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn store_failure_releases_connection() {
        let provider = Arc::new(CountingProvider::new(Some(scratch_db())));
        let executor = QueryExecutor::new(provider.clone());
        let stmt = ReadOnlyStatement::parse("SELECT * FROM no_such_table").unwrap();

        let err = executor.execute(&stmt).await.unwrap_err();

        assert!(matches!(
            err,
            InsightsError::Execution {
                kind: ExecutionErrorKind::Store,
                operation: "query_database",
                ..
            }
        ));
        assert_eq!(provider.acquired.load(Ordering::SeqCst), 1);
        assert_eq!(provider.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unavailable_connection_is_connectivity_error() {
        let provider = Arc::new(CountingProvider::new(None));
        let executor = QueryExecutor::new(provider.clone());
        let stmt = ReadOnlyStatement::parse("SELECT 1").unwrap();

        let err = executor.execute(&stmt).await.unwrap_err();

        assert_eq!(err.kind(), "connectivity");
        assert_eq!(provider.released.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn shared_connection_is_reused() {
        let executor = QueryExecutor::new(Arc::new(SharedConnection::new(scratch_db())))
            .with_timeout(Duration::from_secs(5));
        let stmt = ReadOnlyStatement::parse("SELECT 1 AS one").unwrap();

        for _ in 0..3 {
            let rows = executor.execute(&stmt).await.unwrap();
            assert_eq!(rows[0].get("one").and_then(CellValue::as_i64), Some(1));
        }
    }

    #[test]
    fn converts_every_native_width() {
        let created_at = chrono::NaiveDate::from_ymd_opt(2023, 4, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        let row = Row {
            columns: vec![
                ("priority_rank".to_string(), DatabaseValue::Int16(3)),
                ("ratio".to_string(), DatabaseValue::Real32(0.5)),
                ("tickets".to_string(), DatabaseValue::UInt32Opt(Some(7))),
                ("owner".to_string(), DatabaseValue::StringOpt(Some("ops".to_string()))),
                ("resolved_at".to_string(), DatabaseValue::Int64Opt(None)),
                ("note".to_string(), DatabaseValue::StringOpt(None)),
                ("created_at".to_string(), DatabaseValue::DateTime(created_at)),
                ("huge".to_string(), DatabaseValue::UInt64(u64::MAX)),
            ],
        };

        let record = record_row(&row);

        assert_eq!(record.get("priority_rank"), Some(&CellValue::Integer(3)));
        assert_eq!(record.get("ratio"), Some(&CellValue::Real(0.5)));
        assert_eq!(record.get("tickets"), Some(&CellValue::Integer(7)));
        assert_eq!(record.get("owner").and_then(CellValue::as_str), Some("ops"));
        assert!(record.get("resolved_at").is_some_and(CellValue::is_null));
        assert!(record.get("note").is_some_and(CellValue::is_null));
        assert_eq!(
            record.get("created_at"),
            Some(&CellValue::Timestamp(created_at))
        );
        assert!(matches!(record.get("huge"), Some(CellValue::Real(_))));
    }

    #[test]
    fn classifies_store_messages() {
        assert_eq!(
            classify("ERROR: canceling statement due to statement timeout"),
            ExecutionErrorKind::Timeout
        );
        assert_eq!(
            classify("connection closed by server"),
            ExecutionErrorKind::Connectivity
        );
        assert_eq!(
            classify("syntax error at or near \"FORM\""),
            ExecutionErrorKind::Store
        );
    }
}
