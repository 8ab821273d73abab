#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Read-only analytics over the customer/support dataset for AI agent
//! tool execution.
//!
//! Free-form statements pass through the [`validator`] before they can be
//! executed. The fixed analytic operations in [`queries`] and [`catalog`]
//! build parameterized statements and hand them to the
//! [`executor::QueryExecutor`]. [`health`] turns fetched ticket metrics into
//! a bounded score without touching the store.

pub mod catalog;
pub mod executor;
pub mod health;
pub mod queries;
pub mod tools;
pub mod validator;

use thiserror::Error;

pub use executor::{ConnectionError, ConnectionProvider, QueryExecutor, SharedConnection};
pub use validator::{ReadOnlyStatement, Rejection, validate};

/// Which part of a store round trip failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display, strum_macros::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ExecutionErrorKind {
    /// No connection could be obtained, or it dropped mid-query.
    Connectivity,
    /// The round trip exceeded its time limit.
    Timeout,
    /// The store rejected or failed the statement.
    Store,
}

/// Errors that can occur during analytics operations.
#[derive(Debug, Error)]
pub enum InsightsError {
    /// The statement does not start with `SELECT`.
    #[error("Only SELECT queries are permitted")]
    NotReadOnly,

    /// The statement contains a mutating or DDL keyword.
    #[error("Forbidden operation detected: {keyword}")]
    ForbiddenOperation {
        /// The denylisted keyword that was found.
        keyword: &'static str,
    },

    /// More than one statement was submitted.
    #[error("Only a single statement is permitted")]
    MultipleStatements,

    /// A tool argument is out of range or unrecognized.
    #[error("Invalid argument '{field}': {reason}")]
    InvalidArgument {
        /// Argument name as the caller sees it.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// The store round trip failed. Never retried.
    #[error("{operation} failed ({kind}) for {summary}: {cause}")]
    Execution {
        /// The operation that issued the statement.
        operation: &'static str,
        /// Sanitized summary of the arguments.
        summary: String,
        /// Failure category.
        kind: ExecutionErrorKind,
        /// Underlying error message.
        cause: String,
    },

    /// No tool with this name exists.
    #[error("Unknown tool: {name}")]
    UnknownTool {
        /// The requested tool name.
        name: String,
    },

    /// Tool parameters did not deserialize.
    #[error("Invalid parameters for {tool}: {source}")]
    InvalidParams {
        /// The tool being invoked.
        tool: &'static str,
        /// Deserialization failure.
        #[source]
        source: serde_json::Error,
    },
}

impl InsightsError {
    /// Stable, machine-readable error kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotReadOnly => "not_read_only",
            Self::ForbiddenOperation { .. } => "forbidden_operation",
            Self::MultipleStatements => "multiple_statements",
            Self::InvalidArgument { .. } => "invalid_argument",
            Self::Execution { kind, .. } => match kind {
                ExecutionErrorKind::Connectivity => "connectivity",
                ExecutionErrorKind::Timeout => "timeout",
                ExecutionErrorKind::Store => "store",
            },
            Self::UnknownTool { .. } => "unknown_tool",
            Self::InvalidParams { .. } => "invalid_params",
        }
    }

    /// Returns `true` for errors raised before any store round trip.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        !matches!(self, Self::Execution { .. })
    }
}

impl From<Rejection> for InsightsError {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::NotReadOnly => Self::NotReadOnly,
            Rejection::ForbiddenOperation(keyword) => Self::ForbiddenOperation { keyword },
            Rejection::MultipleStatements => Self::MultipleStatements,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_map_to_distinct_kinds() {
        let kinds = [
            InsightsError::from(Rejection::NotReadOnly).kind(),
            InsightsError::from(Rejection::ForbiddenOperation("DROP")).kind(),
            InsightsError::from(Rejection::MultipleStatements).kind(),
        ];
        assert_eq!(
            kinds,
            ["not_read_only", "forbidden_operation", "multiple_statements"]
        );
    }

    #[test]
    fn execution_kind_is_reported() {
        let err = InsightsError::Execution {
            operation: "get_open_tickets",
            summary: "priority=High".to_string(),
            kind: ExecutionErrorKind::Timeout,
            cause: "deadline elapsed".to_string(),
        };
        assert_eq!(err.kind(), "timeout");
        assert!(!err.is_rejection());
        assert_eq!(
            err.to_string(),
            "get_open_tickets failed (timeout) for priority=High: deadline elapsed"
        );
    }
}
