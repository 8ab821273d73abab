#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the support desk server.
//!
//! Tool results themselves are serialized straight from the analytics
//! models; these types cover the envelope around them.

use serde::{Deserialize, Serialize};

/// Health check response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHealth {
    /// Whether the server is healthy.
    pub healthy: bool,
    /// Server version.
    pub version: String,
}

/// A failed tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Stable, machine-readable error kind.
    pub kind: String,
    /// Human-readable description.
    pub message: String,
}

/// Tool definitions offered to agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiToolList {
    /// One entry per tool: name, description and JSON Schema parameters.
    pub tools: Vec<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_serializes_kind_and_message() {
        let err = ApiError {
            kind: "forbidden_operation".to_string(),
            message: "Forbidden operation detected: DROP".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            serde_json::json!({
                "kind": "forbidden_operation",
                "message": "Forbidden operation detected: DROP",
            })
        );
    }
}
