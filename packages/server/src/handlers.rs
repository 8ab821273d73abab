//! HTTP handler functions for the support desk API.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, web};
use support_desk_analytics::{ExecutionErrorKind, InsightsError, catalog, tools};
use support_desk_server_models::{ApiError, ApiHealth, ApiToolList};

use crate::AppState;

/// Maps a tool failure to its HTTP status.
pub(crate) const fn status_for(err: &InsightsError) -> StatusCode {
    match err {
        InsightsError::UnknownTool { .. } => StatusCode::NOT_FOUND,
        InsightsError::Execution { kind, .. } => match kind {
            ExecutionErrorKind::Connectivity => StatusCode::BAD_GATEWAY,
            ExecutionErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ExecutionErrorKind::Store => StatusCode::INTERNAL_SERVER_ERROR,
        },
        _ => StatusCode::BAD_REQUEST,
    }
}

fn error_response(err: &InsightsError) -> HttpResponse {
    HttpResponse::build(status_for(err)).json(ApiError {
        kind: err.kind().to_string(),
        message: err.to_string(),
    })
}

/// `GET /api/health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /api/tools`
///
/// Lists every tool with its JSON Schema parameters.
pub async fn list_tools() -> HttpResponse {
    HttpResponse::Ok().json(ApiToolList {
        tools: support_desk_analytics_models::tool_definitions(),
    })
}

/// `POST /api/tools/{name}`
///
/// The body is the tool's argument object. An empty body means no
/// arguments.
pub async fn call_tool(
    state: web::Data<AppState>,
    name: web::Path<String>,
    body: web::Bytes,
) -> HttpResponse {
    let input = if body.iter().all(u8::is_ascii_whitespace) {
        serde_json::Value::Null
    } else {
        match serde_json::from_slice(&body) {
            Ok(value) => value,
            Err(e) => {
                return HttpResponse::BadRequest().json(ApiError {
                    kind: "invalid_params".to_string(),
                    message: format!("Request body is not valid JSON: {e}"),
                });
            }
        }
    };

    match tools::execute_tool(&state.executor, &name, &input).await {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(e) => error_response(&e),
    }
}

/// `GET /api/resources/schema`
///
/// Markdown rendering of every table's columns.
pub async fn schema_resource(state: web::Data<AppState>) -> HttpResponse {
    match catalog::describe_schema(&state.executor).await {
        Ok(columns) => HttpResponse::Ok()
            .content_type("text/markdown; charset=utf-8")
            .body(catalog::render_schema(&columns)),
        Err(e) => {
            log::error!("Failed to describe schema: {e}");
            error_response(&e)
        }
    }
}

/// `GET /api/resources/tables`
///
/// One `- name (size)` line per table.
pub async fn tables_resource(state: web::Data<AppState>) -> HttpResponse {
    match catalog::list_tables(&state.executor).await {
        Ok(tables) => HttpResponse::Ok()
            .content_type("text/plain; charset=utf-8")
            .body(catalog::render_tables(&tables)),
        Err(e) => {
            log::error!("Failed to list tables: {e}");
            error_response(&e)
        }
    }
}
