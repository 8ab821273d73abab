#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for the support desk analytics tools.
//!
//! Exposes every read-only tool over HTTP so agents can discover and call
//! them, plus text renderings of the schema for use as prompt context.
//! Connections are borrowed from the configured provider per call.

mod handlers;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use support_desk_analytics::QueryExecutor;
use support_desk_database::{DatabaseConfig, DbError};

/// Shared application state.
pub struct AppState {
    /// Executes tool statements against the configured store.
    pub executor: QueryExecutor,
}

/// Errors that can stop the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The store could not be reached at startup.
    #[error(transparent)]
    Database(#[from] DbError),

    /// Binding or serving failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Listener and store settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind.
    pub bind_addr: String,
    /// Port to bind.
    pub port: u16,
    /// Store connection settings.
    pub database: DatabaseConfig,
}

impl ServerConfig {
    /// Reads `BIND_ADDR` and `PORT` plus the [`DatabaseConfig`] variables.
    #[must_use]
    pub fn from_env() -> Self {
        let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        Self {
            bind_addr,
            port,
            database: DatabaseConfig::from_env(),
        }
    }
}

/// Initializes `pretty_env_logger`.
///
/// The filter comes from `level` if given, else `LOG_LEVEL`, else
/// `RUST_LOG`, else `info`. Safe to call more than once.
pub fn init_logger(level: Option<&str>) {
    let filters = level
        .map(ToString::to_string)
        .or_else(|| std::env::var("LOG_LEVEL").ok())
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| "info".to_string());

    pretty_env_logger::formatted_builder()
        .parse_filters(&filters)
        .try_init()
        .ok();
}

/// Registers the API routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(handlers::health))
            .route("/tools", web::get().to(handlers::list_tools))
            .route("/tools/{name}", web::post().to(handlers::call_tool))
            .route("/resources/schema", web::get().to(handlers::schema_resource))
            .route("/resources/tables", web::get().to(handlers::tables_resource)),
    );
}

/// Starts the support desk API server.
///
/// Builds the connection provider, then serves until shut down. This is a
/// regular async function; the caller provides the runtime (e.g. via
/// `#[actix_web::main]` or [`run_blocking`]).
///
/// # Errors
///
/// Returns [`ServerError`] if the shared connection cannot be opened or
/// the HTTP server fails to bind.
#[allow(clippy::future_not_send)]
pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    log::info!("Connecting to database...");
    let executor = config.database.executor().await?;

    let state = web::Data::new(AppState { executor });

    log::info!("Starting server on {}:{}", config.bind_addr, config.port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((config.bind_addr, config.port))?
    .run()
    .await?;

    Ok(())
}

/// Runs [`run_server`] on a dedicated Actix system, blocking the calling
/// thread. Use from inside another runtime via `spawn_blocking`.
///
/// # Errors
///
/// Same as [`run_server`].
pub fn run_blocking(config: ServerConfig) -> Result<(), ServerError> {
    actix_rt::System::new().block_on(run_server(config))
}
