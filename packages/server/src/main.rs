#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Standalone entry point for the support desk API server.

use support_desk_server::{ServerConfig, ServerError, init_logger, run_server};

#[actix_web::main]
async fn main() -> Result<(), ServerError> {
    init_logger(None);
    run_server(ServerConfig::from_env()).await
}
