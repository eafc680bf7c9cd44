use std::net::SocketAddr;

use anyhow::{Context, Result};
use holonet_service::config::Config;
use holonet_service::metric;
use holonet_service::services::SharedServices;

use crate::endpoints;

/// Creates all services and runs the HTTP server on the configured address.
pub fn run(config: Config) -> Result<()> {
    // Log this metric before actually starting the server. This allows to see restarts even if
    // service creation fails.
    metric!(counter("server.starting") += 1);

    let megs = 1024 * 1024;
    let web_pool = tokio::runtime::Builder::new_multi_thread()
        .thread_name("holonet-web")
        .enable_all()
        .thread_stack_size(8 * megs)
        .build()?;

    let services = SharedServices::new(&config).context("failed to create services")?;
    let socket = config.bind.parse::<SocketAddr>()?;
    let server =
        axum_server::bind(socket).serve(endpoints::create_app(services).into_make_service());
    tracing::info!("Starting HTTP server on {}", socket);

    web_pool.block_on(server)?;
    tracing::info!("System shutdown complete");

    Ok(())
}
