//! HTTP Gateway
//!
//! One route tree per protocol version, nested under the version's path
//! prefix (the legacy revision sits at the root). Every protocol route
//! requires a known caller; discovery is public.
//!
//! ```text
//! /.well-known/dspace-version
//! {prefix}/negotiations/request                        POST
//! {prefix}/negotiations/{pid}                          GET
//! {prefix}/negotiations/{pid}/agreement/verification   POST
//! {prefix}/negotiations/{pid}/termination              POST
//! {prefix}/transfers/request                           POST
//! {prefix}/transfers/{pid}                             GET
//! {prefix}/transfers/{pid}/start|completion|suspension|termination  POST
//! {prefix}/transfers/token/refresh                     POST
//! ```

pub mod handlers;
pub mod state;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::codec::ProtocolVersion;
use crate::config::GatewayConfig;
use crate::engine::ProtocolEngine;
use state::VersionState;

fn version_routes(state: VersionState) -> Router {
    Router::new()
        // Negotiation
        .route("/negotiations/request", post(handlers::contract_request))
        .route("/negotiations/{pid}", get(handlers::negotiation_status))
        .route(
            "/negotiations/{pid}/agreement/verification",
            post(handlers::contract_verification),
        )
        .route(
            "/negotiations/{pid}/termination",
            post(handlers::negotiation_termination),
        )
        // Transfer
        .route("/transfers/request", post(handlers::transfer_request))
        .route("/transfers/token/refresh", post(handlers::token_refresh))
        .route("/transfers/{pid}", get(handlers::transfer_status))
        .route("/transfers/{pid}/start", post(handlers::transfer_start))
        .route("/transfers/{pid}/completion", post(handlers::transfer_completion))
        .route("/transfers/{pid}/suspension", post(handlers::transfer_suspension))
        .route("/transfers/{pid}/termination", post(handlers::transfer_termination))
        .route_layer(from_fn_with_state(state.clone(), handlers::identify_caller))
        .with_state(state)
}

/// Complete router over all supported protocol versions.
pub fn router(engine: Arc<ProtocolEngine>) -> Router {
    let mut app = Router::new().route("/.well-known/dspace-version", get(handlers::dspace_version));
    for version in ProtocolVersion::ALL {
        let routes = version_routes(VersionState::new(engine.clone(), version));
        app = match version.path_prefix() {
            "" => app.merge(routes),
            prefix => app.nest(prefix, routes),
        };
    }
    app
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");
}

/// Bind and serve until Ctrl-C.
pub async fn run_server(config: &GatewayConfig, engine: Arc<ProtocolEngine>) -> std::io::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await.inspect_err(|e| {
        error!(addr = %addr, error = %e, "Failed to bind gateway");
    })?;

    info!(addr = %addr, "Gateway listening");
    for version in ProtocolVersion::ALL {
        info!(version = %version, path = version.advertised_path(), "Protocol version mounted");
    }

    axum::serve(listener, router(engine))
        .with_graceful_shutdown(shutdown_signal())
        .await
}
