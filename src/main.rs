//! DSP Provider - entry point
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌──────────┐    ┌──────────┐
//! │ Gateway  │───▶│  Engine  │───▶│ Dispatch │───▶│ Partner  │
//! │  (axum)  │    │(FSM+Tok) │    │  Queue   │    │callbacks │
//! └──────────┘    └──────────┘    └──────────┘    └──────────┘
//! ```
//!
//! Usage: `dsp_provider [--env dev] [--port 8080]`

use anyhow::Context;
use std::sync::Arc;
use tracing::info;

use dsp_provider::config::AppConfig;
use dsp_provider::dispatch::{HttpPartnerClient, WorkerPool};
use dsp_provider::engine::{Collaborators, ProtocolEngine};
use dsp_provider::gateway;
use dsp_provider::logging::init_logging;

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

fn get_port_override() -> Option<u16> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "--port" && i + 1 < args.len() {
            return args[i + 1].parse().ok();
        }
    }
    None
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let mut config =
        AppConfig::load(&env).with_context(|| format!("loading config/{}.yaml", env))?;
    if let Some(port) = get_port_override() {
        config.gateway.port = port;
    }
    let _log_guard = init_logging(&config);

    info!(
        env = %env,
        build = env!("GIT_HASH"),
        participant_id = %config.provider.participant_id,
        partners = config.partners.len(),
        assets = config.assets.len(),
        "DSP provider starting"
    );

    let client = HttpPartnerClient::new(config.dispatcher.http_timeout())
        .context("building partner HTTP client")?;
    let (engine, dispatch_ctx, receiver) =
        ProtocolEngine::build(&config, Collaborators::from_config(&config), Arc::new(client));
    let pool = WorkerPool::spawn(dispatch_ctx, receiver, config.dispatcher.workers);
    info!(workers = pool.size(), "Dispatch pool running");

    gateway::run_server(&config.gateway, engine)
        .await
        .context("gateway server")?;

    // The engine (and with it the queue sender) is gone once the server
    // returns, so the workers drain and stop
    pool.join().await;
    info!("DSP provider stopped");
    Ok(())
}
