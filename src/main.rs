//! Gateway daemon entrypoint.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use krill_gateway::cli::{run_pair_action, Cli, Command};
use krill_gateway::collaborators::{CommandRestart, HttpHealthCheck, HttpLlmProbe};
use krill_gateway::config::{GatewayConfig, GATEWAY_VERSION};
use krill_gateway::config_update::ConfigUpdateOrchestrator;
use krill_gateway::health::{ActivityClock, HealthMonitor};
use krill_gateway::pairing::PairingManager;
use krill_gateway::protocol::Dispatcher;
use krill_gateway::server::PairingServer;
use krill_gateway::startup::schedule;
use krill_gateway::store::JsonStore;
use krill_gateway::verify::VerificationService;

/// Delay before the post-connect enrollment announcement.
const ANNOUNCE_DELAY: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = GatewayConfig::from_env()?;

    match cli.command {
        Some(Command::Pair { action }) => run_pair_action(&config, action).await?,
        Some(Command::Run) | None => run_daemon(config).await?,
    }
    Ok(())
}

async fn run_daemon(config: GatewayConfig) -> anyhow::Result<()> {
    tracing::info!(
        version = GATEWAY_VERSION,
        gateway_id = %config.gateway_id,
        "Starting krill gateway"
    );

    let verification = VerificationService::new(&config);
    let clock = ActivityClock::new();

    let pairing = PairingManager::new(
        JsonStore::new(config.pairings_path.clone()),
        config.agent.clone(),
    );

    let agent_id = config
        .agent
        .as_ref()
        .map(|a| a.agent_id.clone())
        .unwrap_or_default();

    let probe_url = std::env::var("KRILL_LLM_PROBE_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:7541/llm/probe".to_string());
    let health_url = std::env::var("KRILL_HEALTH_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:7541/health".to_string());
    let restart_cmd = std::env::var("KRILL_RESTART_CMD")
        .unwrap_or_else(|_| "systemctl restart krill-gateway".to_string());

    let health = Arc::new(HealthMonitor::new(
        clock.clone(),
        Arc::new(HttpLlmProbe::new(probe_url, verification.clone())),
        agent_id,
        config.gateway_id.clone(),
        config.grace_window,
        GATEWAY_VERSION.to_string(),
    ));

    let updates = Arc::new(ConfigUpdateOrchestrator::new(
        JsonStore::new(config.config_path.clone()),
        config.config_backup_path.clone(),
        config.update_allowlist.clone(),
        Arc::new(CommandRestart::new(restart_cmd)),
        Arc::new(HttpHealthCheck::new(health_url, verification.clone())),
        config.health_check_timeout,
    ));

    // The chat transport binds here: it hands every inbound message body to
    // `dispatcher.handle_raw` together with a reply sink for the room.
    let _dispatcher = Arc::new(Dispatcher::new(
        pairing.clone(),
        verification.clone(),
        health,
        updates,
        clock,
        None,
    ));

    let mut server = PairingServer::new(config.http_addr, Arc::new(pairing));
    server.start().await?;

    // Announce enrollment shortly after startup; cancelled on shutdown if
    // the timer has not fired yet.
    let announce = {
        let verification = verification.clone();
        let gateway_id = config.gateway_id.clone();
        let agent = config.agent.clone();
        schedule(ANNOUNCE_DELAY, async move {
            if let Some(agent) = agent {
                let enrolled_at = chrono::Utc::now().timestamp();
                let hash = verification.enrollment_hash(&agent.agent_id, &gateway_id, enrolled_at);
                tracing::info!(
                    agent = %agent.agent_id,
                    enrolled_at,
                    hash = %hash,
                    "Announcing enrollment"
                );
            }
        })
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    announce.cancel();
    server.shutdown().await;
    Ok(())
}
