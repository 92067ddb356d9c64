use clap::Parser;
use tracing::info;

use stratagem_core::config::Config;
use stratagem_core::types::AgentKind;

mod driver;
mod manager;
mod services;

/// Run an autonomous agent: one long-lived driver loop per process.
#[derive(Parser)]
#[command(name = "agent", version, about = "Autonomous strategy-agent runner")]
struct Cli {
    /// Agent kind to drive.
    #[arg(value_parser = parse_kind)]
    agent_type: AgentKind,

    /// Session this run belongs to.
    session_id: String,

    /// Agent identity (owns strategies, wallet, index partitions).
    agent_id: String,

    /// Path to stratagem.toml (defaults to ./stratagem.toml).
    #[arg(long)]
    config: Option<String>,
}

fn parse_kind(raw: &str) -> Result<AgentKind, String> {
    raw.parse()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stratagem=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        Config::default()
    });

    info!(
        kind = %cli.agent_type,
        session_id = %cli.session_id,
        agent_id = %cli.agent_id,
        "starting agent runner"
    );

    driver::run(cli.agent_type, &cli.session_id, &cli.agent_id, config).await
}
