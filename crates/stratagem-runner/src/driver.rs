//! The forever loop: session bootstrap, component wiring, and the
//! cycle-pace-cycle rhythm. A failed cycle is logged and the loop moves
//! on; only construction-time faults (bad templates, no sandbox, no
//! store) abort the process.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{error, info, warn};

use stratagem_agent::flows::{assisted_flow, marketing_flow, MarketingCycle, TradingCycle};
use stratagem_agent::prompts::{MarketingPrompts, TradingPrompts};
use stratagem_agent::{MarketingAgent, TradingAgent};
use stratagem_core::config::Config;
use stratagem_core::types::{AgentKind, SessionState, SessionStatus, TIMESTAMP_FORMAT};
use stratagem_llm::{build_generator, TokenSink};
use stratagem_rag::{Embedder, HashEmbedder, HttpIndex, OpenAiEmbedder, StrategyIndex, StrategyRag};
use stratagem_sandbox::{DockerCli, Sandbox, SandboxExecutor};
use stratagem_sensor::{MarketingSensor, TradingSensor};
use stratagem_store::{HttpStore, OutcomeStore, SqliteStore};

use crate::manager::{ManagerClient, SessionSettings};
use crate::services::{services_to_envs, services_to_prompts};

const TRADING_NOTIFICATION_LIMIT: usize = 5;
const MARKETING_NOTIFICATION_LIMIT: usize = 2;

pub async fn run(
    kind: AgentKind,
    session_id: &str,
    agent_id: &str,
    config: Config,
) -> anyhow::Result<()> {
    let store = build_store(&config).context("outcome store construction")?;
    ensure_session(store.as_ref(), session_id, agent_id)
        .await
        .context("session bootstrap")?;

    let manager = (!config.services.manager_url.is_empty()).then(|| {
        Arc::new(ManagerClient::new(
            config.services.manager_url.clone(),
            session_id,
        ))
    });

    let settings = match &manager {
        Some(client) => client.fetch_session_settings(kind).await,
        None => {
            info!("no manager service configured, using default session settings");
            SessionSettings::defaults(kind)
        }
    };

    let sink: Option<TokenSink> = manager.as_ref().map(|client| {
        let client = Arc::clone(client);
        Arc::new(move |token: &str| client.push_token(token)) as TokenSink
    });

    let generator = build_generator(&config.llm, sink).context("generator construction")?;

    let sandbox_env = services_to_envs(&settings.research_tools);
    let apis = services_to_prompts(&settings.research_tools);
    let sandbox: Arc<dyn Sandbox> = Arc::new(
        SandboxExecutor::connect(DockerCli::new(), &config.sandbox, sandbox_env)
            .await
            .context("sandbox construction")?,
    );

    let rag = build_rag(&config, agent_id, session_id).context("index construction")?;

    match kind {
        AgentKind::Trading => {
            let prompts =
                TradingPrompts::new(settings.prompts.clone()).context("template validation")?;
            let sensor = Arc::new(TradingSensor::new(
                agent_id,
                config.services.signer_url.clone(),
                config.chain.rpc_url.clone(),
                config.chain.indexer_url.clone(),
                config.chain.indexer_api_key.clone(),
                config.chain.price_oracle_url.clone(),
            ));
            let agent = TradingAgent::new(
                agent_id,
                generator,
                prompts,
                sensor,
                sandbox,
                Arc::clone(&store),
                Arc::clone(&rag),
            );
            tokio::select! {
                result = run_trading(agent, &config, &settings, &apis, session_id) => result,
                result = stop_on_signal(Arc::clone(&store), session_id, agent_id) => result,
            }
        }
        AgentKind::Marketing => {
            let prompts =
                MarketingPrompts::new(settings.prompts.clone()).context("template validation")?;
            let sensor = Arc::new(MarketingSensor::new(
                config.social.base_url.clone(),
                config.social.bearer_token.clone(),
            ));
            let agent = MarketingAgent::new(
                agent_id,
                generator,
                prompts,
                sensor,
                sandbox,
                Arc::clone(&store),
                Arc::clone(&rag),
            );
            tokio::select! {
                result = run_marketing(agent, &config, &settings, &apis, session_id) => result,
                result = stop_on_signal(Arc::clone(&store), session_id, agent_id) => result,
            }
        }
    }
}

/// Wait for ctrl-c, mark the session stopped, and let the process exit.
async fn stop_on_signal(
    store: Arc<dyn OutcomeStore>,
    session_id: &str,
    agent_id: &str,
) -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, marking session stopped");
    if let Err(e) = store
        .update_session_status(session_id, agent_id, SessionStatus::Stopped)
        .await
    {
        warn!(error = %e, "session stop update failed");
    }
    Ok(())
}

async fn run_trading(
    mut agent: TradingAgent,
    config: &Config,
    settings: &SessionSettings,
    apis: &[String],
    session_id: &str,
) -> anyhow::Result<()> {
    // seed the index with the agent's whole history before the first cycle
    match agent.store.fetch_all_strategies(&agent.agent_id).await {
        Ok(all) => {
            info!(count = all.len(), "seeding index with prior strategies");
            if let Err(e) = agent.rag.save_strategies(&all).await {
                warn!(error = %e, "index seeding failed");
            }
        }
        Err(e) => warn!(error = %e, "could not fetch prior strategies"),
    }

    loop {
        let prev = match agent.store.fetch_latest_strategy(&agent.agent_id).await {
            Ok(prev) => prev,
            Err(e) => {
                warn!(error = %e, "latest-strategy read failed, treating as first cycle");
                None
            }
        };
        if let Some(strategy) = &prev {
            if let Err(e) = agent.rag.save_strategies(std::slice::from_ref(strategy)).await {
                warn!(error = %e, "index upsert failed");
            }
        }

        let notification_str = fetch_notifications(
            agent.store.as_ref(),
            &settings.notification_sources,
            TRADING_NOTIFICATION_LIMIT,
        )
        .await;

        let cycle = TradingCycle {
            session_id,
            role: &settings.role,
            time: &settings.time,
            apis,
            trading_instruments: &settings.trading_instruments,
            metric_name: &settings.metric_name,
            signer_url: &config.services.signer_url,
            prev_strategy: prev.as_ref(),
            notification_str: &notification_str,
        };

        if let Err(e) = assisted_flow(&mut agent, &cycle).await {
            error!(error = %e, "trading cycle failed");
        }

        bump_cycle_count(agent.store.as_ref(), session_id, &agent.agent_id).await;
        pace(config).await;
    }
}

async fn run_marketing(
    mut agent: MarketingAgent,
    config: &Config,
    settings: &SessionSettings,
    apis: &[String],
    session_id: &str,
) -> anyhow::Result<()> {
    loop {
        let prev = match agent.store.fetch_latest_strategy(&agent.agent_id).await {
            Ok(prev) => prev,
            Err(e) => {
                warn!(error = %e, "latest-strategy read failed, treating as first cycle");
                None
            }
        };
        if let Some(strategy) = &prev {
            if let Err(e) = agent.rag.save_strategies(std::slice::from_ref(strategy)).await {
                warn!(error = %e, "index upsert failed");
            }
        }

        let notification_str = fetch_notifications(
            agent.store.as_ref(),
            &settings.notification_sources,
            MARKETING_NOTIFICATION_LIMIT,
        )
        .await;

        let cycle = MarketingCycle {
            session_id,
            role: &settings.role,
            time: &settings.time,
            apis,
            metric_name: &settings.metric_name,
            prev_strategy: prev.as_ref(),
            notification_str: (!notification_str.is_empty()).then_some(notification_str.as_str()),
        };

        if let Err(e) = marketing_flow(&mut agent, &cycle).await {
            error!(error = %e, "marketing cycle failed");
        }

        bump_cycle_count(agent.store.as_ref(), session_id, &agent.agent_id).await;
        pace(config).await;
    }
}

fn build_store(config: &Config) -> anyhow::Result<Arc<dyn OutcomeStore>> {
    if !config.services.store_url.is_empty() {
        info!(url = %config.services.store_url, "using REST outcome store");
        Ok(Arc::new(HttpStore::new(
            config.services.store_url.clone(),
            config.services.store_api_key.clone(),
        )))
    } else {
        info!(path = %config.runner.db_path, "using local SQLite outcome store");
        Ok(Arc::new(SqliteStore::open(&config.runner.db_path)?))
    }
}

fn build_rag(
    config: &Config,
    agent_id: &str,
    session_id: &str,
) -> anyhow::Result<Arc<dyn StrategyRag>> {
    if !config.services.rag_url.is_empty() {
        info!(url = %config.services.rag_url, "using remote semantic index");
        return Ok(Arc::new(HttpIndex::new(
            config.services.rag_url.clone(),
            agent_id,
            session_id,
        )));
    }

    let embedder: Arc<dyn Embedder> = if config.llm.embed_api_key.is_empty() {
        warn!("no embeddings key configured, using the hash embedder");
        Arc::new(HashEmbedder::new())
    } else {
        Arc::new(OpenAiEmbedder::new(
            config.llm.embed_api_key.clone(),
            config.llm.embed_base_url.clone(),
            config.llm.embed_model.clone(),
        ))
    };
    info!(dir = %config.runner.rag_dir, "using local semantic index");
    Ok(Arc::new(StrategyIndex::new(
        agent_id,
        embedder,
        config.runner.rag_dir.clone(),
    )?))
}

/// Mark an existing session row running, or create a fresh one.
async fn ensure_session(
    store: &dyn OutcomeStore,
    session_id: &str,
    agent_id: &str,
) -> anyhow::Result<()> {
    match store.get_session(session_id).await? {
        Some(_) => {
            info!(session_id, "resuming existing session");
            store
                .update_session_status(session_id, agent_id, SessionStatus::Running)
                .await?;
        }
        None => {
            info!(session_id, "creating session");
            store
                .create_session(&SessionState {
                    session_id: session_id.to_string(),
                    agent_id: agent_id.to_string(),
                    started_at: chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string(),
                    ended_at: None,
                    status: SessionStatus::Running,
                    cycle_count: 0,
                    will_end_at: None,
                })
                .await?;
        }
    }
    Ok(())
}

async fn fetch_notifications(
    store: &dyn OutcomeStore,
    sources: &[String],
    limit: usize,
) -> String {
    match store.fetch_latest_notification_str(sources, limit).await {
        Ok(text) => {
            info!(lines = text.lines().count(), "fetched notifications");
            text
        }
        Err(e) => {
            warn!(error = %e, "notification fetch failed, continuing without");
            String::new()
        }
    }
}

async fn bump_cycle_count(store: &dyn OutcomeStore, session_id: &str, agent_id: &str) {
    if let Err(e) = store.increment_cycle_count(session_id, agent_id).await {
        warn!(error = %e, "cycle-count update failed");
    }
}

async fn pace(config: &Config) {
    info!(secs = config.runner.pacing_secs, "waiting before next cycle");
    tokio::time::sleep(Duration::from_secs(config.runner.pacing_secs)).await;
}
