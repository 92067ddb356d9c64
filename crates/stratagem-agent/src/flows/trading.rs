use std::collections::HashMap;

use tracing::{error, info};

use stratagem_core::types::{StrategyData, StrategyInsertData, RESULT_FAILED, RESULT_SUCCESS};

use crate::error::AgentError;
use crate::flows::{CODE_ATTEMPTS, RESEARCH_ATTEMPTS, STRATEGY_ATTEMPTS};
use crate::summarizer::summarize_or_first;
use crate::trading::TradingAgent;

/// Per-cycle inputs for a trading run.
pub struct TradingCycle<'a> {
    pub session_id: &'a str,
    pub role: &'a str,
    pub time: &'a str,
    pub apis: &'a [String],
    pub trading_instruments: &'a [String],
    pub metric_name: &'a str,
    pub signer_url: &'a str,
    pub prev_strategy: Option<&'a StrategyData>,
    pub notification_str: &'a str,
}

/// Assisted flow: strategy → address research → trading code.
pub async fn assisted_flow(
    agent: &mut TradingAgent,
    cycle: &TradingCycle<'_>,
) -> Result<(), AgentError> {
    run_flow(agent, cycle, true).await
}

/// Unassisted flow: strategy → trading code, no address research.
pub async fn unassisted_flow(
    agent: &mut TradingAgent,
    cycle: &TradingCycle<'_>,
) -> Result<(), AgentError> {
    run_flow(agent, cycle, false).await
}

async fn run_flow(
    agent: &mut TradingAgent,
    cycle: &TradingCycle<'_>,
    assisted: bool,
) -> Result<(), AgentError> {
    agent.reset();
    info!(agent_id = %agent.agent_id, assisted, "starting trading cycle");

    let metric_state = agent.sensor.metric_state(cycle.metric_name).await;
    info!(metric = cycle.metric_name, state = %metric_state, "metric snapshot");

    agent.chat_history =
        agent.prepare_system(cycle.role, cycle.time, cycle.metric_name, &metric_state);

    // ---- strategy stage -------------------------------------------------
    let mut strategy_output = String::new();
    let mut strategy_ok = false;
    {
        let mut err_acc = String::new();
        for attempt in 1..=STRATEGY_ATTEMPTS {
            let result = match cycle.prev_strategy {
                None => agent.gen_strategy_on_first(cycle.apis).await,
                Some(prev) => {
                    agent
                        .gen_strategy(
                            cycle.notification_str,
                            &prev.summarized_desc,
                            &prev.strategy_result,
                            cycle.apis,
                        )
                        .await
                }
            };

            match result {
                Ok((output, delta)) => {
                    info!(attempt, "strategy generated");
                    agent.chat_history = agent.chat_history.concat(&delta);
                    agent
                        .store
                        .insert_chat_history(cycle.session_id, &delta, None)
                        .await?;
                    strategy_output = output;
                    strategy_ok = true;
                    break;
                }
                Err(e) => {
                    error!(attempt, error = %e, "strategy generation failed");
                    err_acc.push_str(&format!("\n{}", e));
                }
            }
        }
    }

    // ---- address research stage (assisted only) -------------------------
    let mut address_research = String::new();
    let mut research_ok = !assisted;
    if strategy_ok && assisted {
        let mut code = String::new();
        let mut err_acc = String::new();
        let mut regen = false;
        for attempt in 1..=RESEARCH_ATTEMPTS {
            let result = if regen {
                agent.gen_better_code(&code, &err_acc).await
            } else {
                agent
                    .gen_address_research_code(
                        cycle.role,
                        cycle.time,
                        cycle.metric_name,
                        &metric_state,
                    )
                    .await
            };

            let (new_code, delta) = match result {
                Ok(pair) => pair,
                Err(e) => {
                    error!(attempt, error = %e, "address research generation failed");
                    err_acc.push_str(&format!("\n{}", e));
                    regen = true;
                    continue;
                }
            };

            code = new_code;
            agent.chat_history = agent.chat_history.concat(&delta);
            agent
                .store
                .insert_chat_history(cycle.session_id, &delta, None)
                .await?;

            match agent.sandbox.run_code(&code, "trading_address_research").await {
                Ok(artifact) => {
                    info!(attempt, "address research done");
                    address_research = artifact.stdout_merged;
                    research_ok = true;
                    break;
                }
                Err(e) if e.is_recoverable() => {
                    error!(attempt, error = %e, "address research run failed");
                    err_acc.push_str(&format!("\n{}", e));
                    regen = true;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    // ---- trading code stage ---------------------------------------------
    let mut output = String::new();
    let mut code_ok = false;
    if strategy_ok && research_ok {
        let mut code = String::new();
        let mut err_acc = String::new();
        let mut regen = false;
        for attempt in 1..=CODE_ATTEMPTS {
            let result = if regen {
                agent
                    .gen_better_code(&code, &err_acc)
                    .await
                    .map_err(AgentError::Gen)
            } else if assisted {
                agent
                    .gen_trading_code(
                        &strategy_output,
                        &address_research,
                        cycle.apis,
                        cycle.trading_instruments,
                        cycle.signer_url,
                    )
                    .await
            } else {
                agent
                    .gen_trading_code_non_address(
                        &strategy_output,
                        cycle.apis,
                        cycle.trading_instruments,
                        cycle.signer_url,
                    )
                    .await
            };

            let (new_code, delta) = match result {
                Ok(pair) => pair,
                Err(AgentError::Gen(e)) => {
                    error!(attempt, error = %e, "trading code generation failed");
                    err_acc.push_str(&format!("\n{}", e));
                    regen = true;
                    continue;
                }
                Err(e) => return Err(e),
            };

            code = new_code;
            agent.chat_history = agent.chat_history.concat(&delta);
            agent
                .store
                .insert_chat_history(cycle.session_id, &delta, None)
                .await?;

            match agent.sandbox.run_code(&code, "trading_execute").await {
                Ok(artifact) => {
                    info!(attempt, "trading code ran");
                    output = artifact.stdout_merged;
                    code_ok = true;
                    break;
                }
                Err(e) if e.is_recoverable() => {
                    error!(attempt, error = %e, "trading code run failed");
                    err_acc.push_str(&format!("\n{}", e));
                    regen = true;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    let success = strategy_ok && research_ok && code_ok;
    if success {
        info!(output = %output, "trading cycle succeeded");
    } else {
        info!("trading cycle failed, recording the outcome anyway");
    }

    // ---- persist ---------------------------------------------------------
    let summarized_desc =
        summarize_or_first(agent.generator.as_ref(), &[strategy_output.clone()]).await;

    let parameters: HashMap<String, serde_json::Value> = HashMap::from([
        ("apis".to_string(), serde_json::json!(cycle.apis)),
        (
            "trading_instruments".to_string(),
            serde_json::json!(cycle.trading_instruments),
        ),
        (
            "metric_name".to_string(),
            serde_json::json!(cycle.metric_name),
        ),
        ("metric_state".to_string(), serde_json::json!(metric_state)),
        (
            "prev_strat".to_string(),
            serde_json::json!(cycle
                .prev_strategy
                .map(|p| p.summarized_desc.clone())
                .unwrap_or_default()),
        ),
    ]);

    agent
        .store
        .insert_strategy(
            &agent.agent_id,
            StrategyInsertData {
                summarized_desc,
                full_desc: strategy_output,
                parameters,
                strategy_result: if success { RESULT_SUCCESS } else { RESULT_FAILED }
                    .to_string(),
            },
        )
        .await?;

    info!("trading cycle recorded");
    Ok(())
}
