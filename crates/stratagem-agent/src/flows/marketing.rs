use std::collections::HashMap;

use tracing::{error, info, warn};

use stratagem_core::types::{StrategyData, StrategyInsertData, RESULT_FAILED, RESULT_SUCCESS};

use crate::error::AgentError;
use crate::flows::{
    CODE_ATTEMPTS, FRESH_ENVIRONMENT, NO_RAG_RESULT, RESEARCH_ATTEMPTS, STRATEGY_ATTEMPTS,
};
use crate::marketing::MarketingAgent;
use crate::summarizer::summarize_or_first;

/// Per-cycle inputs for a marketing run.
pub struct MarketingCycle<'a> {
    pub session_id: &'a str,
    pub role: &'a str,
    pub time: &'a str,
    pub apis: &'a [String],
    pub metric_name: &'a str,
    pub prev_strategy: Option<&'a StrategyData>,
    /// Absent or empty means a fresh environment.
    pub notification_str: Option<&'a str>,
}

/// Research → strategy → marketing code, bracketed by metric readings so
/// the recorded parameters capture the state change the cycle caused.
pub async fn marketing_flow(
    agent: &mut MarketingAgent,
    cycle: &MarketingCycle<'_>,
) -> Result<(), AgentError> {
    agent.reset();
    info!(agent_id = %agent.agent_id, "starting marketing cycle");

    let notif_str = cycle
        .notification_str
        .filter(|s| !s.is_empty())
        .unwrap_or(FRESH_ENVIRONMENT);

    let start_metric_state = agent.sensor.metric_state(cycle.metric_name).await;
    info!(metric = cycle.metric_name, state = %start_metric_state, "metric snapshot");

    // Closest past strategy for this situation, with its before/after
    // metric readings. Placeholders when the index has nothing.
    let (rag_summary, rag_before, rag_after) =
        match agent.rag.relevant_strategies(notif_str, 1).await {
            Ok(hits) if !hits.is_empty() => {
                let hit = &hits[0];
                info!(summary = %hit.summarized_desc, "using related past strategy");
                (
                    hit.summarized_desc.clone(),
                    hit.parameter_str("start_metric_state")
                        .unwrap_or(NO_RAG_RESULT)
                        .to_string(),
                    hit.parameter_str("end_metric_state")
                        .unwrap_or(NO_RAG_RESULT)
                        .to_string(),
                )
            }
            Ok(_) => {
                info!("no related past strategy found");
                (
                    NO_RAG_RESULT.to_string(),
                    NO_RAG_RESULT.to_string(),
                    NO_RAG_RESULT.to_string(),
                )
            }
            Err(e) => {
                warn!(error = %e, "index lookup failed, continuing without");
                (
                    NO_RAG_RESULT.to_string(),
                    NO_RAG_RESULT.to_string(),
                    NO_RAG_RESULT.to_string(),
                )
            }
        };

    agent.chat_history =
        agent.prepare_system(cycle.role, cycle.time, cycle.metric_name, &start_metric_state);

    // ---- research stage --------------------------------------------------
    let mut research_output = String::new();
    let mut research_ok = false;
    {
        let mut code = String::new();
        let mut err_acc = String::new();
        let mut regen = false;
        for attempt in 1..=RESEARCH_ATTEMPTS {
            let result = if regen {
                agent.gen_better_code(&code, &err_acc).await
            } else if cycle.prev_strategy.is_none() {
                agent.gen_research_code_on_first(cycle.apis).await
            } else {
                agent
                    .gen_research_code(
                        notif_str,
                        cycle
                            .prev_strategy
                            .map(|p| p.summarized_desc.as_str())
                            .unwrap_or(""),
                        &rag_summary,
                        &rag_before,
                        &rag_after,
                    )
                    .await
            };

            let (new_code, delta) = match result {
                Ok(pair) => pair,
                Err(e) => {
                    error!(attempt, error = %e, "research generation failed");
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

            match agent.sandbox.run_code(&code, "marketing_research").await {
                Ok(artifact) => {
                    info!(attempt, "research code ran");
                    research_output = artifact.stdout_merged;
                    research_ok = true;
                    break;
                }
                Err(e) if e.is_recoverable() => {
                    error!(attempt, error = %e, "research run failed");
                    err_acc.push_str(&format!("\n{}", e));
                    regen = true;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    // ---- strategy stage --------------------------------------------------
    let mut strategy_output = String::new();
    let mut strategy_ok = false;
    if research_ok {
        let mut err_acc = String::new();
        for attempt in 1..=STRATEGY_ATTEMPTS {
            match agent
                .gen_strategy(notif_str, &research_output, cycle.metric_name, cycle.time)
                .await
            {
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

    // ---- marketing code stage --------------------------------------------
    let mut marketing_code_output = String::new();
    let mut code_ok = false;
    if strategy_ok {
        let mut code = String::new();
        let mut err_acc = String::new();
        let mut regen = false;
        for attempt in 1..=CODE_ATTEMPTS {
            let result = if regen {
                agent.gen_better_code(&code, &err_acc).await
            } else {
                agent.gen_marketing_code(&strategy_output, cycle.apis).await
            };

            let (new_code, delta) = match result {
                Ok(pair) => pair,
                Err(e) => {
                    error!(attempt, error = %e, "marketing code generation failed");
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

            match agent.sandbox.run_code(&code, "marketing_execute").await {
                Ok(artifact) => {
                    info!(attempt, "marketing code ran");
                    marketing_code_output = artifact.stdout_merged;
                    code_ok = true;
                    break;
                }
                Err(e) if e.is_recoverable() => {
                    error!(attempt, error = %e, "marketing code run failed");
                    err_acc.push_str(&format!("\n{}", e));
                    regen = true;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    let success = research_ok && strategy_ok && code_ok;

    // ---- wrap up ----------------------------------------------------------
    let end_metric_state = agent.sensor.metric_state(cycle.metric_name).await;

    let summarized_state_change = summarize_or_first(
        agent.generator.as_ref(),
        &[
            format!("This is the start state {}", start_metric_state),
            format!("This is the end state {}", end_metric_state),
            "Summarize the state changes of the above".to_string(),
        ],
    )
    .await;
    info!(change = %summarized_state_change, "state change summarized");

    let summarized_code = summarize_or_first(
        agent.generator.as_ref(),
        &[
            marketing_code_output.clone(),
            "Summarize the code".to_string(),
        ],
    )
    .await;

    let summarized_desc =
        summarize_or_first(agent.generator.as_ref(), &[strategy_output.clone()]).await;

    let parameters: HashMap<String, serde_json::Value> = HashMap::from([
        ("apis".to_string(), serde_json::json!(cycle.apis)),
        (
            "metric_name".to_string(),
            serde_json::json!(cycle.metric_name),
        ),
        (
            "start_metric_state".to_string(),
            serde_json::json!(start_metric_state),
        ),
        (
            "end_metric_state".to_string(),
            serde_json::json!(end_metric_state),
        ),
        (
            "summarized_state_change".to_string(),
            serde_json::json!(summarized_state_change),
        ),
        (
            "summarized_code".to_string(),
            serde_json::json!(summarized_code),
        ),
        (
            "code_output".to_string(),
            serde_json::json!(marketing_code_output),
        ),
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

    info!("marketing cycle recorded");
    Ok(())
}
