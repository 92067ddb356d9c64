//! End-to-end cycle tests over the in-process substrate: scripted
//! generator, scripted sandbox, in-memory SQLite store, and a hash-embedded
//! local index.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use stratagem_agent::flows::{
    assisted_flow, marketing_flow, unassisted_flow, MarketingCycle, TradingCycle,
};
use stratagem_agent::prompts::{MarketingPrompts, TradingPrompts};
use stratagem_agent::{MarketingAgent, TradingAgent};
use stratagem_core::types::StrategyData;
use stratagem_llm::mock::MockGenerator;
use stratagem_rag::{HashEmbedder, StrategyIndex, StrategyRag};
use stratagem_sandbox::MockSandbox;
use stratagem_sensor::MetricSensor;
use stratagem_store::{OutcomeStore, SqliteStore};

/// Sensor stub returning scripted states in order, repeating the last one.
struct FixedSensor {
    states: std::sync::Mutex<Vec<String>>,
}

impl FixedSensor {
    fn new(states: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            states: std::sync::Mutex::new(states.iter().map(|s| s.to_string()).collect()),
        })
    }
}

#[async_trait]
impl MetricSensor for FixedSensor {
    async fn metric_state(&self, _metric_name: &str) -> String {
        let mut states = self.states.lock().unwrap();
        if states.len() > 1 {
            states.remove(0)
        } else {
            states.first().cloned().unwrap_or_default()
        }
    }
}

const WALLET_STATE: &str = r#"{"eth_balance": 0.0166, "total_value_usd": 100.0}"#;

fn code_response(body: &str) -> String {
    format!("Here you go:\n```python\n{}\n```", body)
}

struct TradingHarness {
    agent: TradingAgent,
    generator: Arc<MockGenerator>,
    sandbox: Arc<MockSandbox>,
    store: Arc<SqliteStore>,
    index: Arc<StrategyIndex>,
    _rag_dir: tempfile::TempDir,
}

fn trading_harness() -> TradingHarness {
    let generator = Arc::new(MockGenerator::new());
    let sandbox = Arc::new(MockSandbox::new());
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let rag_dir = tempfile::tempdir().unwrap();
    let index = Arc::new(
        StrategyIndex::new("phi", Arc::new(HashEmbedder::new()), rag_dir.path()).unwrap(),
    );

    let agent = TradingAgent::new(
        "phi",
        generator.clone(),
        TradingPrompts::new(HashMap::new()).unwrap(),
        FixedSensor::new(&[WALLET_STATE]),
        sandbox.clone(),
        store.clone(),
        index.clone(),
    );

    TradingHarness {
        agent,
        generator,
        sandbox,
        store,
        index,
        _rag_dir: rag_dir,
    }
}

fn trading_cycle_params<'a>(prev: Option<&'a StrategyData>) -> TradingCycle<'a> {
    TradingCycle {
        session_id: "sess-1",
        role: "degen",
        time: "24h",
        apis: &[],
        trading_instruments: &[],
        metric_name: "wallet",
        signer_url: "signer.local:9009",
        prev_strategy: prev,
        notification_str: "",
    }
}

#[tokio::test]
async fn trading_happy_path_records_success_and_indexes_summary() {
    let mut harness = trading_harness();

    harness
        .generator
        .push_response("I will research trending tokens and buy WETH with idle ETH.");
    harness
        .generator
        .push_response(&code_response(r#"print('{"WETH": "0xC02a...6Cc2"}')"#));
    harness
        .generator
        .push_response(&code_response(r#"print("SWAP_OK hash=0xdead...")"#));
    harness.generator.push_response("Buy WETH with idle ETH.");

    harness.sandbox.push_output(r#"{"WETH": "0xC02a...6Cc2"}"#);
    harness.sandbox.push_output("SWAP_OK hash=0xdead...");

    let params = trading_cycle_params(None);
    assisted_flow(&mut harness.agent, &params).await.unwrap();

    let latest = harness
        .store
        .fetch_latest_strategy("phi")
        .await
        .unwrap()
        .expect("a strategy was recorded");
    assert_eq!(latest.strategy_result, "success");
    assert_eq!(latest.summarized_desc, "Buy WETH with idle ETH.");
    assert!(latest.full_desc.contains("buy WETH"));
    assert!(latest
        .parameter_str("metric_state")
        .unwrap()
        .contains("eth_balance"));

    // the driver's follow-up step: index the latest strategy, then
    // retrieval by the summary must surface the same record
    harness
        .index
        .save_strategies(std::slice::from_ref(&latest))
        .await
        .unwrap();
    let hits = harness
        .index
        .relevant_strategies("Buy WETH with idle ETH.", 1)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].strategy_id, latest.strategy_id);

    // trading prompt carried the instrument stubs' signer URL is not used
    // here (no instruments configured); the code prompt still has the
    // address research output
    let code_prompt = harness.generator.histories()[2].latest_instruction();
    assert!(code_prompt.contains("0xC02a...6Cc2"));
}

#[tokio::test]
async fn trading_regen_recovers_and_grows_history_by_four() {
    let mut harness = trading_harness();

    harness.generator.push_response("Strategy: swap into stables.");
    harness.generator.push_response(&code_response("import foo"));
    harness
        .generator
        .push_response(&code_response(r#"print("SWAP_OK")"#));
    harness.generator.push_response("Swap into stables.");

    harness
        .sandbox
        .push_exec_failure("ImportError: No module named foo");
    harness.sandbox.push_output("SWAP_OK");

    let params = trading_cycle_params(None);
    unassisted_flow(&mut harness.agent, &params).await.unwrap();

    assert_eq!(harness.sandbox.run_count(), 2);

    // system + strategy (2) + code stage: user+assistant twice (4)
    assert_eq!(harness.agent.chat_history.len(), 7);

    // the regen prompt carried the captured traceback
    let regen_prompt = harness.generator.histories()[2].latest_instruction();
    assert!(regen_prompt.contains("ImportError: No module named foo"));

    let latest = harness
        .store
        .fetch_latest_strategy("phi")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.strategy_result, "success");
}

#[tokio::test]
async fn trading_code_budget_exhaustion_records_failure() {
    let mut harness = trading_harness();

    harness.generator.push_response("Strategy: ape into memecoins.");
    for _ in 0..3 {
        harness.generator.push_response(&code_response("import foo"));
    }

    for _ in 0..3 {
        harness
            .sandbox
            .push_exec_failure("Traceback: ImportError: No module named foo");
    }

    let params = trading_cycle_params(None);
    unassisted_flow(&mut harness.agent, &params).await.unwrap();

    // exactly the budgeted number of executions, and generator calls
    // bounded by the budget too: 1 strategy + 3 code + 1 summary
    assert_eq!(harness.sandbox.run_count(), 3);
    assert_eq!(harness.generator.call_count(), 5);

    let latest = harness
        .store
        .fetch_latest_strategy("phi")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.strategy_result, "failed");
    assert_eq!(latest.full_desc, "Strategy: ape into memecoins.");
}

#[tokio::test]
async fn trading_generation_failures_also_consume_the_budget() {
    let mut harness = trading_harness();

    harness.generator.push_response("Strategy: wait and see.");
    // three malformed code responses: no fence at all
    for _ in 0..3 {
        harness.generator.push_response("I cannot write code right now.");
    }

    let params = trading_cycle_params(None);
    unassisted_flow(&mut harness.agent, &params).await.unwrap();

    // nothing ever reached the sandbox
    assert_eq!(harness.sandbox.run_count(), 0);

    let latest = harness
        .store
        .fetch_latest_strategy("phi")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.strategy_result, "failed");
}

#[tokio::test]
async fn marketing_rag_hit_flows_into_research_prompt() {
    let generator = Arc::new(MockGenerator::new());
    let sandbox = Arc::new(MockSandbox::new());
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let rag_dir = tempfile::tempdir().unwrap();
    let index = Arc::new(
        StrategyIndex::new("mk", Arc::new(HashEmbedder::new()), rag_dir.path()).unwrap(),
    );

    // pre-populate the index with the past strategy S4 describes
    let past = StrategyData {
        strategy_id: "11".to_string(),
        agent_id: "mk".to_string(),
        summarized_desc: "post thread about L2 scaling".to_string(),
        full_desc: "full text".to_string(),
        parameters: HashMap::from([
            ("start_metric_state".to_string(), serde_json::json!("27")),
            ("end_metric_state".to_string(), serde_json::json!("34")),
        ]),
        strategy_result: "success".to_string(),
        created_at: "2025-03-01 10:00:00".to_string(),
    };
    index.save_strategies(std::slice::from_ref(&past)).await.unwrap();

    let mut agent = MarketingAgent::new(
        "mk",
        generator.clone(),
        MarketingPrompts::new(HashMap::new()).unwrap(),
        FixedSensor::new(&["27", "34"]),
        sandbox.clone(),
        store.clone(),
        index.clone(),
    );

    generator.push_response(&code_response(r#"print("trending: #L2Summer")"#));
    generator.push_response("Plan: post a thread riffing on L2 scaling.");
    generator.push_response(&code_response(r#"print("POSTED id=123")"#));
    generator.push_response("Followers went from 27 to 34.");
    generator.push_response("Posts a thread.");
    generator.push_response("Post a thread riffing on L2 scaling.");

    sandbox.push_output("trending: #L2Summer");
    sandbox.push_output("POSTED id=123");

    let params = MarketingCycle {
        session_id: "sess-2",
        role: "influencer",
        time: "24h",
        apis: &[],
        metric_name: "followers",
        prev_strategy: Some(&past),
        notification_str: Some("thread about scaling"),
    };
    marketing_flow(&mut agent, &params).await.unwrap();

    // the research prompt was rendered with the retrieved summary and the
    // before/after readings
    let research_prompt = generator.histories()[0].latest_instruction();
    assert!(research_prompt.contains("post thread about L2 scaling"));
    assert!(research_prompt.contains("27"));
    assert!(research_prompt.contains("34"));

    let latest = store.fetch_latest_strategy("mk").await.unwrap().unwrap();
    assert_eq!(latest.strategy_result, "success");
    assert_eq!(latest.parameter_str("start_metric_state"), Some("27"));
    assert_eq!(latest.parameter_str("end_metric_state"), Some("34"));
    assert_eq!(latest.parameter_str("code_output"), Some("POSTED id=123"));
}

#[tokio::test]
async fn marketing_without_notification_uses_fresh_environment() {
    let generator = Arc::new(MockGenerator::new());
    let sandbox = Arc::new(MockSandbox::new());
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let rag_dir = tempfile::tempdir().unwrap();
    let index = Arc::new(
        StrategyIndex::new("mk", Arc::new(HashEmbedder::new()), rag_dir.path()).unwrap(),
    );

    let past = StrategyData {
        strategy_id: "5".to_string(),
        agent_id: "mk".to_string(),
        summarized_desc: "reply to mentions".to_string(),
        full_desc: "full".to_string(),
        parameters: HashMap::new(),
        strategy_result: "success".to_string(),
        created_at: "2025-03-01 10:00:00".to_string(),
    };

    let mut agent = MarketingAgent::new(
        "mk",
        generator.clone(),
        MarketingPrompts::new(HashMap::new()).unwrap(),
        FixedSensor::new(&["27"]),
        sandbox.clone(),
        store.clone(),
        index,
    );

    generator.push_response(&code_response(r#"print("research")"#));
    generator.push_response("Plan: keep replying.");
    generator.push_response(&code_response(r#"print("POSTED")"#));

    let params = MarketingCycle {
        session_id: "sess-3",
        role: "influencer",
        time: "24h",
        apis: &[],
        metric_name: "followers",
        prev_strategy: Some(&past),
        notification_str: None,
    };
    marketing_flow(&mut agent, &params).await.unwrap();

    let research_prompt = generator.histories()[0].latest_instruction();
    assert!(research_prompt.contains("Fresh"));
}
