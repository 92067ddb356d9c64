use std::sync::Arc;

use stratagem_core::{ChatHistory, Message};
use stratagem_llm::{GenError, Generator};
use stratagem_rag::StrategyRag;
use stratagem_sandbox::Sandbox;
use stratagem_sensor::MetricSensor;
use stratagem_store::OutcomeStore;

use crate::prompts::MarketingPrompts;

/// The marketing agent. Mirrors [`crate::TradingAgent`]: generation
/// methods return `(output, chat delta)` pairs the flow folds into the
/// cycle history.
pub struct MarketingAgent {
    pub agent_id: String,
    pub chat_history: ChatHistory,
    pub generator: Arc<dyn Generator>,
    pub prompts: MarketingPrompts,
    pub sensor: Arc<dyn MetricSensor>,
    pub sandbox: Arc<dyn Sandbox>,
    pub store: Arc<dyn OutcomeStore>,
    pub rag: Arc<dyn StrategyRag>,
}

impl MarketingAgent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agent_id: impl Into<String>,
        generator: Arc<dyn Generator>,
        prompts: MarketingPrompts,
        sensor: Arc<dyn MetricSensor>,
        sandbox: Arc<dyn Sandbox>,
        store: Arc<dyn OutcomeStore>,
        rag: Arc<dyn StrategyRag>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            chat_history: ChatHistory::new(),
            generator,
            prompts,
            sensor,
            sandbox,
            store,
            rag,
        }
    }

    pub fn reset(&mut self) {
        self.chat_history = ChatHistory::new();
    }

    pub fn prepare_system(
        &self,
        role: &str,
        time: &str,
        metric_name: &str,
        metric_state: &str,
    ) -> ChatHistory {
        ChatHistory::from_message(Message::system(self.prompts.render_system(
            role,
            time,
            metric_name,
            metric_state,
        )))
    }

    async fn complete(&self, prompt: String) -> Result<(String, ChatHistory), GenError> {
        let delta = ChatHistory::from_message(Message::user(prompt));
        let response = self
            .generator
            .chat_completion(&self.chat_history.concat(&delta))
            .await?;
        let delta = delta.append(Message::assistant(response.clone()));
        Ok((response, delta))
    }

    async fn complete_code(&self, prompt: String) -> Result<(String, ChatHistory), GenError> {
        let delta = ChatHistory::from_message(Message::user(prompt));
        let (snippets, raw) = self
            .generator
            .generate_code(&self.chat_history.concat(&delta), &[""])
            .await?;
        let code = snippets
            .into_iter()
            .next()
            .ok_or_else(|| GenError::Extract("no code snippet produced".to_string()))?;
        let delta = delta.append(Message::assistant(raw));
        Ok((code, delta))
    }

    pub async fn gen_research_code_on_first(
        &self,
        apis: &[String],
    ) -> Result<(String, ChatHistory), GenError> {
        self.complete_code(self.prompts.render_research_code_first(apis))
            .await
    }

    pub async fn gen_research_code(
        &self,
        notifications_str: &str,
        prev_strategy: &str,
        rag_summary: &str,
        before_metric_state: &str,
        after_metric_state: &str,
    ) -> Result<(String, ChatHistory), GenError> {
        self.complete_code(self.prompts.render_research_code(
            notifications_str,
            prev_strategy,
            rag_summary,
            before_metric_state,
            after_metric_state,
        ))
        .await
    }

    pub async fn gen_strategy(
        &self,
        notifications_str: &str,
        research_output_str: &str,
        metric_name: &str,
        time: &str,
    ) -> Result<(String, ChatHistory), GenError> {
        self.complete(self.prompts.render_strategy(
            notifications_str,
            research_output_str,
            metric_name,
            time,
        ))
        .await
    }

    pub async fn gen_marketing_code(
        &self,
        strategy_output: &str,
        apis: &[String],
    ) -> Result<(String, ChatHistory), GenError> {
        self.complete_code(self.prompts.render_marketing_code(strategy_output, apis))
            .await
    }

    pub async fn gen_better_code(
        &self,
        previous_code: &str,
        errors: &str,
    ) -> Result<(String, ChatHistory), GenError> {
        self.complete_code(self.prompts.render_regen_code(previous_code, errors))
            .await
    }
}
