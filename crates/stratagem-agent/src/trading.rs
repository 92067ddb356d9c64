use std::sync::Arc;

use stratagem_core::{ChatHistory, Message};
use stratagem_llm::{GenError, Generator};
use stratagem_rag::StrategyRag;
use stratagem_sandbox::Sandbox;
use stratagem_sensor::MetricSensor;
use stratagem_store::OutcomeStore;

use crate::error::AgentError;
use crate::prompts::TradingPrompts;

/// The trading agent: owns the per-cycle chat history and the generation
/// methods the flow drives. Each `gen_*` method returns the produced text
/// plus the chat delta (user prompt + assistant reply); the flow decides
/// whether the delta is folded into the cycle history.
pub struct TradingAgent {
    pub agent_id: String,
    pub chat_history: ChatHistory,
    pub generator: Arc<dyn Generator>,
    pub prompts: TradingPrompts,
    pub sensor: Arc<dyn MetricSensor>,
    pub sandbox: Arc<dyn Sandbox>,
    pub store: Arc<dyn OutcomeStore>,
    pub rag: Arc<dyn StrategyRag>,
}

impl TradingAgent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agent_id: impl Into<String>,
        generator: Arc<dyn Generator>,
        prompts: TradingPrompts,
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

    /// Drop the previous cycle's context.
    pub fn reset(&mut self) {
        self.chat_history = ChatHistory::new();
    }

    /// Fresh history holding only the rendered system prompt.
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

    pub async fn gen_strategy_on_first(
        &self,
        apis: &[String],
    ) -> Result<(String, ChatHistory), GenError> {
        self.complete(self.prompts.render_strategy_first(apis)).await
    }

    pub async fn gen_strategy(
        &self,
        cur_environment: &str,
        prev_strategy: &str,
        prev_strategy_result: &str,
        apis: &[String],
    ) -> Result<(String, ChatHistory), GenError> {
        self.complete(self.prompts.render_strategy(
            cur_environment,
            prev_strategy,
            prev_strategy_result,
            apis,
        ))
        .await
    }

    pub async fn gen_address_research_code(
        &self,
        role: &str,
        time: &str,
        metric_name: &str,
        metric_state: &str,
    ) -> Result<(String, ChatHistory), GenError> {
        self.complete_code(self.prompts.render_address_research_code(
            role,
            time,
            metric_name,
            metric_state,
        ))
        .await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn gen_trading_code(
        &self,
        strategy_output: &str,
        address_research: &str,
        apis: &[String],
        trading_instruments: &[String],
        signer_url: &str,
    ) -> Result<(String, ChatHistory), AgentError> {
        let prompt = self.prompts.render_trading_code(
            strategy_output,
            address_research,
            apis,
            trading_instruments,
            &self.agent_id,
            signer_url,
        )?;
        Ok(self.complete_code(prompt).await?)
    }

    pub async fn gen_trading_code_non_address(
        &self,
        strategy_output: &str,
        apis: &[String],
        trading_instruments: &[String],
        signer_url: &str,
    ) -> Result<(String, ChatHistory), AgentError> {
        let prompt = self.prompts.render_trading_code_non_address(
            strategy_output,
            apis,
            trading_instruments,
            &self.agent_id,
            signer_url,
        )?;
        Ok(self.complete_code(prompt).await?)
    }

    /// Regen form: previous broken code plus the accumulated error text.
    pub async fn gen_better_code(
        &self,
        previous_code: &str,
        errors: &str,
    ) -> Result<(String, ChatHistory), GenError> {
        self.complete_code(self.prompts.render_regen_code(previous_code, errors))
            .await
    }
}
