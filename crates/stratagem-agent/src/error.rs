use thiserror::Error;

use crate::prompts::PromptError;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Gen(#[from] stratagem_llm::GenError),

    #[error(transparent)]
    Sandbox(#[from] stratagem_sandbox::SandboxError),

    #[error(transparent)]
    Store(#[from] stratagem_store::StoreError),

    #[error(transparent)]
    Rag(#[from] stratagem_rag::RagError),

    #[error(transparent)]
    Prompt(#[from] PromptError),
}
