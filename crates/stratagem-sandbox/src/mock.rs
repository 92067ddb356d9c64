use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Result, SandboxError};
use crate::executor::{ExecutionArtifact, Sandbox};

/// Scripted sandbox for tests: outcomes pop in push order; an exhausted
/// queue succeeds with empty output. Records every script it was asked to
/// run.
pub struct MockSandbox {
    outcomes: Mutex<VecDeque<Result<String>>>,
    runs: Mutex<Vec<(String, String)>>,
}

impl MockSandbox {
    pub fn new() -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            runs: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful run producing `output`.
    pub fn push_output(&self, output: impl Into<String>) {
        self.outcomes.lock().unwrap().push_back(Ok(output.into()));
    }

    /// Queue a non-zero-exit run whose combined output is `output`.
    pub fn push_exec_failure(&self, output: impl Into<String>) {
        self.outcomes.lock().unwrap().push_back(Err(SandboxError::Exec {
            output: output.into(),
        }));
    }

    /// Queue a wall-clock timeout.
    pub fn push_timeout(&self, secs: u64) {
        self.outcomes
            .lock()
            .unwrap()
            .push_back(Err(SandboxError::Timeout { secs }));
    }

    /// Number of scripts executed so far.
    pub fn run_count(&self) -> usize {
        self.runs.lock().unwrap().len()
    }

    /// `(script, postfix)` pairs in execution order.
    pub fn runs(&self) -> Vec<(String, String)> {
        self.runs.lock().unwrap().clone()
    }
}

impl Default for MockSandbox {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sandbox for MockSandbox {
    async fn run_code(&self, script: &str, postfix: &str) -> Result<ExecutionArtifact> {
        self.runs
            .lock()
            .unwrap()
            .push((script.to_string(), postfix.to_string()));

        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(String::new()));

        outcome.map(|stdout| ExecutionArtifact {
            script_body: script.to_string(),
            postfix_tag: postfix.to_string(),
            host_cache_path: String::new(),
            in_container_path: format!("/temp_script_mock_{}.py", postfix),
            reflected_body: script.to_string(),
            stdout_merged: stdout,
            exit_code: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_outcomes_pop_in_order() {
        let sandbox = MockSandbox::new();
        sandbox.push_exec_failure("ImportError: No module named foo");
        sandbox.push_output("SWAP_OK");

        let first = sandbox.run_code("import foo", "trade").await;
        assert!(matches!(first, Err(SandboxError::Exec { .. })));

        let second = sandbox.run_code("print('ok')", "trade").await.unwrap();
        assert_eq!(second.stdout_merged, "SWAP_OK");
        assert_eq!(sandbox.run_count(), 2);
    }

    #[tokio::test]
    async fn timeout_is_recoverable() {
        let sandbox = MockSandbox::new();
        sandbox.push_timeout(150);
        let err = sandbox.run_code("while True: pass", "trade").await.unwrap_err();
        assert!(err.is_recoverable());
    }
}
