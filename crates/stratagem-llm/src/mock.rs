use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use stratagem_core::ChatHistory;

use crate::generator::{GenError, Generator};

/// Scripted back-end for tests: responses are popped in push order, and an
/// exhausted queue falls back to a canned code answer so simple tests need
/// no scripting at all. Received histories are recorded for assertions.
pub struct MockGenerator {
    responses: Mutex<VecDeque<Result<String, String>>>,
    calls: Mutex<Vec<ChatHistory>>,
}

const CANNED_RESPONSE: &str = "Here is the code:\n```python\nprint(\"mock output\")\n```\n";

impl MockGenerator {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful response.
    pub fn push_response(&self, text: impl Into<String>) {
        self.responses.lock().unwrap().push_back(Ok(text.into()));
    }

    /// Queue a failure.
    pub fn push_error(&self, message: impl Into<String>) {
        self.responses.lock().unwrap().push_back(Err(message.into()));
    }

    /// Number of completions requested so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Histories seen so far, in call order.
    pub fn histories(&self) -> Vec<ChatHistory> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Generator for MockGenerator {
    fn name(&self) -> &str {
        "mock"
    }

    async fn chat_completion(&self, history: &ChatHistory) -> Result<String, GenError> {
        self.calls.lock().unwrap().push(history.clone());

        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(GenError::Api {
                status: 500,
                message,
            }),
            None => Ok(CANNED_RESPONSE.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratagem_core::Message;

    #[tokio::test]
    async fn pops_scripted_responses_in_order() {
        let mock = MockGenerator::new();
        mock.push_response("one");
        mock.push_error("boom");

        let history = ChatHistory::from_message(Message::user("hi"));
        assert_eq!(mock.chat_completion(&history).await.unwrap(), "one");
        assert!(mock.chat_completion(&history).await.is_err());
        // queue exhausted — canned fallback
        let canned = mock.chat_completion(&history).await.unwrap();
        assert!(canned.contains("```python"));
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn generate_code_extracts_from_scripted_response() {
        let mock = MockGenerator::new();
        mock.push_response("```python\nx = 1\n```");

        let history = ChatHistory::from_message(Message::user("code please"));
        let (snippets, raw) = mock.generate_code(&history, &[""]).await.unwrap();
        assert_eq!(snippets, vec!["x = 1\n".to_string()]);
        assert!(raw.contains("x = 1"));
    }

    #[tokio::test]
    async fn generate_list_round_trips_yaml() {
        let mock = MockGenerator::new();
        mock.push_response("<Ideas>\n```yaml\n- a\n- b\n```\n</Ideas>");

        let history = ChatHistory::from_message(Message::user("list please"));
        let (lists, _) = mock.generate_list(&history, &["Ideas"]).await.unwrap();
        assert_eq!(lists, vec![vec!["a".to_string(), "b".to_string()]]);
    }

    #[tokio::test]
    async fn generate_code_reports_malformed_response() {
        let mock = MockGenerator::new();
        mock.push_response("I refuse to write code today.");

        let history = ChatHistory::from_message(Message::user("code please"));
        let err = mock.generate_code(&history, &[""]).await.unwrap_err();
        assert!(matches!(err, GenError::Extract(_)));
    }
}
