use tracing::warn;

use stratagem_core::{ChatHistory, Message};
use stratagem_llm::{GenError, Generator};

const SUMMARIZER_SYSTEM: &str =
    "You are a summarizer agent. You are to summarize anything below in 1 single sentence or more.";

const MAX_ATTEMPTS: usize = 3;

/// One non-streaming completion over a bullet-formatted list of talking
/// points. Bounded retries; the trimmed text is both the index key and the
/// next cycle's prior-strategy context, so a best-effort fallback to the
/// raw first point beats failing the whole cycle.
pub async fn summarize(generator: &dyn Generator, talking_points: &[String]) -> Result<String, GenError> {
    let bullets: String = talking_points
        .iter()
        .filter(|point| !point.trim().is_empty())
        .map(|point| format!("\n\u{2022} {}", point.trim()))
        .collect();

    if bullets.is_empty() {
        return Err(GenError::EmptyResponse);
    }

    let history = ChatHistory::from_messages(vec![
        Message::system(SUMMARIZER_SYSTEM),
        Message::user(bullets),
    ]);

    let mut last_err = GenError::EmptyResponse;
    for attempt in 1..=MAX_ATTEMPTS {
        match generator.chat_completion(&history).await {
            Ok(text) if !text.trim().is_empty() => return Ok(text.trim().to_string()),
            Ok(_) => last_err = GenError::EmptyResponse,
            Err(e) => {
                warn!(attempt, error = %e, "summarization attempt failed");
                last_err = e;
            }
        }
    }
    Err(last_err)
}

/// `summarize`, degraded: on exhaustion fall back to the first talking
/// point so callers always get usable text.
pub async fn summarize_or_first(generator: &dyn Generator, talking_points: &[String]) -> String {
    match summarize(generator, talking_points).await {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "summarization exhausted retries, falling back to raw text");
            talking_points.first().cloned().unwrap_or_default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratagem_llm::mock::MockGenerator;

    #[tokio::test]
    async fn returns_trimmed_summary() {
        let mock = MockGenerator::new();
        mock.push_response("  a tidy one-liner \n");
        let out = summarize(&mock, &["point one".to_string()]).await.unwrap();
        assert_eq!(out, "a tidy one-liner");
    }

    #[tokio::test]
    async fn retries_up_to_three_times() {
        let mock = MockGenerator::new();
        mock.push_error("flaky");
        mock.push_error("flaky");
        mock.push_response("third time lucky");

        let out = summarize(&mock, &["point".to_string()]).await.unwrap();
        assert_eq!(out, "third time lucky");
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn exhaustion_reports_last_error() {
        let mock = MockGenerator::new();
        for _ in 0..3 {
            mock.push_error("down");
        }
        assert!(summarize(&mock, &["point".to_string()]).await.is_err());
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn bullet_prompt_reaches_the_generator() {
        let mock = MockGenerator::new();
        mock.push_response("summary");
        summarize(&mock, &["alpha".to_string(), "beta".to_string()])
            .await
            .unwrap();

        let history = &mock.histories()[0];
        let prompt = history.latest_instruction();
        assert!(prompt.contains("\u{2022} alpha"));
        assert!(prompt.contains("\u{2022} beta"));
    }

    #[tokio::test]
    async fn empty_points_error_and_fallback_behaviour() {
        let mock = MockGenerator::new();
        assert!(summarize(&mock, &[]).await.is_err());

        for _ in 0..3 {
            mock.push_error("down");
        }
        let out = summarize_or_first(&mock, &["raw point".to_string()]).await;
        assert_eq!(out, "raw point");
    }
}
