//! Fenced-block extraction from raw model output.
//!
//! The contract: optionally narrow to a named `<Tag>…</Tag>` region, then
//! take the first ```python fence (code) or the first ```yaml fence parsed
//! as a sequence of strings (list). An empty tag name means "the whole
//! response".

use regex::Regex;
use std::sync::LazyLock;

use crate::generator::GenError;

static PYTHON_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```python\n(.*?)```").unwrap());
static YAML_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```yaml\n(.*?)```").unwrap());

/// Content between `<tag>` and `</tag>`, trimmed. Empty tag returns the
/// input unchanged; a missing tag returns `""` so the fence match below
/// reports the real problem.
pub fn extract_tag(text: &str, tag: &str) -> String {
    if tag.is_empty() {
        return text.to_string();
    }
    let pattern = format!(r"(?s)<{0}>\s*(.*?)\s*</{0}>", regex::escape(tag));
    match Regex::new(&pattern) {
        Ok(re) => re
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default(),
        Err(_) => String::new(),
    }
}

/// One python snippet per requested tag.
pub fn extract_code(response: &str, blocks: &[&str]) -> Result<Vec<String>, GenError> {
    let mut extracts = Vec::with_capacity(blocks.len());

    for block in blocks {
        let narrowed = extract_tag(response, block);
        let code = PYTHON_FENCE
            .captures(&narrowed)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| {
                GenError::Extract(format!(
                    "no ```python fence found (tag: {:?})",
                    block
                ))
            })?;
        extracts.push(code);
    }

    Ok(extracts)
}

/// One string sequence per requested tag, parsed from the first yaml fence.
pub fn extract_list(response: &str, blocks: &[&str]) -> Result<Vec<Vec<String>>, GenError> {
    let mut extracts = Vec::with_capacity(blocks.len());

    for block in blocks {
        let narrowed = extract_tag(response, block);
        let yaml_text = YAML_FENCE
            .captures(&narrowed)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .ok_or_else(|| {
                GenError::Extract(format!("no ```yaml fence found (tag: {:?})", block))
            })?;

        let value: serde_yaml::Value = serde_yaml::from_str(&yaml_text)
            .map_err(|e| GenError::Extract(format!("yaml parse failed: {}", e)))?;

        let items = value
            .as_sequence()
            .ok_or_else(|| GenError::Extract("yaml content is not a sequence".to_string()))?;

        let strings = items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| {
                        GenError::Extract("yaml sequence item is not a string".to_string())
                    })
            })
            .collect::<Result<Vec<String>, GenError>>()?;

        extracts.push(strings);
    }

    Ok(extracts)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNIPPET: &str = "print('hello')\n";

    #[test]
    fn extracts_single_python_fence() {
        let response = format!("Sure, here you go:\n```python\n{}```\nDone.", SNIPPET);
        let code = extract_code(&response, &[""]).unwrap();
        assert_eq!(code, vec![SNIPPET.to_string()]);
    }

    #[test]
    fn first_fence_wins_when_multiple() {
        let response = "```python\nfirst()\n```\n```python\nsecond()\n```";
        let code = extract_code(response, &[""]).unwrap();
        assert_eq!(code[0], "first()\n");
    }

    #[test]
    fn missing_fence_is_an_error() {
        let err = extract_code("no code here, sorry", &[""]).unwrap_err();
        assert!(matches!(err, GenError::Extract(_)));
    }

    #[test]
    fn non_python_fence_is_not_matched() {
        let response = "```javascript\nconsole.log(1)\n```";
        assert!(extract_code(response, &[""]).is_err());
    }

    #[test]
    fn narrows_to_named_tag() {
        let response = format!(
            "<Research>\n```python\n{}```\n</Research>\n<Trade>\n```python\ntrade()\n```\n</Trade>",
            SNIPPET
        );
        let code = extract_code(&response, &["Trade"]).unwrap();
        assert_eq!(code, vec!["trade()\n".to_string()]);

        let both = extract_code(&response, &["Research", "Trade"]).unwrap();
        assert_eq!(both.len(), 2);
        assert_eq!(both[0], SNIPPET);
    }

    #[test]
    fn extracts_yaml_string_list() {
        let response = "```yaml\n- buy low\n- sell high\n```";
        let lists = extract_list(response, &[""]).unwrap();
        assert_eq!(lists, vec![vec!["buy low".to_string(), "sell high".to_string()]]);
    }

    #[test]
    fn yaml_mapping_is_rejected() {
        let response = "```yaml\nkey: value\n```";
        assert!(extract_list(response, &[""]).is_err());
    }

    #[test]
    fn yaml_non_string_items_are_rejected() {
        let response = "```yaml\n- 1\n- 2\n```";
        assert!(extract_list(response, &[""]).is_err());
    }
}
