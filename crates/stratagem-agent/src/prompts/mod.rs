//! Per-agent-kind template registries.
//!
//! A registry is built from a possibly-partial map of custom templates;
//! anything missing is filled from the kind's defaults. Validation runs at
//! construction: a custom template's `{placeholder}` set must exactly match
//! the default template's set, so a bad override fails the process start
//! instead of producing a half-rendered prompt mid-cycle.

pub mod marketing;
pub mod trading;

pub use marketing::MarketingPrompts;
pub use trading::TradingPrompts;

use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("missing template: {0}")]
    MissingTemplate(String),

    #[error("missing placeholders in {template}: {placeholders:?}")]
    MissingPlaceholders {
        template: String,
        placeholders: Vec<String>,
    },

    #[error("unexpected placeholders in {template}: {placeholders:?}")]
    UnexpectedPlaceholders {
        template: String,
        placeholders: Vec<String>,
    },

    #[error("unknown trading instrument: {0}, expected one of spot, futures, options, defi")]
    UnknownInstrument(String),
}

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([a-z][a-z0-9_]*)\}").unwrap());

/// The lowercase `{name}` tokens in a template. Uppercase braces (env-var
/// markers the model is supposed to substitute at run time) are not
/// placeholders.
pub(crate) fn placeholders(template: &str) -> BTreeSet<String> {
    PLACEHOLDER
        .captures_iter(template)
        .map(|c| c[1].to_string())
        .collect()
}

/// Overlay `custom` on `defaults`, then check every template's placeholder
/// set against its default.
pub(crate) fn build_registry(
    custom: HashMap<String, String>,
    defaults: &[(&str, &str)],
) -> Result<HashMap<String, String>, PromptError> {
    let mut templates: HashMap<String, String> = defaults
        .iter()
        .map(|(name, text)| (name.to_string(), text.to_string()))
        .collect();
    templates.extend(custom);

    for (name, default_text) in defaults {
        let template = templates
            .get(*name)
            .ok_or_else(|| PromptError::MissingTemplate(name.to_string()))?;

        let required = placeholders(default_text);
        let actual = placeholders(template);

        let missing: Vec<String> = required.difference(&actual).cloned().collect();
        if !missing.is_empty() {
            return Err(PromptError::MissingPlaceholders {
                template: name.to_string(),
                placeholders: missing,
            });
        }

        let unexpected: Vec<String> = actual.difference(&required).cloned().collect();
        if !unexpected.is_empty() {
            return Err(PromptError::UnexpectedPlaceholders {
                template: name.to_string(),
                placeholders: unexpected,
            });
        }
    }

    Ok(templates)
}

/// Substitute bound values. Unbound `{tokens}` pass through untouched.
pub(crate) fn render(template: &str, bindings: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (name, value) in bindings {
        out = out.replace(&format!("{{{}}}", name), value);
    }
    out
}

/// Comma-joined API blurbs, or the kind's default list when none given.
pub(crate) fn join_apis(apis: &[String], default_blurbs: &str) -> String {
    if apis.is_empty() {
        default_blurbs.to_string()
    } else {
        apis.join(",\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_ignore_uppercase_markers() {
        let set = placeholders("use {role} with key {EXA_API_KEY} at {metric_state}");
        assert!(set.contains("role"));
        assert!(set.contains("metric_state"));
        assert!(!set.contains("EXA_API_KEY"));
    }

    #[test]
    fn render_substitutes_and_leaves_unbound() {
        let out = render("a {x} b {y}", &[("x", "1")]);
        assert_eq!(out, "a 1 b {y}");
    }

    #[test]
    fn build_registry_rejects_dropped_placeholder() {
        let defaults = [("greet", "hello {name}, you are {role}")];
        let custom = HashMap::from([("greet".to_string(), "hello {name}".to_string())]);
        let err = build_registry(custom, &defaults).unwrap_err();
        assert!(matches!(err, PromptError::MissingPlaceholders { .. }));
    }

    #[test]
    fn build_registry_rejects_added_placeholder() {
        let defaults = [("greet", "hello {name}")];
        let custom =
            HashMap::from([("greet".to_string(), "hello {name} at {place}".to_string())]);
        let err = build_registry(custom, &defaults).unwrap_err();
        assert!(matches!(err, PromptError::UnexpectedPlaceholders { .. }));
    }

    #[test]
    fn build_registry_fills_missing_from_defaults() {
        let defaults = [("greet", "hello {name}")];
        let registry = build_registry(HashMap::new(), &defaults).unwrap();
        assert_eq!(registry["greet"], "hello {name}");
    }
}
