use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::debug;

use crate::error::{ClaimError, Result};

/// Placeholder name → value.
pub type Bindings = HashMap<String, String>;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{|\}\}|\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
});

/// A prompt with `{NAME}` placeholders. `{{` and `}}` render as literal braces,
/// which lets prompts carry JSON examples.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    name: &'static str,
    text: &'static str,
    placeholders: BTreeSet<String>,
}

impl PromptTemplate {
    pub fn new(name: &'static str, text: &'static str) -> Self {
        let placeholders = PLACEHOLDER
            .captures_iter(text)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
            .collect();
        Self {
            name,
            text,
            placeholders,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.placeholders.iter().map(String::as_str)
    }

    /// Substitutes every placeholder in a single pass. Fails on the first
    /// declared placeholder that has no binding.
    pub fn render(&self, bindings: &Bindings) -> Result<String> {
        if let Some(missing) = self.placeholders.iter().find(|p| !bindings.contains_key(*p)) {
            return Err(ClaimError::TemplateBinding {
                template: self.name,
                placeholder: missing.clone(),
            });
        }

        for unused in bindings.keys().filter(|k| !self.placeholders.contains(*k)) {
            debug!(template = self.name, binding = %unused, "ignoring unused prompt binding");
        }

        let rendered = PLACEHOLDER.replace_all(self.text, |caps: &Captures| match caps.get(1) {
            Some(name) => bindings[name.as_str()].clone(),
            None => caps[0][..1].to_string(),
        });
        Ok(rendered.into_owned())
    }
}

/// Shorthand for building [`Bindings`] from string pairs.
pub fn bindings<const N: usize>(pairs: [(&str, &str); N]) -> Bindings {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_named_placeholders() {
        let template = PromptTemplate::new("greeting", "Policy: {POLICY}\nClaim: {CLAIM}");
        assert_eq!(template.name(), "greeting");
        let rendered = template
            .render(&bindings([("POLICY", "80 per year"), ("CLAIM", "120 dental")]))
            .unwrap();
        assert_eq!(rendered, "Policy: 80 per year\nClaim: 120 dental");
    }

    #[test]
    fn missing_placeholder_is_a_binding_error() {
        let template = PromptTemplate::new("claim", "{POLICY} / {CLAIM}");
        let err = template
            .render(&bindings([("POLICY", "x")]))
            .unwrap_err();
        match err {
            ClaimError::TemplateBinding {
                template,
                placeholder,
            } => {
                assert_eq!(template, "claim");
                assert_eq!(placeholder, "CLAIM");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn double_braces_are_literal_and_not_placeholders() {
        let template = PromptTemplate::new("json", r#"Reply with {{"amount": "..."}} for {text}"#);
        assert_eq!(template.placeholders().collect::<Vec<_>>(), vec!["text"]);
        let rendered = template.render(&bindings([("text", "80")])).unwrap();
        assert_eq!(rendered, r#"Reply with {"amount": "..."} for 80"#);
    }

    #[test]
    fn values_are_not_expanded_again() {
        let template = PromptTemplate::new("single_pass", "{A} and {B}");
        let rendered = template
            .render(&bindings([("A", "{B}"), ("B", "b")]))
            .unwrap();
        assert_eq!(rendered, "{B} and b");
    }

    #[test]
    fn unused_bindings_are_ignored() {
        let template = PromptTemplate::new("plain", "only {A}");
        let rendered = template
            .render(&bindings([("A", "a"), ("Z", "z")]))
            .unwrap();
        assert_eq!(rendered, "only a");
    }
}
