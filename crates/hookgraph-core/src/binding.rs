//! Subscription bindings.

use serde::{Deserialize, Serialize};

/// An exchange plus a routing key pattern.
///
/// Patterns use topic-exchange semantics: `*` matches exactly one word and
/// `#` matches zero or more words.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Binding {
    pub exchange: String,
    pub routing_key_pattern: String,
}

impl Binding {
    pub fn new(exchange: impl Into<String>, routing_key_pattern: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            routing_key_pattern: routing_key_pattern.into(),
        }
    }

    /// Whether a message published on `exchange` with `routing_key` is
    /// delivered through this binding.
    pub fn matches(&self, exchange: &str, routing_key: &str) -> bool {
        if self.exchange != exchange {
            return false;
        }
        let pattern: Vec<&str> = self.routing_key_pattern.split('.').collect();
        let words: Vec<&str> = routing_key.split('.').collect();
        topic_matches(&pattern, &words)
    }
}

impl std::fmt::Display for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]", self.exchange, self.routing_key_pattern)
    }
}

fn topic_matches(pattern: &[&str], words: &[&str]) -> bool {
    match pattern.split_first() {
        None => words.is_empty(),
        Some((&"#", rest)) => (0..=words.len()).any(|skip| topic_matches(rest, &words[skip..])),
        Some((&head, rest)) => match words.split_first() {
            Some((&word, remaining)) if head == "*" || head == word => {
                topic_matches(rest, remaining)
            }
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_word_wildcards() {
        let binding = Binding::new("exchange/x", "primary.*.*.opened");
        assert!(binding.matches("exchange/x", "primary.acme.widgets.opened"));
        assert!(!binding.matches("exchange/x", "primary.acme.widgets.closed"));
        assert!(!binding.matches("exchange/x", "primary.acme.opened"));
        assert!(!binding.matches("exchange/y", "primary.acme.widgets.opened"));
    }

    #[test]
    fn test_multi_word_wildcard() {
        let binding = Binding::new("exchange/x", "route.#");
        assert!(binding.matches("exchange/x", "route"));
        assert!(binding.matches("exchange/x", "route.a.b.c"));
        assert!(!binding.matches("exchange/x", "other.a"));

        let binding = Binding::new("exchange/x", "#.sha");
        assert!(binding.matches("exchange/x", "a.b.sha"));
        assert!(!binding.matches("exchange/x", "a.b.other"));
    }
}
