//! Exchange kinds and routing-key matching.

/// How an exchange selects queues for a routing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeKind {
    /// Binding key must equal the routing key.
    Direct,
    /// Binding key is a dot-separated pattern (`*` one word, `#` zero or more).
    Topic,
    /// Every bound queue receives every message.
    Fanout,
}

impl ExchangeKind {
    /// Returns true if a binding with `binding_key` receives `routing_key`.
    pub fn routes(&self, binding_key: &str, routing_key: &str) -> bool {
        match self {
            ExchangeKind::Direct => binding_key == routing_key,
            ExchangeKind::Topic => topic_matches(binding_key, routing_key),
            ExchangeKind::Fanout => true,
        }
    }

    /// Returns the kind name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeKind::Direct => "direct",
            ExchangeKind::Topic => "topic",
            ExchangeKind::Fanout => "fanout",
        }
    }
}

impl std::fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Matches a routing key against a topic binding pattern.
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    match_words(&pattern, &key)
}

fn match_words(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => (0..=key.len()).any(|skip| match_words(rest, &key[skip..])),
        Some((&"*", rest)) => !key.is_empty() && match_words(rest, &key[1..]),
        Some((word, rest)) => key.first() == Some(word) && match_words(rest, &key[1..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_words() {
        assert!(topic_matches("order.notification", "order.notification"));
        assert!(!topic_matches("order.notification", "order.created"));
        assert!(!topic_matches("order.notification", "order.notification.extra"));
    }

    #[test]
    fn test_hash_matches_zero_or_more_words() {
        assert!(topic_matches("order.#", "order.notification"));
        assert!(topic_matches("order.#", "order"));
        assert!(topic_matches("order.#", "order.a.b.c"));
        assert!(topic_matches("#", "billing.deposit"));
        assert!(!topic_matches("order.#", "billing.deposit"));
        assert!(topic_matches("#.deposit", "billing.deposit"));
    }

    #[test]
    fn test_star_matches_exactly_one_word() {
        assert!(topic_matches("billing.*", "billing.deposit"));
        assert!(!topic_matches("billing.*", "billing"));
        assert!(!topic_matches("billing.*", "billing.deposit.extra"));
    }

    #[test]
    fn test_exchange_kinds() {
        assert!(ExchangeKind::Direct.routes("a.b", "a.b"));
        assert!(!ExchangeKind::Direct.routes("a.*", "a.b"));
        assert!(ExchangeKind::Topic.routes("a.*", "a.b"));
        assert!(ExchangeKind::Fanout.routes("ignored", "anything"));
    }
}
