//! Topic routing helpers
//!
//! Routing keys are dot-separated words. In a binding pattern `*` matches
//! exactly one word and `#` matches zero or more words.

/// True when `routing_key` matches the binding `pattern`.
///
/// # Examples
///
/// ```
/// use muster_bus::topic_matches;
///
/// assert!(topic_matches("entity.*", "entity.created"));
/// assert!(topic_matches("#", "service.register"));
/// assert!(!topic_matches("entity.*", "entity.created.v2"));
/// ```
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    match_words(&pattern, &key)
}

fn match_words(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => (0..=key.len()).any(|skip| match_words(rest, &key[skip..])),
        Some((&word, rest)) => match key.split_first() {
            Some((&first, key_rest)) => (word == "*" || word == first) && match_words(rest, key_rest),
            None => false,
        },
    }
}

/// Durable queue name for a consumer: `q.{client_id}.{routing_key}`,
/// lowercased with wildcards replaced by `_`.
pub fn queue_name(client_id: &str, routing_key: &str) -> String {
    format!("q.{}.{}", client_id, routing_key)
        .replace(['*', '#'], "_")
        .to_lowercase()
}
