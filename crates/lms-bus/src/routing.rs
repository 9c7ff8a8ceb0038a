//! # Routing
//!
//! Mapping from dotted event types to broker routing keys and queue names.
//!
//! Dots are significant in AMQP topic routing, so every `.` in a type is
//! replaced with `_` on both the publish and the bind side. The mapping is
//! the same on both sides, which is all that matters for delivery.

/// Routing key for an event type: `course.lesson.completed` → `course_lesson_completed`.
#[must_use]
pub fn routing_key(event_type: &str) -> String {
    event_type.replace('.', "_")
}

/// Durable queue name for a subscription.
///
/// Deterministic so that a restarted service re-attaches to the queue that
/// buffered messages while it was away.
#[must_use]
pub fn queue_name(service_name: Option<&str>, event_type: &str) -> String {
    let key = routing_key(event_type);
    match service_name {
        Some(service) => format!("{service}.{key}"),
        None => key,
    }
}

/// AMQP topic match: words are `.`-separated, `*` matches exactly one word,
/// `#` matches zero or more.
#[must_use]
pub fn topic_matches(pattern: &str, key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = key.split('.').collect();
    match_words(&pattern, &key)
}

fn match_words(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => (0..=key.len()).any(|skip| match_words(rest, &key[skip..])),
        Some((&word, rest)) => match key.split_first() {
            Some((&head, tail)) => (word == "*" || word == head) && match_words(rest, tail),
            None => false,
        },
    }
}
