//! Topic matching
//!
//! A pattern matches a topic when the topic starts with the pattern's exact
//! bytes. There is no wildcard syntax: the empty pattern is the only
//! "subscribe to everything", and matching is case-sensitive.

use std::borrow::Cow;

/// Whether `pattern` is a byte prefix of `topic`.
#[inline]
pub fn matches(pattern: &[u8], topic: &[u8]) -> bool {
    topic.starts_with(pattern)
}

/// Lossy rendering of topic or pattern bytes for log lines.
pub fn printable(bytes: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(bytes)
}
