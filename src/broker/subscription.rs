//! Subscription table
//!
//! Tracks which patterns each subscriber connection holds and, per distinct
//! pattern, which connections hold it. The size of that second set is the
//! aggregated count: the table reports a [`Directive`] exactly when a count
//! moves 0→1 or 1→0, and those directives are what the engine sends
//! upstream to publishers.
//!
//! Callers must serialize access (the engine keeps the table behind its
//! lock) so a count transition and its directive are observed together.

use std::collections::{HashMap, HashSet};

use bytes::Bytes;

use crate::broker::topic;
use crate::connection::ConnectionId;
use crate::transport::frame::ControlFrame;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Subscribe(Bytes),
    Unsubscribe(Bytes),
}

impl Directive {
    pub fn pattern(&self) -> &Bytes {
        match self {
            Directive::Subscribe(p) | Directive::Unsubscribe(p) => p,
        }
    }

    pub fn to_frame(&self) -> ControlFrame {
        match self {
            Directive::Subscribe(p) => ControlFrame::subscribe(p.clone()),
            Directive::Unsubscribe(p) => ControlFrame::unsubscribe(p.clone()),
        }
    }
}

#[derive(Debug, Default)]
pub struct SubscriptionTable {
    by_connection: HashMap<ConnectionId, HashSet<Bytes>>,
    by_pattern: HashMap<Bytes, HashSet<ConnectionId>>,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `pattern` to the connection's set. Repeating a subscription is a
    /// no-op.
    pub fn subscribe(&mut self, id: ConnectionId, pattern: Bytes) -> Option<Directive> {
        let held = self.by_connection.entry(id).or_default();
        if !held.insert(pattern.clone()) {
            return None;
        }

        let holders = self.by_pattern.entry(pattern.clone()).or_default();
        holders.insert(id);
        (holders.len() == 1).then_some(Directive::Subscribe(pattern))
    }

    pub fn unsubscribe(&mut self, id: &ConnectionId, pattern: &[u8]) -> Option<Directive> {
        let held = self.by_connection.get_mut(id)?;
        let pattern = held.take(pattern)?;
        if held.is_empty() {
            self.by_connection.remove(id);
        }
        self.release(id, pattern)
    }

    /// Drop every pattern the connection held. Returns one `Unsubscribe` per
    /// pattern that no other connection still holds.
    pub fn remove_connection(&mut self, id: &ConnectionId) -> Vec<Directive> {
        let Some(held) = self.by_connection.remove(id) else {
            return Vec::new();
        };

        held.into_iter()
            .filter_map(|pattern| self.release(id, pattern))
            .collect()
    }

    fn release(&mut self, id: &ConnectionId, pattern: Bytes) -> Option<Directive> {
        let holders = self.by_pattern.get_mut(&pattern)?;
        holders.remove(id);
        if holders.is_empty() {
            self.by_pattern.remove(&pattern);
            Some(Directive::Unsubscribe(pattern))
        } else {
            None
        }
    }

    /// Every connection holding at least one pattern that prefixes `topic`.
    /// A connection appears once however many of its patterns match.
    pub fn subscribers_for(&self, topic: &[u8]) -> HashSet<ConnectionId> {
        self.by_pattern
            .iter()
            .filter(|(pattern, _)| topic::matches(pattern, topic))
            .flat_map(|(_, holders)| holders.iter().copied())
            .collect()
    }

    /// Distinct patterns with at least one holder.
    pub fn patterns(&self) -> impl Iterator<Item = &Bytes> {
        self.by_pattern.keys()
    }

    pub fn pattern_count(&self) -> usize {
        self.by_pattern.len()
    }

    pub fn subscriber_count(&self, pattern: &[u8]) -> usize {
        self.by_pattern.get(pattern).map_or(0, HashSet::len)
    }

    pub fn patterns_of(&self, id: &ConnectionId) -> Vec<Bytes> {
        self.by_connection
            .get(id)
            .map(|held| held.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.by_pattern.is_empty()
    }

    /// Forget everything without producing directives.
    pub fn clear(&mut self) {
        self.by_connection.clear();
        self.by_pattern.clear();
    }
}
