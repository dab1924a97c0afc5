//! Forwarding engine
//!
//! The engine owns the subscription table and the connection registry and
//! routes every inbound frame:
//! - subscriber control frames update the table, and any 0→1 / 1→0
//!   transition is re-encoded and queued to every publisher;
//! - publisher data frames are queued, byte-for-byte, to each subscriber
//!   holding a matching pattern, once per subscriber;
//! - anything else is counted and dropped.
//!
//! Concurrency and usage notes:
//! - The API is synchronous and lives behind [`SharedEngine`]'s mutex. Every
//!   operation finishes without awaiting: queues are fed with `try_send`, so
//!   the lock is never held across network I/O.
//! - A table mutation and the upstream enqueue it causes happen under the
//!   same lock acquisition, so publishers see directives in the order the
//!   counts changed.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::broker::subscription::{Directive, SubscriptionTable};
use crate::broker::topic::printable;
use crate::config::BrokerSettings;
use crate::connection::{Connection, ConnectionId, ConnectionRegistry, Enqueue, Role};
use crate::transport::frame::{ControlFrame, DataFrame, Frame, SubscriptionAction};
use crate::utils::error::{ProxyError, Result};

/// Counters kept by the engine since it was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub frames_received: u64,
    pub frames_forwarded: u64,
    pub frames_unrouted: u64,
    pub frames_ignored: u64,
    pub frames_malformed: u64,
    pub directives_emitted: u64,
    pub overflows: u64,
    pub evictions: u64,
}

#[derive(Debug)]
pub struct ForwardingEngine {
    table: SubscriptionTable,
    registry: ConnectionRegistry,
    max_overflows: u32,
    stats: EngineStats,
}

impl ForwardingEngine {
    pub fn new(settings: &BrokerSettings) -> Self {
        Self {
            table: SubscriptionTable::new(),
            registry: ConnectionRegistry::new(settings.max_connections),
            max_overflows: settings.max_overflows,
            stats: EngineStats::default(),
        }
    }

    pub fn shared(self) -> SharedEngine {
        SharedEngine(Arc::new(Mutex::new(self)))
    }

    /// Admit a connection. A publisher is immediately sent one subscribe
    /// frame per pattern currently held downstream.
    pub fn register(&mut self, connection: Connection) -> Result<ConnectionId> {
        let role = connection.role();
        let id = self.registry.register(connection)?;

        if role == Role::Publisher {
            let frames: Vec<Bytes> = self
                .table
                .patterns()
                .map(|pattern| ControlFrame::subscribe(pattern.clone()).encode())
                .collect();
            if !frames.is_empty() {
                debug!(%id, patterns = frames.len(), "replaying subscriptions to new publisher");
            }
            for frame in frames {
                self.deliver(&id, frame);
            }
        }

        Ok(id)
    }

    /// Decode and route one inbound frame from `from`.
    ///
    /// Frames from connections that are no longer registered are ignored.
    /// A malformed frame is dropped and reported; the connection stays open.
    pub fn handle_frame(&mut self, from: &ConnectionId, raw: Bytes) -> Result<()> {
        let Some(role) = self.registry.role(from) else {
            return Ok(());
        };
        self.stats.frames_received += 1;

        let frame = match Frame::decode(raw) {
            Ok(frame) => frame,
            Err(e) => {
                self.stats.frames_malformed += 1;
                return Err(ProxyError::Protocol(e));
            }
        };

        match (role, frame) {
            (Role::Subscriber, Frame::Control(control)) => {
                self.apply_control(from, control);
            }
            (Role::Publisher, Frame::Data(data)) => {
                self.route(&data);
            }
            (Role::Subscriber, Frame::Data(data)) => {
                self.stats.frames_ignored += 1;
                debug!(%from, topic = %printable(&data.topic()), "ignoring data frame from subscriber");
            }
            (Role::Publisher, Frame::Control(control)) => {
                self.stats.frames_ignored += 1;
                debug!(%from, pattern = %printable(&control.pattern), "ignoring control frame from publisher");
            }
        }

        Ok(())
    }

    /// Apply a subscriber's subscribe/unsubscribe and propagate the
    /// resulting directive, if any, to every publisher.
    pub fn apply_control(&mut self, from: &ConnectionId, control: ControlFrame) -> Option<Directive> {
        if self.registry.role(from) != Some(Role::Subscriber) {
            return None;
        }

        let directive = match control.action {
            SubscriptionAction::Subscribe => {
                debug!(%from, pattern = %printable(&control.pattern), "subscribe");
                self.table.subscribe(*from, control.pattern)
            }
            SubscriptionAction::Unsubscribe => {
                debug!(%from, pattern = %printable(&control.pattern), "unsubscribe");
                self.table.unsubscribe(from, &control.pattern)
            }
        };

        if let Some(directive) = &directive {
            self.broadcast_upstream(directive);
        }
        directive
    }

    /// Queue a data frame to every matching subscriber. Returns how many
    /// subscribers accepted it.
    pub fn route(&mut self, frame: &DataFrame) -> usize {
        let topic = frame.topic();
        let targets = self.table.subscribers_for(&topic);
        if targets.is_empty() {
            self.stats.frames_unrouted += 1;
            trace!(topic = %printable(&topic), "no subscribers, dropping");
            return 0;
        }

        let delivered = targets
            .iter()
            .filter(|id| self.deliver(id, frame.as_bytes().clone()))
            .count();
        self.stats.frames_forwarded += delivered as u64;
        delivered
    }

    /// Unregister a connection and release its subscriptions. Returns the
    /// unsubscribe directives that were sent upstream as a result.
    pub fn remove_connection(&mut self, id: &ConnectionId) -> Vec<Directive> {
        let Some(connection) = self.registry.remove(id) else {
            return Vec::new();
        };

        let directives = self.table.remove_connection(id);
        for directive in &directives {
            self.broadcast_upstream(directive);
        }
        info!(
            %id,
            role = %connection.role(),
            released = directives.len(),
            "connection removed"
        );
        directives
    }

    /// Stop admitting connections and put every live one into `Draining`.
    /// The proxy is going away, so no directives are emitted.
    pub fn drain_all(&mut self) -> usize {
        self.table.clear();
        self.registry.drain_all().len()
    }

    fn broadcast_upstream(&mut self, directive: &Directive) {
        self.stats.directives_emitted += 1;
        let encoded = directive.to_frame().encode();
        let publishers = self.registry.ids_with_role(Role::Publisher);
        debug!(?directive, publishers = publishers.len(), "forwarding directive upstream");
        for id in publishers {
            self.deliver(&id, encoded.clone());
        }
    }

    fn deliver(&mut self, id: &ConnectionId, frame: Bytes) -> bool {
        let Some(connection) = self.registry.get_mut(id) else {
            return false;
        };

        match connection.enqueue(frame) {
            Enqueue::Queued => true,
            Enqueue::Overflow { consecutive } => {
                self.stats.overflows += 1;
                if consecutive > self.max_overflows {
                    self.evict(id);
                } else {
                    debug!(%id, consecutive, "outbound queue full, frame dropped");
                }
                false
            }
            Enqueue::Closed => {
                self.remove_connection(id);
                false
            }
        }
    }

    fn evict(&mut self, id: &ConnectionId) {
        self.stats.evictions += 1;
        warn!("{}", ProxyError::SlowConsumer(*id));
        self.remove_connection(id);
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn table(&self) -> &SubscriptionTable {
        &self.table
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }
}

/// The engine as shared between connection tasks.
#[derive(Debug, Clone)]
pub struct SharedEngine(Arc<Mutex<ForwardingEngine>>);

impl SharedEngine {
    /// Lock the engine, recovering the guard from a poisoned mutex.
    pub fn lock(&self) -> MutexGuard<'_, ForwardingEngine> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
