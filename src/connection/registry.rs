//! Registry of live connections on both endpoints.
//!
//! The registry is not synchronized on its own; it lives inside the
//! forwarding engine and shares the engine's lock with the subscription
//! table.

use std::collections::HashMap;

use tracing::debug;

use super::peer::{Connection, ConnectionId, ConnectionState, Role};
use crate::utils::error::{ProxyError, Result};

#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Connection>,
    max_connections: usize,
    accepting: bool,
}

impl ConnectionRegistry {
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: HashMap::new(),
            max_connections,
            accepting: true,
        }
    }

    /// Admit a connection and mark it `Open`.
    pub fn register(&mut self, connection: Connection) -> Result<ConnectionId> {
        if !self.accepting {
            return Err(ProxyError::Draining);
        }
        if self.connections.len() >= self.max_connections {
            return Err(ProxyError::ConnectionLimit(self.max_connections));
        }

        let id = connection.id();
        connection.liveness().advance(ConnectionState::Open);
        debug!(%id, role = %connection.role(), peer = %connection.peer_addr(), "connection registered");
        self.connections.insert(id, connection);
        Ok(id)
    }

    /// Take a connection out of the registry and mark it `Draining`.
    ///
    /// Dropping the returned record drops the queue sender, which lets the
    /// I/O task flush what is already queued and then finish.
    pub fn remove(&mut self, id: &ConnectionId) -> Option<Connection> {
        let connection = self.connections.remove(id)?;
        connection.liveness().advance(ConnectionState::Draining);
        Some(connection)
    }

    /// Stop admitting connections and drain every live one.
    pub fn drain_all(&mut self) -> Vec<Connection> {
        self.accepting = false;
        self.connections
            .drain()
            .map(|(_, connection)| {
                connection.liveness().advance(ConnectionState::Draining);
                connection
            })
            .collect()
    }

    pub fn get(&self, id: &ConnectionId) -> Option<&Connection> {
        self.connections.get(id)
    }

    pub fn get_mut(&mut self, id: &ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(id)
    }

    pub fn role(&self, id: &ConnectionId) -> Option<Role> {
        self.connections.get(id).map(Connection::role)
    }

    /// Liveness as the registry sees it; unknown ids are reported `Closed`.
    pub fn state(&self, id: &ConnectionId) -> ConnectionState {
        self.connections
            .get(id)
            .map(Connection::state)
            .unwrap_or(ConnectionState::Closed)
    }

    pub fn ids_with_role(&self, role: Role) -> Vec<ConnectionId> {
        self.connections
            .values()
            .filter(|c| c.role() == role)
            .map(Connection::id)
            .collect()
    }

    pub fn count(&self, role: Role) -> usize {
        self.connections.values().filter(|c| c.role() == role).count()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting
    }
}
