use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

/// Opaque connection identity, unique for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0.simple())
    }
}

/// Which endpoint accepted the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Publisher,
    Subscriber,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Publisher => "publisher",
            Role::Subscriber => "subscriber",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Draining,
    Closed,
}

/// Shared liveness cell. The broker record and the connection's I/O task
/// both hold one; the task watches it to learn it has been told to drain.
#[derive(Debug, Clone)]
pub struct Liveness(Arc<watch::Sender<ConnectionState>>);

impl Liveness {
    pub fn new() -> Self {
        Self(Arc::new(watch::Sender::new(ConnectionState::Connecting)))
    }

    pub fn get(&self) -> ConnectionState {
        *self.0.borrow()
    }

    /// Move forward in the lifecycle. Never moves backwards, so a late
    /// `Open` cannot resurrect a draining connection.
    pub fn advance(&self, next: ConnectionState) {
        self.0.send_if_modified(|state| {
            if rank(next) > rank(*state) {
                *state = next;
                true
            } else {
                false
            }
        });
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.0.subscribe()
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

fn rank(state: ConnectionState) -> u8 {
    match state {
        ConnectionState::Connecting => 0,
        ConnectionState::Open => 1,
        ConnectionState::Draining => 2,
        ConnectionState::Closed => 3,
    }
}

/// Outcome of pushing a frame onto a connection's outbound queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueue {
    Queued,
    /// The queue was at its high-water mark; the frame was dropped.
    Overflow { consecutive: u32 },
    /// The I/O task is gone.
    Closed,
}

/// Broker-side record of an accepted peer.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    role: Role,
    peer_addr: SocketAddr,
    outbound: mpsc::Sender<Bytes>,
    liveness: Liveness,
    overflows: u32,
}

impl Connection {
    pub fn new(role: Role, peer_addr: SocketAddr, outbound: mpsc::Sender<Bytes>) -> Self {
        Self {
            id: ConnectionId::new(),
            role,
            peer_addr,
            outbound,
            liveness: Liveness::new(),
            overflows: 0,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn liveness(&self) -> Liveness {
        self.liveness.clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.liveness.get()
    }

    pub fn overflows(&self) -> u32 {
        self.overflows
    }

    /// Open and with room in the outbound queue.
    pub fn is_writable(&self) -> bool {
        self.state() == ConnectionState::Open && self.outbound.capacity() > 0
    }

    pub fn queued(&self) -> usize {
        self.outbound.max_capacity() - self.outbound.capacity()
    }

    /// Non-blocking enqueue. A non-writable connection is skipped without
    /// touching the queue; either way the skip counts as an overflow and a
    /// successful enqueue resets the streak.
    pub fn enqueue(&mut self, frame: Bytes) -> Enqueue {
        if self.outbound.is_closed() {
            return Enqueue::Closed;
        }
        if !self.is_writable() {
            self.overflows += 1;
            return Enqueue::Overflow {
                consecutive: self.overflows,
            };
        }

        match self.outbound.try_send(frame) {
            Ok(()) => {
                self.overflows = 0;
                Enqueue::Queued
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.overflows += 1;
                Enqueue::Overflow {
                    consecutive: self.overflows,
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Enqueue::Closed,
        }
    }
}
