//! The `connection` module models the peers attached to the proxy.
//!
//! A [`Connection`] is the broker-side record of one accepted WebSocket: its
//! identity, which endpoint accepted it, the sending half of its bounded
//! outbound queue and its liveness. The [`ConnectionRegistry`] owns every
//! live record.

pub mod peer;
pub mod registry;

pub use peer::{Connection, ConnectionId, ConnectionState, Enqueue, Liveness, Role};
pub use registry::ConnectionRegistry;
