//! The `transport` module carries frames between peers and the broker.
//!
//! Peers speak WebSocket; each binary message is one frame in the format
//! defined in [`frame`]. [`websocket`] runs the accept loop for an endpoint
//! and the per-connection task that feeds inbound frames to the forwarding
//! engine and writes the connection's outbound queue back to the socket.

pub mod frame;
pub mod websocket;

pub use frame::{ControlFrame, DataFrame, Frame, FrameError, SubscriptionAction};
pub use websocket::{EndpointContext, run_endpoint};

#[cfg(test)]
mod tests;
