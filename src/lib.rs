//! # relaysub
//!
//! `relaysub` is a subscription-aware publish/subscribe forwarding proxy.
//! Publishers and subscribers connect to two separate WebSocket endpoints;
//! the proxy routes each published message to the subscribers whose topic
//! prefix matches it, and forwards subscription changes upstream so
//! publishers can filter at the source.
//!
//! ## Core Modules
//!
//! - `broker`: topic matching, subscription aggregation and the forwarding engine.
//! - `client`: publisher, subscriber and load-generating clients for driving a proxy.
//! - `config`: settings loaded from defaults, an optional file and the environment.
//! - `connection`: connection identity, liveness, bounded outbound queues and the registry.
//! - `proxy`: starts both endpoints and drains them on stop.
//! - `transport`: the binary frame codec and the WebSocket endpoint loops.
//! - `utils`: error types and logging setup.

pub mod broker;
pub mod client;
pub mod config;
pub mod connection;
pub mod proxy;
pub mod transport;
pub mod utils;
