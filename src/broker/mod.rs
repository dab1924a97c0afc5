//! The broker: topic matching, subscription aggregation and the forwarding
//! engine that ties them to the connection registry.

pub mod engine;
pub mod subscription;
pub mod topic;

pub use engine::{EngineStats, ForwardingEngine, SharedEngine};
pub use subscription::{Directive, SubscriptionTable};
