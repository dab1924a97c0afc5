//! The proxy ties the pieces together: two listeners (publisher-facing and
//! subscriber-facing) sharing one forwarding engine, plus the handle used to
//! drain and stop them.

pub mod service;

pub use service::{ProxyHandle, ProxyService, StopReport};

#[cfg(test)]
mod tests;
