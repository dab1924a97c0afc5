use std::net::SocketAddr;
use std::time::Duration;

use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::broker::{EngineStats, ForwardingEngine, SharedEngine};
use crate::config::{BrokerSettings, Settings};
use crate::connection::Role;
use crate::transport::{EndpointContext, run_endpoint};
use crate::utils::error::{ProxyError, Result};

pub struct ProxyService;

impl ProxyService {
    /// Bind both endpoints and start accepting. Either address may use port
    /// 0; the handle reports what was actually bound.
    pub async fn start(
        publisher_bind: &str,
        subscriber_bind: &str,
        settings: BrokerSettings,
    ) -> Result<ProxyHandle> {
        let publisher_listener = bind("publisher", publisher_bind).await?;
        let subscriber_listener = bind("subscriber", subscriber_bind).await?;
        let publisher_addr = local_addr("publisher", publisher_bind, &publisher_listener)?;
        let subscriber_addr = local_addr("subscriber", subscriber_bind, &subscriber_listener)?;

        let engine = ForwardingEngine::new(&settings).shared();
        let (shutdown, shutdown_rx) = watch::channel(false);

        let context = |role| EndpointContext {
            engine: engine.clone(),
            role,
            queue_capacity: settings.queue_capacity,
            drain_grace: settings.drain_grace(),
        };
        let endpoints = vec![
            tokio::spawn(run_endpoint(
                publisher_listener,
                context(Role::Publisher),
                shutdown_rx.clone(),
            )),
            tokio::spawn(run_endpoint(
                subscriber_listener,
                context(Role::Subscriber),
                shutdown_rx,
            )),
        ];

        info!(%publisher_addr, %subscriber_addr, "proxy listening");
        Ok(ProxyHandle {
            publisher_addr,
            subscriber_addr,
            engine,
            shutdown,
            endpoints,
        })
    }

    pub async fn start_from_settings(settings: &Settings) -> Result<ProxyHandle> {
        Self::start(
            &settings.server.publisher_addr(),
            &settings.server.subscriber_addr(),
            settings.broker.clone(),
        )
        .await
    }
}

async fn bind(endpoint: &'static str, addr: &str) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ProxyError::Startup {
            endpoint,
            addr: addr.to_string(),
            source,
        })
}

fn local_addr(endpoint: &'static str, addr: &str, listener: &TcpListener) -> Result<SocketAddr> {
    listener.local_addr().map_err(|source| ProxyError::Startup {
        endpoint,
        addr: addr.to_string(),
        source,
    })
}

/// How the connections that were live at shutdown ended.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StopReport {
    pub drained: usize,
    pub forced: usize,
}

/// A running proxy. Dropping it stops the accept loops without draining.
pub struct ProxyHandle {
    publisher_addr: SocketAddr,
    subscriber_addr: SocketAddr,
    engine: SharedEngine,
    shutdown: watch::Sender<bool>,
    endpoints: Vec<JoinHandle<JoinSet<()>>>,
}

impl ProxyHandle {
    pub fn publisher_addr(&self) -> SocketAddr {
        self.publisher_addr
    }

    pub fn subscriber_addr(&self) -> SocketAddr {
        self.subscriber_addr
    }

    pub fn engine(&self) -> &SharedEngine {
        &self.engine
    }

    pub fn stats(&self) -> EngineStats {
        self.engine.lock().stats()
    }

    /// Stop accepting, move every connection to `Draining` and wait up to
    /// `drain_timeout` for their queues to flush. Whatever is still running
    /// at the deadline is aborted.
    pub async fn stop(self, drain_timeout: Duration) -> StopReport {
        let deadline = Instant::now() + drain_timeout;
        self.shutdown.send_replace(true);

        let mut endpoints = Vec::with_capacity(self.endpoints.len());
        for endpoint in self.endpoints {
            match endpoint.await {
                Ok(tasks) => endpoints.push(tasks),
                Err(e) => warn!("endpoint task failed: {e}"),
            }
        }

        let marked = self.engine.lock().drain_all();
        info!(connections = marked, ?drain_timeout, "draining proxy");

        let mut report = StopReport::default();
        for mut tasks in endpoints {
            report.drained += drain_until(&mut tasks, deadline).await;
            report.forced += tasks.len();
            tasks.abort_all();
        }

        let stats = self.engine.lock().stats();
        match serde_json::to_string(&stats) {
            Ok(json) => info!(drained = report.drained, forced = report.forced, stats = %json, "proxy stopped"),
            Err(_) => info!(drained = report.drained, forced = report.forced, "proxy stopped"),
        }
        report
    }
}

/// Reap finished connection tasks until the set is empty or `deadline`
/// passes. Returns how many finished.
async fn drain_until(tasks: &mut JoinSet<()>, deadline: Instant) -> usize {
    let mut finished = 0;
    while !tasks.is_empty() {
        match tokio::time::timeout_at(deadline, tasks.join_next()).await {
            Ok(Some(_)) => finished += 1,
            Ok(None) | Err(_) => break,
        }
    }
    finished
}
