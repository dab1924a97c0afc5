//! Load generator: a publisher that cycles canned chat lines through a set
//! of topics. Each payload is a small JSON document so the subscriber side
//! has something readable to print.

use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use super::publisher::PublisherClient;
use super::retry::{ClientError, ReconnectPolicy, connect_with_retry};

pub const SAMPLE_MESSAGES: [&str; 10] = [
    "Hello, anyone there?",
    "Is this thing on?",
    "What a neat little chat",
    "Automated test message",
    "Rust is great",
    "Distributed systems are fascinating",
    "Prefix routing makes this easy",
    "One more test message",
    "Chat working perfectly",
    "Sending yet another message",
];

#[derive(Debug, Clone)]
pub struct LoadPlan {
    pub url: String,
    pub topics: Vec<String>,
    pub rounds: usize,
    pub interval: Duration,
    pub policy: ReconnectPolicy,
}

impl LoadPlan {
    pub fn new(url: impl Into<String>, topics: Vec<String>) -> Self {
        Self {
            url: url.into(),
            topics,
            rounds: 1,
            interval: Duration::ZERO,
            policy: ReconnectPolicy::default(),
        }
    }

    /// (topic, text) pairs in send order.
    pub fn schedule(&self) -> impl Iterator<Item = (&str, &'static str)> + '_ {
        let per_round = self.topics.len();
        (0..self.rounds * per_round).map(move |i| {
            let topic = self.topics[i % per_round].as_str();
            (topic, SAMPLE_MESSAGES[i % SAMPLE_MESSAGES.len()])
        })
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub sent: usize,
    pub lost: usize,
    pub reconnects: usize,
}

pub fn bot_name() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("bot_{}", &id[..4])
}

/// Sends the whole schedule. A transient send failure loses that message and
/// triggers a reconnect; a fatal one ends the run.
pub async fn run_load(plan: &LoadPlan) -> Result<LoadReport, ClientError> {
    let user = bot_name();
    let mut report = LoadReport::default();
    let mut publisher = connect_with_retry(&plan.policy, || PublisherClient::connect(&plan.url)).await?;
    info!(%user, url = %plan.url, topics = ?plan.topics, "load run started");

    for (topic, text) in plan.schedule() {
        let payload = json!({
            "user": user,
            "message": text,
            "timestamp": Utc::now().timestamp(),
        })
        .to_string();

        match publisher.publish(topic.as_bytes(), payload.as_bytes()).await {
            Ok(()) => report.sent += 1,
            Err(e) if e.is_transient() => {
                warn!(%topic, "send failed, reconnecting: {e}");
                report.lost += 1;
                publisher = connect_with_retry(&plan.policy, || PublisherClient::connect(&plan.url)).await?;
                report.reconnects += 1;
            }
            Err(e) => return Err(e),
        }

        if !plan.interval.is_zero() {
            tokio::time::sleep(plan.interval).await;
        }
    }

    info!(sent = report.sent, lost = report.lost, "load run finished");
    if let Err(e) = publisher.close().await {
        warn!("close after load run failed: {e}");
    }
    Ok(report)
}
