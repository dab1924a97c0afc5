//! CLI for relaysub
//!
//! Subcommands:
//! - `serve`: run the proxy until Ctrl-C, then drain it
//! - `publish`: send one or more messages on a topic
//! - `subscribe`: print deliveries as JSON lines
//! - `load`: cycle sample chat messages through a set of topics

use std::time::Duration;

use clap::Parser;
use relaysub::client::{LoadPlan, PublisherClient, SubscriberClient, run_load};
use relaysub::config::{Settings, load_config, load_config_from};
use relaysub::proxy::ProxyService;
use relaysub::utils::logging;
use serde_json::json;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "relaysub")]
enum Command {
    /// Run the proxy
    Serve {
        /// Configuration file; defaults to `config/default` if present
        #[arg(long)]
        config: Option<String>,
    },
    /// Publish messages to the publisher-facing endpoint
    Publish {
        #[arg(long, default_value = "ws://127.0.0.1:5557")]
        url: String,
        #[arg(long)]
        topic: String,
        #[arg(long)]
        payload: String,
        #[arg(long, default_value_t = 1)]
        count: usize,
        #[arg(long, default_value_t = 0)]
        interval_ms: u64,
    },
    /// Subscribe on the subscriber-facing endpoint and print what arrives
    Subscribe {
        #[arg(long, default_value = "ws://127.0.0.1:5558")]
        url: String,
        /// Topic prefix; repeatable. No pattern subscribes to everything.
        #[arg(long = "pattern")]
        patterns: Vec<String>,
    },
    /// Generate load with sample chat messages
    Load {
        #[arg(long, default_value = "ws://127.0.0.1:5557")]
        url: String,
        #[arg(long, value_delimiter = ',', default_value = "general")]
        topics: Vec<String>,
        #[arg(long, default_value_t = 10)]
        rounds: usize,
        #[arg(long, default_value_t = 100)]
        interval_ms: u64,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cmd = Command::parse();

    let result = match cmd {
        Command::Serve { config } => serve(config).await,
        Command::Publish {
            url,
            topic,
            payload,
            count,
            interval_ms,
        } => {
            logging::init("info");
            publish(&url, &topic, &payload, count, Duration::from_millis(interval_ms)).await
        }
        Command::Subscribe { url, patterns } => {
            logging::init("info");
            subscribe(&url, patterns).await
        }
        Command::Load {
            url,
            topics,
            rounds,
            interval_ms,
        } => {
            logging::init("info");
            let mut plan = LoadPlan::new(url, topics);
            plan.rounds = rounds;
            plan.interval = Duration::from_millis(interval_ms);
            run_load(&plan)
                .await
                .map(|report| info!(sent = report.sent, lost = report.lost, reconnects = report.reconnects, "load done"))
                .map_err(Into::into)
        }
    };

    if let Err(e) = result {
        logging::init("info");
        error!("{e}");
        std::process::exit(1);
    }
}

async fn serve(path: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let settings: Settings = match path {
        Some(path) => load_config_from(&path)?,
        None => load_config()?,
    };
    logging::init(&settings.logging.level);

    let proxy = ProxyService::start_from_settings(&settings).await?;
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Draining.");

    let report = proxy.stop(settings.broker.drain_timeout()).await;
    info!(drained = report.drained, forced = report.forced, "stopped");
    Ok(())
}

async fn publish(
    url: &str,
    topic: &str,
    payload: &str,
    count: usize,
    interval: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut publisher = PublisherClient::connect(url).await?;
    for _ in 0..count {
        publisher.publish(topic.as_bytes(), payload.as_bytes()).await?;
        if !interval.is_zero() {
            tokio::time::sleep(interval).await;
        }
    }
    info!(count, topic, "published");
    publisher.close().await?;
    Ok(())
}

async fn subscribe(url: &str, patterns: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    let mut subscriber = SubscriberClient::connect(url).await?;
    if patterns.is_empty() {
        subscriber.subscribe(b"").await?;
    }
    for pattern in &patterns {
        subscriber.subscribe(pattern.as_bytes()).await?;
    }

    while let Some(message) = subscriber.next_message().await? {
        let line = json!({
            "topic": String::from_utf8_lossy(&message.topic()),
            "payload": String::from_utf8_lossy(&message.payload()),
        });
        println!("{line}");
    }
    info!("proxy closed the subscription");
    Ok(())
}
