use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration settings for the proxy.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub server: ServerSettings,
    pub broker: BrokerSettings,
    pub logging: LoggingSettings,
}

/// Where the two listening endpoints bind.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ServerSettings {
    pub host: String,
    pub publisher_port: u16,
    pub subscriber_port: u16,
}

/// Forwarding and backpressure parameters.
///
/// `queue_capacity` is the per-connection outbound high-water mark;
/// `max_overflows` is how many consecutive full-queue deliveries a
/// connection survives before it is evicted as a slow consumer.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BrokerSettings {
    pub max_connections: usize,
    pub queue_capacity: usize,
    pub max_overflows: u32,
    pub drain_grace_ms: u64,
    pub drain_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Missing values are filled from `Settings::default()`.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub broker: Option<PartialBrokerSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub publisher_port: Option<u16>,
    pub subscriber_port: Option<u16>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialBrokerSettings {
    pub max_connections: Option<usize>,
    pub queue_capacity: Option<usize>,
    pub max_overflows: Option<u32>,
    pub drain_grace_ms: Option<u64>,
    pub drain_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

impl ServerSettings {
    pub fn publisher_addr(&self) -> String {
        format!("{}:{}", self.host, self.publisher_port)
    }

    pub fn subscriber_addr(&self) -> String {
        format!("{}:{}", self.host, self.subscriber_port)
    }
}

impl BrokerSettings {
    pub fn drain_grace(&self) -> Duration {
        Duration::from_millis(self.drain_grace_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            publisher_port: 5557,
            subscriber_port: 5558,
        }
    }
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            max_connections: 1000,
            queue_capacity: 1024,
            max_overflows: 4,
            drain_grace_ms: 2000,
            drain_timeout_ms: 5000,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            broker: BrokerSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl PartialSettings {
    /// Overlay the values that were provided onto `Settings::default()`.
    pub fn merge_with_defaults(self) -> Settings {
        let default = Settings::default();
        let server = self.server.unwrap_or_default();
        let broker = self.broker.unwrap_or_default();
        let logging = self.logging.unwrap_or_default();

        Settings {
            server: ServerSettings {
                host: server.host.unwrap_or(default.server.host),
                publisher_port: server
                    .publisher_port
                    .unwrap_or(default.server.publisher_port),
                subscriber_port: server
                    .subscriber_port
                    .unwrap_or(default.server.subscriber_port),
            },
            broker: BrokerSettings {
                max_connections: broker
                    .max_connections
                    .unwrap_or(default.broker.max_connections),
                queue_capacity: broker
                    .queue_capacity
                    .unwrap_or(default.broker.queue_capacity),
                max_overflows: broker
                    .max_overflows
                    .unwrap_or(default.broker.max_overflows),
                drain_grace_ms: broker
                    .drain_grace_ms
                    .unwrap_or(default.broker.drain_grace_ms),
                drain_timeout_ms: broker
                    .drain_timeout_ms
                    .unwrap_or(default.broker.drain_timeout_ms),
            },
            logging: LoggingSettings {
                level: logging.level.unwrap_or(default.logging.level),
            },
        }
    }
}
