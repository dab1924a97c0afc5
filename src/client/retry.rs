use std::future::Future;
use std::io;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::transport::frame::FrameError;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport: {0}")]
    Transport(#[from] tungstenite::Error),

    #[error("unexpected frame from proxy: {0}")]
    Protocol(#[from] FrameError),

    #[error("proxy sent a data frame to a publisher")]
    UnexpectedData,

    #[error("proxy closed the connection")]
    Closed,

    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<ClientError>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Transient,
    Fatal,
}

impl ClientError {
    pub fn class(&self) -> FailureClass {
        match self {
            ClientError::Transport(e) => classify_transport(e),
            ClientError::Closed => FailureClass::Transient,
            ClientError::Protocol(_)
            | ClientError::UnexpectedData
            | ClientError::RetriesExhausted { .. } => FailureClass::Fatal,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class() == FailureClass::Transient
    }
}

fn classify_transport(error: &tungstenite::Error) -> FailureClass {
    match error {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            FailureClass::Transient
        }
        tungstenite::Error::Io(e) => match e.kind() {
            io::ErrorKind::PermissionDenied
            | io::ErrorKind::InvalidInput
            | io::ErrorKind::AddrNotAvailable
            | io::ErrorKind::Unsupported => FailureClass::Fatal,
            _ => FailureClass::Transient,
        },
        // bad URL, rejected handshake, TLS or protocol violations
        _ => FailureClass::Fatal,
    }
}

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl ReconnectPolicy {
    /// Delay to wait after the `attempt`-th failure (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

/// Run `connect` until it succeeds, a fatal error occurs, or the policy's
/// attempts are used up.
pub async fn connect_with_retry<T, F, Fut>(
    policy: &ReconnectPolicy,
    mut connect: F,
) -> Result<T, ClientError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match connect().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) if attempt >= policy.max_attempts => {
                return Err(ClientError::RetriesExhausted {
                    attempts: attempt,
                    last: Box::new(e),
                });
            }
            Err(e) => {
                let delay = policy.delay_for(attempt);
                warn!(attempt, ?delay, "connection attempt failed: {e}");
                tokio::time::sleep(delay).await;
            }
        }
    }
}
