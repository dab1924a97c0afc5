//! Publisher side of the harness.
//!
//! Connects to the publisher-facing endpoint and sends data frames. A
//! background task keeps reading the socket so forwarded directives and
//! pings never back up on the proxy side, even when the caller only
//! publishes. Directives are buffered up to [`DIRECTIVE_BUFFER`]; beyond
//! that they are dropped.

use futures_util::SinkExt;
use futures_util::stream::{SplitSink, SplitStream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tracing::debug;
use tungstenite::protocol::Message as WsMessage;

use super::retry::ClientError;
use super::{ClientStream, next_frame};
use crate::transport::frame::{ControlFrame, DataFrame, Frame};

pub const DIRECTIVE_BUFFER: usize = 256;

type Directives = mpsc::Receiver<Result<ControlFrame, ClientError>>;

pub struct PublisherClient {
    sink: SplitSink<ClientStream, WsMessage>,
    directives: Directives,
    reader: JoinHandle<()>,
}

impl PublisherClient {
    pub async fn connect(url: &str) -> Result<Self, ClientError> {
        let (ws, _response) = connect_async(url).await?;
        let (sink, stream) = ws.split();
        let (tx, directives) = mpsc::channel(DIRECTIVE_BUFFER);
        let reader = tokio::spawn(read_directives(stream, tx));
        Ok(Self {
            sink,
            directives,
            reader,
        })
    }

    pub async fn publish(&mut self, topic: &[u8], payload: &[u8]) -> Result<(), ClientError> {
        let frame = DataFrame::new(topic, payload)?;
        self.sink.send(WsMessage::Binary(frame.into_bytes())).await?;
        Ok(())
    }

    /// Wait for the next forwarded directive.
    pub async fn next_directive(&mut self) -> Result<ControlFrame, ClientError> {
        self.directives.recv().await.unwrap_or(Err(ClientError::Closed))
    }

    pub async fn close(mut self) -> Result<(), ClientError> {
        self.sink.close().await?;
        Ok(())
    }
}

impl Drop for PublisherClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_directives(
    mut stream: SplitStream<ClientStream>,
    tx: mpsc::Sender<Result<ControlFrame, ClientError>>,
) {
    loop {
        let item = match next_frame(&mut stream).await {
            Ok(Some(Frame::Control(control))) => Ok(control),
            // Data frames never go to publishers.
            Ok(Some(Frame::Data(_))) => Err(ClientError::UnexpectedData),
            Ok(None) => return,
            Err(e) => {
                let _ = tx.try_send(Err(e));
                return;
            }
        };
        match tx.try_send(item) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!("directive buffer full, dropping directive");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => return,
        }
    }
}
