use bytes::Bytes;
use futures_util::SinkExt;
use tokio_tungstenite::connect_async;
use tungstenite::protocol::Message as WsMessage;

use super::retry::ClientError;
use super::{ClientStream, next_frame};
use crate::transport::frame::{ControlFrame, DataFrame, Frame};

/// Subscriber side of the harness.
pub struct SubscriberClient {
    ws: ClientStream,
}

impl SubscriberClient {
    pub async fn connect(url: &str) -> Result<Self, ClientError> {
        let (ws, _response) = connect_async(url).await?;
        Ok(Self { ws })
    }

    pub async fn subscribe(&mut self, pattern: &[u8]) -> Result<(), ClientError> {
        self.send_control(ControlFrame::subscribe(Bytes::copy_from_slice(pattern)))
            .await
    }

    pub async fn unsubscribe(&mut self, pattern: &[u8]) -> Result<(), ClientError> {
        self.send_control(ControlFrame::unsubscribe(Bytes::copy_from_slice(pattern)))
            .await
    }

    async fn send_control(&mut self, frame: ControlFrame) -> Result<(), ClientError> {
        self.ws.send(WsMessage::Binary(frame.encode())).await?;
        Ok(())
    }

    /// Next delivered message; `Ok(None)` once the proxy closes the stream.
    pub async fn next_message(&mut self) -> Result<Option<DataFrame>, ClientError> {
        loop {
            match next_frame(&mut self.ws).await? {
                Some(Frame::Data(data)) => return Ok(Some(data)),
                Some(Frame::Control(_)) => continue,
                None => return Ok(None),
            }
        }
    }

    pub async fn close(mut self) -> Result<(), ClientError> {
        self.ws.close(None).await?;
        Ok(())
    }
}
