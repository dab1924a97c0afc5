//! The `client` module holds the peers that talk to the proxy from the
//! outside: a publisher, a subscriber and a load generator built on the
//! publisher.
//!
//! Failures are classified as transient (worth reconnecting) or fatal
//! (reconnecting cannot help), and reconnection follows a bounded
//! exponential backoff instead of retrying forever.

pub mod load;
pub mod publisher;
pub mod retry;
pub mod subscriber;

use futures_util::{Stream, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tungstenite::protocol::Message as WsMessage;

pub use load::{LoadPlan, LoadReport, run_load};
pub use publisher::PublisherClient;
pub use retry::{ClientError, FailureClass, ReconnectPolicy, connect_with_retry};
pub use subscriber::SubscriberClient;

use crate::transport::frame::Frame;

pub(crate) type ClientStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Next frame from the proxy, skipping control-level WebSocket messages.
/// `Ok(None)` means the proxy closed the connection.
pub(crate) async fn next_frame<S>(ws: &mut S) -> Result<Option<Frame>, ClientError>
where
    S: Stream<Item = Result<WsMessage, tungstenite::Error>> + Unpin,
{
    while let Some(msg) = ws.next().await {
        match msg? {
            WsMessage::Binary(data) => return Ok(Some(Frame::decode(data)?)),
            WsMessage::Close(_) => return Ok(None),
            _ => continue,
        }
    }
    Ok(None)
}
