//! Wire format
//!
//! Every frame is carried as one binary WebSocket message. The first byte is
//! a marker:
//!
//! - `0x00` unsubscribe, `0x01` subscribe: the rest of the message is the
//!   pattern, taken verbatim.
//! - `0x02` data: a big-endian `u16` topic length, the topic, then the
//!   payload up to the end of the message.
//!
//! Decoding never copies: topic, payload and pattern are `Bytes` slices of
//! the received message, and a data frame keeps the original buffer so it can
//! be forwarded byte-for-byte.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

pub const UNSUBSCRIBE_MARKER: u8 = 0x00;
pub const SUBSCRIBE_MARKER: u8 = 0x01;
pub const DATA_MARKER: u8 = 0x02;

const DATA_HEADER_LEN: usize = 3;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("empty frame")]
    Empty,
    #[error("unknown frame marker {0:#04x}")]
    UnknownMarker(u8),
    #[error("data frame truncated: header needs {needed} bytes, got {actual}")]
    Truncated { needed: usize, actual: usize },
    #[error("topic of {0} bytes does not fit a data frame")]
    TopicTooLong(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionAction {
    Unsubscribe,
    Subscribe,
}

impl SubscriptionAction {
    pub fn marker(self) -> u8 {
        match self {
            SubscriptionAction::Unsubscribe => UNSUBSCRIBE_MARKER,
            SubscriptionAction::Subscribe => SUBSCRIBE_MARKER,
        }
    }
}

/// A subscribe or unsubscribe request for a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlFrame {
    pub action: SubscriptionAction,
    pub pattern: Bytes,
}

impl ControlFrame {
    pub fn subscribe(pattern: impl Into<Bytes>) -> Self {
        Self {
            action: SubscriptionAction::Subscribe,
            pattern: pattern.into(),
        }
    }

    pub fn unsubscribe(pattern: impl Into<Bytes>) -> Self {
        Self {
            action: SubscriptionAction::Unsubscribe,
            pattern: pattern.into(),
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(1 + self.pattern.len());
        buf.put_u8(self.action.marker());
        buf.put_slice(&self.pattern);
        buf.freeze()
    }
}

/// A published message. Holds the encoded bytes it was decoded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    raw: Bytes,
    topic_len: usize,
}

impl DataFrame {
    pub fn new(topic: &[u8], payload: &[u8]) -> Result<Self, FrameError> {
        let topic_len = u16::try_from(topic.len()).map_err(|_| FrameError::TopicTooLong(topic.len()))?;

        let mut buf = BytesMut::with_capacity(DATA_HEADER_LEN + topic.len() + payload.len());
        buf.put_u8(DATA_MARKER);
        buf.put_u16(topic_len);
        buf.put_slice(topic);
        buf.put_slice(payload);

        Ok(Self {
            raw: buf.freeze(),
            topic_len: topic.len(),
        })
    }

    pub fn topic(&self) -> Bytes {
        self.raw
            .slice(DATA_HEADER_LEN..DATA_HEADER_LEN + self.topic_len)
    }

    pub fn payload(&self) -> Bytes {
        self.raw.slice(DATA_HEADER_LEN + self.topic_len..)
    }

    /// The exact bytes as received; this is what gets forwarded.
    pub fn as_bytes(&self) -> &Bytes {
        &self.raw
    }

    pub fn into_bytes(self) -> Bytes {
        self.raw
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Control(ControlFrame),
    Data(DataFrame),
}

impl Frame {
    pub fn decode(raw: Bytes) -> Result<Frame, FrameError> {
        let Some(&marker) = raw.first() else {
            return Err(FrameError::Empty);
        };

        match marker {
            UNSUBSCRIBE_MARKER => Ok(Frame::Control(ControlFrame::unsubscribe(raw.slice(1..)))),
            SUBSCRIBE_MARKER => Ok(Frame::Control(ControlFrame::subscribe(raw.slice(1..)))),
            DATA_MARKER => {
                if raw.len() < DATA_HEADER_LEN {
                    return Err(FrameError::Truncated {
                        needed: DATA_HEADER_LEN,
                        actual: raw.len(),
                    });
                }
                let topic_len = u16::from_be_bytes([raw[1], raw[2]]) as usize;
                let needed = DATA_HEADER_LEN + topic_len;
                if raw.len() < needed {
                    return Err(FrameError::Truncated {
                        needed,
                        actual: raw.len(),
                    });
                }
                Ok(Frame::Data(DataFrame { raw, topic_len }))
            }
            other => Err(FrameError::UnknownMarker(other)),
        }
    }

    pub fn encode(&self) -> Bytes {
        match self {
            Frame::Control(control) => control.encode(),
            Frame::Data(data) => data.as_bytes().clone(),
        }
    }
}
