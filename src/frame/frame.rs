//! Frame encoding and decoding for the NOMAD mux.

use std::io;

use bytes::{BufMut, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::pool::{BufferPool, PooledBuf};
use crate::core::{
    FLAG_CONN_CLOSE, FLAG_MSG_SEND_OK, FLAG_NEW_CONN, FLAG_NEW_CONN_FAIL, FLAG_NEW_CONN_OK,
    FLAG_NEW_MSG, FLAG_NEW_MSG_PART, FLAG_PING, FLAG_PING_RETURN, FRAME_HEADER_SIZE,
    FRAME_LENGTH_SIZE, FRAME_WINDOW_SIZE, POOL_BUFFER_SIZE, SESSION_CONN_ID,
};

/// Frame parsing and building errors.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Flag byte is not a known frame flag.
    #[error("unknown frame flag: {0:#04x}")]
    UnknownFlag(u8),

    /// Payload exceeds the maximum segment size.
    #[error("payload too large: {len} bytes (max {max})")]
    PayloadTooLarge {
        /// Payload length.
        len: usize,
        /// Maximum allowed.
        max: usize,
    },

    /// Transport read failed (including EOF mid-frame).
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Frame flag identifying what a frame does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Flag {
    /// Keep-alive ping.
    Ping = FLAG_PING,
    /// New connection accepted.
    NewConnOk = FLAG_NEW_CONN_OK,
    /// New connection refused.
    NewConnFail = FLAG_NEW_CONN_FAIL,
    /// Final segment of a message.
    NewMsg = FLAG_NEW_MSG,
    /// Non-final segment of a message.
    NewMsgPart = FLAG_NEW_MSG_PART,
    /// Receive credit released by the reader.
    MsgSendOk = FLAG_MSG_SEND_OK,
    /// Open a new connection.
    NewConn = FLAG_NEW_CONN,
    /// Close a connection.
    ConnClose = FLAG_CONN_CLOSE,
    /// Ping echo.
    PingReturn = FLAG_PING_RETURN,
}

impl Flag {
    /// Parse a flag from its wire byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            FLAG_PING => Some(Self::Ping),
            FLAG_NEW_CONN_OK => Some(Self::NewConnOk),
            FLAG_NEW_CONN_FAIL => Some(Self::NewConnFail),
            FLAG_NEW_MSG => Some(Self::NewMsg),
            FLAG_NEW_MSG_PART => Some(Self::NewMsgPart),
            FLAG_MSG_SEND_OK => Some(Self::MsgSendOk),
            FLAG_NEW_CONN => Some(Self::NewConn),
            FLAG_CONN_CLOSE => Some(Self::ConnClose),
            FLAG_PING_RETURN => Some(Self::PingReturn),
            _ => None,
        }
    }

    /// Wire byte of this flag.
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Whether frames with this flag carry a length-prefixed payload.
    pub fn has_payload(self) -> bool {
        matches!(
            self,
            Flag::Ping | Flag::PingReturn | Flag::NewMsg | Flag::NewMsgPart
        )
    }

    /// Largest payload accepted for this flag.
    ///
    /// Message segments are bounded by `max_segment`; ping payloads are
    /// session control and may use a whole pool buffer.
    pub fn payload_limit(self, max_segment: usize) -> usize {
        let limit = match self {
            Flag::NewMsg | Flag::NewMsgPart => max_segment,
            Flag::Ping | Flag::PingReturn => max_segment.max(POOL_BUFFER_SIZE),
            _ => 0,
        };
        limit.min(u16::MAX as usize)
    }

    /// Whether frames with this flag skip ahead of ordinary traffic in the
    /// write queue.
    ///
    /// Only frames that carry no per-connection ordering constraint qualify.
    pub fn is_priority(self) -> bool {
        matches!(self, Flag::Ping | Flag::PingReturn | Flag::MsgSendOk)
    }
}

/// One mux frame.
///
/// The payload, if any, is a pooled buffer owned by the frame; dropping the
/// frame releases it.
#[derive(Debug)]
pub struct Frame {
    /// What the frame does.
    pub flag: Flag,
    /// Logical connection id, or [`SESSION_CONN_ID`] for session control.
    pub id: i32,
    /// Payload for ping, ping-return and message frames.
    pub payload: Option<PooledBuf>,
    /// Receive credit released by the peer (message-send-ok only).
    pub window: u32,
}

impl Frame {
    /// Payload-less control frame for a connection (new-connection, -ok,
    /// -fail, connection-close).
    pub fn control(flag: Flag, id: i32) -> Self {
        Self {
            flag,
            id,
            payload: None,
            window: 0,
        }
    }

    /// Message segment. `part` marks a segment that more segments follow.
    pub fn data(id: i32, payload: PooledBuf, part: bool) -> Self {
        Self {
            flag: if part { Flag::NewMsgPart } else { Flag::NewMsg },
            id,
            payload: Some(payload),
            window: 0,
        }
    }

    /// Session-level ping.
    pub fn ping(payload: PooledBuf) -> Self {
        Self {
            flag: Flag::Ping,
            id: SESSION_CONN_ID,
            payload: Some(payload),
            window: 0,
        }
    }

    /// Echo of a received ping payload.
    pub fn ping_return(payload: PooledBuf) -> Self {
        Self {
            flag: Flag::PingReturn,
            id: SESSION_CONN_ID,
            payload: Some(payload),
            window: 0,
        }
    }

    /// Report `window` bytes of freed receive space for a connection.
    pub fn send_ok(id: i32, window: u32) -> Self {
        Self {
            flag: Flag::MsgSendOk,
            id,
            payload: None,
            window,
        }
    }

    /// Payload bytes (empty for frames without a payload).
    pub fn payload(&self) -> &[u8] {
        match &self.payload {
            Some(buf) => &buf[..],
            None => &[],
        }
    }

    /// Take ownership of the payload buffer.
    pub fn take_payload(&mut self) -> Option<PooledBuf> {
        self.payload.take()
    }

    /// Encoded size of this frame in bytes.
    pub fn encoded_len(&self) -> usize {
        FRAME_HEADER_SIZE
            + if self.flag.has_payload() {
                FRAME_LENGTH_SIZE + self.payload().len()
            } else if self.flag == Flag::MsgSendOk {
                FRAME_WINDOW_SIZE
            } else {
                0
            }
    }

    /// Append the wire encoding of this frame to `dst`.
    ///
    /// Fails if the payload is longer than the flag's
    /// [`payload_limit`](Flag::payload_limit).
    pub fn encode(&self, dst: &mut BytesMut, max_segment: usize) -> Result<(), FrameError> {
        let payload = self.payload();
        let max = self.flag.payload_limit(max_segment);
        if self.flag.has_payload() && payload.len() > max {
            return Err(FrameError::PayloadTooLarge {
                len: payload.len(),
                max,
            });
        }

        dst.reserve(self.encoded_len());
        dst.put_u8(self.flag.as_byte());
        dst.put_i32_le(self.id);
        if self.flag.has_payload() {
            dst.put_u16_le(payload.len() as u16);
            dst.put_slice(payload);
        } else if self.flag == Flag::MsgSendOk {
            dst.put_u32_le(self.window);
        }
        Ok(())
    }

    /// Read and decode one frame from `reader`.
    ///
    /// Payloads are copied into a buffer taken from `pool`. Returns the frame
    /// and the number of payload bytes copied.
    pub async fn read_from<R>(
        reader: &mut R,
        pool: &BufferPool,
        max_segment: usize,
    ) -> Result<(Frame, usize), FrameError>
    where
        R: AsyncRead + Unpin,
    {
        let byte = reader.read_u8().await?;
        let flag = Flag::from_byte(byte).ok_or(FrameError::UnknownFlag(byte))?;
        let id = reader.read_i32_le().await?;

        if flag.has_payload() {
            let len = reader.read_u16_le().await? as usize;
            let max = flag.payload_limit(max_segment);
            if len > max {
                return Err(FrameError::PayloadTooLarge { len, max });
            }
            let mut payload = pool.acquire();
            payload.resize(len, 0);
            reader.read_exact(&mut payload[..]).await?;
            let frame = Frame {
                flag,
                id,
                payload: Some(payload),
                window: 0,
            };
            return Ok((frame, len));
        }

        let window = if flag == Flag::MsgSendOk {
            reader.read_u32_le().await?
        } else {
            0
        };
        Ok((
            Frame {
                flag,
                id,
                payload: None,
                window,
            },
            0,
        ))
    }
}
