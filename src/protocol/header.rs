//! Message header codec.

use crate::error::ProtocolError;
use bytes::{Buf, BufMut};

/// Protocol identifier carried by every header.
pub const MAGIC: u32 = 0xfae1_fae2;

/// Encoded header size: magic(4) + rrid(4) + type(1) + fields(4).
pub const HEADER_SIZE: usize = 13;

/// One-byte message type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Helo = 0,
    Ohhi = 1,
    Ping = 10,
    Pong = 11,
}

impl TryFrom<u8> for MessageType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageType::Helo),
            1 => Ok(MessageType::Ohhi),
            10 => Ok(MessageType::Ping),
            11 => Ok(MessageType::Pong),
            other => Err(ProtocolError::UnknownType(other)),
        }
    }
}

/// Payload sizes negotiated by the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sizes {
    pub req_size: u16,
    pub res_size: u16,
}

impl Sizes {
    pub fn new(req_size: u16, res_size: u16) -> Self {
        Self { req_size, res_size }
    }

    /// Bytes on the wire for one request, header included.
    pub fn request_len(&self) -> usize {
        HEADER_SIZE + self.req_size as usize
    }

    /// Bytes on the wire for one response, header included.
    pub fn response_len(&self) -> usize {
        HEADER_SIZE + self.res_size as usize
    }
}

/// Type-specific header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    /// Client opens a session with the sizes it wants.
    Helo(Sizes),
    /// Server acknowledges the sizes.
    Ohhi(Sizes),
    /// Request. `dlen` is informational only.
    Ping { dlen: u16 },
    /// Response. `dlen` is informational only.
    Pong { dlen: u16 },
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Helo(_) => MessageType::Helo,
            Message::Ohhi(_) => MessageType::Ohhi,
            Message::Ping { .. } => MessageType::Ping,
            Message::Pong { .. } => MessageType::Pong,
        }
    }
}

/// A decoded message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub rrid: u32,
    pub message: Message,
}

impl Header {
    pub fn new(rrid: u32, message: Message) -> Self {
        Self { rrid, message }
    }

    pub fn helo(sizes: Sizes) -> Self {
        Self::new(0, Message::Helo(sizes))
    }

    pub fn ohhi(rrid: u32, sizes: Sizes) -> Self {
        Self::new(rrid, Message::Ohhi(sizes))
    }

    pub fn ping(rrid: u32, dlen: u16) -> Self {
        Self::new(rrid, Message::Ping { dlen })
    }

    pub fn pong(rrid: u32, dlen: u16) -> Self {
        Self::new(rrid, Message::Pong { dlen })
    }

    pub fn message_type(&self) -> MessageType {
        self.message.message_type()
    }

    /// Encode into a standalone header buffer.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        self.encode_into(&mut out);
        out
    }

    /// Encode into the first `HEADER_SIZE` bytes of `dst`, leaving the
    /// payload area untouched.
    ///
    /// # Panics
    /// Panics if `dst` is shorter than `HEADER_SIZE`.
    pub fn encode_into(&self, dst: &mut [u8]) {
        let mut buf = &mut dst[..HEADER_SIZE];
        buf.put_u32_ne(MAGIC);
        buf.put_u32_ne(self.rrid);
        buf.put_u8(self.message_type() as u8);
        match self.message {
            Message::Helo(sizes) | Message::Ohhi(sizes) => {
                buf.put_u16_ne(sizes.req_size);
                buf.put_u16_ne(sizes.res_size);
            }
            Message::Ping { dlen } | Message::Pong { dlen } => {
                buf.put_u16_ne(dlen);
                buf.put_u16_ne(0);
            }
        }
    }

    /// Decode the header at the start of `src`. Trailing payload bytes are
    /// ignored.
    pub fn decode(src: &[u8]) -> Result<Self, ProtocolError> {
        if src.len() < HEADER_SIZE {
            return Err(ProtocolError::Truncated {
                got: src.len(),
                need: HEADER_SIZE,
            });
        }

        let mut buf = &src[..HEADER_SIZE];
        let magic = buf.get_u32_ne();
        if magic != MAGIC {
            return Err(ProtocolError::BadMagic(magic));
        }
        let rrid = buf.get_u32_ne();
        let kind = MessageType::try_from(buf.get_u8())?;

        let message = match kind {
            MessageType::Helo | MessageType::Ohhi => {
                let sizes = Sizes::new(buf.get_u16_ne(), buf.get_u16_ne());
                if kind == MessageType::Helo {
                    Message::Helo(sizes)
                } else {
                    Message::Ohhi(sizes)
                }
            }
            MessageType::Ping => Message::Ping {
                dlen: buf.get_u16_ne(),
            },
            MessageType::Pong => Message::Pong {
                dlen: buf.get_u16_ne(),
            },
        };

        Ok(Header { rrid, message })
    }

    /// Decode and require a specific message type.
    pub fn decode_expecting(src: &[u8], expected: MessageType) -> Result<Self, ProtocolError> {
        let header = Self::decode(src)?;
        let got = header.message_type();
        if got != expected {
            return Err(ProtocolError::UnexpectedType { expected, got });
        }
        Ok(header)
    }
}
