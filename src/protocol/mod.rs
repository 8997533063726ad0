//! rrbench wire protocol.
//!
//! Every message starts with a fixed 13-byte header, followed by an opaque
//! payload whose length is fixed for the whole session by the handshake:
//!
//! ```text
//! offset 0: magic  (u32, 0xfae1fae2)
//! offset 4: rrid   (u32, request id, echoed by the server)
//! offset 8: type   (u8: 0=HELO, 1=OHHI, 10=PING, 11=PONG)
//! offset 9: fields (4 bytes)
//!             HELO/OHHI: req_size (u16), res_size (u16)
//!             PING/PONG: dlen (u16), 2 bytes unused
//! ```
//!
//! All integers are in host byte order. Peers on machines with different
//! endianness will reject each other on the magic check.
//!
//! ## Session flow
//!
//! ```text
//! client                          server
//!   HELO {req_size, res_size} -->
//!                             <-- OHHI {req_size, res_size}
//!   PING rrid=0 + req payload -->
//!   PING rrid=1 + req payload -->          (up to `burst` in flight)
//!                             <-- PONG rrid=0 + res payload
//!   ...
//! ```

pub mod header;

pub use header::{Header, Message, MessageType, Sizes, HEADER_SIZE};
