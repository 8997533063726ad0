//! I/O and timing plumbing shared by the client and server engines.
//!
//! - `Transport`: one-call-per-message send/receive with a per-call
//!   blocking mode, implemented for `socket2::Socket`
//! - `Clock`: opaque monotonic ticks plus conversion to microseconds

pub mod clock;
pub mod transport;

pub use clock::{Clock, MonotonicClock, TickSource};
#[cfg(target_arch = "x86_64")]
pub use clock::TscClock;
pub use transport::{IoMode, Transport};
