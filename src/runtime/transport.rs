//! Fixed-size message I/O over a connected socket.
//!
//! The engines never touch the socket directly. They issue one send or
//! receive per message and pick, per call, whether that call may block.
//! There is no readiness polling: a non-blocking call either completes or
//! fails with `WouldBlock`.

use socket2::{Socket, Type};
use std::io;
use std::mem::MaybeUninit;

/// Whether a single I/O call is allowed to block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoMode {
    Blocking,
    NonBlocking,
}

impl IoMode {
    fn flags(self) -> libc::c_int {
        match self {
            IoMode::Blocking => 0,
            IoMode::NonBlocking => libc::MSG_DONTWAIT,
        }
    }
}

/// A connected message transport.
pub trait Transport {
    /// Send `buf` in one call, returning the number of bytes accepted.
    fn send_msg(&mut self, buf: &[u8], mode: IoMode) -> io::Result<usize>;

    /// Receive at most `buf.len()` bytes in one call. `Ok(0)` means the peer
    /// closed the connection (or, on datagram sockets, sent an empty
    /// datagram).
    fn recv_msg(&mut self, buf: &mut [u8], mode: IoMode) -> io::Result<usize>;

    /// True if the transport preserves message boundaries.
    fn is_datagram(&self) -> bool {
        false
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send_msg(&mut self, buf: &[u8], mode: IoMode) -> io::Result<usize> {
        (**self).send_msg(buf, mode)
    }

    fn recv_msg(&mut self, buf: &mut [u8], mode: IoMode) -> io::Result<usize> {
        (**self).recv_msg(buf, mode)
    }

    fn is_datagram(&self) -> bool {
        (**self).is_datagram()
    }
}

#[cfg(target_os = "linux")]
const SEND_FLAGS: libc::c_int = libc::MSG_NOSIGNAL;
#[cfg(not(target_os = "linux"))]
const SEND_FLAGS: libc::c_int = 0;

impl Transport for Socket {
    fn send_msg(&mut self, buf: &[u8], mode: IoMode) -> io::Result<usize> {
        loop {
            match self.send_with_flags(buf, SEND_FLAGS | mode.flags()) {
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                result => return result,
            }
        }
    }

    fn recv_msg(&mut self, buf: &mut [u8], mode: IoMode) -> io::Result<usize> {
        // SAFETY: `recv_with_flags` only writes initialized bytes into the
        // slice, so viewing initialized memory as `MaybeUninit` is sound.
        let uninit = unsafe { &mut *(buf as *mut [u8] as *mut [MaybeUninit<u8>]) };
        loop {
            match self.recv_with_flags(uninit, mode.flags()) {
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                result => return result,
            }
        }
    }

    fn is_datagram(&self) -> bool {
        matches!(self.r#type(), Ok(ty) if ty == Type::DGRAM)
    }
}
