//! rrbench server.
//!
//! Serves one client at a time: accept (or, for UDP, wait for a first
//! datagram), run the session to completion, then take the next client.

use crate::address::{self, Proto, Url};
use crate::config::ServerConfig;
use crate::error::{Error, IoContext, ProtocolError, Result};
use crate::protocol::{Header, Message, MessageType, Sizes, HEADER_SIZE};
use crate::runtime::{IoMode, Transport};
use socket2::Socket;
use std::io;
use std::mem::MaybeUninit;
use std::net::SocketAddr;
use tracing::{debug, error, info, info_span};

/// Outcome of a session that ended with the client closing the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub sizes: Sizes,
    pub served: u64,
}

/// Current state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    /// Waiting for the client's HELO.
    AwaitHelo,
    /// Echoing PINGs with the negotiated sizes.
    Active(Sizes),
    /// Client closed the connection.
    Closed(Sizes),
}

/// Server side of one connection.
pub struct Session<T: Transport> {
    transport: T,
    state: SessionState,
    served: u64,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            state: SessionState::AwaitHelo,
            served: 0,
        }
    }

    /// Run the handshake and the echo loop until the client closes.
    pub fn run(&mut self) -> Result<SessionSummary> {
        loop {
            self.state = match self.state {
                SessionState::AwaitHelo => SessionState::Active(self.handshake()?),
                SessionState::Active(sizes) => {
                    self.serve(sizes)?;
                    SessionState::Closed(sizes)
                }
                SessionState::Closed(sizes) => {
                    return Ok(SessionSummary {
                        sizes,
                        served: self.served,
                    })
                }
            };
        }
    }

    /// Receive HELO and acknowledge it with the same header relabelled OHHI.
    fn handshake(&mut self) -> Result<Sizes> {
        let mut buf = [0u8; HEADER_SIZE];
        let n = self
            .transport
            .recv_msg(&mut buf, IoMode::Blocking)
            .during("recv helo")?;
        if n != HEADER_SIZE {
            return Err(Error::protocol(
                "recv helo",
                ProtocolError::ShortMessage {
                    got: n,
                    expected: HEADER_SIZE,
                },
            ));
        }

        let header = Header::decode(&buf).map_err(|e| Error::protocol("recv helo", e))?;
        let sizes = match header.message {
            Message::Helo(sizes) => sizes,
            other => {
                return Err(Error::protocol(
                    "recv helo",
                    ProtocolError::UnexpectedType {
                        expected: MessageType::Helo,
                        got: other.message_type(),
                    },
                ))
            }
        };
        info!(
            req_size = sizes.req_size,
            res_size = sizes.res_size,
            "Negotiated sizes"
        );

        let reply = Header::ohhi(header.rrid, sizes).encode();
        let sent = self
            .transport
            .send_msg(&reply, IoMode::Blocking)
            .during("send ohhi")?;
        check_sent("send ohhi", sent, reply.len())?;

        Ok(sizes)
    }

    /// Answer every PING with a PONG until the client closes.
    fn serve(&mut self, sizes: Sizes) -> Result<()> {
        let mut req = vec![0u8; sizes.request_len()];
        let mut res = vec![0u8; sizes.response_len()];

        loop {
            let n = self
                .transport
                .recv_msg(&mut req, IoMode::Blocking)
                .during("recv ping")?;
            if n == 0 {
                debug!(served = self.served, "Peer closed");
                return Ok(());
            }
            if n != req.len() {
                return Err(Error::protocol(
                    "recv ping",
                    ProtocolError::ShortMessage {
                        got: n,
                        expected: req.len(),
                    },
                ));
            }

            let ping = Header::decode_expecting(&req, MessageType::Ping)
                .map_err(|e| Error::protocol("recv ping", e))?;

            Header::pong(ping.rrid, sizes.res_size).encode_into(&mut res);
            let sent = self
                .transport
                .send_msg(&res, IoMode::Blocking)
                .during("send pong")?;
            check_sent("send pong", sent, res.len())?;

            self.served += 1;
        }
    }
}

fn check_sent(op: &'static str, sent: usize, expected: usize) -> Result<()> {
    if sent != expected {
        return Err(Error::io(
            op,
            io::Error::new(
                io::ErrorKind::WriteZero,
                format!("sent {sent} of {expected} bytes"),
            ),
        ));
    }
    Ok(())
}

/// Serial session driver bound to one address.
pub struct Server {
    config: ServerConfig,
    socket: Socket,
    local_addr: SocketAddr,
}

impl Server {
    /// Bind the configured address.
    pub fn bind(config: ServerConfig) -> Result<Self> {
        let socket = config.listen.bind()?;
        let local_addr = socket
            .local_addr()
            .on_listener("getsockname")?
            .as_socket()
            .ok_or_else(|| {
                Error::listener(
                    "getsockname",
                    io::Error::new(io::ErrorKind::InvalidData, "not an inet address"),
                )
            })?;

        Ok(Self {
            config,
            socket,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve clients forever.
    ///
    /// A failed session stops the server unless `keep_going` is set, in
    /// which case it is logged and the next client is served.
    pub fn run(&mut self) -> Result<()> {
        info!(
            address = %self.config.listen,
            local = %self.local_addr(),
            all_interfaces = self.config.listen.is_wildcard(),
            keep_going = self.config.keep_going,
            "Server listening"
        );

        loop {
            match self.serve_one() {
                Ok(_) => {}
                Err(e) if self.config.keep_going && is_session_error(&e) => {
                    error!(
                        error = %e,
                        protocol_violation = e.as_protocol().is_some(),
                        "Session failed"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Take the next client and run its session to completion.
    pub fn serve_one(&mut self) -> Result<SessionSummary> {
        match self.config.listen.proto {
            Proto::Tcp => {
                let (conn, addr) = self.socket.accept().on_listener("accept")?;
                let peer = peer_name(Proto::Tcp, addr.as_socket());
                run_session(conn, &peer)
            }
            Proto::Udp => self.serve_datagram_peer(),
        }
    }

    /// Connect the datagram socket to the sender of the next datagram, run
    /// its session, then rebind so the next peer can connect.
    fn serve_datagram_peer(&mut self) -> Result<SessionSummary> {
        let mut peek_buf = [MaybeUninit::<u8>::uninit(); 1];
        let (_, from) = self.socket.peek_from(&mut peek_buf).on_listener("peek")?;
        self.socket.connect(&from).on_listener("connect peer")?;

        let peer = peer_name(Proto::Udp, from.as_socket());
        let result = run_session(&mut self.socket, &peer);

        self.socket = address::bind_socket(Proto::Udp, self.local_addr)
            .on_listener("rebind")?;
        result
    }
}

fn run_session<T: Transport>(transport: T, peer: &str) -> Result<SessionSummary> {
    let _span = info_span!("session", peer = %peer).entered();
    info!("connection from: {}", peer);

    let summary = Session::new(transport).run()?;
    info!(
        served = summary.served,
        req_size = summary.sizes.req_size,
        res_size = summary.sizes.res_size,
        "done with: {} (served {} messages)", peer, summary.served
    );
    Ok(summary)
}

fn peer_name(proto: Proto, addr: Option<SocketAddr>) -> String {
    match addr {
        Some(addr) => Url::from_peer(proto, addr).to_string(),
        None => format!("{}://?", proto.as_str()),
    }
}

/// Errors confined to one client's session. Listener failures and
/// everything else stop the server.
fn is_session_error(e: &Error) -> bool {
    matches!(e, Error::Protocol { .. } | Error::Io { .. })
}
