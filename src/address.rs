//! Address parsing, resolution and socket setup.
//!
//! Accepted forms:
//!
//! ```text
//! [tcp://|udp://]host:port
//! [tcp://|udp://]*:port        wildcard (all interfaces when binding)
//! [tcp://|udp://][::1]:port    IPv6 literals must be bracketed
//! ```
//!
//! The protocol defaults to TCP. The port is required and must be numeric:
//! service names such as `host:http` are rejected rather than looked up.

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::fmt;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

/// Listen backlog for stream sockets.
const LISTEN_BACKLOG: i32 = 5;

/// Address errors.
#[derive(Error, Debug)]
pub enum AddressError {
    #[error("empty address")]
    Empty,

    #[error("unknown protocol '{0}' (expected tcp or udp)")]
    UnknownProtocol(String),

    #[error("missing port in '{0}'")]
    MissingPort(String),

    #[error("invalid port in '{0}'")]
    InvalidPort(String),

    #[error("malformed address '{0}'")]
    Malformed(String),

    #[error("cannot resolve '{url}': {source}")]
    Resolve { url: String, source: io::Error },

    #[error("'{0}' resolved to no addresses")]
    NoAddresses(String),

    #[error("could not bind '{url}': {source}")]
    Bind { url: String, source: io::Error },

    #[error("could not connect to '{url}': {source}")]
    Connect { url: String, source: io::Error },
}

/// Transport protocol selected by the URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Proto {
    Tcp,
    Udp,
}

impl Proto {
    fn socket_type(self) -> Type {
        match self {
            Proto::Tcp => Type::STREAM,
            Proto::Udp => Type::DGRAM,
        }
    }

    fn protocol(self) -> Protocol {
        match self {
            Proto::Tcp => Protocol::TCP,
            Proto::Udp => Protocol::UDP,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Proto::Tcp => "tcp",
            Proto::Udp => "udp",
        }
    }
}

/// A parsed `[proto://]node:port` address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Url {
    pub proto: Proto,
    /// `None` for the `*` wildcard.
    pub node: Option<String>,
    pub port: u16,
}

impl Url {
    /// Describe a connected peer.
    pub fn from_peer(proto: Proto, addr: SocketAddr) -> Self {
        Self {
            proto,
            node: Some(addr.ip().to_string()),
            port: addr.port(),
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.node.is_none()
    }

    /// Resolve to candidate socket addresses.
    ///
    /// A wildcard resolves to the unspecified addresses when binding and to
    /// the loopback addresses when connecting.
    pub fn resolve(&self, passive: bool) -> Result<Vec<SocketAddr>, AddressError> {
        let addrs: Vec<SocketAddr> = match &self.node {
            None if passive => vec![
                SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port)),
                SocketAddr::from((Ipv6Addr::UNSPECIFIED, self.port)),
            ],
            None => vec![
                SocketAddr::from((Ipv4Addr::LOCALHOST, self.port)),
                SocketAddr::from((Ipv6Addr::LOCALHOST, self.port)),
            ],
            Some(node) => (node.as_str(), self.port)
                .to_socket_addrs()
                .map_err(|source| AddressError::Resolve {
                    url: self.to_string(),
                    source,
                })?
                .collect(),
        };

        if addrs.is_empty() {
            return Err(AddressError::NoAddresses(self.to_string()));
        }
        Ok(addrs)
    }

    /// Bind a socket on the first usable resolved address.
    pub fn bind(&self) -> Result<Socket, AddressError> {
        let mut last_err = None;

        for addr in self.resolve(true)? {
            match bind_socket(self.proto, addr) {
                Ok(socket) => {
                    debug!(addr = %addr, proto = self.proto.as_str(), "Bound");
                    return Ok(socket);
                }
                Err(e) => {
                    warn!(addr = %addr, error = %e, "bind failed (continuing)");
                    last_err = Some(e);
                }
            }
        }

        Err(AddressError::Bind {
            url: self.to_string(),
            source: last_err.unwrap_or_else(|| io::Error::from(io::ErrorKind::AddrNotAvailable)),
        })
    }

    /// Connect a socket to the first reachable resolved address.
    pub fn connect(&self) -> Result<Socket, AddressError> {
        let mut last_err = None;

        for addr in self.resolve(false)? {
            match self.connect_one(addr) {
                Ok(socket) => {
                    debug!(addr = %addr, proto = self.proto.as_str(), "Connected");
                    return Ok(socket);
                }
                Err(e) => {
                    debug!(addr = %addr, error = %e, "connect failed (continuing)");
                    last_err = Some(e);
                }
            }
        }

        Err(AddressError::Connect {
            url: self.to_string(),
            source: last_err.unwrap_or_else(|| io::Error::from(io::ErrorKind::AddrNotAvailable)),
        })
    }

    fn connect_one(&self, addr: SocketAddr) -> io::Result<Socket> {
        let socket = Socket::new(
            Domain::for_address(addr),
            self.proto.socket_type(),
            Some(self.proto.protocol()),
        )?;
        socket.connect(&SockAddr::from(addr))?;
        if self.proto == Proto::Tcp {
            socket.set_nodelay(true)?;
        }
        Ok(socket)
    }
}

/// Bind a socket of `proto` to `addr`. Stream sockets are also put into
/// the listening state.
pub fn bind_socket(proto: Proto, addr: SocketAddr) -> io::Result<Socket> {
    let socket = Socket::new(
        Domain::for_address(addr),
        proto.socket_type(),
        Some(proto.protocol()),
    )?;
    socket.set_reuse_address(true)?;
    // Datagram servers rebind the same port between sessions.
    #[cfg(unix)]
    {
        if proto == Proto::Udp {
            socket.set_reuse_port(true)?;
        }
    }
    if addr.is_ipv6() {
        socket.set_only_v6(true)?;
    }
    socket.bind(&SockAddr::from(addr))?;
    if proto == Proto::Tcp {
        socket.listen(LISTEN_BACKLOG)?;
    }
    Ok(socket)
}

impl FromStr for Url {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(AddressError::Empty);
        }

        let (proto, rest) = match s.split_once("://") {
            Some(("tcp", rest)) => (Proto::Tcp, rest),
            Some(("udp", rest)) => (Proto::Udp, rest),
            Some((other, _)) => return Err(AddressError::UnknownProtocol(other.to_string())),
            None => (Proto::Tcp, s),
        };

        let (node, port) = if let Some(bracketed) = rest.strip_prefix('[') {
            let (node, after) = bracketed
                .split_once(']')
                .ok_or_else(|| AddressError::Malformed(s.to_string()))?;
            let port = after
                .strip_prefix(':')
                .ok_or_else(|| AddressError::MissingPort(s.to_string()))?;
            (node, port)
        } else {
            let (node, port) = rest
                .rsplit_once(':')
                .ok_or_else(|| AddressError::MissingPort(s.to_string()))?;
            if node.contains(':') {
                // Unbracketed IPv6 literal: the port split is ambiguous.
                return Err(AddressError::Malformed(s.to_string()));
            }
            (node, port)
        };

        let port: u16 = port
            .parse()
            .map_err(|_| AddressError::InvalidPort(s.to_string()))?;

        let node = match node {
            "" | "*" => None,
            other => Some(other.to_string()),
        };

        Ok(Url { proto, node, port })
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.node {
            None => write!(f, "{}://*:{}", self.proto.as_str(), self.port),
            Some(node) if node.contains(':') => {
                write!(f, "{}://[{}]:{}", self.proto.as_str(), node, self.port)
            }
            Some(node) => write!(f, "{}://{}:{}", self.proto.as_str(), node, self.port),
        }
    }
}
