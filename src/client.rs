//! rrbench client.
//!
//! After the HELO/OHHI handshake the client keeps up to `burst` PINGs in
//! flight. Each iteration of the pipeline loop has two phases:
//!
//! 1. **Fill**: send non-blocking PINGs until the window is full, all
//!    requests are sent, or the socket send buffer is full (`WouldBlock`).
//! 2. **Drain**: receive PONGs while any are in flight. The first receive
//!    blocks so the loop always makes progress; later ones only block once
//!    there is nothing left to send.
//!
//! There is no readiness polling. `WouldBlock` is the only signal to switch
//! phases.

use crate::address::Url;
use crate::config::{ClientConfig, ClockKind};
use crate::error::{is_transient, Error, IoContext, ProtocolError, Result};
use crate::protocol::{Header, Message, MessageType, Sizes, HEADER_SIZE};
use crate::runtime::{Clock, IoMode, MonotonicClock, TickSource, Transport};
use crate::stats::{LatencySamples, LatencyStats, Report, RunParams};
use socket2::Socket;
use std::io;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Pause between connection attempts.
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// What one run sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Workload {
    /// Maximum requests in flight, at least 1.
    pub burst: u32,
    /// Requests to complete, at least 1.
    pub nmessages: u32,
    pub sizes: Sizes,
    /// HELO send attempts before giving up, at least 1.
    pub handshake_attempts: u32,
}

impl From<&ClientConfig> for Workload {
    fn from(config: &ClientConfig) -> Self {
        Self {
            burst: config.burst,
            nmessages: config.nmessages,
            sizes: config.sizes,
            handshake_attempts: config.handshake_attempts,
        }
    }
}

/// Client progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Init,
    Handshake,
    Pipeline,
    Done,
}

/// Result of a completed run.
#[derive(Debug)]
pub struct RunSummary {
    /// Elapsed ticks per request id.
    pub samples: LatencySamples,
    pub sent: u32,
    pub received: u32,
    /// Largest number of requests observed in flight.
    pub max_in_flight: u32,
    /// Wall time of the pipeline phase.
    pub elapsed: Duration,
}

/// In-flight window accounting.
#[derive(Debug, Default, Clone, Copy)]
struct Window {
    sent: u32,
    received: u32,
    in_flight: u32,
    max_in_flight: u32,
    checksum_sent: u32,
    checksum_received: u32,
}

impl Window {
    fn on_sent(&mut self, rrid: u32) {
        self.sent += 1;
        self.in_flight += 1;
        self.max_in_flight = self.max_in_flight.max(self.in_flight);
        self.checksum_sent = self.checksum_sent.wrapping_add(rrid);
    }

    fn on_received(&mut self, rrid: u32) {
        self.received += 1;
        self.in_flight -= 1;
        self.checksum_received = self.checksum_received.wrapping_add(rrid);
    }

    fn verify(&self) -> Result<()> {
        if self.checksum_sent != self.checksum_received {
            return Err(Error::Integrity {
                sent: self.checksum_sent,
                received: self.checksum_received,
            });
        }
        Ok(())
    }
}

/// Client side of one benchmark run.
pub struct Client<T: Transport, C: Clock> {
    transport: T,
    clock: C,
    workload: Workload,
    state: ClientState,
}

impl<T: Transport, C: Clock> Client<T, C> {
    pub fn new(transport: T, clock: C, workload: Workload) -> Self {
        Self {
            transport,
            clock,
            workload,
            state: ClientState::Init,
        }
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Handshake, pipeline all requests and verify the checksums.
    pub fn run(&mut self) -> Result<RunSummary> {
        self.state = ClientState::Handshake;
        self.handshake()?;

        self.state = ClientState::Pipeline;
        let start = Instant::now();
        let (samples, window) = self.pipeline()?;
        let elapsed = start.elapsed();

        self.state = ClientState::Done;
        window.verify()?;

        if self.transport.is_datagram() {
            // An empty datagram stands in for the connection close.
            self.transport
                .send_msg(&[], IoMode::Blocking)
                .during("send close")?;
        }

        Ok(RunSummary {
            samples,
            sent: window.sent,
            received: window.received,
            max_in_flight: window.max_in_flight,
            elapsed,
        })
    }

    fn handshake(&mut self) -> Result<()> {
        let sizes = self.workload.sizes;
        let helo = Header::helo(sizes).encode();

        let mut attempts = 0;
        loop {
            let err = match self.transport.send_msg(&helo, IoMode::Blocking) {
                Ok(n) if n == helo.len() => break,
                Ok(n) => io::Error::new(
                    io::ErrorKind::WriteZero,
                    format!("sent {n} of {} bytes", helo.len()),
                ),
                Err(e) => e,
            };
            attempts += 1;
            warn!(attempt = attempts, error = %err, "send helo failed");
            if attempts >= self.workload.handshake_attempts {
                return Err(Error::io("send helo", err));
            }
        }

        let mut buf = [0u8; HEADER_SIZE];
        let n = self
            .transport
            .recv_msg(&mut buf, IoMode::Blocking)
            .during("recv ohhi")?;
        if n != HEADER_SIZE {
            return Err(Error::protocol(
                "recv ohhi",
                ProtocolError::ShortMessage {
                    got: n,
                    expected: HEADER_SIZE,
                },
            ));
        }

        let ohhi = Header::decode_expecting(&buf, MessageType::Ohhi)
            .map_err(|e| Error::protocol("recv ohhi", e))?;
        if let Message::Ohhi(echoed) = ohhi.message {
            if echoed != sizes {
                return Err(Error::protocol(
                    "recv ohhi",
                    ProtocolError::SizeMismatch {
                        requested: sizes,
                        echoed,
                    },
                ));
            }
        }

        debug!(
            req_size = sizes.req_size,
            res_size = sizes.res_size,
            "Handshake complete"
        );
        Ok(())
    }

    fn pipeline(&mut self) -> Result<(LatencySamples, Window)> {
        let Workload {
            burst,
            nmessages,
            sizes,
            ..
        } = self.workload;

        let mut req = vec![0u8; sizes.request_len()];
        let mut res = vec![0u8; sizes.response_len()];
        let mut samples = LatencySamples::new(nmessages as usize);
        let mut window = Window::default();

        while window.received < nmessages {
            // Fill
            while window.in_flight < burst && window.sent < nmessages {
                let rrid = window.sent;
                Header::ping(rrid, sizes.req_size).encode_into(&mut req);

                match self.transport.send_msg(&req, IoMode::NonBlocking) {
                    Ok(n) if n == req.len() => {}
                    Ok(n) => {
                        return Err(Error::io(
                            "send ping",
                            io::Error::new(
                                io::ErrorKind::WriteZero,
                                format!("sent {n} of {} bytes", req.len()),
                            ),
                        ))
                    }
                    Err(ref e) if is_transient(e) => break,
                    Err(e) => return Err(Error::io("send ping", e)),
                }

                samples.record_send(rrid, self.clock.now());
                window.on_sent(rrid);
                debug_assert!(window.in_flight <= burst);
            }

            // Drain
            let mut received_one = false;
            while window.in_flight > 0 {
                let mode = if received_one && window.sent < nmessages {
                    IoMode::NonBlocking
                } else {
                    IoMode::Blocking
                };

                let n = match self.transport.recv_msg(&mut res, mode) {
                    Ok(n) => n,
                    Err(ref e) if mode == IoMode::NonBlocking && is_transient(e) => break,
                    Err(e) => return Err(Error::io("recv pong", e)),
                };
                let now = self.clock.now();

                let rrid = self.check_pong(&res[..n])?;
                samples
                    .record_response(rrid, now)
                    .map_err(|e| Error::protocol("recv pong", e))?;
                window.on_received(rrid);
                received_one = true;
            }
        }

        Ok((samples, window))
    }

    /// Validate one received response and return its request id.
    fn check_pong(&self, msg: &[u8]) -> Result<u32> {
        let expected = self.workload.sizes.response_len();
        if msg.is_empty() {
            return Err(Error::io(
                "recv pong",
                io::Error::new(io::ErrorKind::UnexpectedEof, "server closed the connection"),
            ));
        }
        if msg.len() != expected {
            return Err(Error::protocol(
                "recv pong",
                ProtocolError::ShortMessage {
                    got: msg.len(),
                    expected,
                },
            ));
        }

        let pong = Header::decode_expecting(msg, MessageType::Pong)
            .map_err(|e| Error::protocol("recv pong", e))?;
        let res_size = self.workload.sizes.res_size;
        match pong.message {
            Message::Pong { dlen } if dlen != res_size => Err(Error::protocol(
                "recv pong",
                ProtocolError::LengthMismatch {
                    got: dlen,
                    expected: res_size,
                },
            )),
            _ => Ok(pong.rrid),
        }
    }
}

/// Connect to `url`, retrying up to `attempts` times.
pub fn connect(url: &Url, attempts: u32) -> Result<Socket> {
    let mut attempt = 0;
    loop {
        match url.connect() {
            Ok(socket) => return Ok(socket),
            Err(e) => {
                attempt += 1;
                warn!(attempt, error = %e, "connect failed");
                if attempt >= attempts {
                    return Err(e.into());
                }
                std::thread::sleep(CONNECT_RETRY_DELAY);
            }
        }
    }
}

/// Build the tick source selected in the configuration.
pub fn tick_source(kind: ClockKind) -> Result<TickSource> {
    match kind {
        ClockKind::Monotonic => Ok(TickSource::Monotonic(MonotonicClock::new())),
        #[cfg(target_arch = "x86_64")]
        ClockKind::Tsc => {
            use crate::runtime::TscClock;
            let clock = TscClock::calibrate(TscClock::CALIBRATION);
            debug!(ticks_per_usec = clock.ticks_per_usec(), "Calibrated TSC");
            Ok(TickSource::Tsc(clock))
        }
        #[cfg(not(target_arch = "x86_64"))]
        ClockKind::Tsc => Err(Error::Usage(
            "the tsc clock is only available on x86_64".to_string(),
        )),
    }
}

/// Connect, run the configured benchmark and build its report.
pub fn run(config: &ClientConfig) -> Result<Report> {
    let clock = tick_source(config.clock)?;
    let started_at = chrono::Local::now();

    info!(
        server = %config.server,
        burst = config.burst,
        nmessages = config.nmessages,
        req_size = config.sizes.req_size,
        res_size = config.sizes.res_size,
        clock = clock.name(),
        "Starting run"
    );

    let socket = connect(&config.server, config.connect_attempts)?;
    let mut client = Client::new(socket, clock, Workload::from(config));
    let summary = match client.run() {
        Ok(summary) => summary,
        Err(e) => {
            debug!(state = ?client.state(), "Run aborted");
            return Err(e);
        }
    };

    info!(
        sent = summary.sent,
        received = summary.received,
        max_in_flight = summary.max_in_flight,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "Run complete"
    );

    let stats = summarize(summary.samples, config.nmessages)?;

    let params = RunParams {
        server: config.server.to_string(),
        burst: config.burst,
        nmessages: config.nmessages,
        req_size: config.sizes.req_size,
        res_size: config.sizes.res_size,
    };
    Ok(Report::new(
        started_at,
        params,
        &stats,
        summary.max_in_flight,
        summary.elapsed,
        &clock,
    ))
}

/// Reduce the samples of a finished run to summary statistics. Every
/// request must have completed.
fn summarize(samples: LatencySamples, expected: u32) -> Result<LatencyStats> {
    let completed = samples.completed();
    let mut elapsed = samples.into_elapsed();
    match LatencyStats::compute(&mut elapsed) {
        Some(stats) if completed == expected as usize => Ok(stats),
        _ => Err(Error::Incomplete {
            expected,
            completed,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ReportFormat, ServerConfig};
    use crate::server::{Server, Session};
    use socket2::{Domain, Type};
    use std::collections::VecDeque;
    use std::thread;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Op {
        Send(u32),
        Recv(u32),
    }

    /// In-memory server stand-in.
    struct SimPeer {
        sizes: Sizes,
        /// Responses the client can receive right now.
        ready: VecDeque<Vec<u8>>,
        /// Responses released one at a time by blocking receives.
        pending: VecDeque<Vec<u8>>,
        lazy: bool,
        /// Queued responses at which sends start failing with `WouldBlock`.
        send_capacity: usize,
        helo_failures: u32,
        ohhi_sizes: Option<Sizes>,
        corrupt: Option<fn(&mut Vec<u8>)>,
        handshake_done: bool,
        requests: u32,
        responses: u32,
        max_outstanding: u32,
        log: Vec<Op>,
        /// Mode of every receive call after the handshake.
        recv_modes: Vec<IoMode>,
    }

    impl SimPeer {
        fn new() -> Self {
            Self {
                sizes: Sizes::default(),
                ready: VecDeque::new(),
                pending: VecDeque::new(),
                lazy: false,
                send_capacity: usize::MAX,
                helo_failures: 0,
                ohhi_sizes: None,
                corrupt: None,
                handshake_done: false,
                requests: 0,
                responses: 0,
                max_outstanding: 0,
                log: Vec::new(),
                recv_modes: Vec::new(),
            }
        }
    }

    impl Transport for SimPeer {
        fn send_msg(&mut self, buf: &[u8], _mode: IoMode) -> io::Result<usize> {
            let header = Header::decode(buf).expect("client sent a bad header");
            match header.message {
                Message::Helo(sizes) => {
                    if self.helo_failures > 0 {
                        self.helo_failures -= 1;
                        return Err(io::Error::from(io::ErrorKind::ConnectionRefused));
                    }
                    self.sizes = sizes;
                    let echoed = self.ohhi_sizes.unwrap_or(sizes);
                    self.ready.push_back(Header::ohhi(0, echoed).encode().to_vec());
                }
                Message::Ping { dlen } => {
                    if self.ready.len() + self.pending.len() >= self.send_capacity {
                        return Err(io::Error::from(io::ErrorKind::WouldBlock));
                    }
                    assert_eq!(buf.len(), self.sizes.request_len());
                    assert_eq!(dlen, self.sizes.req_size);

                    self.requests += 1;
                    self.max_outstanding = self.max_outstanding.max(self.requests - self.responses);
                    self.log.push(Op::Send(header.rrid));

                    let mut res = vec![0u8; self.sizes.response_len()];
                    Header::pong(header.rrid, self.sizes.res_size).encode_into(&mut res);
                    if let Some(corrupt) = self.corrupt {
                        corrupt(&mut res);
                    }
                    if self.lazy {
                        self.pending.push_back(res);
                    } else {
                        self.ready.push_back(res);
                    }
                }
                other => panic!("unexpected client message {other:?}"),
            }
            Ok(buf.len())
        }

        fn recv_msg(&mut self, buf: &mut [u8], mode: IoMode) -> io::Result<usize> {
            if self.handshake_done {
                self.recv_modes.push(mode);
            }
            if self.ready.is_empty() {
                match (mode, self.pending.pop_front()) {
                    (IoMode::NonBlocking, Some(msg)) => {
                        self.pending.push_front(msg);
                        return Err(io::Error::from(io::ErrorKind::WouldBlock));
                    }
                    (IoMode::NonBlocking, None) => {
                        return Err(io::Error::from(io::ErrorKind::WouldBlock))
                    }
                    (IoMode::Blocking, Some(msg)) => self.ready.push_back(msg),
                    (IoMode::Blocking, None) => {
                        return Err(io::Error::new(io::ErrorKind::Other, "blocking recv would hang"))
                    }
                }
            }

            let msg = self.ready.pop_front().unwrap();
            let n = msg.len().min(buf.len());
            buf[..n].copy_from_slice(&msg[..n]);

            if self.handshake_done {
                self.responses += 1;
                if msg.len() >= 8 {
                    let rrid = u32::from_ne_bytes(msg[4..8].try_into().unwrap());
                    self.log.push(Op::Recv(rrid));
                }
            }
            self.handshake_done = true;
            Ok(n)
        }
    }

    fn workload(burst: u32, nmessages: u32, req_size: u16, res_size: u16) -> Workload {
        Workload {
            burst,
            nmessages,
            sizes: Sizes::new(req_size, res_size),
            handshake_attempts: 3,
        }
    }

    fn run_sim(peer: &mut SimPeer, workload: Workload) -> Result<RunSummary> {
        Client::new(peer, MonotonicClock::new(), workload).run()
    }

    #[test]
    fn test_burst_one_alternates() {
        let mut peer = SimPeer::new();
        let summary = run_sim(&mut peer, workload(1, 4, 8, 8)).unwrap();

        assert_eq!(summary.sent, 4);
        assert_eq!(summary.received, 4);
        assert_eq!(summary.max_in_flight, 1);
        assert_eq!(
            peer.log,
            vec![
                Op::Send(0),
                Op::Recv(0),
                Op::Send(1),
                Op::Recv(1),
                Op::Send(2),
                Op::Recv(2),
                Op::Send(3),
                Op::Recv(3),
            ]
        );
    }

    #[test]
    fn test_window_bounded_by_burst() {
        let mut peer = SimPeer::new();
        peer.lazy = true;
        let summary = run_sim(&mut peer, workload(4, 100, 0, 16)).unwrap();

        assert_eq!(summary.sent, 100);
        assert_eq!(summary.received, 100);
        assert_eq!(summary.max_in_flight, 4);
        assert_eq!(peer.max_outstanding, 4);
        assert_eq!(summary.samples.completed(), 100);
    }

    #[test]
    fn test_drain_returns_to_fill_after_one_blocking_recv() {
        use IoMode::{Blocking, NonBlocking};
        use Op::{Recv, Send};

        let mut peer = SimPeer::new();
        peer.lazy = true;
        let summary = run_sim(&mut peer, workload(4, 8, 0, 0)).unwrap();
        assert_eq!(summary.received, 8);

        assert_eq!(
            peer.log,
            vec![
                Send(0),
                Send(1),
                Send(2),
                Send(3),
                Recv(0),
                Send(4),
                Recv(1),
                Send(5),
                Recv(2),
                Send(6),
                Recv(3),
                Send(7),
                Recv(4),
                Recv(5),
                Recv(6),
                Recv(7),
            ]
        );

        // While requests remain, each drain blocks once and then polls. Once
        // everything is sent, every remaining response is awaited.
        assert_eq!(
            peer.recv_modes,
            vec![
                Blocking,
                NonBlocking,
                Blocking,
                NonBlocking,
                Blocking,
                NonBlocking,
                Blocking,
                NonBlocking,
                Blocking,
                Blocking,
                Blocking,
                Blocking,
            ]
        );
    }

    #[test]
    fn test_summarize_requires_every_sample() {
        let mut samples = LatencySamples::new(3);
        samples.record_send(0, 10);
        samples.record_send(1, 20);
        samples.record_response(0, 15).unwrap();
        assert!(matches!(
            summarize(samples, 3),
            Err(Error::Incomplete {
                expected: 3,
                completed: 1
            })
        ));

        assert!(matches!(
            summarize(LatencySamples::new(0), 0),
            Err(Error::Incomplete { completed: 0, .. })
        ));

        let mut samples = LatencySamples::new(2);
        samples.record_send(0, 10);
        samples.record_send(1, 20);
        samples.record_response(1, 26).unwrap();
        samples.record_response(0, 14).unwrap();
        let stats = summarize(samples, 2).unwrap();
        assert_eq!((stats.min, stats.max, stats.median), (4, 6, 5));
    }

    #[test]
    fn test_send_would_block_ends_fill() {
        let mut peer = SimPeer::new();
        peer.send_capacity = 3;
        let summary = run_sim(&mut peer, workload(8, 50, 4, 4)).unwrap();

        assert_eq!(summary.received, 50);
        assert!(summary.max_in_flight <= 3);
        assert!(peer.max_outstanding <= 3);
    }

    #[test]
    fn test_burst_larger_than_nmessages() {
        let mut peer = SimPeer::new();
        let summary = run_sim(&mut peer, workload(16, 5, 0, 0)).unwrap();
        assert_eq!(summary.sent, 5);
        assert_eq!(summary.max_in_flight, 5);
    }

    #[test]
    fn test_single_message() {
        let mut peer = SimPeer::new();
        let mut client = Client::new(&mut peer, MonotonicClock::new(), workload(1, 1, 0, 0));
        assert_eq!(client.state(), ClientState::Init);
        let summary = client.run().unwrap();
        assert_eq!(client.state(), ClientState::Done);

        assert_eq!(summary.samples.into_elapsed().len(), 1);
    }

    #[test]
    fn test_helo_retries() {
        let mut peer = SimPeer::new();
        peer.helo_failures = 2;
        assert!(run_sim(&mut peer, workload(1, 1, 0, 0)).is_ok());

        let mut peer = SimPeer::new();
        peer.helo_failures = 3;
        let err = run_sim(&mut peer, workload(1, 1, 0, 0)).unwrap_err();
        assert!(matches!(err, Error::Io { op: "send helo", .. }));
    }

    #[test]
    fn test_ohhi_size_mismatch() {
        let mut peer = SimPeer::new();
        peer.ohhi_sizes = Some(Sizes::new(1, 1));
        let err = run_sim(&mut peer, workload(1, 1, 2, 2)).unwrap_err();
        assert!(matches!(
            err.as_protocol(),
            Some(ProtocolError::SizeMismatch { .. })
        ));
    }

    fn run_corrupted(corrupt: fn(&mut Vec<u8>)) -> Error {
        let mut peer = SimPeer::new();
        peer.corrupt = Some(corrupt);
        run_sim(&mut peer, workload(2, 10, 0, 4)).unwrap_err()
    }

    #[test]
    fn test_rejects_bad_responses() {
        let err = run_corrupted(|res| res[0] ^= 0x01);
        assert!(matches!(err.as_protocol(), Some(ProtocolError::BadMagic(_))));

        let err = run_corrupted(|res| res[8] = MessageType::Ping as u8);
        assert!(matches!(
            err.as_protocol(),
            Some(ProtocolError::UnexpectedType {
                got: MessageType::Ping,
                ..
            })
        ));

        let err = run_corrupted(|res| res[9..11].copy_from_slice(&3u16.to_ne_bytes()));
        assert_eq!(
            err.as_protocol(),
            Some(&ProtocolError::LengthMismatch {
                got: 3,
                expected: 4
            })
        );

        let err = run_corrupted(|res| res[4..8].copy_from_slice(&999u32.to_ne_bytes()));
        assert_eq!(err.as_protocol(), Some(&ProtocolError::UnknownRequest(999)));

        let err = run_corrupted(|res| res.truncate(HEADER_SIZE));
        assert!(matches!(
            err.as_protocol(),
            Some(ProtocolError::ShortMessage { got: HEADER_SIZE, .. })
        ));
    }

    #[test]
    fn test_checksum_mismatch() {
        let window = Window {
            checksum_sent: 10,
            checksum_received: 9,
            ..Window::default()
        };
        assert!(matches!(
            window.verify(),
            Err(Error::Integrity {
                sent: 10,
                received: 9
            })
        ));
    }

    #[test]
    fn test_checksums_match_after_run() {
        let mut window = Window::default();
        for rrid in 0..10 {
            window.on_sent(rrid);
        }
        for rrid in (0..10).rev() {
            window.on_received(rrid);
        }
        assert_eq!(window.checksum_sent, 45);
        assert!(window.verify().is_ok());
        assert_eq!(window.in_flight, 0);
    }

    #[test]
    fn test_against_session_over_socket_pair() {
        let (client_sock, server_sock) = Socket::pair(Domain::UNIX, Type::STREAM, None).unwrap();
        let server = thread::spawn(move || Session::new(server_sock).run());

        let mut client = Client::new(client_sock, MonotonicClock::new(), workload(4, 1000, 64, 128));
        let summary = client.run().unwrap();
        drop(client);

        let served = server.join().unwrap().unwrap();
        assert_eq!(served.served, 1000);
        assert_eq!(served.sizes, Sizes::new(64, 128));

        assert_eq!(summary.received, 1000);
        assert!(summary.max_in_flight <= 4);

        let mut elapsed = summary.samples.into_elapsed();
        let stats = LatencyStats::compute(&mut elapsed).unwrap();
        assert!(stats.min <= stats.median && stats.median <= stats.max);
        assert!(stats.min <= stats.avg && stats.avg <= stats.max);
    }

    fn client_config(server: Url, burst: u32, nmessages: u32, sizes: Sizes) -> ClientConfig {
        ClientConfig {
            server,
            burst,
            nmessages,
            sizes,
            connect_attempts: 3,
            handshake_attempts: 3,
            clock: ClockKind::Monotonic,
            format: ReportFormat::Text,
        }
    }

    #[test]
    fn test_tcp_loopback_end_to_end() {
        let mut server = Server::bind(ServerConfig {
            listen: "tcp://127.0.0.1:0".parse().unwrap(),
            keep_going: false,
        })
        .unwrap();
        let port = server.local_addr().port();
        let handle = thread::spawn(move || server.serve_one());

        let target: Url = format!("tcp://127.0.0.1:{port}").parse().unwrap();
        let report = run(&client_config(target, 4, 1000, Sizes::new(64, 128))).unwrap();

        let summary = handle.join().unwrap().unwrap();
        assert_eq!(summary.served, 1000);
        assert!(report.min.ticks <= report.median.ticks);
        assert!(report.median.ticks <= report.max.ticks);
        assert!(report.min.ticks <= report.avg.ticks && report.avg.ticks <= report.max.ticks);
        assert_eq!(report.params.nmessages, 1000);
    }

    #[test]
    fn test_udp_loopback_end_to_end() {
        let mut server = Server::bind(ServerConfig {
            listen: "udp://127.0.0.1:0".parse().unwrap(),
            keep_going: false,
        })
        .unwrap();
        let port = server.local_addr().port();
        let handle = thread::spawn(move || server.serve_one());

        let target: Url = format!("udp://127.0.0.1:{port}").parse().unwrap();
        let report = run(&client_config(target, 2, 200, Sizes::new(32, 32))).unwrap();

        let summary = handle.join().unwrap().unwrap();
        assert_eq!(summary.served, 200);
        assert_eq!(summary.sizes, Sizes::new(32, 32));
        assert!(report.max_in_flight <= 2);
    }

    #[test]
    fn test_connect_gives_up() {
        // Bind then drop to get a port with nobody listening.
        let port = {
            let url: Url = "tcp://127.0.0.1:0".parse().unwrap();
            let socket = url.bind().unwrap();
            socket.local_addr().unwrap().as_socket().unwrap().port()
        };
        let target: Url = format!("tcp://127.0.0.1:{port}").parse().unwrap();
        let err = connect(&target, 2).unwrap_err();
        assert!(matches!(err, Error::Address(_)));
    }
}
