//! The engine-facing protocol object
//!
//! [`EngineProtocol`] binds one non-blocking UDP socket, keeps one state
//! record per configured peer and is driven by the engine loop: `send` once
//! per outgoing message, `receive` (or `poll_message`) until it reports
//! nothing, once per tick.

use crate::config::ProtocolConfig;
use crate::error::ProtocolError;
use crate::registry::{self, EndpointId, EndpointRegistry};
use bytes::{BufMut, Bytes, BytesMut};
use sep_io::{Clock, DatagramSocket, SystemClock};
use sep_protocol::packet::{check_payload_len, PacketHeader, HEADER_SIZE};
use sep_protocol::{EndpointState, EndpointStats, FloodConfig, ReceiveReport, SeqNumber};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// A validated message taken off the socket
#[derive(Debug, Clone)]
pub struct Message {
    /// Endpoint the message came from
    pub endpoint: EndpointId,
    /// Sender address
    pub from: SocketAddr,
    /// Sender's sequence number
    pub seq: SeqNumber,
    /// Opaque application payload
    pub payload: Bytes,
    /// State updates the message caused
    pub report: ReceiveReport,
}

struct Transport {
    socket: DatagramSocket,
    max_datagram: usize,
    recv_buf: Vec<u8>,
    send_buf: BytesMut,
}

impl Transport {
    fn new(socket: DatagramSocket, max_payload_size: usize) -> Self {
        let max_datagram = HEADER_SIZE + max_payload_size;
        Transport {
            socket,
            max_datagram,
            // One spare byte so an oversized datagram shows up as too long
            // instead of being silently truncated to fit.
            recv_buf: vec![0u8; max_datagram + 1],
            send_buf: BytesMut::with_capacity(max_datagram),
        }
    }
}

/// Connectionless, best-effort-reliable messaging over UDP
///
/// Not thread-safe by design: every operation takes `&mut self` and is meant
/// to be called from the thread that runs the engine loop.
pub struct EngineProtocol<C: Clock = SystemClock> {
    config: ProtocolConfig,
    flood: FloodConfig,
    clock: C,
    transport: Option<Transport>,
    registry: EndpointRegistry,
    dropped_datagrams: u64,
}

impl EngineProtocol<SystemClock> {
    /// Create an uninitialized protocol using the system clock
    pub fn new(config: ProtocolConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> EngineProtocol<C> {
    /// Create an uninitialized protocol reading time from `clock`
    pub fn with_clock(config: ProtocolConfig, clock: C) -> Self {
        let flood = config.flood_config();
        EngineProtocol {
            config,
            flood,
            clock,
            transport: None,
            registry: EndpointRegistry::new(),
            dropped_datagrams: 0,
        }
    }

    /// Bind the socket and register every configured host
    pub fn init(&mut self) -> Result<(), ProtocolError> {
        if self.transport.is_some() {
            return Err(ProtocolError::AlreadyInitialized);
        }
        self.config.validate()?;

        let bind_addr = self.config.bind_addr();
        let socket = DatagramSocket::bind(bind_addr)?;
        if let Some(size) = self.config.socket_buffer_size {
            socket.set_send_buffer_size(size)?;
            socket.set_recv_buffer_size(size)?;
        }
        let local_addr = socket.local_addr()?;

        let now = self.clock.now().as_instant();
        let mut registry = EndpointRegistry::new();
        for host in &self.config.hosts {
            let addr = registry::resolve(host, self.config.remote_port, bind_addr.is_ipv4())?;
            let id = registry.register(host, addr, &self.flood, now);
            tracing::info!(%host, %addr, endpoint = %id, "Registered endpoint");
        }
        if registry.is_empty() {
            tracing::warn!("No remote hosts configured, every datagram will be dropped");
        }

        self.registry = registry;
        self.transport = Some(Transport::new(socket, self.config.max_payload_size));
        tracing::info!(%local_addr, endpoints = self.registry.len(), "Protocol initialized");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.transport.is_some()
    }

    /// Address the socket is bound to
    pub fn local_addr(&self) -> Result<SocketAddr, ProtocolError> {
        let transport = self.transport.as_ref().ok_or(ProtocolError::NotInitialized)?;
        Ok(transport.socket.local_addr()?)
    }

    /// Send `payload` to every registered endpoint
    ///
    /// Each endpoint gets its own datagram and sequence number. A failed send
    /// does not stop the others; the first failure is returned after all
    /// endpoints were tried. Returns the number of successful sends.
    pub fn send(&mut self, payload: &[u8]) -> Result<usize, ProtocolError> {
        let transport = self.transport.as_mut().ok_or(ProtocolError::NotInitialized)?;
        check_payload_len(payload.len(), self.config.max_payload_size)?;

        let mut sent = 0;
        let mut first_error = None;
        for (id, endpoint) in self.registry.iter_mut() {
            let header = endpoint.next_header();

            transport.send_buf.clear();
            header.to_bytes(&mut transport.send_buf);
            transport.send_buf.put_slice(payload);

            match transport.socket.send_to(&transport.send_buf, endpoint.addr()) {
                Ok(_) => {
                    let now = self.clock.now().as_instant();
                    endpoint.on_sent(header.seq, payload.len(), now);
                    sent += 1;
                    tracing::trace!(endpoint = %id, seq = %header.seq, len = payload.len(), "Sent message");
                }
                Err(e) => {
                    tracing::warn!(endpoint = %id, addr = %endpoint.addr(), seq = %header.seq, error = %e, "Send failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(sent),
        }
    }

    /// Take the next valid message off the socket, if any
    ///
    /// Invalid datagrams (foreign protocol, unknown sender, too short or too
    /// long) are discarded without touching endpoint state. Never blocks.
    pub fn poll_message(&mut self) -> Result<Option<Message>, ProtocolError> {
        self.next_message(usize::MAX)
    }

    /// Copy the next valid payload into `buf` and return its length
    ///
    /// Returns 0 when no valid datagram is queued. At most one message is
    /// consumed per call.
    pub fn receive(&mut self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
        match self.next_message(buf.len())? {
            Some(message) => {
                let len = message.payload.len();
                buf[..len].copy_from_slice(&message.payload);
                Ok(len)
            }
            None => Ok(0),
        }
    }

    fn next_message(&mut self, capacity: usize) -> Result<Option<Message>, ProtocolError> {
        let transport = self.transport.as_mut().ok_or(ProtocolError::NotInitialized)?;

        loop {
            let (len, from) = match transport.socket.try_recv_from(&mut transport.recv_buf)? {
                Some(received) => received,
                None => return Ok(None),
            };
            if len > transport.max_datagram {
                self.dropped_datagrams += 1;
                tracing::debug!(%from, len, max = transport.max_datagram, "Dropped oversized datagram");
                continue;
            }
            let datagram = &transport.recv_buf[..len];

            let header = match PacketHeader::from_bytes(datagram) {
                Ok(header) => header,
                Err(e) => {
                    self.dropped_datagrams += 1;
                    tracing::debug!(%from, len, error = %e, "Dropped invalid datagram");
                    continue;
                }
            };

            let id = match self.registry.lookup_addr(from) {
                Some(id) => id,
                None => {
                    self.dropped_datagrams += 1;
                    tracing::debug!(%from, "Dropped datagram from unknown endpoint");
                    continue;
                }
            };

            let payload = &datagram[HEADER_SIZE..];
            if payload.len() > capacity {
                return Err(ProtocolError::BufferTooSmall {
                    needed: payload.len(),
                    available: capacity,
                });
            }
            let payload = Bytes::copy_from_slice(payload);

            let now = self.clock.now().as_instant();
            let endpoint = self
                .registry
                .get_mut(id)
                .ok_or(ProtocolError::NotInitialized)?;
            let report = endpoint.on_receive(&header, payload.len(), now, &self.flood);
            tracing::trace!(endpoint = %id, seq = %header.seq, ack = %header.ack, len = payload.len(), "Received message");

            return Ok(Some(Message {
                endpoint: id,
                from,
                seq: header.seq,
                payload,
                report,
            }));
        }
    }

    /// Whether `host` sent a valid message within the disconnection timeout
    pub fn is_connected_to(&self, host: &str) -> bool {
        let now = self.clock.now().as_instant();
        let timeout = self.config.disconnection_timeout();
        self.registry
            .by_host(host)
            .map_or(false, |endpoint| endpoint.is_connected(now, timeout))
    }

    /// Whether the connection to `host` is in flood mode
    pub fn is_connection_flooded(&self, host: &str) -> bool {
        self.registry
            .by_host(host)
            .map_or(false, EndpointState::is_flooded)
    }

    /// Whether message `seq` from `host` is known to have been received
    pub fn received_message(&self, host: &str, seq: impl Into<SeqNumber>) -> bool {
        let seq = seq.into();
        self.registry
            .by_host(host)
            .map_or(false, |endpoint| endpoint.received(seq))
    }

    /// Whether `host` acknowledged our message `seq`
    pub fn acknowledged_message(&self, host: &str, seq: impl Into<SeqNumber>) -> bool {
        let seq = seq.into();
        self.registry
            .by_host(host)
            .map_or(false, |endpoint| endpoint.acknowledged(seq))
    }

    /// Smoothed round-trip time to `host`
    pub fn round_trip_time(&self, host: &str) -> Option<Duration> {
        self.registry.by_host(host).map(|endpoint| endpoint.flood().rtt())
    }

    /// Statistics for `host`
    pub fn stats(&self, host: &str) -> Option<EndpointStats> {
        self.registry.by_host(host).map(EndpointState::stats)
    }

    /// Statistics for every endpoint
    pub fn all_stats(&self) -> Vec<EndpointStats> {
        self.registry.iter().map(|(_, endpoint)| endpoint.stats()).collect()
    }

    /// State record registered under `host`
    pub fn endpoint(&self, host: &str) -> Option<&EndpointState> {
        self.registry.by_host(host)
    }

    /// Host name of an endpoint
    pub fn host(&self, id: EndpointId) -> Option<&str> {
        self.registry.get(id).map(EndpointState::host)
    }

    /// Datagrams dropped as invalid or from unknown senders
    pub fn dropped_datagrams(&self) -> u64 {
        self.dropped_datagrams
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn local_port(&self) -> u16 {
        self.config.local_port
    }

    pub fn set_local_port(&mut self, port: u16) -> Result<(), ProtocolError> {
        self.ensure_uninitialized()?;
        self.config.local_port = port;
        Ok(())
    }

    pub fn remote_port(&self) -> u16 {
        self.config.remote_port
    }

    pub fn set_remote_port(&mut self, port: u16) -> Result<(), ProtocolError> {
        self.ensure_uninitialized()?;
        self.config.remote_port = port;
        Ok(())
    }

    pub fn bind_address(&self) -> IpAddr {
        self.config.bind_address
    }

    pub fn set_bind_address(&mut self, address: IpAddr) -> Result<(), ProtocolError> {
        self.ensure_uninitialized()?;
        self.config.bind_address = address;
        Ok(())
    }

    pub fn hosts(&self) -> &[String] {
        &self.config.hosts
    }

    pub fn set_hosts(&mut self, hosts: Vec<String>) -> Result<(), ProtocolError> {
        self.ensure_uninitialized()?;
        self.config.hosts = hosts;
        Ok(())
    }

    pub fn add_host(&mut self, host: impl Into<String>) -> Result<(), ProtocolError> {
        self.ensure_uninitialized()?;
        self.config.hosts.push(host.into());
        Ok(())
    }

    pub fn max_payload_size(&self) -> usize {
        self.config.max_payload_size
    }

    pub fn set_max_payload_size(&mut self, size: usize) -> Result<(), ProtocolError> {
        self.ensure_uninitialized()?;
        self.config.max_payload_size = size;
        Ok(())
    }

    pub fn disconnection_timeout(&self) -> Duration {
        self.config.disconnection_timeout()
    }

    /// Must be a non-zero whole number of milliseconds
    pub fn set_disconnection_timeout(&mut self, timeout: Duration) -> Result<(), ProtocolError> {
        self.config.disconnection_timeout_ms = whole_millis("disconnection timeout", timeout)?;
        Ok(())
    }

    pub fn flood_threshold(&self) -> Duration {
        self.flood.threshold
    }

    /// Must be a non-zero whole number of milliseconds
    pub fn set_flood_threshold(&mut self, threshold: Duration) -> Result<(), ProtocolError> {
        let millis = whole_millis("flood threshold", threshold)?;
        self.config.flood_threshold_ms = millis;
        self.flood.threshold = Duration::from_millis(millis);
        Ok(())
    }

    pub fn supports_multiple_endpoints(&self) -> bool {
        self.config.multiple_endpoints
    }

    /// Only `false` is accepted; multiple endpoints are not supported
    pub fn set_multiple_endpoints(&mut self, enabled: bool) -> Result<(), ProtocolError> {
        if enabled {
            return Err(ProtocolError::Unsupported(
                "multiple endpoints are not supported".to_string(),
            ));
        }
        self.config.multiple_endpoints = false;
        Ok(())
    }

    fn ensure_uninitialized(&self) -> Result<(), ProtocolError> {
        if self.transport.is_some() {
            return Err(ProtocolError::AlreadyInitialized);
        }
        Ok(())
    }
}

/// Durations are stored as milliseconds; refuse anything that would round
fn whole_millis(name: &str, value: Duration) -> Result<u64, ProtocolError> {
    let millis = u64::try_from(value.as_millis()).ok().filter(|&millis| {
        millis > 0 && Duration::from_millis(millis) == value
    });
    millis.ok_or_else(|| {
        ProtocolError::InvalidConfig(format!(
            "{name} must be a non-zero whole number of milliseconds, got {value:?}"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sep_io::ManualClock;
    use std::net::{Ipv4Addr, UdpSocket};
    use std::thread;

    fn loopback_config(local_port: u16, remote_port: u16) -> ProtocolConfig {
        ProtocolConfig::for_host("127.0.0.1")
            .with_bind_address(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .with_local_port(local_port)
            .with_remote_port(remote_port)
    }

    fn free_port() -> u16 {
        UdpSocket::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    fn raw_datagram(protocol_id: u32, seq: u32, ack: u32, bits: u32, payload: &[u8]) -> Vec<u8> {
        let mut datagram = Vec::new();
        datagram.extend_from_slice(&protocol_id.to_le_bytes());
        datagram.extend_from_slice(&seq.to_le_bytes());
        datagram.extend_from_slice(&ack.to_le_bytes());
        datagram.extend_from_slice(&bits.to_le_bytes());
        datagram.extend_from_slice(payload);
        datagram
    }

    fn receive_within(protocol: &mut EngineProtocol<ManualClock>, buf: &mut [u8]) -> usize {
        for _ in 0..100 {
            let n = protocol.receive(buf).unwrap();
            if n > 0 {
                return n;
            }
            thread::sleep(Duration::from_millis(5));
        }
        0
    }

    #[test]
    fn test_operations_before_init() {
        let mut protocol = EngineProtocol::new(ProtocolConfig::default());

        assert!(!protocol.is_initialized());
        assert!(matches!(protocol.send(b"x"), Err(ProtocolError::NotInitialized)));
        assert!(matches!(
            protocol.receive(&mut [0u8; 16]),
            Err(ProtocolError::NotInitialized)
        ));
        assert!(!protocol.is_connected_to("127.0.0.1"));
        assert!(!protocol.is_connection_flooded("127.0.0.1"));
    }

    #[test]
    fn test_init_rejects_multiple_hosts() {
        let mut config = loopback_config(0, 10222);
        config.hosts.push("127.0.0.2".to_string());
        let mut protocol = EngineProtocol::new(config);

        assert!(matches!(protocol.init(), Err(ProtocolError::Unsupported(_))));
        assert!(!protocol.is_initialized());
    }

    #[test]
    fn test_multiple_endpoint_setter() {
        let mut protocol = EngineProtocol::new(ProtocolConfig::default());

        assert!(matches!(
            protocol.set_multiple_endpoints(true),
            Err(ProtocolError::Unsupported(_))
        ));
        assert!(protocol.set_multiple_endpoints(false).is_ok());
        assert!(!protocol.supports_multiple_endpoints());
    }

    #[test]
    fn test_socket_buffer_size_applied() {
        let mut config = loopback_config(0, 10222);
        config.socket_buffer_size = Some(256 * 1024);
        let mut protocol = EngineProtocol::new(config);

        assert!(protocol.init().is_ok());
        assert!(protocol.is_initialized());
    }

    #[test]
    fn test_init_twice() {
        let mut protocol = EngineProtocol::new(loopback_config(0, 10222));
        protocol.init().unwrap();

        assert!(matches!(protocol.init(), Err(ProtocolError::AlreadyInitialized)));
        assert!(matches!(
            protocol.set_local_port(1),
            Err(ProtocolError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_setters_before_init() {
        let mut protocol = EngineProtocol::new(ProtocolConfig::default());

        protocol.set_local_port(4000).unwrap();
        protocol.set_remote_port(4001).unwrap();
        protocol.set_hosts(vec!["example".to_string()]).unwrap();
        protocol.set_max_payload_size(512).unwrap();
        protocol.set_disconnection_timeout(Duration::from_secs(3)).unwrap();
        protocol.set_flood_threshold(Duration::from_millis(100)).unwrap();

        assert_eq!(protocol.local_port(), 4000);
        assert_eq!(protocol.remote_port(), 4001);
        assert_eq!(protocol.hosts(), &["example".to_string()]);
        assert_eq!(protocol.max_payload_size(), 512);
        assert_eq!(protocol.disconnection_timeout(), Duration::from_secs(3));
        assert_eq!(protocol.flood_threshold(), Duration::from_millis(100));
    }

    #[test]
    fn test_payload_limit_enforced() {
        let mut config = loopback_config(0, free_port());
        config.max_payload_size = 8;
        let mut protocol = EngineProtocol::new(config);
        protocol.init().unwrap();

        assert!(matches!(
            protocol.send(&[0u8; 9]),
            Err(ProtocolError::Packet(_))
        ));
        assert_eq!(protocol.endpoint("127.0.0.1").unwrap().local_seq(), SeqNumber::FIRST);
    }

    #[test]
    fn test_send_advances_sequence() {
        let mut protocol = EngineProtocol::new(loopback_config(0, free_port()));
        protocol.init().unwrap();

        for _ in 0..5 {
            assert_eq!(protocol.send(b"tick").unwrap(), 1);
        }
        let stats = protocol.stats("127.0.0.1").unwrap();
        assert_eq!(stats.local_seq, SeqNumber::new(6));
        assert_eq!(stats.messages_sent, 5);
    }

    #[test]
    fn test_round_trip_between_two_instances() {
        let clock = ManualClock::new();
        let port_a = free_port();
        let port_b = free_port();
        let mut a = EngineProtocol::with_clock(loopback_config(port_a, port_b), clock.clone());
        let mut b = EngineProtocol::with_clock(loopback_config(port_b, port_a), clock.clone());
        a.init().unwrap();
        b.init().unwrap();

        a.send(b"ping").unwrap();
        let mut buf = [0u8; 64];
        assert_eq!(receive_within(&mut b, &mut buf), 4);
        assert_eq!(&buf[..4], b"ping");
        assert!(b.received_message("127.0.0.1", 1u32));

        clock.advance(Duration::from_millis(10));
        b.send(b"pong").unwrap();
        assert_eq!(receive_within(&mut a, &mut buf), 4);
        assert_eq!(&buf[..4], b"pong");

        assert_eq!(a.round_trip_time("127.0.0.1"), Some(Duration::from_millis(10)));
        assert!(a.acknowledged_message("127.0.0.1", 1u32));
        assert!(a.is_connected_to("127.0.0.1"));
        assert!(!a.is_connection_flooded("127.0.0.1"));
    }

    #[test]
    fn test_foreign_datagrams_are_dropped() {
        let clock = ManualClock::new();
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        let peer_port = peer.local_addr().unwrap().port();
        let mut protocol =
            EngineProtocol::with_clock(loopback_config(0, peer_port), clock.clone());
        protocol.init().unwrap();
        let target = protocol.local_addr().unwrap();

        let before = protocol.stats("127.0.0.1").unwrap();

        peer.send_to(&raw_datagram(0xDEAD_BEEF, 1, 0, 0, b"junk"), target)
            .unwrap();
        peer.send_to(&[1, 2, 3], target).unwrap();
        let stranger = UdpSocket::bind("127.0.0.1:0").unwrap();
        stranger
            .send_to(&raw_datagram(PacketHeader::PROTOCOL_ID, 1, 0, 0, b"hi"), target)
            .unwrap();

        thread::sleep(Duration::from_millis(50));
        clock.advance(Duration::from_secs(1));
        let mut buf = [0u8; 64];
        assert_eq!(protocol.receive(&mut buf).unwrap(), 0);
        assert_eq!(protocol.dropped_datagrams(), 3);

        let after = protocol.stats("127.0.0.1").unwrap();
        assert_eq!(after.remote_seq, before.remote_seq);
        assert_eq!(after.messages_received, 0);
        assert_eq!(
            protocol.endpoint("127.0.0.1").unwrap().last_receipt(),
            clock.now().as_instant() - Duration::from_secs(1)
        );
    }

    #[test]
    fn test_valid_datagram_after_invalid_ones() {
        let clock = ManualClock::new();
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        let peer_port = peer.local_addr().unwrap().port();
        let mut protocol = EngineProtocol::with_clock(loopback_config(0, peer_port), clock);
        protocol.init().unwrap();
        let target = protocol.local_addr().unwrap();

        peer.send_to(&raw_datagram(0, 1, 0, 0, b"bad"), target).unwrap();
        peer.send_to(&raw_datagram(PacketHeader::PROTOCOL_ID, 7, 0, 0, b"good"), target)
            .unwrap();
        thread::sleep(Duration::from_millis(50));

        let message = protocol.poll_message().unwrap().unwrap();
        assert_eq!(message.seq, SeqNumber::new(7));
        assert_eq!(&message.payload[..], b"good");
        assert_eq!(protocol.host(message.endpoint), Some("127.0.0.1"));
        assert_eq!(protocol.dropped_datagrams(), 1);
    }

    #[test]
    fn test_buffer_too_small() {
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        let peer_port = peer.local_addr().unwrap().port();
        let mut protocol = EngineProtocol::new(loopback_config(0, peer_port));
        protocol.init().unwrap();
        let target = protocol.local_addr().unwrap();

        peer.send_to(&raw_datagram(PacketHeader::PROTOCOL_ID, 1, 0, 0, b"0123456789"), target)
            .unwrap();
        thread::sleep(Duration::from_millis(50));

        let mut small = [0u8; 4];
        assert!(matches!(
            protocol.receive(&mut small),
            Err(ProtocolError::BufferTooSmall { needed: 10, available: 4 })
        ));
        assert_eq!(protocol.stats("127.0.0.1").unwrap().messages_received, 0);
    }

    #[test]
    fn test_sub_millisecond_durations_rejected() {
        let mut protocol = EngineProtocol::new(ProtocolConfig::default());

        assert!(matches!(
            protocol.set_disconnection_timeout(Duration::from_micros(500)),
            Err(ProtocolError::InvalidConfig(_))
        ));
        assert!(matches!(
            protocol.set_flood_threshold(Duration::from_micros(1_500)),
            Err(ProtocolError::InvalidConfig(_))
        ));
        assert!(protocol.set_disconnection_timeout(Duration::ZERO).is_err());

        // Rejected values leave the previous settings in place.
        assert_eq!(protocol.disconnection_timeout(), Duration::from_secs(10));
        assert_eq!(protocol.flood_threshold(), Duration::from_millis(250));
        assert_eq!(protocol.config().flood_threshold(), protocol.flood_threshold());
    }

    #[test]
    fn test_oversized_datagram_dropped() {
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        let peer_port = peer.local_addr().unwrap().port();
        let mut config = loopback_config(0, peer_port);
        config.max_payload_size = 8;
        let mut protocol = EngineProtocol::new(config);
        protocol.init().unwrap();
        let target = protocol.local_addr().unwrap();

        let oversized = [b'x'; 20];
        peer.send_to(&raw_datagram(PacketHeader::PROTOCOL_ID, 1, 0, 0, &oversized), target)
            .unwrap();
        thread::sleep(Duration::from_millis(50));

        let mut buf = [0u8; 64];
        assert_eq!(protocol.receive(&mut buf).unwrap(), 0);
        assert!(!protocol.received_message("127.0.0.1", 1u32));
        assert_eq!(protocol.dropped_datagrams(), 1);
        assert_eq!(protocol.stats("127.0.0.1").unwrap().messages_received, 0);

        // A datagram of exactly the maximum size still goes through.
        peer.send_to(&raw_datagram(PacketHeader::PROTOCOL_ID, 2, 0, 0, b"01234567"), target)
            .unwrap();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(protocol.receive(&mut buf).unwrap(), 8);
        assert_eq!(&buf[..8], b"01234567");
        assert!(protocol.received_message("127.0.0.1", 2u32));
    }

    #[test]
    fn test_failed_send_is_not_recorded() {
        // Broadcast without SO_BROADCAST is refused by the kernel.
        let config = ProtocolConfig::for_host("255.255.255.255")
            .with_bind_address(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
            .with_local_port(0)
            .with_remote_port(10222);
        let mut protocol = EngineProtocol::new(config);
        protocol.init().unwrap();

        assert!(matches!(protocol.send(b"x"), Err(ProtocolError::Socket(_))));

        let stats = protocol.stats("255.255.255.255").unwrap();
        assert_eq!(stats.local_seq, SeqNumber::new(2));
        assert_eq!(stats.messages_sent, 0);
        assert_eq!(stats.bytes_sent, 0);
        assert!(!protocol.acknowledged_message("255.255.255.255", 1u32));
    }
}
