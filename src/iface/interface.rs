//! Connection driver over a link-layer transport
//!
//! This module sequences one TCP conversation by hand:
//! - wrapping TCB-labelled segments in IPv4 and sending them to the peer
//! - filtering received frames by address, protocol and port
//! - SYN / SYN-ACK / ACK, one data segment, FIN / FIN-ACK / ACK

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::iface::address::MacAddr;
use crate::iface::transport::{LinkTransport, Wait};
use crate::network::ipv4::{protocol, IpPacket, Ipv4Header, MAX_BODY_LEN};
use crate::transport::tcb::TransmissionControlBlock;
use crate::transport::tcp::{Endpoint, SegmentParams, TcpFlags, TcpSegment, TCP_HEADER_LEN};

/// Window advertised when none is configured
pub const DEFAULT_WINDOW: u16 = 64240;
/// Largest frame read from the transport
pub const DEFAULT_RECV_BUFFER: usize = 2048;

/// Tunables of a connection
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Window advertised in every segment
    pub window: u16,
    /// Bytes requested per transport receive
    pub recv_buffer: usize,
    /// Bound on each wait for a matching segment
    pub wait: Wait,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            window: DEFAULT_WINDOW,
            recv_buffer: DEFAULT_RECV_BUFFER,
            wait: Wait::forever(),
        }
    }
}

/// Which way a segment travelled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Sent,
    Received,
}

type SegmentHook = Box<dyn FnMut(Direction, &IpPacket, &TcpSegment)>;

/// One hand-driven TCP connection to a resolved peer
pub struct Connection<T: LinkTransport> {
    transport: T,
    interface: String,
    local: Endpoint,
    remote: Endpoint,
    remote_mac: MacAddr,
    tcb: TransmissionControlBlock,
    config: SessionConfig,
    on_segment: Option<SegmentHook>,
}

impl<T: LinkTransport> Connection<T> {
    /// `transport` must be bound to the IPv4 ethertype.
    pub fn new(
        transport: T,
        interface: impl Into<String>,
        local: Endpoint,
        remote: Endpoint,
        remote_mac: MacAddr,
    ) -> Self {
        Connection {
            transport,
            interface: interface.into(),
            local,
            remote,
            remote_mac,
            tcb: TransmissionControlBlock::new(),
            config: SessionConfig::default(),
            on_segment: None,
        }
    }

    pub fn with_tcb(mut self, tcb: TransmissionControlBlock) -> Self {
        self.tcb = tcb;
        self
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Call `hook` for every segment sent or accepted.
    pub fn on_segment(
        mut self,
        hook: impl FnMut(Direction, &IpPacket, &TcpSegment) + 'static,
    ) -> Self {
        self.on_segment = Some(Box::new(hook));
        self
    }

    pub fn tcb(&self) -> &TransmissionControlBlock {
        &self.tcb
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Label a segment through the TCB, wrap it in IPv4 and send it.
    ///
    /// A segment too large for one IPv4 packet fails with `Oversized` and
    /// leaves the TCB untouched.
    pub fn send_segment(&mut self, params: SegmentParams) -> Result<TcpSegment> {
        let len = TCP_HEADER_LEN + params.options.len() + params.body.len();
        if len > MAX_BODY_LEN {
            return Err(Error::Oversized {
                len,
                max: MAX_BODY_LEN,
            });
        }

        let segment = self.tcb.create_send_segment(self.local, self.remote, params);
        let packet = IpPacket::build(
            protocol::TCP,
            self.local.ip,
            self.remote.ip,
            segment.marshal(),
        )?;

        if let Some(hook) = self.on_segment.as_mut() {
            hook(Direction::Sent, &packet, &segment);
        }
        self.transport
            .send(&self.interface, self.remote_mac, &packet.marshal())?;
        debug!(
            seq = segment.seq(),
            ack = segment.ack_seq(),
            flags = ?segment.flags(),
            len = segment.body().len(),
            "segment sent"
        );

        Ok(segment)
    }

    /// Wait for the next segment of this connection and apply it to the TCB.
    ///
    /// Frames from other hosts, for other hosts, of other protocols or for
    /// other ports are dropped on the fixed header alone, so a foreign frame
    /// cut short by the receive buffer is dropped too. Malformed frames of
    /// this connection are errors.
    pub fn receive_segment(&mut self) -> Result<TcpSegment> {
        let deadline = self.config.wait.deadline();
        loop {
            let data = self.recv_before(deadline)?;
            let header = Ipv4Header::from_bytes(&data)?;

            if header.src_addr != self.remote.ip || header.dst_addr != self.local.ip {
                debug!(
                    src = %header.src_addr,
                    dst = %header.dst_addr,
                    "packet of other hosts dropped"
                );
                continue;
            }
            if header.protocol != protocol::TCP {
                debug!(protocol = header.protocol, "non-tcp packet dropped");
                continue;
            }

            let packet = IpPacket::parse(&data)?;
            let mut segment = TcpSegment::parse(packet.body())?;
            if segment.src_port() != self.remote.port || segment.dst_port() != self.local.port {
                debug!(
                    src_port = segment.src_port(),
                    dst_port = segment.dst_port(),
                    "segment of other ports dropped"
                );
                continue;
            }
            attach_payload(&mut segment, packet.body());

            if let Some(hook) = self.on_segment.as_mut() {
                hook(Direction::Received, &packet, &segment);
            }
            self.tcb.apply_receive_segment(&segment);
            debug!(
                seq = segment.seq(),
                ack = segment.ack_seq(),
                flags = ?segment.flags(),
                len = segment.body().len(),
                "segment received"
            );

            return Ok(segment);
        }
    }

    fn recv_before(&mut self, deadline: Option<Instant>) -> Result<Vec<u8>> {
        let total = self.config.wait.timeout;
        let wait = Wait {
            timeout: deadline.map(|deadline| deadline.saturating_duration_since(Instant::now())),
            cancel: self.config.wait.cancel.clone(),
        };
        self.transport
            .recv(self.config.recv_buffer, &wait)
            .map_err(|err| match err {
                Error::Timeout(_) => Error::Timeout(total.unwrap_or(Duration::ZERO)),
                err => err,
            })
    }

    /// Three-way handshake: SYN, wait for SYN-ACK, ACK.
    pub fn connect(&mut self) -> Result<()> {
        info!(local = %self.local, remote = %self.remote, "connecting");
        self.send_segment(SegmentParams::new(TcpFlags::SYN, self.config.window))?;

        let reply = self.receive_segment()?;
        if !(reply.is_syn() && reply.is_ack()) {
            warn!(flags = ?reply.flags(), "expected SYN-ACK");
        }

        self.send_segment(SegmentParams::new(TcpFlags::ACK, self.config.window))?;
        info!(iss = self.tcb.iss(), irs = self.tcb.irs(), "established");
        Ok(())
    }

    /// Push `body` in one segment and wait for its acknowledgement.
    pub fn send_data(&mut self, body: &[u8]) -> Result<()> {
        let params = SegmentParams::new(TcpFlags::ACK | TcpFlags::PSH, self.config.window)
            .with_body(body);
        self.send_segment(params)?;

        let reply = self.receive_segment()?;
        if !reply.is_ack() {
            warn!(flags = ?reply.flags(), "expected ACK");
        }
        info!(len = body.len(), "data acknowledged");
        Ok(())
    }

    /// Four-way close: FIN, wait for FIN-ACK, ACK.
    pub fn close(&mut self) -> Result<()> {
        let fin = SegmentParams::new(TcpFlags::FIN | TcpFlags::ACK, self.config.window);
        self.send_segment(fin)?;

        let reply = self.receive_segment()?;
        if !reply.is_fin() {
            warn!(flags = ?reply.flags(), "expected FIN");
        }

        self.send_segment(SegmentParams::new(TcpFlags::ACK, self.config.window))?;
        info!("closed");
        Ok(())
    }

    /// Handshake, one data segment, teardown.
    pub fn run(&mut self, message: &[u8]) -> Result<()> {
        self.connect()?;
        self.send_data(message)?;
        self.close()
    }
}

/// Slice options and body after the fixed header as the data offset says.
fn attach_payload(segment: &mut TcpSegment, bytes: &[u8]) {
    let offset = (segment.data_offset() as usize * 4)
        .clamp(TCP_HEADER_LEN, bytes.len().max(TCP_HEADER_LEN));
    let options = bytes.get(TCP_HEADER_LEN..offset).unwrap_or_default().to_vec();
    let body = bytes.get(offset..).unwrap_or_default().to_vec();
    segment.attach_payload(options, body);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::iface::address::IpAddr;
    use crate::iface::testing::ScriptedTransport;
    use crate::network::arp::ArpMessage;
    use crate::network::resolver::ArpResolver;

    const ISS: u32 = 1000;
    const PEER_ISS: u32 = 5000;

    fn local() -> Endpoint {
        Endpoint::new("172.17.0.2".parse().unwrap(), 40000)
    }

    fn remote() -> Endpoint {
        Endpoint::new("172.17.0.3".parse().unwrap(), 80)
    }

    fn peer_mac() -> MacAddr {
        "aa:bb:cc:dd:ee:02".parse().unwrap()
    }

    /// A frame the peer would send
    fn from_peer(seq: u32, ack: u32, flags: TcpFlags, body: &[u8]) -> Vec<u8> {
        frame(remote(), local(), seq, ack, flags, body)
    }

    fn frame(
        src: Endpoint,
        dst: Endpoint,
        seq: u32,
        ack: u32,
        flags: TcpFlags,
        body: &[u8],
    ) -> Vec<u8> {
        let params = SegmentParams::new(flags, 29200).with_body(body);
        let segment = TcpSegment::build(src, dst, seq, ack, params);
        IpPacket::build(protocol::TCP, src.ip, dst.ip, segment.marshal())
            .unwrap()
            .marshal()
    }

    fn connection(transport: ScriptedTransport) -> Connection<ScriptedTransport> {
        Connection::new(transport, "eth0", local(), remote(), peer_mac())
            .with_tcb(TransmissionControlBlock::with_iss(ISS))
    }

    fn sent_segments(transport: &ScriptedTransport) -> Vec<(Ipv4Header, TcpSegment)> {
        transport
            .sent
            .iter()
            .map(|(_, _, bytes)| {
                let packet = IpPacket::parse(bytes).unwrap();
                let segment = TcpSegment::parse(packet.body()).unwrap();
                (packet.header().clone(), segment)
            })
            .collect()
    }

    #[test]
    fn test_end_to_end_scenario() {
        let local_mac: MacAddr = "aa:bb:cc:dd:ee:01".parse().unwrap();

        // ARP first, on its own transport.
        let mut arp = ScriptedTransport::new();
        let request = ArpMessage::request(local_mac, local().ip, remote().ip);
        arp.push_reply(ArpMessage::reply_to(&request, peer_mac()).serialize().to_vec());
        let resolved = ArpResolver::new("eth0", local_mac, local().ip)
            .resolve(&mut arp, remote().ip, &Wait::forever())
            .unwrap();
        assert_eq!(resolved.to_string(), "aa:bb:cc:dd:ee:02");

        let transport = ScriptedTransport::new();
        let mut conn = Connection::new(transport, "eth0", local(), remote(), resolved)
            .with_tcb(TransmissionControlBlock::with_iss(ISS));
        let syn = conn
            .send_segment(SegmentParams::new(TcpFlags::SYN, DEFAULT_WINDOW))
            .unwrap();
        assert_eq!(syn.seq(), ISS);
        assert_eq!(syn.ack_seq(), 0);
        assert_eq!(syn.data_offset(), ((20 + 0 + 1) & 0x0F) as u8);

        let (interface, dst, bytes) = &conn.transport().sent[0];
        assert_eq!(interface, "eth0");
        assert_eq!(*dst, resolved);
        let packet = IpPacket::parse(bytes).unwrap();
        assert_eq!(packet.header().total_len, 40);
        assert_eq!(packet.header().protocol, protocol::TCP);
        assert_eq!(packet.body(), syn.marshal().as_slice());
        assert!(syn.verify_checksum(local().ip, remote().ip));
    }

    #[test]
    fn test_full_run() {
        let mut transport = ScriptedTransport::new();
        transport.push_reply(from_peer(PEER_ISS, ISS + 1, TcpFlags::SYN | TcpFlags::ACK, &[]));
        transport.push_reply(from_peer(PEER_ISS + 1, ISS + 10, TcpFlags::ACK, &[]));
        transport.push_reply(from_peer(PEER_ISS + 1, ISS + 11, TcpFlags::FIN | TcpFlags::ACK, &[]));

        let mut conn = connection(transport);
        conn.run(b"HELLO TCP").unwrap();

        let sent = sent_segments(conn.transport());
        let summary: Vec<(TcpFlags, u32, u32)> = sent
            .iter()
            .map(|(_, segment)| (segment.flags(), segment.seq(), segment.ack_seq()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (TcpFlags::SYN, ISS, 0),
                (TcpFlags::ACK, ISS + 1, PEER_ISS + 1),
                (TcpFlags::ACK | TcpFlags::PSH, ISS + 1, PEER_ISS + 1),
                (TcpFlags::FIN | TcpFlags::ACK, ISS + 10, PEER_ISS + 1),
                (TcpFlags::ACK, ISS + 11, PEER_ISS + 2),
            ]
        );
        assert_eq!(sent[2].0.total_len, 20 + 20 + 9);
        assert_eq!(conn.tcb().irs(), PEER_ISS);
    }

    #[test]
    fn test_receive_discards_foreign_frames() {
        let stranger = Endpoint::new("172.17.0.9".parse().unwrap(), 80);
        let mut transport = ScriptedTransport::new();
        // From another host.
        transport.push_reply(frame(stranger, local(), 1, 1, TcpFlags::ACK, &[]));
        // To another host.
        transport.push_reply(frame(remote(), stranger, 1, 1, TcpFlags::ACK, &[]));
        // Wrong ports.
        transport.push_reply(frame(
            Endpoint::new(remote().ip, 81),
            local(),
            1,
            1,
            TcpFlags::ACK,
            &[],
        ));
        transport.push_reply(frame(
            remote(),
            Endpoint::new(local().ip, 40001),
            1,
            1,
            TcpFlags::ACK,
            &[],
        ));
        // Not TCP.
        transport.push_reply(
            IpPacket::build(protocol::UDP, remote().ip, local().ip, vec![0u8; 8])
                .unwrap()
                .marshal(),
        );
        transport.push_reply(from_peer(PEER_ISS, ISS + 1, TcpFlags::SYN | TcpFlags::ACK, &[]));

        let mut conn = connection(transport);
        let segment = conn.receive_segment().unwrap();
        assert_eq!(segment.seq(), PEER_ISS);
        assert_eq!(conn.transport().pending(), 0);
        assert_eq!(conn.tcb().rcv_nxt(), PEER_ISS + 1);
    }

    #[test]
    fn test_receive_drops_foreign_frame_cut_by_buffer() {
        let a = Endpoint::new("10.9.9.9".parse().unwrap(), 443);
        let b = Endpoint::new("10.9.9.8".parse().unwrap(), 50000);
        let jumbo = frame(a, b, 1, 1, TcpFlags::ACK | TcpFlags::PSH, &[0x5a; 3000]);
        assert_eq!(jumbo.len(), 3040);

        let mut transport = ScriptedTransport::new();
        transport.push_reply(jumbo);
        transport.push_reply(from_peer(PEER_ISS, ISS + 1, TcpFlags::SYN | TcpFlags::ACK, &[]));

        let mut conn = connection(transport);
        let segment = conn.receive_segment().unwrap();
        assert!(segment.is_syn() && segment.is_ack());
        assert_eq!(
            conn.transport().recv_limits,
            vec![DEFAULT_RECV_BUFFER, DEFAULT_RECV_BUFFER]
        );
    }

    #[test]
    fn test_receive_own_frame_cut_by_buffer_is_error() {
        let mut transport = ScriptedTransport::new();
        transport.push_reply(from_peer(PEER_ISS, ISS, TcpFlags::ACK, &[1; 3000]));

        let mut conn = connection(transport);
        assert!(matches!(
            conn.receive_segment(),
            Err(Error::Truncated { needed: 3040, actual: 2048 })
        ));
    }

    #[test]
    fn test_send_rejects_segment_beyond_packet_limit() {
        let mut conn = connection(ScriptedTransport::new());
        let before = conn.tcb().clone();

        match conn.send_data(&vec![0; 70_000]) {
            Err(Error::Oversized { len, max }) => assert_eq!((len, max), (70_020, MAX_BODY_LEN)),
            other => panic!("unexpected {:?}", other.err()),
        }
        let params = SegmentParams::new(TcpFlags::ACK, DEFAULT_WINDOW)
            .with_body(vec![0; MAX_BODY_LEN - TCP_HEADER_LEN + 1]);
        assert!(matches!(
            conn.send_segment(params),
            Err(Error::Oversized { .. })
        ));
        assert!(conn.transport().sent.is_empty());
        assert_eq!(conn.tcb(), &before);

        // The largest body that fits still goes out with total length 65535.
        let params = SegmentParams::new(TcpFlags::ACK, DEFAULT_WINDOW)
            .with_body(vec![0; MAX_BODY_LEN - TCP_HEADER_LEN]);
        conn.send_segment(params).unwrap();
        let (header, _) = &sent_segments(conn.transport())[0];
        assert_eq!(header.total_len, u16::MAX);
    }

    #[test]
    fn test_receive_attaches_payload() {
        let options = [2u8, 4, 5, 180];
        let header = crate::transport::tcp::TcpHeader {
            src_port: remote().port,
            dst_port: local().port,
            seq_number: PEER_ISS,
            ack_number: ISS,
            data_offset: 6,
            reserved: 0,
            flags: TcpFlags::ACK | TcpFlags::PSH,
            window_size: 100,
            checksum: 0,
            urgent_ptr: 0,
        };
        let segment = TcpSegment::new(header, options.to_vec(), b"hey".to_vec());
        let mut transport = ScriptedTransport::new();
        let packet =
            IpPacket::build(protocol::TCP, remote().ip, local().ip, segment.marshal()).unwrap();
        transport.push_reply(packet.marshal());

        let mut conn = connection(transport);
        let received = conn.receive_segment().unwrap();
        assert_eq!(received.options(), &options);
        assert_eq!(received.body(), b"hey");
        assert_eq!(conn.tcb().rcv_nxt(), PEER_ISS + 3);
    }

    #[test]
    fn test_receive_malformed_packet_is_error() {
        let mut transport = ScriptedTransport::new();
        transport.push_reply(vec![0x45; 10]);
        let mut conn = connection(transport);
        assert!(matches!(
            conn.receive_segment(),
            Err(Error::Truncated { needed: 20, actual: 10 })
        ));
    }

    #[test]
    fn test_receive_timeout_reports_configured_bound() {
        let config = SessionConfig {
            wait: Wait::timeout(Duration::from_millis(250)),
            ..SessionConfig::default()
        };
        let mut conn = connection(ScriptedTransport::new()).with_config(config);
        match conn.connect() {
            Err(Error::Timeout(after)) => assert_eq!(after, Duration::from_millis(250)),
            other => panic!("unexpected {:?}", other.err()),
        }
        // The SYN still went out.
        assert_eq!(conn.transport().sent.len(), 1);
    }

    #[test]
    fn test_receive_cancelled() {
        let config = SessionConfig::default();
        config.wait.cancel.cancel();
        let mut transport = ScriptedTransport::new();
        transport.push_reply(from_peer(PEER_ISS, ISS + 1, TcpFlags::SYN | TcpFlags::ACK, &[]));

        let mut conn = connection(transport).with_config(config);
        assert!(matches!(conn.receive_segment(), Err(Error::Cancelled)));
    }

    #[test]
    fn test_hook_sees_both_directions() {
        let seen: Rc<RefCell<Vec<(Direction, IpAddr, TcpFlags)>>> = Rc::default();
        let log = Rc::clone(&seen);

        let mut transport = ScriptedTransport::new();
        transport.push_reply(from_peer(PEER_ISS, ISS + 1, TcpFlags::SYN | TcpFlags::ACK, &[]));
        let mut conn = connection(transport).on_segment(move |direction, packet, segment| {
            log.borrow_mut()
                .push((direction, packet.header().src_addr, segment.flags()));
        });
        conn.connect().unwrap();

        assert_eq!(
            *seen.borrow(),
            vec![
                (Direction::Sent, local().ip, TcpFlags::SYN),
                (Direction::Received, remote().ip, TcpFlags::SYN | TcpFlags::ACK),
                (Direction::Sent, local().ip, TcpFlags::ACK),
            ]
        );
    }
}
