//! TCP (Transmission Control Protocol) segment codec
//!
//! This module provides TCP segment construction, parsing and serialization,
//! including the pseudo-header checksum. The header layout is the standard
//! RFC 793 one with the ECN bits of RFC 3168 and 3540:
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |          Source Port          |       Destination Port        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Sequence Number                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                    Acknowledgment Number                      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |  Data |     |N|C|E|U|A|P|R|S|F|                               |
//! | Offset| Res.|S|W|C|R|C|S|S|Y|I|            Window             |
//! |       |     | |R|E|G|K|H|T|N|N|                               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |           Checksum            |         Urgent Pointer        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use std::fmt;

use bitflags::bitflags;
use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};
use crate::iface::address::IpAddr;
use crate::network::{checksum, protocol};

/// Length of the fixed TCP header in bytes
pub const TCP_HEADER_LEN: usize = 20;
/// Length of the IPv4 pseudo-header used for the checksum
const PSEUDO_HEADER_LEN: usize = 12;

bitflags! {
    /// The nine control bits, numbered as they sit in bytes 12-13.
    pub struct TcpFlags: u16 {
        const FIN = 1 << 0;
        const SYN = 1 << 1;
        const RST = 1 << 2;
        const PSH = 1 << 3;
        const ACK = 1 << 4;
        const URG = 1 << 5;
        const ECE = 1 << 6;
        const CWR = 1 << 7;
        const NS = 1 << 8;
    }
}

/// TCP packet header structure
///
/// Represents the 20-byte TCP header. `data_offset` is the raw 4-bit field
/// and `reserved` the 3 bits between it and NS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq_number: u32,
    pub ack_number: u32,
    pub data_offset: u8,
    pub reserved: u8,
    pub flags: TcpFlags,
    pub window_size: u16,
    pub checksum: u16,
    pub urgent_ptr: u16,
}

impl TcpHeader {
    /// Parse TCP header from byte slice
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Error::check_len(data, TCP_HEADER_LEN)?;

        let bits = ((data[12] as u16 & 0x01) << 8) | data[13] as u16;
        Ok(TcpHeader {
            src_port: BigEndian::read_u16(&data[0..2]),
            dst_port: BigEndian::read_u16(&data[2..4]),
            seq_number: BigEndian::read_u32(&data[4..8]),
            ack_number: BigEndian::read_u32(&data[8..12]),
            data_offset: data[12] >> 4,
            reserved: (data[12] >> 1) & 0x07,
            flags: TcpFlags::from_bits_truncate(bits),
            window_size: BigEndian::read_u16(&data[14..16]),
            checksum: BigEndian::read_u16(&data[16..18]),
            urgent_ptr: BigEndian::read_u16(&data[18..20]),
        })
    }

    /// Convert TCP header to bytes
    pub fn to_bytes(&self) -> [u8; TCP_HEADER_LEN] {
        let mut bytes = [0u8; TCP_HEADER_LEN];
        BigEndian::write_u16(&mut bytes[0..2], self.src_port);
        BigEndian::write_u16(&mut bytes[2..4], self.dst_port);
        BigEndian::write_u32(&mut bytes[4..8], self.seq_number);
        BigEndian::write_u32(&mut bytes[8..12], self.ack_number);
        let bits = self.flags.bits();
        bytes[12] = (self.data_offset << 4) | ((self.reserved & 0x07) << 1) | (bits >> 8) as u8;
        bytes[13] = bits as u8;
        BigEndian::write_u16(&mut bytes[14..16], self.window_size);
        BigEndian::write_u16(&mut bytes[16..18], self.checksum);
        BigEndian::write_u16(&mut bytes[18..20], self.urgent_ptr);
        bytes
    }
}

/// Everything the sender chooses about an outgoing segment besides its
/// endpoints and sequence numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentParams {
    pub flags: TcpFlags,
    pub window: u16,
    pub urgent_ptr: u16,
    pub options: Vec<u8>,
    pub body: Vec<u8>,
}

impl SegmentParams {
    pub fn new(flags: TcpFlags, window: u16) -> Self {
        SegmentParams {
            flags,
            window,
            urgent_ptr: 0,
            options: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_options(mut self, options: impl Into<Vec<u8>>) -> Self {
        self.options = options.into();
        self
    }

    pub fn with_urgent(mut self, urgent_ptr: u16) -> Self {
        self.flags |= TcpFlags::URG;
        self.urgent_ptr = urgent_ptr;
        self
    }
}

/// Addresses and ports of one side of a connection pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub ip: IpAddr,
    pub port: u16,
}

impl Endpoint {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Endpoint { ip, port }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// A TCP header with its options and body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpSegment {
    header: TcpHeader,
    options: Vec<u8>,
    body: Vec<u8>,
}

impl TcpSegment {
    /// Assemble a segment from fields taken as is, checksum included.
    pub fn new(header: TcpHeader, options: Vec<u8>, body: Vec<u8>) -> Self {
        TcpSegment {
            header,
            options,
            body,
        }
    }

    /// Build an outgoing segment from `src` to `dst` and fill in its checksum.
    ///
    /// The data offset is computed as `20 + options + 1` and stored into the
    /// 4-bit field, which for an option-less segment yields 5.
    pub fn build(src: Endpoint, dst: Endpoint, seq: u32, ack: u32, params: SegmentParams) -> Self {
        let data_offset = ((TCP_HEADER_LEN + params.options.len() + 1) & 0x0F) as u8;
        let header = TcpHeader {
            src_port: src.port,
            dst_port: dst.port,
            seq_number: seq,
            ack_number: ack,
            data_offset,
            reserved: 0,
            flags: params.flags,
            window_size: params.window,
            checksum: 0,
            urgent_ptr: params.urgent_ptr,
        };

        let mut segment = TcpSegment {
            header,
            options: params.options,
            body: params.body,
        };
        segment.header.checksum = segment.compute_checksum(src.ip, dst.ip);
        segment
    }

    /// Decode the fixed header only.
    ///
    /// Options and body stay empty whatever follows the first 20 bytes; use
    /// [`TcpSegment::attach_payload`] to add them.
    pub fn parse(data: &[u8]) -> Result<Self> {
        Ok(TcpSegment {
            header: TcpHeader::from_bytes(data)?,
            options: Vec::new(),
            body: Vec::new(),
        })
    }

    /// Set the options and body sliced from the bytes after the header.
    pub fn attach_payload(&mut self, options: Vec<u8>, body: Vec<u8>) {
        self.options = options;
        self.body = body;
    }

    /// Header, options and body as sent on the wire
    pub fn marshal(&self) -> Vec<u8> {
        let mut bytes =
            Vec::with_capacity(TCP_HEADER_LEN + self.options.len() + self.body.len());
        bytes.extend_from_slice(&self.header.to_bytes());
        bytes.extend_from_slice(&self.options);
        bytes.extend_from_slice(&self.body);
        bytes
    }

    /// Checksum over pseudo-header and segment with the checksum field zeroed.
    ///
    /// The pseudo-header length is 16 bits. `Connection::send_segment` rejects
    /// segments longer than that before building them.
    pub fn compute_checksum(&self, src: IpAddr, dst: IpAddr) -> u16 {
        let tcp_len = TCP_HEADER_LEN + self.options.len() + self.body.len();
        let mut buffer = Vec::with_capacity(PSEUDO_HEADER_LEN + tcp_len);
        buffer.extend_from_slice(&src.host_order());
        buffer.extend_from_slice(&dst.host_order());
        buffer.push(0);
        buffer.push(protocol::TCP);
        buffer.extend_from_slice(&(tcp_len as u16).to_be_bytes());

        let mut header = self.header;
        header.checksum = 0;
        buffer.extend_from_slice(&header.to_bytes());
        buffer.extend_from_slice(&self.options);
        buffer.extend_from_slice(&self.body);

        checksum(&buffer)
    }

    /// Whether the stored checksum matches the segment's contents.
    pub fn verify_checksum(&self, src: IpAddr, dst: IpAddr) -> bool {
        self.compute_checksum(src, dst) == self.header.checksum
    }

    pub fn header(&self) -> &TcpHeader {
        &self.header
    }

    pub fn src_port(&self) -> u16 {
        self.header.src_port
    }

    pub fn dst_port(&self) -> u16 {
        self.header.dst_port
    }

    pub fn seq(&self) -> u32 {
        self.header.seq_number
    }

    pub fn ack_seq(&self) -> u32 {
        self.header.ack_number
    }

    /// Raw 4-bit data offset field
    pub fn data_offset(&self) -> u8 {
        self.header.data_offset
    }

    pub fn reserved(&self) -> u8 {
        self.header.reserved
    }

    pub fn flags(&self) -> TcpFlags {
        self.header.flags
    }

    pub fn window(&self) -> u16 {
        self.header.window_size
    }

    pub fn checksum(&self) -> u16 {
        self.header.checksum
    }

    pub fn urgent_pointer(&self) -> u16 {
        self.header.urgent_ptr
    }

    pub fn options(&self) -> &[u8] {
        &self.options
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn is_ns(&self) -> bool {
        self.header.flags.contains(TcpFlags::NS)
    }

    pub fn is_cwr(&self) -> bool {
        self.header.flags.contains(TcpFlags::CWR)
    }

    pub fn is_ece(&self) -> bool {
        self.header.flags.contains(TcpFlags::ECE)
    }

    pub fn is_urg(&self) -> bool {
        self.header.flags.contains(TcpFlags::URG)
    }

    pub fn is_ack(&self) -> bool {
        self.header.flags.contains(TcpFlags::ACK)
    }

    pub fn is_psh(&self) -> bool {
        self.header.flags.contains(TcpFlags::PSH)
    }

    pub fn is_rst(&self) -> bool {
        self.header.flags.contains(TcpFlags::RST)
    }

    pub fn is_syn(&self) -> bool {
        self.header.flags.contains(TcpFlags::SYN)
    }

    pub fn is_fin(&self) -> bool {
        self.header.flags.contains(TcpFlags::FIN)
    }
}

impl fmt::Display for TcpSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "src port    : {}", self.src_port())?;
        writeln!(f, "dst port    : {}", self.dst_port())?;
        writeln!(f, "seq         : {}", self.seq())?;
        writeln!(f, "ack seq     : {}", self.ack_seq())?;
        writeln!(f, "data offset : {}", self.data_offset())?;
        writeln!(f, "reserved    : {}", self.reserved())?;
        let names = [
            (TcpFlags::NS, "ns"),
            (TcpFlags::CWR, "cwr"),
            (TcpFlags::ECE, "ece"),
            (TcpFlags::URG, "urg"),
            (TcpFlags::ACK, "ack"),
            (TcpFlags::PSH, "psh"),
            (TcpFlags::RST, "rst"),
            (TcpFlags::SYN, "syn"),
            (TcpFlags::FIN, "fin"),
        ];
        for (flag, name) in names {
            if self.flags().contains(flag) {
                writeln!(f, "{:<12}: 1", name)?;
            }
        }
        writeln!(f, "window      : {}", self.window())?;
        write!(f, "checksum    : {}", self.checksum())?;
        if self.is_urg() {
            write!(f, "\nurg_pointer : {}", self.urgent_pointer())?;
        }
        Ok(())
    }
}
