//! IPv4 protocol implementation
//!
//! This module provides IPv4 packet building, parsing and serialization.
//! Only the fixed 20-byte header is supported; options are never emitted
//! and the body is treated as opaque bytes.
//!
//! Features:
//! - Packet construction with automatic checksum
//! - Header parsing at fixed big-endian offsets
//! - Checksum calculation and validation

use std::fmt;

use crate::error::{Error, Result};
use crate::iface::address::IpAddr;
use crate::network::checksum;
use byteorder::{BigEndian, ByteOrder};

pub const IPV4_HEADER_LEN: usize = 20;
const IPV4_VERSION: u8 = 4;
const DEFAULT_IHL: u8 = 5; // 5 * 4 = 20 bytes (standard header length)
const DEFAULT_TTL: u8 = 32;
/// Identification stamped on every built packet
const DEFAULT_ID: u16 = 0xa78b;
/// Largest body the 16-bit total length can describe
pub const MAX_BODY_LEN: usize = u16::MAX as usize - IPV4_HEADER_LEN;

/// IPv4 packet header structure
///
/// Represents the standard 20-byte IPv4 header as defined in RFC 791
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Header {
    pub version: u8,
    pub ihl: u8, // Internet Header Length, in 32-bit words
    pub tos: u8, // Type of Service
    pub total_len: u16,
    pub id: u16,
    pub flags_frag_offset: u16, // Flags and Fragment Offset
    pub ttl: u8,                // Time to Live
    pub protocol: u8,           // Next Protocol
    pub checksum: u16,
    pub src_addr: IpAddr, // Source IP Address
    pub dst_addr: IpAddr, // Destination IP Address
}

impl Ipv4Header {
    /// Parse IPv4 header from byte slice
    ///
    /// No field is validated, a header with any version or IHL is returned as is.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Error::check_len(data, IPV4_HEADER_LEN)?;

        let mut src_addr = [0u8; 4];
        src_addr.copy_from_slice(&data[12..16]);
        let mut dst_addr = [0u8; 4];
        dst_addr.copy_from_slice(&data[16..20]);

        Ok(Ipv4Header {
            version: data[0] >> 4,
            ihl: data[0] & 0x0F,
            tos: data[1],
            total_len: BigEndian::read_u16(&data[2..4]),
            id: BigEndian::read_u16(&data[4..6]),
            flags_frag_offset: BigEndian::read_u16(&data[6..8]),
            ttl: data[8],
            protocol: data[9],
            checksum: BigEndian::read_u16(&data[10..12]),
            src_addr: IpAddr::from_host_order(src_addr),
            dst_addr: IpAddr::from_host_order(dst_addr),
        })
    }

    /// Update checksum after modifying header fields
    pub fn update_checksum(&mut self) {
        self.checksum = Ipv4Utils::calculate_checksum(self);
    }

    /// Convert IPv4 header to bytes
    ///
    /// Serializes the header to a 20-byte array ready for transmission
    pub fn to_bytes(&self) -> [u8; IPV4_HEADER_LEN] {
        let mut bytes = [0u8; IPV4_HEADER_LEN];
        bytes[0] = (self.version << 4) | (self.ihl & 0x0F);
        bytes[1] = self.tos;
        BigEndian::write_u16(&mut bytes[2..4], self.total_len);
        BigEndian::write_u16(&mut bytes[4..6], self.id);
        BigEndian::write_u16(&mut bytes[6..8], self.flags_frag_offset);
        bytes[8] = self.ttl;
        bytes[9] = self.protocol;
        BigEndian::write_u16(&mut bytes[10..12], self.checksum);
        bytes[12..16].copy_from_slice(&self.src_addr.host_order());
        bytes[16..20].copy_from_slice(&self.dst_addr.host_order());

        bytes
    }

    /// Get the header length in bytes
    pub fn header_len(&self) -> usize {
        (self.ihl as usize) * 4
    }
}

impl fmt::Display for Ipv4Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "version   : {}", self.version)?;
        writeln!(f, "ihl       : {}", self.ihl)?;
        writeln!(f, "tos       : {}", self.tos)?;
        writeln!(f, "tot_len   : {}", self.total_len)?;
        writeln!(f, "id        : {}", self.id)?;
        writeln!(f, "frag_off  : {}", self.flags_frag_offset)?;
        writeln!(f, "ttl       : {}", self.ttl)?;
        writeln!(f, "protocol  : {}", self.protocol)?;
        writeln!(f, "check     : {}", self.checksum)?;
        writeln!(f, "src addr  : {}", self.src_addr)?;
        write!(f, "dst addr  : {}", self.dst_addr)
    }
}

/// An IPv4 header together with its opaque body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpPacket {
    header: Ipv4Header,
    body: Vec<u8>,
}

impl IpPacket {
    /// Build a packet around `body` with the checksum filled in.
    ///
    /// Fails with `Oversized` when the body exceeds [`MAX_BODY_LEN`].
    pub fn build(protocol: u8, src_addr: IpAddr, dst_addr: IpAddr, body: Vec<u8>) -> Result<Self> {
        if body.len() > MAX_BODY_LEN {
            return Err(Error::Oversized {
                len: body.len(),
                max: MAX_BODY_LEN,
            });
        }
        let mut header = Ipv4Header {
            version: IPV4_VERSION,
            ihl: DEFAULT_IHL,
            tos: 0,
            total_len: (IPV4_HEADER_LEN + body.len()) as u16,
            id: DEFAULT_ID,
            flags_frag_offset: 0,
            ttl: DEFAULT_TTL,
            protocol,
            checksum: 0, // Will be calculated
            src_addr,
            dst_addr,
        };
        header.update_checksum();

        Ok(IpPacket { header, body })
    }

    /// Parse a packet, taking `total_len - ihl * 4` bytes after the header as body.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let header = Ipv4Header::from_bytes(data)?;

        let header_len = header.header_len();
        let total_len = header.total_len as usize;
        let body = if total_len > header_len {
            Error::check_len(data, total_len)?;
            data[header_len..total_len].to_vec()
        } else {
            Vec::new()
        };

        Ok(IpPacket { header, body })
    }

    /// Header bytes followed by the body
    pub fn marshal(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(IPV4_HEADER_LEN + self.body.len());
        packet.extend_from_slice(&self.header.to_bytes());
        packet.extend_from_slice(&self.body);
        packet
    }

    pub fn header(&self) -> &Ipv4Header {
        &self.header
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

/// IPv4 protocol constants
pub mod protocol {
    pub const ICMP: u8 = 1;
    pub const TCP: u8 = 6;
    pub const UDP: u8 = 17;
}

pub struct Ipv4Utils {}

impl Ipv4Utils {
    /// Calculate IPv4 header checksum
    ///
    /// Calculates the checksum for this IPv4 header according to RFC 791.
    /// The checksum field is treated as zero during calculation.
    pub fn calculate_checksum(header: &Ipv4Header) -> u16 {
        let mut header_bytes = header.to_bytes();
        header_bytes[10..12].copy_from_slice(&[0, 0]);
        checksum(&header_bytes)
    }

    /// Validate IPv4 header checksum
    ///
    /// Returns true if the header checksum is valid
    pub fn validate_checksum(header: &Ipv4Header) -> bool {
        let calculated = Self::calculate_checksum(header);
        calculated == header.checksum
    }
}
