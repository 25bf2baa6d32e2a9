//! ARP (Address Resolution Protocol) message codec
//!
//! Only the Ethernet/IPv4 flavour of ARP is modelled, giving a fixed
//! 28-byte message:
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |         Hardware Type         |         Protocol Type         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! | Hardware Size | Protocol Size |        Operation Code         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                       Sender MAC Address                      |
//! +                               +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                               |       Sender IP Address       |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |       Sender IP Address       |                               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+                               +
//! |                       Target MAC Address                      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                       Target IP Address                       |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};
use crate::iface::address::{IpAddr, MacAddr, IP_ADDR_LEN, MAC_ADDR_LEN};

/// Length of an Ethernet/IPv4 ARP message in bytes
pub const ARP_MESSAGE_LEN: usize = 28;

pub const HW_TYPE_ETHERNET: u16 = 0x0001;
pub const PROTOCOL_TYPE_IPV4: u16 = 0x0800;
pub const HW_SIZE_MAC: u8 = MAC_ADDR_LEN as u8;
pub const PROTOCOL_SIZE_IPV4: u8 = IP_ADDR_LEN as u8;

/// ARP operation codes
pub mod operation {
    pub const REQUEST: u16 = 0x0001;
    pub const REPLY: u16 = 0x0002;
}

/// A decoded ARP message
///
/// Fields are kept as found on the wire; nothing ties the size fields to the
/// actual address lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpMessage {
    pub hw_type: u16,
    pub protocol_type: u16,
    pub hw_size: u8,
    pub protocol_size: u8,
    pub operation: u16,
    pub sender_mac: MacAddr,
    pub sender_ip: IpAddr,
    pub target_mac: MacAddr,
    pub target_ip: IpAddr,
}

impl ArpMessage {
    /// An Ethernet/IPv4 request asking who holds `target_ip`.
    pub fn request(sender_mac: MacAddr, sender_ip: IpAddr, target_ip: IpAddr) -> Self {
        ArpMessage {
            hw_type: HW_TYPE_ETHERNET,
            protocol_type: PROTOCOL_TYPE_IPV4,
            hw_size: HW_SIZE_MAC,
            protocol_size: PROTOCOL_SIZE_IPV4,
            operation: operation::REQUEST,
            sender_mac,
            sender_ip,
            target_mac: MacAddr::UNSPECIFIED,
            target_ip,
        }
    }

    /// The reply a host holding `sender_ip` sends for `request`.
    pub fn reply_to(request: &ArpMessage, sender_mac: MacAddr) -> Self {
        ArpMessage {
            operation: operation::REPLY,
            sender_mac,
            sender_ip: request.target_ip,
            target_mac: request.sender_mac,
            target_ip: request.sender_ip,
            ..*request
        }
    }

    /// Decode the fixed 28-byte layout. Bytes past the message are ignored.
    pub fn parse(data: &[u8]) -> Result<Self> {
        Error::check_len(data, ARP_MESSAGE_LEN)?;

        Ok(ArpMessage {
            hw_type: BigEndian::read_u16(&data[0..2]),
            protocol_type: BigEndian::read_u16(&data[2..4]),
            hw_size: data[4],
            protocol_size: data[5],
            operation: BigEndian::read_u16(&data[6..8]),
            sender_mac: read_mac(&data[8..14]),
            sender_ip: read_ip(&data[14..18]),
            target_mac: read_mac(&data[18..24]),
            target_ip: read_ip(&data[24..28]),
        })
    }

    /// Encode in wire order, multi-byte fields big-endian.
    pub fn serialize(&self) -> [u8; ARP_MESSAGE_LEN] {
        let mut bytes = [0u8; ARP_MESSAGE_LEN];
        BigEndian::write_u16(&mut bytes[0..2], self.hw_type);
        BigEndian::write_u16(&mut bytes[2..4], self.protocol_type);
        bytes[4] = self.hw_size;
        bytes[5] = self.protocol_size;
        BigEndian::write_u16(&mut bytes[6..8], self.operation);
        bytes[8..14].copy_from_slice(&self.sender_mac.host_order());
        bytes[14..18].copy_from_slice(&self.sender_ip.host_order());
        bytes[18..24].copy_from_slice(&self.target_mac.host_order());
        bytes[24..28].copy_from_slice(&self.target_ip.host_order());
        bytes
    }

    pub fn is_request(&self) -> bool {
        self.operation == operation::REQUEST
    }

    pub fn is_reply(&self) -> bool {
        self.operation == operation::REPLY
    }
}

fn read_mac(data: &[u8]) -> MacAddr {
    let mut octets = [0u8; MAC_ADDR_LEN];
    octets.copy_from_slice(data);
    MacAddr::from_host_order(octets)
}

fn read_ip(data: &[u8]) -> IpAddr {
    let mut octets = [0u8; IP_ADDR_LEN];
    octets.copy_from_slice(data);
    IpAddr::from_host_order(octets)
}
