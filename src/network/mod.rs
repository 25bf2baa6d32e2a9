//! Network layer protocols implementation
//!
//! This module contains implementations for the protocols below TCP:
//! - ARP: Address Resolution Protocol, message codec and resolver
//! - IPv4: Internet Protocol version 4

pub mod arp;
pub mod ipv4;
pub mod resolver;

// Re-export commonly used items
pub use arp::ArpMessage;
pub use ipv4::{protocol, IpPacket, Ipv4Header};
pub use resolver::ArpResolver;

/// Ethertypes of the frames carried by the link-layer transport
pub mod ethertype {
    pub const IPV4: u16 = 0x0800;
    pub const ARP: u16 = 0x0806;
}

/// Calculate Internet checksum
///
/// Algorithm: Sum data in 16-bit big-endian chunks, add carry bits to the sum,
/// and return the one's complement of the result.
/// This is used for both the IPv4 header and the TCP pseudo-header checksum.
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum = 0u32;

    // Process data in 2-byte chunks
    for chunk in data.chunks_exact(2) {
        sum += u16::from_be_bytes([chunk[0], chunk[1]]) as u32;
    }

    // An odd trailing byte is the high byte of a final word
    if data.len() % 2 != 0 {
        if let Some(&last_byte) = data.last() {
            sum += (last_byte as u32) << 8;
        }
    }

    // Add carry bits
    while (sum >> 16) > 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    // Return one's complement
    !sum as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_rfc1071_example() {
        // Sum of the words is 0x2ddf0, folded 0xddf2.
        let data = [0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7];
        assert_eq!(checksum(&data), !0xddf2);
    }

    #[test]
    fn test_checksum_odd_length() {
        assert_eq!(checksum(&[0x12]), !0x1200);
        assert_eq!(checksum(&[0x12, 0x34, 0x56]), !(0x1234 + 0x5600));
    }

    #[test]
    fn test_checksum_empty() {
        assert_eq!(checksum(&[]), 0xffff);
    }
}
