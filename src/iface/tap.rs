//! TAP device transport
//!
//! A TAP device hands userspace whole Ethernet frames, so unlike the packet
//! socket this transport writes the Ethernet header itself and drops frames
//! of other ethertypes on receive. One device can back several transports
//! with different ethertypes (ARP and IPv4 for a session).

use std::os::unix::io::AsRawFd;
use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder};
use tracing::{debug, trace};
use tun_tap::{Iface, Mode};

use crate::error::{Error, Result};
use crate::iface::address::{MacAddr, MAC_ADDR_LEN};
use crate::iface::transport::{wait_readable, LinkTransport, Wait};

pub const ETHERNET_HEADER_LEN: usize = 14;
/// Largest untagged frame without FCS
const MAX_FRAME_LEN: usize = 1514;

/// Prepend an Ethernet II header to `payload`.
pub fn encode_frame(dst: MacAddr, src: MacAddr, ethertype: u16, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(ETHERNET_HEADER_LEN + payload.len());
    frame.extend_from_slice(&dst.host_order());
    frame.extend_from_slice(&src.host_order());
    frame.extend_from_slice(&ethertype.to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Split an Ethernet II frame into destination, source, ethertype and payload.
pub fn decode_frame(frame: &[u8]) -> Result<(MacAddr, MacAddr, u16, &[u8])> {
    Error::check_len(frame, ETHERNET_HEADER_LEN)?;

    let mut dst = [0u8; MAC_ADDR_LEN];
    dst.copy_from_slice(&frame[0..6]);
    let mut src = [0u8; MAC_ADDR_LEN];
    src.copy_from_slice(&frame[6..12]);
    let ethertype = BigEndian::read_u16(&frame[12..14]);

    Ok((
        MacAddr::from_host_order(dst),
        MacAddr::from_host_order(src),
        ethertype,
        &frame[ETHERNET_HEADER_LEN..],
    ))
}

/// Payload of `frame` cut to `max_len`, or `None` for runt frames and
/// frames of another ethertype.
fn accept_frame(frame: &[u8], ethertype: u16, max_len: usize) -> Option<Vec<u8>> {
    let (_, src, kind, payload) = match decode_frame(frame) {
        Ok(parts) => parts,
        Err(_) => {
            trace!(len = frame.len(), "runt tap frame dropped");
            return None;
        }
    };
    if kind != ethertype {
        trace!(%src, ethertype = kind, "tap frame of other ethertype dropped");
        return None;
    }

    let mut payload = payload.to_vec();
    payload.truncate(max_len);
    Some(payload)
}

/// Transport over a TAP device, filtering one ethertype.
#[derive(Clone)]
pub struct TapTransport {
    iface: Arc<Iface>,
    local_mac: MacAddr,
    ethertype: u16,
}

impl TapTransport {
    /// Create or attach to the TAP device `name`.
    ///
    /// Frames are sent with `local_mac` as their source address. The device
    /// is released when the last transport sharing it is dropped.
    pub fn open(name: &str, local_mac: MacAddr, ethertype: u16) -> Result<Self> {
        let iface = Iface::without_packet_info(name, Mode::Tap)
            .map_err(|err| Error::io("Failed to open tap device", err))?;
        debug!(name = iface.name(), %local_mac, "tap device ready");

        Ok(TapTransport {
            iface: Arc::new(iface),
            local_mac,
            ethertype,
        })
    }

    /// Another transport on the same device for a different ethertype.
    pub fn with_ethertype(&self, ethertype: u16) -> Self {
        TapTransport {
            ethertype,
            ..self.clone()
        }
    }
}

impl LinkTransport for TapTransport {
    fn send(&mut self, interface: &str, dst: MacAddr, payload: &[u8]) -> Result<()> {
        if interface != self.iface.name() {
            debug!(interface, device = self.iface.name(), "tap ignores interface name");
        }
        let frame = encode_frame(dst, self.local_mac, self.ethertype, payload);
        self.iface
            .send(&frame)
            .map_err(|err| Error::io("Failed to write tap frame", err))?;
        trace!(%dst, len = frame.len(), "tap frame sent");
        Ok(())
    }

    fn recv(&mut self, max_len: usize, wait: &Wait) -> Result<Vec<u8>> {
        let deadline = wait.deadline();
        let mut buffer = [0u8; MAX_FRAME_LEN];
        loop {
            wait_readable(self.iface.as_raw_fd(), wait, deadline)?;

            let len = self
                .iface
                .recv(&mut buffer)
                .map_err(|err| Error::io("Failed to read tap frame", err))?;
            if let Some(payload) = accept_frame(&buffer[..len], self.ethertype, max_len) {
                return Ok(payload);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::ethertype;

    #[test]
    fn test_frame_layout() {
        let dst = MacAddr::BROADCAST;
        let src = MacAddr::from_host_order([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0x01]);
        let frame = encode_frame(dst, src, ethertype::ARP, &[1, 2, 3]);

        assert_eq!(frame.len(), 17);
        assert_eq!(&frame[0..6], &[0xff; 6]);
        assert_eq!(&frame[6..12], &src.host_order());
        assert_eq!(&frame[12..14], &[0x08, 0x06]);
        assert_eq!(&frame[14..], &[1, 2, 3]);

        let (d, s, kind, payload) = decode_frame(&frame).unwrap();
        assert_eq!((d, s, kind), (dst, src, ethertype::ARP));
        assert_eq!(payload, &[1, 2, 3]);
    }

    #[test]
    fn test_accept_frame_filters_ethertype() {
        let peer = MacAddr::from_host_order([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0x02]);
        let ip_frame = encode_frame(MacAddr::BROADCAST, peer, ethertype::IPV4, &[0x45; 40]);
        let arp_frame = encode_frame(MacAddr::BROADCAST, peer, ethertype::ARP, &[1; 28]);

        assert_eq!(accept_frame(&arp_frame, ethertype::ARP, 28), Some(vec![1; 28]));
        assert_eq!(accept_frame(&ip_frame, ethertype::ARP, 28), None);
        assert_eq!(accept_frame(&arp_frame, ethertype::IPV4, 2048), None);
        assert_eq!(accept_frame(&ip_frame, ethertype::IPV4, 2048), Some(vec![0x45; 40]));
    }

    #[test]
    fn test_accept_frame_truncates_and_drops_runts() {
        let peer = MacAddr::from_host_order([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0x02]);
        let frame = encode_frame(MacAddr::BROADCAST, peer, ethertype::ARP, &[1, 2, 3, 4]);

        assert_eq!(accept_frame(&frame, ethertype::ARP, 2), Some(vec![1, 2]));
        assert_eq!(accept_frame(&frame[..10], ethertype::ARP, 28), None);
        // A bare header carries an empty payload.
        assert_eq!(accept_frame(&frame[..14], ethertype::ARP, 28), Some(Vec::new()));
    }

    #[test]
    fn test_decode_short_frame() {
        assert!(matches!(
            decode_frame(&[0u8; 13]),
            Err(Error::Truncated { needed: 14, actual: 13 })
        ));
    }
}
