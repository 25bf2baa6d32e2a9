//! A hand-driven TCP handshake over a raw link-layer transport
//!
//! This library provides the pieces for one scripted TCP conversation:
//! - ARP resolution of the peer hardware address
//! - IPv4 packet and TCP segment codecs
//! - Transmission control block bookkeeping
//! - A connection driver doing handshake, one data segment and teardown

pub mod error;
pub mod iface;
pub mod network;
pub mod transport;

// Re-export commonly used types
pub use error::{Error, Result};
pub use iface::{Connection, Direction, IpAddr, LinkTransport, MacAddr, SessionConfig, Wait};
pub use network::{ArpMessage, ArpResolver, IpPacket, Ipv4Header};
pub use transport::{Endpoint, SegmentParams, TcpFlags, TcpSegment, TransmissionControlBlock};
