//! Network interface abstraction layer
//!
//! This module provides everything below IPv4:
//! - Fixed-length address values (IPv4, MAC)
//! - Local interface address queries
//! - Link-layer transports (packet socket, TAP device)
//! - The connection driver tying a transport to the TCP control block

pub mod address;
pub mod device;
pub mod interface;
pub mod tap;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used items
pub use address::{IpAddr, MacAddr};
pub use interface::{Connection, Direction, SessionConfig};
pub use tap::TapTransport;
pub use transport::{CancelToken, LinkTransport, PacketSocket, Wait};
