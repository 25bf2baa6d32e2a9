//! Transport layer protocols implementation
//!
//! This module contains the TCP pieces the connection driver needs:
//! - tcp: segment header codec, flags and checksum
//! - tcb: transmission control block counters and the initial sequence number

pub mod tcb;
pub mod tcp;

// Re-export commonly used items
pub use tcb::{Clock, SystemClock, TransmissionControlBlock};
pub use tcp::{Endpoint, SegmentParams, TcpFlags, TcpHeader, TcpSegment};
