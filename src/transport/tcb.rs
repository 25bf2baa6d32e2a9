//! Transmission Control Block
//!
//! The TCB keeps the sequence variables of RFC 793 section 3.2 for a single
//! connection. It labels each outgoing segment with SND.NXT/RCV.NXT and
//! advances its counters from incoming segments, assuming in-order, loss-free
//! delivery from a cooperative peer. There is no retransmission queue, no
//! timer and no window enforcement.
//!
//! The update rules are deliberately simple and do not follow RFC 793 to the
//! letter: SND.UNA moves on every send and to `SEG.ACK + 1` on every ACK, and
//! SND.WL1 records the advertised window.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::trace;

use crate::transport::tcp::{Endpoint, SegmentParams, TcpFlags, TcpSegment};

const SECS_PER_DAY: u64 = 86_400;
const MICROS_PER_SEC: u64 = 1_000_000;

/// Source of wall-clock time for initial sequence numbers.
pub trait Clock {
    fn now(&self) -> SystemTime;
}

/// The system's real-time clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

impl<F: Fn() -> SystemTime> Clock for F {
    fn now(&self) -> SystemTime {
        self()
    }
}

/// Initial sequence number from a clock ticking every 4 microseconds.
///
/// Counts microseconds since the last UTC midnight, divides by 4 and wraps
/// into 32 bits.
pub fn initial_sequence_number(clock: &impl Clock) -> u32 {
    let since_epoch = clock
        .now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);
    let secs_from_midnight = since_epoch.as_secs() % SECS_PER_DAY;
    let micros_from_midnight =
        secs_from_midnight * MICROS_PER_SEC + since_epoch.subsec_micros() as u64;

    (micros_from_midnight / 4) as u32
}

/// Per-connection sequence number state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransmissionControlBlock {
    // Send sequence variables
    snd_una: u32,
    snd_nxt: u32,
    snd_up: u32,
    snd_wl1: u32,
    snd_wl2: u32,
    iss: u32,
    // Receive sequence variables
    rcv_nxt: u32,
    rcv_wnd: u32,
    rcv_up: u32,
    irs: u32,
}

impl TransmissionControlBlock {
    /// A fresh TCB whose ISS comes from the system clock.
    pub fn new() -> Self {
        Self::with_clock(&SystemClock)
    }

    pub fn with_clock(clock: &impl Clock) -> Self {
        Self::with_iss(initial_sequence_number(clock))
    }

    /// A fresh TCB with ISS = SND.NXT = `iss`.
    pub fn with_iss(iss: u32) -> Self {
        TransmissionControlBlock {
            snd_nxt: iss,
            iss,
            ..Default::default()
        }
    }

    /// Label a segment with SND.NXT / RCV.NXT and advance the send side.
    pub fn create_send_segment(
        &mut self,
        src: Endpoint,
        dst: Endpoint,
        params: SegmentParams,
    ) -> TcpSegment {
        let flags = params.flags;
        let window = params.window;
        let urgent_ptr = params.urgent_ptr;
        let body_len = params.body.len() as u32;

        let segment = TcpSegment::build(src, dst, self.snd_nxt, self.rcv_nxt, params);

        self.snd_una = self.snd_nxt;
        if flags.intersects(TcpFlags::SYN | TcpFlags::FIN) {
            self.snd_nxt = self.snd_nxt.wrapping_add(1);
        } else {
            self.snd_nxt = self.snd_nxt.wrapping_add(body_len);
        }
        if flags.contains(TcpFlags::URG) {
            self.snd_up = urgent_ptr as u32;
        }
        self.snd_wl1 = window as u32;
        self.snd_wl2 = self.rcv_nxt;

        trace!(
            snd_una = self.snd_una,
            snd_nxt = self.snd_nxt,
            snd_wl2 = self.snd_wl2,
            "send side updated"
        );
        segment
    }

    /// Advance the receive side (and SND.UNA) from an incoming segment.
    pub fn apply_receive_segment(&mut self, segment: &TcpSegment) {
        if segment.is_ack() {
            self.snd_una = segment.ack_seq().wrapping_add(1);
        }

        let body_len = segment.body().len() as u32;
        if segment.is_syn() || segment.is_fin() {
            self.rcv_nxt = segment.seq().wrapping_add(1);
        } else if !segment.is_ack() && body_len == 0 {
            self.rcv_nxt = segment.seq().wrapping_add(1);
        } else if body_len != 0 {
            self.rcv_nxt = segment.seq().wrapping_add(body_len);
        }

        self.rcv_wnd = segment.window() as u32;
        if segment.is_urg() {
            self.rcv_up = segment.urgent_pointer() as u32;
        }
        if segment.is_syn() {
            self.irs = segment.seq();
        }

        trace!(
            snd_una = self.snd_una,
            rcv_nxt = self.rcv_nxt,
            rcv_wnd = self.rcv_wnd,
            "receive side updated"
        );
    }

    /// SND.UNA, oldest unacknowledged sequence number
    pub fn snd_una(&self) -> u32 {
        self.snd_una
    }

    /// SND.NXT, next sequence number to be sent
    pub fn snd_nxt(&self) -> u32 {
        self.snd_nxt
    }

    pub fn snd_up(&self) -> u32 {
        self.snd_up
    }

    pub fn snd_wl1(&self) -> u32 {
        self.snd_wl1
    }

    pub fn snd_wl2(&self) -> u32 {
        self.snd_wl2
    }

    pub fn iss(&self) -> u32 {
        self.iss
    }

    /// RCV.NXT, next sequence number expected from the peer
    pub fn rcv_nxt(&self) -> u32 {
        self.rcv_nxt
    }

    pub fn rcv_wnd(&self) -> u32 {
        self.rcv_wnd
    }

    pub fn rcv_up(&self) -> u32 {
        self.rcv_up
    }

    pub fn irs(&self) -> u32 {
        self.irs
    }
}
