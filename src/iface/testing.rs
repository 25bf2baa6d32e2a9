//! In-memory transport for unit tests.

use std::collections::VecDeque;

use crate::error::{Error, Result};
use crate::iface::address::MacAddr;
use crate::iface::transport::{LinkTransport, Wait};

/// Records every frame sent and replays queued frames on receive.
///
/// Once the queue is empty a receive fails with `Timeout`, as if the peer
/// went silent.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    pub sent: Vec<(String, MacAddr, Vec<u8>)>,
    pub recv_limits: Vec<usize>,
    replies: VecDeque<Vec<u8>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_reply(&mut self, frame: Vec<u8>) {
        self.replies.push_back(frame);
    }

    pub fn pending(&self) -> usize {
        self.replies.len()
    }
}

impl LinkTransport for ScriptedTransport {
    fn send(&mut self, interface: &str, dst: MacAddr, payload: &[u8]) -> Result<()> {
        self.sent.push((interface.to_string(), dst, payload.to_vec()));
        Ok(())
    }

    fn recv(&mut self, max_len: usize, wait: &Wait) -> Result<Vec<u8>> {
        self.recv_limits.push(max_len);
        if wait.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        match self.replies.pop_front() {
            Some(mut frame) => {
                frame.truncate(max_len);
                Ok(frame)
            }
            None => Err(Error::Timeout(wait.timeout.unwrap_or_default())),
        }
    }
}
