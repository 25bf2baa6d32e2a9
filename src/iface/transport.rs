//! Link-layer transport
//!
//! A transport emits and receives frames of one ethertype below IP. The
//! kernel (or the TAP backend) does the Ethernet framing; callers only see
//! the payload. Receiving never blocks forever: every wait carries a
//! [`Wait`] with an optional timeout and a [`CancelToken`].

use std::ffi::CString;
use std::mem;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::iface::address::{MacAddr, MAC_ADDR_LEN};

/// Granularity at which a blocked receive re-checks its cancellation token
const POLL_SLICE: Duration = Duration::from_millis(50);

/// Shared flag that aborts pending receives when set.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How long a receive may wait.
#[derive(Debug, Clone, Default)]
pub struct Wait {
    /// `None` waits until a frame arrives or the token fires.
    pub timeout: Option<Duration>,
    pub cancel: CancelToken,
}

impl Wait {
    pub fn forever() -> Self {
        Self::default()
    }

    pub fn timeout(timeout: Duration) -> Self {
        Wait {
            timeout: Some(timeout),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.timeout.map(|timeout| Instant::now() + timeout)
    }

    /// Error for a wait that ended without a frame.
    pub(crate) fn check(&self, deadline: Option<Instant>) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        match (deadline, self.timeout) {
            (Some(deadline), Some(timeout)) if Instant::now() >= deadline => {
                Err(Error::Timeout(timeout))
            }
            _ => Ok(()),
        }
    }
}

/// Raw frame exchange on a network interface.
pub trait LinkTransport {
    /// Send one frame carrying `payload` to `dst` on `interface`.
    fn send(&mut self, interface: &str, dst: MacAddr, payload: &[u8]) -> Result<()>;

    /// Receive the payload of the next frame of this transport's ethertype,
    /// truncated to `max_len` bytes. No address filtering happens here.
    fn recv(&mut self, max_len: usize, wait: &Wait) -> Result<Vec<u8>>;
}

/// Block until `fd` is readable, honouring `deadline` and the wait's token.
pub(crate) fn wait_readable(fd: RawFd, wait: &Wait, deadline: Option<Instant>) -> Result<()> {
    loop {
        wait.check(deadline)?;

        let slice = match deadline {
            Some(deadline) => deadline
                .saturating_duration_since(Instant::now())
                .min(POLL_SLICE),
            None => POLL_SLICE,
        };
        let mut pollfd = libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        };
        let res = unsafe { libc::poll(&mut pollfd, 1, slice.as_millis() as libc::c_int) };
        if res < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            return Err(Error::io("Failed to poll", err));
        }
        // Errors and hangups also end the wait; the following read reports them.
        if res > 0 {
            return Ok(());
        }
    }
}

/// An `AF_PACKET` datagram socket bound to one ethertype.
///
/// The kernel adds and strips the Ethernet header. The descriptor is closed
/// when the socket is dropped.
#[derive(Debug)]
pub struct PacketSocket {
    fd: RawFd,
    ethertype: u16,
}

impl PacketSocket {
    /// Open a socket receiving frames of `ethertype` from every interface.
    ///
    /// Needs `CAP_NET_RAW`.
    pub fn open(ethertype: u16) -> Result<Self> {
        let fd = unsafe {
            libc::socket(
                libc::AF_PACKET,
                libc::SOCK_DGRAM,
                ethertype.to_be() as libc::c_int,
            )
        };
        if fd < 0 {
            return Err(Error::last_os("Failed to create socket"));
        }
        debug!(fd, ethertype, "opened packet socket");

        Ok(PacketSocket { fd, ethertype })
    }
}

impl LinkTransport for PacketSocket {
    fn send(&mut self, interface: &str, dst: MacAddr, payload: &[u8]) -> Result<()> {
        let name = CString::new(interface)
            .map_err(|_| Error::Config(format!("invalid interface name {:?}", interface)))?;
        let ifindex = unsafe { libc::if_nametoindex(name.as_ptr()) };
        if ifindex == 0 {
            return Err(Error::last_os("Failed to look up interface"));
        }

        let mut sll_addr = [0u8; 8];
        sll_addr[..MAC_ADDR_LEN].copy_from_slice(&dst.host_order());
        let addr = libc::sockaddr_ll {
            sll_family: libc::AF_PACKET as u16,
            sll_protocol: self.ethertype.to_be(),
            sll_ifindex: ifindex as libc::c_int,
            sll_hatype: 0,
            sll_pkttype: 0,
            sll_halen: MAC_ADDR_LEN as u8,
            sll_addr,
        };

        let sent = unsafe {
            libc::sendto(
                self.fd,
                payload.as_ptr() as *const libc::c_void,
                payload.len(),
                0,
                &addr as *const libc::sockaddr_ll as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if sent < 0 {
            return Err(Error::last_os("Failed to sendto"));
        }
        trace!(interface, %dst, len = payload.len(), "frame sent");
        Ok(())
    }

    fn recv(&mut self, max_len: usize, wait: &Wait) -> Result<Vec<u8>> {
        wait_readable(self.fd, wait, wait.deadline())?;

        let mut buffer = vec![0u8; max_len];
        let len = unsafe {
            libc::recv(
                self.fd,
                buffer.as_mut_ptr() as *mut libc::c_void,
                buffer.len(),
                0,
            )
        };
        if len < 0 {
            return Err(Error::last_os("Failed to recv"));
        }
        buffer.truncate(len as usize);
        trace!(len, "frame received");
        Ok(buffer)
    }
}

impl Drop for PacketSocket {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}
