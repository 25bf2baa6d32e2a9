//! Addresses the operating system has bound to an interface.

use std::mem;

use tracing::debug;

use crate::error::{Error, Result};
use crate::iface::address::{IpAddr, MacAddr, IP_ADDR_LEN, MAC_ADDR_LEN};

const SIOCGIFADDR: libc::Ioctl = 0x8915;
const SIOCGIFHWADDR: libc::Ioctl = 0x8927;

/// `struct ifreq` restricted to the address member of its union.
#[repr(C)]
struct IfAddrRequest {
    name: [libc::c_char; libc::IFNAMSIZ],
    addr: libc::sockaddr,
    // The union is 24 bytes wide, sockaddr only covers 16.
    _pad: [u8; 8],
}

impl IfAddrRequest {
    fn new(ifname: &str) -> Result<Self> {
        let bytes = ifname.as_bytes();
        if bytes.is_empty() || bytes.len() >= libc::IFNAMSIZ || bytes.contains(&0) {
            return Err(Error::Config(format!("invalid interface name {:?}", ifname)));
        }

        let mut request: IfAddrRequest = unsafe { mem::zeroed() };
        for (dst, src) in request.name.iter_mut().zip(bytes) {
            *dst = *src as libc::c_char;
        }
        request.addr.sa_family = libc::AF_INET as libc::sa_family_t;
        Ok(request)
    }

    fn data(&self) -> [u8; 14] {
        let mut data = [0u8; 14];
        for (dst, src) in data.iter_mut().zip(self.addr.sa_data.iter()) {
            *dst = *src as u8;
        }
        data
    }
}

/// Issue an interface ioctl on a throwaway `AF_INET` socket.
fn ioctl_request(ifname: &str, request: libc::Ioctl) -> Result<IfAddrRequest> {
    let mut ifr = IfAddrRequest::new(ifname)?;

    let sock = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM, 0) };
    if sock < 0 {
        return Err(Error::last_os("Failed to create socket"));
    }
    let ret = unsafe { libc::ioctl(sock, request, &mut ifr as *mut IfAddrRequest) };
    // Capture errno before close can clobber it.
    let result = if ret == -1 {
        Err(Error::last_os("Failed to ioctl()"))
    } else {
        Ok(ifr)
    };
    unsafe {
        libc::close(sock);
    }
    result
}

/// IPv4 address currently assigned to `ifname`.
pub fn ip_of(ifname: &str) -> Result<IpAddr> {
    let ifr = ioctl_request(ifname, SIOCGIFADDR)?;
    // sockaddr_in: port in the first two bytes, then the address in wire order.
    let mut octets = [0u8; IP_ADDR_LEN];
    octets.copy_from_slice(&ifr.data()[2..2 + IP_ADDR_LEN]);
    let ip = IpAddr::from_host_order(octets);
    debug!(ifname, %ip, "queried interface address");
    Ok(ip)
}

/// Hardware address of `ifname`.
pub fn mac_of(ifname: &str) -> Result<MacAddr> {
    let ifr = ioctl_request(ifname, SIOCGIFHWADDR)?;
    let mut octets = [0u8; MAC_ADDR_LEN];
    octets.copy_from_slice(&ifr.data()[..MAC_ADDR_LEN]);
    let mac = MacAddr::from_host_order(octets);
    debug!(ifname, %mac, "queried interface hardware address");
    Ok(mac)
}
