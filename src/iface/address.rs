//! Fixed-length link and network addresses
//!
//! Both IPv4 and MAC addresses are a short run of octets kept in presentation
//! order, the order in which they appear when written out (`172.17.0.2` is
//! stored as `[172, 17, 0, 2]`). The two kinds only differ in how they are
//! written as text, which is captured by an [`AddrFormat`].

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Length of an IPv4 address in bytes
pub const IP_ADDR_LEN: usize = 4;
/// Length of an Ethernet MAC address in bytes
pub const MAC_ADDR_LEN: usize = 6;

/// Text representation of an address kind.
pub trait AddrFormat {
    /// Separator between octets
    const DELIMITER: char;
    /// Radix each octet is written in
    const RADIX: u32;
    /// Minimum digits per octet, zero padded
    const WIDTH: usize;
}

/// Dotted decimal, `172.17.0.2`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DottedDecimal {}

impl AddrFormat for DottedDecimal {
    const DELIMITER: char = '.';
    const RADIX: u32 = 10;
    const WIDTH: usize = 0;
}

/// Colon separated hex, `aa:bb:cc:dd:ee:01`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColonHex {}

impl AddrFormat for ColonHex {
    const DELIMITER: char = ':';
    const RADIX: u32 = 16;
    const WIDTH: usize = 2;
}

/// An address of exactly `N` octets.
pub struct Addr<const N: usize, F> {
    octets: [u8; N],
    format: PhantomData<F>,
}

/// IPv4 address
pub type IpAddr = Addr<IP_ADDR_LEN, DottedDecimal>;
/// Ethernet hardware address
pub type MacAddr = Addr<MAC_ADDR_LEN, ColonHex>;

impl<const N: usize, F> Addr<N, F> {
    /// All octets zero.
    pub const UNSPECIFIED: Self = Addr {
        octets: [0; N],
        format: PhantomData,
    };

    /// All octets `0xff`.
    pub const BROADCAST: Self = Addr {
        octets: [0xff; N],
        format: PhantomData,
    };

    /// Store octets given in presentation order.
    pub const fn from_host_order(octets: [u8; N]) -> Self {
        Addr {
            octets,
            format: PhantomData,
        }
    }

    /// Store octets given in reversed order.
    pub fn from_network_order(mut octets: [u8; N]) -> Self {
        octets.reverse();
        Self::from_host_order(octets)
    }

    /// Octets in presentation order.
    pub fn host_order(&self) -> [u8; N] {
        self.octets
    }

    /// Octets in reversed order.
    pub fn network_order(&self) -> [u8; N] {
        let mut octets = self.octets;
        octets.reverse();
        octets
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.octets
    }
}

impl<const N: usize, F: AddrFormat> Addr<N, F> {
    /// Parse the text form, e.g. `172.17.0.2` or `aa:bb:cc:dd:ee:ff`.
    pub fn from_string(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(F::DELIMITER).collect();
        if parts.len() != N {
            return Err(Error::DelimiterCount {
                input: s.to_string(),
                expected: N,
                found: parts.len(),
            });
        }

        let mut octets = [0u8; N];
        for (octet, part) in octets.iter_mut().zip(parts) {
            *octet = u8::from_str_radix(part, F::RADIX).map_err(|_| Error::InvalidOctet {
                part: part.to_string(),
            })?;
        }

        Ok(Self::from_host_order(octets))
    }
}

impl<const N: usize, F: AddrFormat> fmt::Display for Addr<N, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, octet) in self.octets.iter().enumerate() {
            if i != 0 {
                write!(f, "{}", F::DELIMITER)?;
            }
            match F::RADIX {
                16 => write!(f, "{:0width$x}", octet, width = F::WIDTH)?,
                _ => write!(f, "{:0width$}", octet, width = F::WIDTH)?,
            }
        }
        Ok(())
    }
}

impl<const N: usize, F: AddrFormat> fmt::Debug for Addr<N, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl<const N: usize, F: AddrFormat> FromStr for Addr<N, F> {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_string(s)
    }
}

// Manual impls: deriving would put bounds on the uninhabited format marker.
impl<const N: usize, F> Clone for Addr<N, F> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<const N: usize, F> Copy for Addr<N, F> {}

impl<const N: usize, F> PartialEq for Addr<N, F> {
    fn eq(&self, other: &Self) -> bool {
        self.octets == other.octets
    }
}

impl<const N: usize, F> Eq for Addr<N, F> {}

impl<const N: usize, F> Hash for Addr<N, F> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.octets.hash(state);
    }
}

impl<const N: usize, F> From<[u8; N]> for Addr<N, F> {
    fn from(octets: [u8; N]) -> Self {
        Self::from_host_order(octets)
    }
}
