//! Network types for KNX communication.
//!
//! [`Ipv4Addr`] and [`Endpoint`] are the crate's own address types: they
//! serialize to exactly the bytes an HPAI block carries and follow the
//! `impl Into<T>` pattern for API ergonomics. Conversions to and from the
//! `std::net` types sit at the socket boundary.

pub mod mock_transport;
pub mod transport;
pub mod udp;

pub use mock_transport::MockTransport;
pub use transport::{FrameReceiver, FrameSender, Transport};
pub use udp::UdpTransport;

use crate::error::{KnxError, Result};
use crate::protocol::constants::KNXNETIP_DEFAULT_PORT;
use core::fmt;
use std::net::{SocketAddr, SocketAddrV4};

/// IPv4 address representation.
///
/// A lightweight wrapper around a 4-byte array with conversions from the
/// usual input forms.
///
/// # Examples
///
/// ```
/// use knx_tunnel::net::Ipv4Addr;
///
/// let a = Ipv4Addr::from([192, 168, 1, 10]);
/// let b = Ipv4Addr::from((192, 168, 1, 10));
/// let c: Ipv4Addr = "192.168.1.10".parse().unwrap();
/// assert_eq!(a, b);
/// assert_eq!(b, c);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Ipv4Addr {
    octets: [u8; 4],
}

impl Ipv4Addr {
    /// Create a new IPv4 address from individual octets.
    #[inline]
    pub const fn new(a: u8, b: u8, c: u8, d: u8) -> Self {
        Self {
            octets: [a, b, c, d],
        }
    }

    /// Returns the four octets that make up this address.
    #[inline]
    pub const fn octets(&self) -> [u8; 4] {
        self.octets
    }

    /// The unspecified address (0.0.0.0); lets the OS pick the interface.
    pub const UNSPECIFIED: Self = Self::new(0, 0, 0, 0);

    /// Create a localhost IPv4 address (127.0.0.1).
    pub const LOCALHOST: Self = Self::new(127, 0, 0, 1);
}

impl From<[u8; 4]> for Ipv4Addr {
    #[inline]
    fn from(octets: [u8; 4]) -> Self {
        Self { octets }
    }
}

impl From<(u8, u8, u8, u8)> for Ipv4Addr {
    #[inline]
    fn from((a, b, c, d): (u8, u8, u8, u8)) -> Self {
        Self::new(a, b, c, d)
    }
}

impl From<Ipv4Addr> for [u8; 4] {
    #[inline]
    fn from(addr: Ipv4Addr) -> [u8; 4] {
        addr.octets
    }
}

impl From<std::net::Ipv4Addr> for Ipv4Addr {
    #[inline]
    fn from(addr: std::net::Ipv4Addr) -> Self {
        Self {
            octets: addr.octets(),
        }
    }
}

impl From<Ipv4Addr> for std::net::Ipv4Addr {
    #[inline]
    fn from(addr: Ipv4Addr) -> Self {
        Self::from(addr.octets)
    }
}

impl fmt::Display for Ipv4Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.octets;
        write!(f, "{a}.{b}.{c}.{d}")
    }
}

impl core::str::FromStr for Ipv4Addr {
    type Err = KnxError;

    /// Strict dotted quad: exactly four decimal octets.
    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split('.');
        let mut octets = [0u8; 4];

        for octet in &mut octets {
            let part = parts.next().ok_or_else(KnxError::invalid_endpoint)?;
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(KnxError::invalid_endpoint());
            }
            *octet = part.parse().map_err(|_overflow| KnxError::invalid_endpoint())?;
        }

        if parts.next().is_some() {
            return Err(KnxError::invalid_endpoint());
        }

        Ok(Self { octets })
    }
}

/// A UDP endpoint: IPv4 host plus port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Endpoint {
    /// IPv4 host
    pub host: Ipv4Addr,
    /// UDP port
    pub port: u16,
}

impl Endpoint {
    /// Create an endpoint from anything convertible to an address.
    pub fn new(host: impl Into<Ipv4Addr>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// A gateway on the standard KNXnet/IP port.
    pub fn gateway(host: impl Into<Ipv4Addr>) -> Self {
        Self::new(host, KNXNETIP_DEFAULT_PORT)
    }

    /// `0.0.0.0:0`: any interface, ephemeral port.
    pub const fn unspecified() -> Self {
        Self {
            host: Ipv4Addr::UNSPECIFIED,
            port: 0,
        }
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::unspecified()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl core::str::FromStr for Endpoint {
    type Err = KnxError;

    /// `a.b.c.d:port`, or a bare host which gets the KNXnet/IP default port.
    fn from_str(s: &str) -> Result<Self> {
        match s.split_once(':') {
            Some((host, port)) => Ok(Self {
                host: host.parse()?,
                port: port.parse().map_err(|_port| KnxError::invalid_endpoint())?,
            }),
            None => Ok(Self::gateway(s.parse::<Ipv4Addr>()?)),
        }
    }
}

impl From<Endpoint> for SocketAddr {
    fn from(ep: Endpoint) -> Self {
        SocketAddr::V4(SocketAddrV4::new(ep.host.into(), ep.port))
    }
}

impl TryFrom<SocketAddr> for Endpoint {
    type Error = KnxError;

    fn try_from(addr: SocketAddr) -> Result<Self> {
        match addr {
            SocketAddr::V4(v4) => Ok(Self::new(*v4.ip(), v4.port())),
            SocketAddr::V6(_) => Err(KnxError::invalid_endpoint()),
        }
    }
}
