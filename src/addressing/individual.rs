//! KNX individual addresses.
//!
//! Individual addresses identify physical devices: `area.line.device` with
//! 4/4/8 bits. The source of every CEMI frame is an individual address; the
//! destination is one when bit 7 of control field 2 is clear.

use crate::error::{KnxError, Result};
use core::fmt;
use core::fmt::Write;

/// KNX individual address (`area.line.device`).
///
/// ```
/// use knx_tunnel::IndividualAddress;
///
/// let addr: IndividualAddress = "1.1.5".parse().unwrap();
/// assert_eq!(addr.raw(), 0x1105);
/// assert_eq!(addr.to_string(), "1.1.5");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IndividualAddress {
    raw: u16,
}

impl IndividualAddress {
    /// Maximum area value (4 bits)
    pub const MAX_AREA: u8 = 15;
    /// Maximum line value (4 bits)
    pub const MAX_LINE: u8 = 15;
    /// Maximum device value (8 bits)
    pub const MAX_DEVICE: u8 = 255;

    /// Create from components; `area` and `line` must fit in 4 bits.
    pub fn new(area: u8, line: u8, device: u8) -> Result<Self> {
        if area > Self::MAX_AREA || line > Self::MAX_LINE {
            return Err(KnxError::address_out_of_range());
        }
        Ok(Self {
            raw: (u16::from(area) << 12) | (u16::from(line) << 8) | u16::from(device),
        })
    }

    /// Build from the two wire bytes (big-endian).
    #[inline]
    pub const fn from_bytes(bytes: [u8; 2]) -> Self {
        Self {
            raw: u16::from_be_bytes(bytes),
        }
    }

    /// The two wire bytes (big-endian).
    #[inline]
    pub const fn to_bytes(self) -> [u8; 2] {
        self.raw.to_be_bytes()
    }

    /// Get the raw u16 representation of the address.
    #[inline]
    pub const fn raw(self) -> u16 {
        self.raw
    }

    /// Area component (0-15).
    #[inline]
    pub const fn area(self) -> u8 {
        (self.raw >> 12) as u8
    }

    /// Line component (0-15).
    #[inline]
    pub const fn line(self) -> u8 {
        ((self.raw >> 8) & 0x0F) as u8
    }

    /// Device component (0-255).
    #[inline]
    pub const fn device(self) -> u8 {
        (self.raw & 0xFF) as u8
    }

    /// Dotted text as a fixed-capacity string.
    pub fn format(self) -> Result<heapless::String<16>> {
        let mut s = heapless::String::new();
        write!(s, "{self}").map_err(|_full| KnxError::buffer_too_small())?;
        Ok(s)
    }
}

impl fmt::Display for IndividualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.area(), self.line(), self.device())
    }
}

impl From<u16> for IndividualAddress {
    #[inline]
    fn from(raw: u16) -> Self {
        Self { raw }
    }
}

impl From<IndividualAddress> for u16 {
    #[inline]
    fn from(addr: IndividualAddress) -> u16 {
        addr.raw
    }
}

impl core::str::FromStr for IndividualAddress {
    type Err = KnxError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split('.');
        let mut next = || {
            parts
                .next()
                .ok_or_else(KnxError::invalid_address_format)
                .and_then(super::parse_segment::<u8>)
        };
        let (area, line, device) = (next()?, next()?, next()?);
        if parts.next().is_some() {
            return Err(KnxError::invalid_address_format());
        }
        Self::new(area, line, device).map_err(|_range| KnxError::invalid_address_format())
    }
}
