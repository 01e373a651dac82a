//! KNX group addresses.
//!
//! Group addresses name logical functions on the bus. Two textual styles
//! exist for the same 16 bits:
//! - 3-level: `main/middle/sub` (5/3/8 bits), the default
//! - 2-level: `main/sub` (5/11 bits)

use crate::error::{KnxError, Result};
use core::fmt;
use core::fmt::Write;

/// KNX group address, stored as its 16-bit wire value.
///
/// ```
/// use knx_tunnel::GroupAddress;
///
/// let addr: GroupAddress = "1/2/3".parse().unwrap();
/// assert_eq!(addr.raw(), 0x0A03);
/// assert_eq!(addr.format(false).unwrap().as_str(), "1/515");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GroupAddress {
    raw: u16,
}

impl GroupAddress {
    /// Maximum main group value (5 bits)
    pub const MAX_MAIN: u8 = 31;
    /// Maximum middle group value (3 bits)
    pub const MAX_MIDDLE: u8 = 7;
    /// Maximum sub group value (8 bits)
    pub const MAX_SUB: u8 = 255;
    /// Maximum sub value for 2-level format (11 bits)
    pub const MAX_SUB_2LEVEL: u16 = 2047;

    /// Create a 3-level address (`main/middle/sub`).
    pub fn new(main: u8, middle: u8, sub: u8) -> Result<Self> {
        if main > Self::MAX_MAIN || middle > Self::MAX_MIDDLE {
            return Err(KnxError::address_out_of_range());
        }
        Ok(Self {
            raw: (u16::from(main) << 11) | (u16::from(middle) << 8) | u16::from(sub),
        })
    }

    /// Create a 2-level address (`main/sub`).
    pub fn new_2level(main: u8, sub: u16) -> Result<Self> {
        if main > Self::MAX_MAIN || sub > Self::MAX_SUB_2LEVEL {
            return Err(KnxError::address_out_of_range());
        }
        Ok(Self {
            raw: (u16::from(main) << 11) | sub,
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

    /// Main group, top 5 bits (0-31).
    #[inline]
    pub const fn main(self) -> u8 {
        ((self.raw >> 11) & 0x1F) as u8
    }

    /// Middle group in 3-level style (0-7).
    #[inline]
    pub const fn middle(self) -> u8 {
        ((self.raw >> 8) & 0x07) as u8
    }

    /// Sub group in 3-level style (0-255).
    #[inline]
    pub const fn sub(self) -> u8 {
        (self.raw & 0xFF) as u8
    }

    /// Sub group in 2-level style (0-2047).
    #[inline]
    pub const fn sub_2level(self) -> u16 {
        self.raw & 0x07FF
    }

    /// Format in 3-level (`three_level == true`) or 2-level style.
    pub fn format(self, three_level: bool) -> Result<heapless::String<16>> {
        let mut s = heapless::String::new();
        self.write_notation(&mut s, three_level)
            .map_err(|_full| KnxError::buffer_too_small())?;
        Ok(s)
    }

    fn write_notation(self, out: &mut impl fmt::Write, three_level: bool) -> fmt::Result {
        if three_level {
            write!(out, "{}/{}/{}", self.main(), self.middle(), self.sub())
        } else {
            write!(out, "{}/{}", self.main(), self.sub_2level())
        }
    }
}

impl From<u16> for GroupAddress {
    #[inline]
    fn from(raw: u16) -> Self {
        Self { raw }
    }
}

impl From<GroupAddress> for u16 {
    #[inline]
    fn from(addr: GroupAddress) -> u16 {
        addr.raw
    }
}

impl fmt::Display for GroupAddress {
    /// 3-level style.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_notation(f, true)
    }
}

impl core::str::FromStr for GroupAddress {
    type Err = KnxError;

    /// Accepts `main/middle/sub` and `main/sub`. Any separator, segment
    /// count or range violation is an invalid format.
    fn from_str(s: &str) -> Result<Self> {
        let mut segments: heapless::Vec<u16, 3> = heapless::Vec::new();
        for part in s.split('/') {
            let value: u16 = super::parse_segment(part)?;
            segments
                .push(value)
                .map_err(|_full| KnxError::invalid_address_format())?;
        }

        let check_main = |value: u16| {
            u8::try_from(value)
                .ok()
                .filter(|m| *m <= Self::MAX_MAIN)
                .ok_or_else(KnxError::invalid_address_format)
        };

        match segments.as_slice() {
            [m, mid, sub] => {
                let middle = u8::try_from(*mid).map_err(|_range| KnxError::invalid_address_format())?;
                let sub = u8::try_from(*sub).map_err(|_range| KnxError::invalid_address_format())?;
                Self::new(check_main(*m)?, middle, sub).map_err(|_range| KnxError::invalid_address_format())
            }
            [m, sub] => Self::new_2level(check_main(*m)?, *sub).map_err(|_range| KnxError::invalid_address_format()),
            _ => Err(KnxError::invalid_address_format()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_3level_valid() {
        let addr = GroupAddress::new(1, 2, 3).unwrap();
        assert_eq!(addr.main(), 1);
        assert_eq!(addr.middle(), 2);
        assert_eq!(addr.sub(), 3);
        assert_eq!(addr.to_bytes(), [0x0A, 0x03]);
    }

    #[test]
    fn test_new_out_of_range() {
        assert!(GroupAddress::new(32, 0, 0).is_err());
        assert!(GroupAddress::new(0, 8, 0).is_err());
        assert!(GroupAddress::new_2level(0, 2048).is_err());
    }

    #[test]
    fn test_2level_layout() {
        // main in the top 5 bits, sub across the remaining 11
        let addr = GroupAddress::new_2level(1, 234).unwrap();
        assert_eq!(addr.raw(), 0x0800 | 234);
        assert_eq!(addr.format(false).unwrap().as_str(), "1/234");
    }

    #[test]
    fn test_format_both_styles() {
        let addr = GroupAddress::from_bytes([0xFF, 0xFF]);
        assert_eq!(addr.format(true).unwrap().as_str(), "31/7/255");
        assert_eq!(addr.format(false).unwrap().as_str(), "31/2047");
    }

    #[test]
    fn test_every_3level_address_round_trips() {
        for main in 0..=GroupAddress::MAX_MAIN {
            for middle in 0..=GroupAddress::MAX_MIDDLE {
                for sub in 0..=GroupAddress::MAX_SUB {
                    let text = format!("{main}/{middle}/{sub}");
                    let addr: GroupAddress = text.parse().unwrap();
                    assert_eq!(addr.format(true).unwrap().as_str(), text);
                }
            }
        }
    }

    #[test]
    fn test_from_str_invalid() {
        for text in ["", "1", "1/2/3/4", "a/b/c", "32/0/0", "1/8/0", "1/2/256", "1/2048", "32/5", "1.2.3", "1//3", "-1/2/3"] {
            let err = text.parse::<GroupAddress>().unwrap_err();
            assert!(err.is_invalid_address_format(), "{text}");
        }
    }
}
