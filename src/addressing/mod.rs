//! KNX addressing.
//!
//! KNX uses two kinds of 16-bit addresses:
//! - Individual addresses for physical devices (`area.line.device`)
//! - Group addresses for logical functions (`main/middle/sub` or `main/sub`)
//!
//! Textually the kinds are told apart by their separator: a `.` marks an
//! individual address. On the wire both are two big-endian bytes and the
//! kind travels in bit 7 of CEMI control field 2.

pub mod group;
pub mod individual;

pub use group::GroupAddress;
pub use individual::IndividualAddress;

use crate::error::{KnxError, Result};
use core::fmt;

/// Which of the two address spaces an address lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AddressKind {
    /// Physical device address
    Individual,
    /// Logical group address
    Group,
}

/// A destination on the bus, tagged with its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum KnxAddress {
    /// Physical device address
    Individual(IndividualAddress),
    /// Logical group address
    Group(GroupAddress),
}

impl KnxAddress {
    /// Interpret two wire bytes as an address of the given kind.
    pub const fn from_bytes(bytes: [u8; 2], kind: AddressKind) -> Self {
        match kind {
            AddressKind::Individual => Self::Individual(IndividualAddress::from_bytes(bytes)),
            AddressKind::Group => Self::Group(GroupAddress::from_bytes(bytes)),
        }
    }

    /// The two wire bytes.
    pub const fn to_bytes(self) -> [u8; 2] {
        match self {
            Self::Individual(a) => a.to_bytes(),
            Self::Group(g) => g.to_bytes(),
        }
    }

    /// Individual or group
    pub const fn kind(self) -> AddressKind {
        match self {
            Self::Individual(_) => AddressKind::Individual,
            Self::Group(_) => AddressKind::Group,
        }
    }

    /// Whether this is a group address
    pub const fn is_group(self) -> bool {
        matches!(self, Self::Group(_))
    }

    /// Text form; `three_level` selects the group style and is ignored for
    /// individual addresses.
    pub fn format(self, three_level: bool) -> Result<heapless::String<16>> {
        match self {
            Self::Individual(a) => a.format(),
            Self::Group(g) => g.format(three_level),
        }
    }
}

impl From<GroupAddress> for KnxAddress {
    fn from(addr: GroupAddress) -> Self {
        Self::Group(addr)
    }
}

impl From<IndividualAddress> for KnxAddress {
    fn from(addr: IndividualAddress) -> Self {
        Self::Individual(addr)
    }
}

impl fmt::Display for KnxAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Individual(a) => a.fmt(f),
            Self::Group(g) => g.fmt(f),
        }
    }
}

impl core::str::FromStr for KnxAddress {
    type Err = KnxError;

    fn from_str(s: &str) -> Result<Self> {
        if is_individual(s) {
            s.parse().map(Self::Individual)
        } else {
            s.parse().map(Self::Group)
        }
    }
}

/// Anything an operation can address: text or a typed address.
pub trait ToAddress {
    /// Resolve into a tagged address.
    fn to_address(&self) -> Result<KnxAddress>;
}

impl ToAddress for KnxAddress {
    fn to_address(&self) -> Result<KnxAddress> {
        Ok(*self)
    }
}

impl ToAddress for GroupAddress {
    fn to_address(&self) -> Result<KnxAddress> {
        Ok(KnxAddress::Group(*self))
    }
}

impl ToAddress for IndividualAddress {
    fn to_address(&self) -> Result<KnxAddress> {
        Ok(KnxAddress::Individual(*self))
    }
}

impl ToAddress for str {
    fn to_address(&self) -> Result<KnxAddress> {
        self.parse()
    }
}

impl ToAddress for String {
    fn to_address(&self) -> Result<KnxAddress> {
        self.parse()
    }
}

impl<T: ToAddress + ?Sized> ToAddress for &T {
    fn to_address(&self) -> Result<KnxAddress> {
        (**self).to_address()
    }
}

/// Textual heuristic: a `.` marks an individual address.
pub fn is_individual(text: &str) -> bool {
    text.contains('.')
}

/// One numeric address segment: ASCII digits only, no sign or spaces.
pub(crate) fn parse_segment<T: core::str::FromStr>(part: &str) -> Result<T> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(KnxError::invalid_address_format());
    }
    part.parse().map_err(|_range| KnxError::invalid_address_format())
}

/// Parse `a.l.d`, `m/m/s` or `m/s` into the two wire bytes.
pub fn parse_address(text: &str) -> Result<[u8; 2]> {
    text.parse::<KnxAddress>().map(KnxAddress::to_bytes)
}

/// Inverse of [`parse_address`].
pub fn format_address(bytes: [u8; 2], kind: AddressKind, three_level: bool) -> Result<heapless::String<16>> {
    KnxAddress::from_bytes(bytes, kind).format(three_level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address_by_separator() {
        assert_eq!(parse_address("1.1.5").unwrap(), [0x11, 0x05]);
        assert_eq!(parse_address("1/2/3").unwrap(), [0x0A, 0x03]);
        assert_eq!(parse_address("1/515").unwrap(), [0x0A, 0x03]);
        assert!(parse_address("1-2-3").unwrap_err().is_invalid_address_format());
    }

    #[test]
    fn test_format_address() {
        assert_eq!(format_address([0x0A, 0x03], AddressKind::Group, true).unwrap().as_str(), "1/2/3");
        assert_eq!(format_address([0x0A, 0x03], AddressKind::Group, false).unwrap().as_str(), "1/515");
        assert_eq!(format_address([0x0A, 0x03], AddressKind::Individual, true).unwrap().as_str(), "0.10.3");
    }

    #[test]
    fn test_signed_segments_rejected() {
        for text in ["+1/2/3", "1/+2/3", "+1/515", "+1.1.5", "1.1.+5", " 1/2/3"] {
            assert!(parse_address(text).unwrap_err().is_invalid_address_format(), "{text}");
        }
    }

    #[test]
    fn test_is_individual() {
        assert!(is_individual("1.1.1"));
        assert!(!is_individual("1/1/1"));
    }

    #[test]
    fn test_to_address() {
        let from_text = "2/1/10".to_address().unwrap();
        let typed = GroupAddress::new(2, 1, 10).unwrap().to_address().unwrap();
        assert_eq!(from_text, typed);
        assert!(from_text.is_group());
        assert_eq!(
            String::from("1.0.7").to_address().unwrap().kind(),
            AddressKind::Individual
        );
    }
}
