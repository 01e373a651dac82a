//! DPT 5.xxx - 8-bit Unsigned Value (1 byte)
//!
//! Values are passed through unscaled: a percentage is the raw 0-100
//! number, not a 0-255 fraction. The byte follows the TPCI/APCI pair, so
//! the telegram has data length 2.
//!
//! ## Common Subtypes
//!
//! - **5.001** - Percentage (0-100)
//! - **5.004** - Percentage 0-255
//! - **5.005** - Ratio (0-255)
//! - **5.010** - Counter pulses (0-255)

use crate::dpt::{DptDecode, DptEncode, Payload};
use crate::error::{KnxError, Result};

/// DPT 5.xxx 8-bit unsigned types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dpt5 {
    /// DPT 5.001 - Percentage (0-100%)
    Percentage,
    /// DPT 5.004 - Percentage 0-255 (0-255)
    PercentU8,
    /// DPT 5.005 - Ratio (0-255)
    Ratio,
    /// DPT 5.010 - Counter pulses (0-255)
    Counter,
}

impl Dpt5 {
    const ALL: [Dpt5; 4] = [Dpt5::Percentage, Dpt5::PercentU8, Dpt5::Ratio, Dpt5::Counter];

    /// Get the DPT identifier string (e.g., "5.001")
    pub const fn identifier(&self) -> &'static str {
        match self {
            Dpt5::Percentage => "5.001",
            Dpt5::PercentU8 => "5.004",
            Dpt5::Ratio => "5.005",
            Dpt5::Counter => "5.010",
        }
    }

    /// Get the unit string for this DPT
    pub const fn unit(&self) -> &'static str {
        match self {
            Dpt5::Percentage => "%",
            Dpt5::PercentU8 | Dpt5::Ratio => "",
            Dpt5::Counter => "pulses",
        }
    }

    /// Largest accepted value
    pub const fn max(&self) -> u8 {
        match self {
            Dpt5::Percentage => 100,
            Dpt5::PercentU8 | Dpt5::Ratio | Dpt5::Counter => 255,
        }
    }

    /// Look up a subtype by its `5.xxx` identifier.
    pub fn from_identifier(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.identifier() == id)
    }
}

impl DptEncode<u8> for Dpt5 {
    /// `[0x00, value]`: the leading zero keeps small values out of the
    /// inline 6-bit field.
    fn encode(&self, value: u8) -> Result<Payload> {
        if value > self.max() {
            return Err(KnxError::invalid_data_value());
        }
        Ok(Payload::from_iter([0x00, value]))
    }
}

impl DptDecode<u8> for Dpt5 {
    fn decode(&self, apdu: &[u8]) -> Result<u8> {
        apdu.get(2).copied().ok_or_else(KnxError::invalid_dpt_data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode() {
        assert_eq!(Dpt5::Counter.encode(7).unwrap().as_slice(), &[0x00, 0x07]);
        assert_eq!(Dpt5::Percentage.encode(100).unwrap().as_slice(), &[0x00, 100]);
    }

    #[test]
    fn test_percentage_out_of_range() {
        assert!(Dpt5::Percentage.encode(101).unwrap_err().is_invalid_data_value());
        assert!(Dpt5::PercentU8.encode(255).is_ok());
    }

    #[test]
    fn test_decode_third_apdu_byte() {
        assert_eq!(Dpt5::Ratio.decode(&[0x00, 0x80, 0xBF]).unwrap(), 0xBF);
        assert!(Dpt5::Ratio.decode(&[0x00, 0x80]).is_err());
    }

    #[test]
    fn test_identifier() {
        assert_eq!(Dpt5::from_identifier("5.010"), Some(Dpt5::Counter));
        assert_eq!(Dpt5::Percentage.unit(), "%");
    }
}
