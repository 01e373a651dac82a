//! KNX Datapoint Types (DPT)
//!
//! DPTs define how to interpret the data payload of a telegram.
//!
//! ## Supported DPT Families
//!
//! - **DPT 1.xxx** - Boolean (1 bit): switches, binary sensors
//! - **DPT 5.xxx** - 8-bit unsigned: percentages, counters
//! - **DPT 9.xxx** - 2-byte float: temperature, illuminance, humidity
//!
//! ## Conventions
//!
//! Decoders read from the whole APDU (TPCI/APCI bytes included) because
//! small values live in the low six bits of the APCI byte. Encoders produce
//! an outbound *payload* in the form the CEMI builder expects: a single
//! byte below `0x3F` is sent inline, anything else starts with the bits to
//! OR into the APCI byte followed by the data bytes.
//!
//! ```rust
//! use knx_tunnel::dpt::{self, DptValue};
//!
//! let payload = dpt::encode("9.001", &DptValue::Float(21.6)).unwrap();
//! assert_eq!(payload.as_slice(), &[0x00, 0x0C, 0x38]);
//!
//! let value = dpt::decode("1.001", &[0x00, 0x81]).unwrap();
//! assert_eq!(value, DptValue::Bool(true));
//! ```

use crate::error::{KnxError, Result};
use core::fmt;

pub mod dpt1;
pub mod dpt5;
pub mod dpt9;

// Re-export common types
#[doc(inline)]
pub use dpt1::Dpt1;
#[doc(inline)]
pub use dpt5::Dpt5;
#[doc(inline)]
pub use dpt9::Dpt9;

/// Encoded outbound payload; never longer than four bytes for the
/// supported families.
pub type Payload = heapless::Vec<u8, 4>;

/// Trait for encoding values to KNX payload bytes
pub trait DptEncode<T> {
    /// Encode a value into an outbound payload
    fn encode(&self, value: T) -> Result<Payload>;
}

/// Trait for decoding KNX data to values
pub trait DptDecode<T> {
    /// Decode a value from the full APDU
    fn decode(&self, apdu: &[u8]) -> Result<T>;
}

/// A decoded datapoint value.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DptValue {
    /// DPT 1.xxx
    Bool(bool),
    /// DPT 5.xxx
    Unsigned(u8),
    /// DPT 9.xxx
    Float(f64),
}

impl fmt::Display for DptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DptValue::Bool(b) => write!(f, "{b}"),
            DptValue::Unsigned(n) => write!(f, "{n}"),
            DptValue::Float(x) => write!(f, "{x:.2}"),
        }
    }
}

/// A datapoint type resolved from its identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dpt {
    /// DPT 1.xxx; subtype `None` for a bare family id
    Boolean(Option<Dpt1>),
    /// DPT 5.xxx
    Unsigned8(Option<Dpt5>),
    /// DPT 9.xxx
    Float16(Option<Dpt9>),
}

impl Dpt {
    /// Resolve `"1.001"`, `"DPT9.001"`, `"DPT-5"`, `"9"` and similar.
    ///
    /// Unknown subtypes of a supported family resolve to the family.
    pub fn from_id(id: &str) -> Result<Self> {
        let trimmed = id.trim();
        let stripped = trimmed
            .strip_prefix("DPT")
            .or_else(|| trimmed.strip_prefix("dpt"))
            .map_or(trimmed, |rest| rest.trim_start_matches(['-', ' ']));
        let family = stripped.split('.').next().unwrap_or_default();

        match family.parse::<u16>() {
            Ok(1) => Ok(Dpt::Boolean(Dpt1::from_identifier(stripped))),
            Ok(5) => Ok(Dpt::Unsigned8(Dpt5::from_identifier(stripped))),
            Ok(9) => Ok(Dpt::Float16(Dpt9::from_identifier(stripped))),
            _ => Err(KnxError::unsupported_dpt()),
        }
    }

    /// Decode a value from the full APDU.
    pub fn decode(self, apdu: &[u8]) -> Result<DptValue> {
        match self {
            Dpt::Boolean(sub) => sub.unwrap_or(Dpt1::Bool).decode(apdu).map(DptValue::Bool),
            Dpt::Unsigned8(sub) => sub.unwrap_or(Dpt5::Ratio).decode(apdu).map(DptValue::Unsigned),
            Dpt::Float16(sub) => sub.unwrap_or(Dpt9::Temperature).decode(apdu).map(DptValue::Float),
        }
    }

    /// Encode a value into an outbound payload.
    ///
    /// Values of the wrong shape are rejected, except that an integral
    /// float within range is accepted for DPT 5 and any unsigned for DPT 9.
    pub fn encode(self, value: &DptValue) -> Result<Payload> {
        match (self, *value) {
            (Dpt::Boolean(sub), DptValue::Bool(b)) => sub.unwrap_or(Dpt1::Bool).encode(b),
            (Dpt::Unsigned8(sub), DptValue::Unsigned(n)) => sub.unwrap_or(Dpt5::Ratio).encode(n),
            (Dpt::Unsigned8(sub), DptValue::Float(x))
                if x.fract() == 0.0 && (0.0..=255.0).contains(&x) =>
            {
                sub.unwrap_or(Dpt5::Ratio).encode(x as u8)
            }
            (Dpt::Float16(sub), DptValue::Float(x)) => sub.unwrap_or(Dpt9::Temperature).encode(x),
            (Dpt::Float16(sub), DptValue::Unsigned(n)) => {
                sub.unwrap_or(Dpt9::Temperature).encode(f64::from(n))
            }
            _ => Err(KnxError::invalid_data_value()),
        }
    }
}

/// Decode `apdu` as the datapoint type named by `dpt_id`.
pub fn decode(dpt_id: &str, apdu: &[u8]) -> Result<DptValue> {
    Dpt::from_id(dpt_id)?.decode(apdu)
}

/// Encode `value` as the datapoint type named by `dpt_id`.
pub fn encode(dpt_id: &str, value: &DptValue) -> Result<Payload> {
    Dpt::from_id(dpt_id)?.encode(value)
}

/// Encode a plain integer: one data byte up to 255, two big-endian bytes
/// up to 65535.
pub fn encode_unsigned(value: u32) -> Result<Payload> {
    match value {
        0..=0xFF => Ok(Payload::from_iter([0x00, value as u8])),
        0x100..=0xFFFF => {
            let [hi, lo] = (value as u16).to_be_bytes();
            Ok(Payload::from_iter([0x00, hi, lo]))
        }
        _ => Err(KnxError::invalid_data_value()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_id() {
        assert_eq!(Dpt::from_id("1.001").unwrap(), Dpt::Boolean(Some(Dpt1::Switch)));
        assert_eq!(Dpt::from_id("DPT9.001").unwrap(), Dpt::Float16(Some(Dpt9::Temperature)));
        assert_eq!(Dpt::from_id("DPT-5").unwrap(), Dpt::Unsigned8(None));
        assert_eq!(Dpt::from_id("1.999").unwrap(), Dpt::Boolean(None));
        assert!(Dpt::from_id("14.068").is_err());
        assert!(Dpt::from_id("").is_err());
    }

    #[test]
    fn test_decode_by_id() {
        assert_eq!(decode("1.001", &[0x00, 0x81]).unwrap(), DptValue::Bool(true));
        assert_eq!(decode("5", &[0x00, 0x80, 0x42]).unwrap(), DptValue::Unsigned(0x42));
        match decode("9.001", &[0x00, 0x80, 0x0C, 0x38]).unwrap() {
            DptValue::Float(x) => assert!((x - 21.6).abs() < 1e-9),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_encode_by_id() {
        assert_eq!(encode("1", &DptValue::Bool(true)).unwrap().as_slice(), &[0x01]);
        assert_eq!(encode("5.010", &DptValue::Unsigned(200)).unwrap().as_slice(), &[0x00, 200]);
        assert_eq!(encode("5.010", &DptValue::Float(12.0)).unwrap().as_slice(), &[0x00, 12]);
        assert_eq!(encode("9", &DptValue::Unsigned(0)).unwrap().as_slice(), &[0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_encode_shape_mismatch() {
        assert!(encode("1.001", &DptValue::Float(1.0)).unwrap_err().is_invalid_data_value());
        assert!(encode("5.001", &DptValue::Float(1.5)).unwrap_err().is_invalid_data_value());
        assert!(encode("9.001", &DptValue::Float(f64::NAN)).unwrap_err().is_invalid_data_value());
    }

    #[test]
    fn test_encode_unsigned() {
        assert_eq!(encode_unsigned(0x2A).unwrap().as_slice(), &[0x00, 0x2A]);
        assert_eq!(encode_unsigned(0x1234).unwrap().as_slice(), &[0x00, 0x12, 0x34]);
        assert!(encode_unsigned(65_536).unwrap_err().is_invalid_data_value());
    }
}
