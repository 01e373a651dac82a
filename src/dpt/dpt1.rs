//! One-bit booleans (DPT 1).
//!
//! The value travels in the low bits of the APCI byte (the second APDU
//! byte), so a boolean telegram has data length 1. Subtypes differ only in
//! how the two states are labelled.

use crate::dpt::{DptDecode, DptEncode, Payload};
use crate::error::{KnxError, Result};

/// Boolean subtypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dpt1 {
    /// `1.001`: off or on
    Switch,
    /// `1.002`: false or true
    Bool,
    /// `1.003`: disable or enable
    Enable,
    /// `1.005`: no alarm or alarm
    Alarm,
    /// `1.008`: up or down
    UpDown,
    /// `1.009`: open or close
    OpenClose,
    /// `1.010`: stop or start
    Start,
    /// `1.011`: inactive or active
    State,
}

impl DptEncode<bool> for Dpt1 {
    /// A single byte below 0x3F, carried inline in the APCI byte.
    fn encode(&self, value: bool) -> Result<Payload> {
        Ok(Payload::from_iter([u8::from(value)]))
    }
}

impl DptDecode<bool> for Dpt1 {
    fn decode(&self, apdu: &[u8]) -> Result<bool> {
        apdu.get(1)
            .map(|apci| apci & 0x3F != 0)
            .ok_or_else(KnxError::invalid_dpt_data)
    }
}

impl Dpt1 {
    const ALL: [Dpt1; 8] = [
        Dpt1::Switch,
        Dpt1::Bool,
        Dpt1::Enable,
        Dpt1::Alarm,
        Dpt1::UpDown,
        Dpt1::OpenClose,
        Dpt1::Start,
        Dpt1::State,
    ];

    /// Dotted identifier such as `1.001`.
    pub const fn identifier(&self) -> &'static str {
        match self {
            Dpt1::Switch => "1.001",
            Dpt1::Bool => "1.002",
            Dpt1::Enable => "1.003",
            Dpt1::Alarm => "1.005",
            Dpt1::UpDown => "1.008",
            Dpt1::OpenClose => "1.009",
            Dpt1::Start => "1.010",
            Dpt1::State => "1.011",
        }
    }

    /// State labels as `(false, true)`.
    pub const fn labels(&self) -> (&'static str, &'static str) {
        match self {
            Dpt1::Switch => ("off", "on"),
            Dpt1::Bool => ("false", "true"),
            Dpt1::Enable => ("disable", "enable"),
            Dpt1::Alarm => ("no alarm", "alarm"),
            Dpt1::UpDown => ("up", "down"),
            Dpt1::OpenClose => ("open", "close"),
            Dpt1::Start => ("stop", "start"),
            Dpt1::State => ("inactive", "active"),
        }
    }

    /// Look up a subtype by its `1.xxx` identifier.
    pub fn from_identifier(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.identifier() == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode() {
        assert_eq!(Dpt1::Switch.encode(true).unwrap().as_slice(), &[0x01]);
        assert_eq!(Dpt1::Switch.encode(false).unwrap().as_slice(), &[0x00]);
    }

    #[test]
    fn test_decode_from_apci_byte() {
        // GroupValueWrite with value 1
        assert!(Dpt1::Switch.decode(&[0x00, 0x81]).unwrap());
        assert!(!Dpt1::Switch.decode(&[0x00, 0x80]).unwrap());
        // GroupValueResponse with value 1
        assert!(Dpt1::Switch.decode(&[0x00, 0x41]).unwrap());
    }

    #[test]
    fn test_decode_short_apdu() {
        assert!(Dpt1::Switch.decode(&[0x00]).is_err());
        assert!(Dpt1::Switch.decode(&[]).is_err());
    }

    #[test]
    fn test_labels() {
        assert_eq!(Dpt1::OpenClose.labels(), ("open", "close"));
        assert_eq!(Dpt1::from_identifier("1.001"), Some(Dpt1::Switch));
        assert_eq!(Dpt1::from_identifier("1.099"), None);
    }
}
