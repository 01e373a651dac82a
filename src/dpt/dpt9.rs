//! DPT 9.xxx - 2-byte Float (16-bit floating point)
//!
//! ## Format
//!
//! ```text
//! Byte 0: SEEE EMMM
//! Byte 1: MMMM MMMM
//!
//! S = Sign bit
//! E = Exponent (4 bits, unsigned, 0-15)
//! M = Mantissa (11 bits, two's complement together with S)
//!
//! Value = (0.01 * M) * 2^E
//! ```
//!
//! ## Range
//!
//! - Min: -671088.64
//! - Max: +670760.96
//! - Resolution: 0.01 at exponent 0, doubling with every exponent step
//!
//! Inside an APDU the two bytes follow the TPCI/APCI pair, so a telegram
//! carrying a DPT 9 value has data length 3.

use crate::dpt::{DptDecode, DptEncode, Payload};
use crate::error::{KnxError, Result};

/// Smallest encodable value (mantissa -2048, exponent 15)
pub const MIN_VALUE: f64 = -671_088.64;
/// Largest encodable value (mantissa 2047, exponent 15)
pub const MAX_VALUE: f64 = 670_760.96;

const MANTISSA_MIN: f64 = -2048.0;
const MANTISSA_MAX: f64 = 2047.0;
const MAX_EXPONENT: i32 = 15;

/// DPT 9.xxx 2-byte float types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dpt9 {
    /// DPT 9.001 - Temperature (°C)
    Temperature,
    /// DPT 9.002 - Temperature difference (K)
    TemperatureDifference,
    /// DPT 9.004 - Illuminance (lux)
    Illuminance,
    /// DPT 9.005 - Wind speed (m/s)
    WindSpeed,
    /// DPT 9.006 - Pressure (Pa)
    Pressure,
    /// DPT 9.007 - Humidity (%)
    Humidity,
    /// DPT 9.008 - Air quality (ppm)
    AirQuality,
    /// DPT 9.020 - Voltage (mV)
    Voltage,
    /// DPT 9.021 - Current (mA)
    Current,
    /// DPT 9.024 - Power (kW)
    Power,
}

impl Dpt9 {
    const ALL: [Dpt9; 10] = [
        Dpt9::Temperature,
        Dpt9::TemperatureDifference,
        Dpt9::Illuminance,
        Dpt9::WindSpeed,
        Dpt9::Pressure,
        Dpt9::Humidity,
        Dpt9::AirQuality,
        Dpt9::Voltage,
        Dpt9::Current,
        Dpt9::Power,
    ];

    /// Get the DPT identifier string
    pub const fn identifier(&self) -> &'static str {
        match self {
            Dpt9::Temperature => "9.001",
            Dpt9::TemperatureDifference => "9.002",
            Dpt9::Illuminance => "9.004",
            Dpt9::WindSpeed => "9.005",
            Dpt9::Pressure => "9.006",
            Dpt9::Humidity => "9.007",
            Dpt9::AirQuality => "9.008",
            Dpt9::Voltage => "9.020",
            Dpt9::Current => "9.021",
            Dpt9::Power => "9.024",
        }
    }

    /// Get the unit string
    pub const fn unit(&self) -> &'static str {
        match self {
            Dpt9::Temperature => "°C",
            Dpt9::TemperatureDifference => "K",
            Dpt9::Illuminance => "lux",
            Dpt9::WindSpeed => "m/s",
            Dpt9::Pressure => "Pa",
            Dpt9::Humidity => "%",
            Dpt9::AirQuality => "ppm",
            Dpt9::Voltage => "mV",
            Dpt9::Current => "mA",
            Dpt9::Power => "kW",
        }
    }

    /// Look up a subtype by its `9.xxx` identifier.
    pub fn from_identifier(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.identifier() == id)
    }
}

impl DptEncode<f64> for Dpt9 {
    /// `[0x00, hi, lo]`: no inline bits, then the two float bytes.
    fn encode(&self, value: f64) -> Result<Payload> {
        let [hi, lo] = encode_float(value)?;
        Ok(Payload::from_iter([0x00, hi, lo]))
    }
}

impl DptDecode<f64> for Dpt9 {
    fn decode(&self, apdu: &[u8]) -> Result<f64> {
        match apdu.get(2..4) {
            Some(&[hi, lo]) => Ok(decode_float([hi, lo])),
            _ => Err(KnxError::invalid_dpt_data()),
        }
    }
}

/// Decode the two float bytes.
pub fn decode_float(bytes: [u8; 2]) -> f64 {
    let [b0, b1] = bytes;
    let negative = b0 >> 7 == 1;
    let exponent = i32::from((b0 & 0x78) >> 3);
    let mut mantissa = 256 * i32::from(b0 & 0x07) + i32::from(b1);
    if negative {
        // two's complement over 11 bits
        mantissa = !(mantissa ^ 2047);
    }
    ldexp(0.01 * f64::from(mantissa), exponent)
}

/// Encode a value into the two float bytes.
///
/// The exponent search walks down from the `frexp` exponent and keeps the
/// first candidate whose rounded mantissa fits 11 signed bits, which is the
/// smallest exponent (finest resolution) able to hold the value.
pub fn encode_float(value: f64) -> Result<[u8; 2]> {
    if !value.is_finite() || !(MIN_VALUE..=MAX_VALUE).contains(&value) {
        return Err(KnxError::invalid_data_value());
    }

    let (fraction, exponent) = frexp(value);
    let found = (exponent - MAX_EXPONENT..=exponent).rev().find_map(|shift| {
        let candidate = ldexp(100.0 * fraction, shift).round();
        (MANTISSA_MIN..=MANTISSA_MAX)
            .contains(&candidate)
            .then_some((candidate as i32, exponent - shift))
    });
    let Some((mantissa, scale)) = found else {
        return Err(KnxError::invalid_data_value());
    };

    let sign = u8::from(mantissa < 0);
    let bits = (mantissa & 0x07FF) as u16;
    let b0 = (sign << 7) | ((scale as u8) << 3) | ((bits >> 8) as u8 & 0x07);
    Ok([b0, (bits & 0xFF) as u8])
}

/// `mantissa * 2^exponent` without intermediate overflow for extreme
/// exponents.
pub fn ldexp(mantissa: f64, exponent: i32) -> f64 {
    if exponent > 1023 {
        mantissa * pow2(1023) * pow2(exponent - 1023)
    } else if exponent < -1074 {
        mantissa * pow2(-1074) * pow2(exponent + 1074)
    } else {
        mantissa * pow2(exponent)
    }
}

/// Split `value` into a fraction in `[0.5, 1)` (sign preserved) and a power
/// of two. Zero and non-finite values come back unchanged with exponent 0.
pub fn frexp(value: f64) -> (f64, i32) {
    if value == 0.0 || !value.is_finite() {
        return (value, 0);
    }
    let biased = ((value.to_bits() >> 52) & 0x7FF) as i32;
    if biased == 0 {
        // subnormal: scale into the normal range first
        let (fraction, exponent) = frexp(value * pow2(64));
        return (fraction, exponent - 64);
    }
    let exponent = biased - 1022;
    (ldexp(value, -exponent), exponent)
}

/// Exact power of two; saturates to infinity or zero outside f64 range.
fn pow2(exponent: i32) -> f64 {
    match exponent {
        1024.. => f64::INFINITY,
        -1022..=1023 => f64::from_bits(((exponent + 1023) as u64) << 52),
        -1074..=-1023 => f64::from_bits(1u64 << (exponent + 1074)),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Half a resolution step for the exponent the value encodes with.
    fn tolerance(value: f64) -> f64 {
        let [b0, _] = encode_float(value).unwrap();
        let exponent = i32::from((b0 & 0x78) >> 3);
        0.005 * f64::from(1 << exponent) + 1e-9
    }

    fn assert_round_trip(value: f64) {
        let decoded = decode_float(encode_float(value).unwrap());
        assert!(
            (decoded - value).abs() <= tolerance(value),
            "{value} decoded as {decoded}"
        );
    }

    #[test]
    fn test_decode_official_knx_example() {
        // 0x0AF0 -> exponent 1, mantissa 0x2F0 = 752 -> 15.04
        assert!((decode_float([0x0A, 0xF0]) - 15.04).abs() < 1e-9);
        // 0x0C38 -> exponent 1, mantissa 0x438 = 1080 -> 21.6
        assert!((decode_float([0x0C, 0x38]) - 21.6).abs() < 1e-9);
    }

    #[test]
    fn test_decode_negative() {
        // 0x8A24 -> sign, exponent 1, mantissa 0x224 -> -1500 * 0.01 * 2
        assert!((decode_float([0x8A, 0x24]) - -30.0).abs() < 1e-9);
        // mantissa -1 at exponent 0
        assert!((decode_float([0x87, 0xFF]) - -0.01).abs() < 1e-9);
    }

    #[test]
    fn test_encode_zero() {
        assert_eq!(encode_float(0.0).unwrap(), [0x00, 0x00]);
        assert_eq!(encode_float(-0.0).unwrap(), [0x00, 0x00]);
    }

    #[test]
    fn test_encode_uses_smallest_exponent() {
        // -12.3 fits exponent 0: mantissa -1230 -> 0x7FF & -1230 = 0x332
        assert_eq!(encode_float(-12.3).unwrap(), [0x83, 0x32]);
        // 21.6 needs exponent 1 (2160 > 2047)
        assert_eq!(encode_float(21.6).unwrap(), [0x0C, 0x38]);
    }

    #[test]
    fn test_range_extremes() {
        assert_eq!(encode_float(MAX_VALUE).unwrap(), [0x7F, 0xFF]);
        assert_eq!(encode_float(MIN_VALUE).unwrap(), [0xF8, 0x00]);
        assert!((decode_float([0x7F, 0xFF]) - MAX_VALUE).abs() < 1e-6);
        assert!((decode_float([0xF8, 0x00]) - MIN_VALUE).abs() < 1e-6);
    }

    #[test]
    fn test_representative_round_trips() {
        for value in [0.0, 23.45, -12.3, MAX_VALUE, MIN_VALUE, 0.01, -0.01, 1000.5, -273.0] {
            assert_round_trip(value);
        }
    }

    #[test]
    fn test_rejects_unrepresentable() {
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, 670_761.0, -671_089.0, 1e9] {
            assert!(encode_float(value).unwrap_err().is_invalid_data_value(), "{value}");
        }
    }

    #[test]
    fn test_tiny_values_encode_as_zero() {
        assert_eq!(encode_float(1e-6).unwrap(), [0x00, 0x00]);
        assert_eq!(encode_float(f64::MIN_POSITIVE / 4.0).unwrap(), [0x00, 0x00]);
    }

    #[test]
    fn test_frexp() {
        assert_eq!(frexp(8.0), (0.5, 4));
        assert_eq!(frexp(-3.0), (-0.75, 2));
        assert_eq!(frexp(0.0), (0.0, 0));
        // subnormal
        let (fraction, exponent) = frexp(f64::from_bits(1));
        assert_eq!(fraction, 0.5);
        assert_eq!(exponent, -1073);
    }

    #[test]
    fn test_ldexp_splits_extreme_exponents() {
        assert_eq!(ldexp(2f64.powi(-10), 1030), 2f64.powi(1020));
        assert_eq!(ldexp(0.75, 2), 3.0);
        assert_eq!(ldexp(2.0, -1075), f64::from_bits(1));
        assert_eq!(ldexp(1.0, 2000), f64::INFINITY);
    }

    #[test]
    fn test_apdu_decode() {
        // TPCI/APCI 0x00 0x80 then 21.6
        assert!((Dpt9::Temperature.decode(&[0x00, 0x80, 0x0C, 0x38]).unwrap() - 21.6).abs() < 1e-9);
        assert!(Dpt9::Temperature.decode(&[0x00, 0x80, 0x0C]).is_err());
    }

    #[test]
    fn test_trait_encode() {
        let payload = Dpt9::Temperature.encode(21.6).unwrap();
        assert_eq!(payload.as_slice(), &[0x00, 0x0C, 0x38]);
    }

    #[test]
    fn test_identifier_lookup() {
        assert_eq!(Dpt9::from_identifier("9.001"), Some(Dpt9::Temperature));
        assert_eq!(Dpt9::Humidity.unit(), "%");
        assert_eq!(Dpt9::from_identifier("9.999"), None);
    }
}
