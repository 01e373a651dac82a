//! Common External Message Interface (cEMI) frames.
//!
//! A cEMI frame carries one bus telegram inside a tunneling request. This
//! module parses inbound `L_Data` frames into an owned [`CemiFrame`] and
//! builds outbound `L_Data.req` frames for group writes and reads.
//!
//! ## Frame Structure
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │ Message Code (1 byte)                    │
//! ├──────────────────────────────────────────┤
//! │ Additional Info Length (1 byte)          │
//! ├──────────────────────────────────────────┤
//! │ Additional Info (variable)               │
//! ├──────────────────────────────────────────┤
//! │ Service Information (L_Data)             │
//! │  ├─ Control Field 1 (1 byte)             │
//! │  ├─ Control Field 2 (1 byte)             │
//! │  ├─ Source Address (2 bytes)             │
//! │  ├─ Destination Address (2 bytes)        │
//! │  ├─ Data Length (1 byte)                 │
//! │  └─ APDU (data length + 1 bytes)         │
//! └──────────────────────────────────────────┘
//! ```
//!
//! ## Payload length rule
//!
//! Outbound payloads follow one rule shared by the builder and the DPT
//! encoders: no bytes means an empty telegram; a single byte below `0x3F`
//! rides inline in the low six bits of the APCI byte; otherwise a first byte
//! below `0x3F` is OR'd into the APCI byte and the rest follow it, and a
//! first byte at or above `0x3F` is appended after the APCI byte whole.

use crate::addressing::{AddressKind, IndividualAddress, KnxAddress};
use crate::dpt::{self, DptValue};
use crate::error::{KnxError, Result};
use crate::protocol::constants::{CEMIMessageCode, Priority, MAX_PAYLOAD_LEN};
use crate::protocol::frame::FrameBuf;

/// Largest value carried inline in the APCI byte
const INLINE_LIMIT: u8 = 0x3F;

/// APCI bits of `A_GroupValue_Write`
const APCI_WRITE: u8 = 0x80;

/// Control Field 1 of `L_Data` frame
///
/// ```text
/// Bit 7: Frame Type (0=extended, 1=standard)
/// Bit 6: Reserved
/// Bit 5: Repeat (0=repeat, 1=do not repeat)
/// Bit 4: System Broadcast (0=system, 1=broadcast)
/// Bit 3-2: Priority (00=system, 01=normal, 10=urgent, 11=low)
/// Bit 1: Acknowledge Request (0=no ack, 1=ack requested)
/// Bit 0: Confirm (0=no error, 1=error)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlField1 {
    raw: u8,
}

impl From<u8> for ControlField1 {
    fn from(raw: u8) -> Self {
        Self { raw }
    }
}

impl From<ControlField1> for u8 {
    fn from(ctrl: ControlField1) -> u8 {
        ctrl.raw
    }
}

impl ControlField1 {
    /// Outbound requests: standard frame, no repeat, system broadcast,
    /// priority bits `11`, no ack (0xAC)
    pub const REQUEST: Self = Self::new(true, true, false, Priority::Low, false, false);

    /// Get raw byte value
    pub const fn raw(self) -> u8 {
        self.raw
    }

    /// Check if frame is standard (true) or extended (false)
    pub const fn is_standard_frame(self) -> bool {
        (self.raw & 0x80) != 0
    }

    /// Check if repeat flag is set (do not repeat if true)
    pub const fn do_not_repeat(self) -> bool {
        (self.raw & 0x20) != 0
    }

    /// Check if this is a broadcast rather than a system broadcast
    pub const fn is_broadcast(self) -> bool {
        (self.raw & 0x10) != 0
    }

    /// Get priority
    pub const fn priority(self) -> Priority {
        Priority::from_u8((self.raw >> 2) & 0x03)
    }

    /// Check if acknowledge is requested
    pub const fn ack_requested(self) -> bool {
        (self.raw & 0x02) != 0
    }

    /// Check if confirm error flag is set
    pub const fn has_error(self) -> bool {
        (self.raw & 0x01) != 0
    }

    /// Create a new Control Field 1
    pub const fn new(
        standard_frame: bool,
        do_not_repeat: bool,
        broadcast: bool,
        priority: Priority,
        ack_requested: bool,
        has_error: bool,
    ) -> Self {
        let mut raw = 0u8;

        if standard_frame {
            raw |= 0x80;
        }
        if do_not_repeat {
            raw |= 0x20;
        }
        if broadcast {
            raw |= 0x10;
        }
        raw |= (priority.to_u8() & 0x03) << 2;
        if ack_requested {
            raw |= 0x02;
        }
        if has_error {
            raw |= 0x01;
        }

        Self { raw }
    }
}

/// Control Field 2 of `L_Data` frame
///
/// ```text
/// Bit 7: Destination Address Type (0=individual, 1=group)
/// Bit 6-4: Hop Count (0-7)
/// Bit 3-0: Extended Frame Format (0000=standard)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlField2 {
    raw: u8,
}

impl From<u8> for ControlField2 {
    fn from(raw: u8) -> Self {
        Self { raw }
    }
}

impl From<ControlField2> for u8 {
    fn from(ctrl: ControlField2) -> u8 {
        ctrl.raw
    }
}

impl ControlField2 {
    /// Group destination, hop count 7 (0xF0)
    pub const GROUP: Self = Self::new(true, 7, 0);

    /// Individual destination, hop count 5 (0x50)
    pub const INDIVIDUAL: Self = Self::new(false, 5, 0);

    /// Field for a destination of the given kind
    pub const fn for_destination(kind: AddressKind) -> Self {
        match kind {
            AddressKind::Group => Self::GROUP,
            AddressKind::Individual => Self::INDIVIDUAL,
        }
    }

    /// Get raw byte value
    pub const fn raw(self) -> u8 {
        self.raw
    }

    /// Check if destination is group address (true) or individual (false)
    pub const fn is_group_address(self) -> bool {
        (self.raw & 0x80) != 0
    }

    /// Kind of the destination address
    pub const fn destination_kind(self) -> AddressKind {
        if self.is_group_address() {
            AddressKind::Group
        } else {
            AddressKind::Individual
        }
    }

    /// Get hop count (0-7)
    pub const fn hop_count(self) -> u8 {
        (self.raw >> 4) & 0x07
    }

    /// Get extended frame format
    pub const fn extended_format(self) -> u8 {
        self.raw & 0x0F
    }

    /// Create a new Control Field 2
    pub const fn new(is_group: bool, hop_count: u8, extended_format: u8) -> Self {
        let mut raw = 0u8;

        if is_group {
            raw |= 0x80;
        }
        raw |= (hop_count & 0x07) << 4;
        raw |= extended_format & 0x0F;

        Self { raw }
    }
}

/// What an inbound telegram reports, by its APCI type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TelegramKind {
    /// Group value write (type 8): something on the bus changed a value
    Event,
    /// Group value response (type 4): answer to a read
    Status,
}

impl TelegramKind {
    /// Map the 4-bit type of the APCI byte
    pub const fn from_type(ty: u8) -> Option<Self> {
        match ty {
            8 => Some(Self::Event),
            4 => Some(Self::Status),
            _ => None,
        }
    }
}

/// Data carried by a telegram, interpreted by its length.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TelegramData {
    /// Data length 0
    Empty,
    /// Six-bit value from the APCI byte (data length 1)
    Inline(u8),
    /// One data byte (data length 2)
    Byte(u8),
    /// Two data bytes read as a 2-byte float (data length 3)
    Float(f64),
    /// Anything longer, raw
    Bytes(Vec<u8>),
}

/// An owned, parsed cEMI `L_Data` frame.
#[derive(Debug, Clone, PartialEq)]
pub struct CemiFrame {
    /// Message code (0x29 for indications)
    pub message_code: u8,
    /// Additional information block, usually empty
    pub additional_info: Vec<u8>,
    /// Control field 1
    pub ctrl1: ControlField1,
    /// Control field 2
    pub ctrl2: ControlField2,
    /// Sender (always individual)
    pub source: IndividualAddress,
    /// Destination, kind selected by control field 2
    pub destination: KnxAddress,
    /// Destination formatted with the connection's group style
    pub destination_text: heapless::String<16>,
    /// Data length byte
    pub data_length: u8,
    /// TPCI/APCI bytes plus data (`data_length + 1` bytes)
    pub apdu: Vec<u8>,
    /// Interpreted data
    pub data: TelegramData,
}

impl CemiFrame {
    /// Bytes before the additional info
    const PREFIX: usize = 2;
    /// Control fields, addresses and the data length byte
    const SERVICE_INFO: usize = 7;

    /// Parse a cEMI frame; `three_level` picks how group destinations are
    /// rendered in [`destination_text`](Self::destination_text).
    ///
    /// # Errors
    ///
    /// `BufferTooSmall` when the fixed fields are cut short, `InvalidFrame`
    /// when the APDU is shorter than the data length announces.
    pub fn parse(bytes: &[u8], three_level: bool) -> Result<Self> {
        let Some(&[message_code, info_len]) = bytes.first_chunk::<2>() else {
            return Err(KnxError::buffer_too_small());
        };
        let info_end = Self::PREFIX + usize::from(info_len);
        let additional_info = bytes
            .get(Self::PREFIX..info_end)
            .ok_or_else(KnxError::invalid_frame)?
            .to_vec();

        let rest = &bytes[info_end..];
        let Some(&[c1, c2, s_hi, s_lo, d_hi, d_lo, data_length]) = rest.first_chunk::<7>() else {
            return Err(KnxError::buffer_too_small());
        };

        let ctrl2 = ControlField2::from(c2);
        let destination = KnxAddress::from_bytes([d_hi, d_lo], ctrl2.destination_kind());
        let apdu_len = usize::from(data_length) + 1;
        let apdu = rest
            .get(Self::SERVICE_INFO..Self::SERVICE_INFO + apdu_len)
            .ok_or_else(KnxError::invalid_frame)?
            .to_vec();

        Ok(Self {
            message_code,
            additional_info,
            ctrl1: ControlField1::from(c1),
            ctrl2,
            source: IndividualAddress::from_bytes([s_hi, s_lo]),
            destination,
            destination_text: destination.format(three_level)?,
            data_length,
            data: interpret(&apdu),
            apdu,
        })
    }

    /// Whether this is a data indication from the bus
    pub const fn is_indication(&self) -> bool {
        self.message_code == CEMIMessageCode::LDataInd.to_u8()
    }

    /// Bits 7-4 of the second APDU byte, or `None` for a one-byte APDU.
    pub fn apci_type(&self) -> Option<u8> {
        self.apdu.get(1).map(|apci| apci >> 4)
    }

    /// Event or status, when the type is one of the two
    pub fn telegram_kind(&self) -> Option<TelegramKind> {
        self.apci_type().and_then(TelegramKind::from_type)
    }

    /// Decode the APDU as the given datapoint type
    pub fn value(&self, dpt_id: &str) -> Result<DptValue> {
        dpt::decode(dpt_id, &self.apdu)
    }
}

fn interpret(apdu: &[u8]) -> TelegramData {
    match apdu {
        [_, apci] => TelegramData::Inline(apci & INLINE_LIMIT),
        [_, _, byte] => TelegramData::Byte(*byte),
        [_, _, hi, lo] => TelegramData::Float(dpt::dpt9::decode_float([*hi, *lo])),
        [_, _, rest @ ..] => TelegramData::Bytes(rest.to_vec()),
        _ => TelegramData::Empty,
    }
}

/// Data length byte for an outbound payload.
pub fn payload_length(payload: &[u8]) -> usize {
    match payload {
        [] => 0,
        [only] if *only < INLINE_LIMIT => 1,
        [first, ..] if *first < INLINE_LIMIT => payload.len(),
        _ => payload.len() + 1,
    }
}

/// Append the APCI byte and data for `payload` after a TPCI byte.
pub fn write_payload(out: &mut FrameBuf, payload: &[u8]) -> Result<()> {
    let (apci, rest) = match payload {
        [first, rest @ ..] if *first < INLINE_LIMIT => (APCI_WRITE | first, rest),
        _ => (APCI_WRITE, payload),
    };
    out.push(apci).map_err(|_full| KnxError::buffer_too_small())?;
    out.extend_from_slice(rest)
        .map_err(|_full| KnxError::buffer_too_small())
}

fn header(message_code: u8, dest: KnxAddress, data_length: u8) -> Result<FrameBuf> {
    let code = if message_code == 0 {
        CEMIMessageCode::LDataReq.to_u8()
    } else {
        message_code
    };
    let [d_hi, d_lo] = dest.to_bytes();
    let mut out = FrameBuf::new();
    out.extend_from_slice(&[
        code,
        0x00, // no additional info
        ControlField1::REQUEST.raw(),
        ControlField2::for_destination(dest.kind()).raw(),
        0x00, 0x00, // source, filled in by the gateway
        d_hi, d_lo,
        data_length,
    ])
    .map_err(|_full| KnxError::buffer_too_small())?;
    Ok(out)
}

/// Build an `L_Data` group value write.
///
/// A `message_code` of 0 selects `L_Data.req`.
///
/// # Errors
///
/// `InvalidDataValue` for an empty or oversized payload.
pub fn build_write(message_code: u8, dest: KnxAddress, payload: &[u8]) -> Result<FrameBuf> {
    if payload.is_empty() || payload.len() > MAX_PAYLOAD_LEN {
        return Err(KnxError::invalid_data_value());
    }
    let data_length =
        u8::try_from(payload_length(payload)).map_err(|_len| KnxError::invalid_data_value())?;

    let mut out = header(message_code, dest, data_length)?;
    out.push(0x00).map_err(|_full| KnxError::buffer_too_small())?; // TPCI
    write_payload(&mut out, payload)?;
    Ok(out)
}

/// Build an `L_Data` group value read (data length 1, APDU `00 00`).
pub fn build_read(message_code: u8, dest: KnxAddress) -> Result<FrameBuf> {
    let mut out = header(message_code, dest, 1)?;
    out.extend_from_slice(&[0x00, 0x00])
        .map_err(|_full| KnxError::buffer_too_small())?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addressing::GroupAddress;

    fn group(main: u8, middle: u8, sub: u8) -> KnxAddress {
        KnxAddress::Group(GroupAddress::new(main, middle, sub).unwrap())
    }

    #[test]
    fn test_control_field1_request() {
        let ctrl = ControlField1::REQUEST;
        assert_eq!(ctrl.raw(), 0xAC);
        assert!(ctrl.is_standard_frame());
        assert!(ctrl.do_not_repeat());
        assert!(!ctrl.is_broadcast());
        assert_eq!(ctrl.priority(), Priority::Low);
        assert!(!ctrl.ack_requested());
        assert!(!ctrl.has_error());
    }

    #[test]
    fn test_control_field1_raw() {
        // 0xBC: standard, do not repeat, broadcast, low priority
        let ctrl = ControlField1::from(0xBCu8);
        assert!(ctrl.is_standard_frame());
        assert!(ctrl.do_not_repeat());
        assert!(ctrl.is_broadcast());
        assert_eq!(ctrl.priority(), Priority::Low);
    }

    #[test]
    fn test_control_field2() {
        assert_eq!(ControlField2::GROUP.raw(), 0xF0);
        assert_eq!(ControlField2::INDIVIDUAL.raw(), 0x50);
        assert_eq!(ControlField2::GROUP.hop_count(), 7);
        assert!(!ControlField2::INDIVIDUAL.is_group_address());
        assert_eq!(ControlField2::from(0xE0).destination_kind(), AddressKind::Group);
    }

    #[test]
    fn test_parse_group_write_indication() {
        let data = [
            0x29, // L_Data.ind
            0x00, // no additional info
            0xBC, // control field 1
            0xE0, // control field 2: group, hop count 6
            0x11, 0x01, // source 1.1.1
            0x0A, 0x03, // destination 1/2/3
            0x01, // data length
            0x00, 0x81, // TPCI, APCI write + value 1
        ];

        let frame = CemiFrame::parse(&data, true).unwrap();
        assert!(frame.is_indication());
        assert!(frame.additional_info.is_empty());
        assert_eq!(frame.source, IndividualAddress::new(1, 1, 1).unwrap());
        assert_eq!(frame.destination, group(1, 2, 3));
        assert_eq!(frame.destination_text.as_str(), "1/2/3");
        assert_eq!(frame.apdu, vec![0x00, 0x81]);
        assert_eq!(frame.data, TelegramData::Inline(1));
        assert_eq!(frame.telegram_kind(), Some(TelegramKind::Event));
        assert_eq!(frame.value("1.001").unwrap(), DptValue::Bool(true));
    }

    #[test]
    fn test_parse_two_level_destination() {
        let data = [0x29, 0x00, 0xBC, 0xE0, 0x11, 0x01, 0x0A, 0x03, 0x01, 0x00, 0x41];
        let frame = CemiFrame::parse(&data, false).unwrap();
        assert_eq!(frame.destination_text.as_str(), "1/515");
        assert_eq!(frame.telegram_kind(), Some(TelegramKind::Status));
    }

    #[test]
    fn test_parse_with_additional_info() {
        let data = [
            0x29, 0x04, // 4 bytes of additional info
            0x03, 0x02, 0x00, 0x00, // additional info
            0xBC, 0x60, // individual destination
            0x11, 0x02, 0x11, 0x05, // 1.1.2 -> 1.1.5
            0x03, // data length
            0x00, 0x40, 0x0C, 0x38, // response, 2-byte float 21.6
        ];

        let frame = CemiFrame::parse(&data, true).unwrap();
        assert_eq!(frame.additional_info, vec![0x03, 0x02, 0x00, 0x00]);
        assert_eq!(frame.destination_text.as_str(), "1.1.5");
        assert!(matches!(frame.data, TelegramData::Float(x) if (x - 21.6).abs() < 1e-9));
        assert_eq!(frame.telegram_kind(), Some(TelegramKind::Status));
    }

    #[test]
    fn test_parse_byte_and_raw_data() {
        let byte = [0x29, 0x00, 0xBC, 0xE0, 0x11, 0x01, 0x0A, 0x03, 0x02, 0x00, 0x80, 0xC8];
        assert_eq!(CemiFrame::parse(&byte, true).unwrap().data, TelegramData::Byte(0xC8));

        let raw = [0x29, 0x00, 0xBC, 0xE0, 0x11, 0x01, 0x0A, 0x03, 0x04, 0x00, 0x80, 1, 2, 3];
        assert_eq!(
            CemiFrame::parse(&raw, true).unwrap().data,
            TelegramData::Bytes(vec![1, 2, 3])
        );
    }

    #[test]
    fn test_parse_read_has_no_kind() {
        let data = [0x29, 0x00, 0xBC, 0xE0, 0x11, 0x01, 0x0A, 0x03, 0x01, 0x00, 0x00];
        let frame = CemiFrame::parse(&data, true).unwrap();
        assert_eq!(frame.apci_type(), Some(0));
        assert_eq!(frame.telegram_kind(), None);
    }

    #[test]
    fn test_parse_other_types_are_dropped() {
        // 0x50, 0x90 and 0xA5 carry types 5, 9 and 10
        for (apci, ty) in [(0x50, 5), (0x90, 9), (0xA5, 10)] {
            let data = [0x29, 0x00, 0xBC, 0xE0, 0x11, 0x01, 0x0A, 0x03, 0x01, 0x00, apci];
            let frame = CemiFrame::parse(&data, true).unwrap();
            assert_eq!(frame.apci_type(), Some(ty));
            assert_eq!(frame.telegram_kind(), None);
        }
    }

    #[test]
    fn test_parse_truncated() {
        assert!(CemiFrame::parse(&[0x29], true).is_err());
        // additional info longer than the frame
        assert!(CemiFrame::parse(&[0x29, 0x08, 0x00], true).is_err());
        // data length 3 but only 2 APDU bytes
        let short = [0x29, 0x00, 0xBC, 0xE0, 0x11, 0x01, 0x0A, 0x03, 0x03, 0x00, 0x80];
        assert_eq!(CemiFrame::parse(&short, true).unwrap_err(), KnxError::invalid_frame());
    }

    #[test]
    fn test_payload_length() {
        assert_eq!(payload_length(&[]), 0);
        assert_eq!(payload_length(&[0x01]), 1);
        assert_eq!(payload_length(&[0x3F]), 2);
        assert_eq!(payload_length(&[0x00, 0x2A]), 2);
        assert_eq!(payload_length(&[0x40, 0x01]), 3);
    }

    #[test]
    fn test_build_write_inline() {
        let cemi = build_write(0, group(1, 2, 3), &[0x01]).unwrap();
        assert_eq!(
            cemi.as_slice(),
            &[0x11, 0x00, 0xAC, 0xF0, 0x00, 0x00, 0x0A, 0x03, 0x01, 0x00, 0x81]
        );
    }

    #[test]
    fn test_build_write_dpt9_payload() {
        let payload = dpt::encode("9.001", &DptValue::Float(21.6)).unwrap();
        let cemi = build_write(0, group(1, 2, 3), &payload).unwrap();
        // data length 3: TPCI 00, APCI 80, then the float
        assert_eq!(&cemi[8..], &[0x03, 0x00, 0x80, 0x0C, 0x38]);
    }

    #[test]
    fn test_build_write_large_first_byte() {
        let cemi = build_write(0x11, group(0, 0, 1), &[0xC8]).unwrap();
        assert_eq!(&cemi[8..], &[0x02, 0x00, 0x80, 0xC8]);
    }

    #[test]
    fn test_build_write_message_code_and_individual() {
        let dest = KnxAddress::Individual(IndividualAddress::new(1, 1, 5).unwrap());
        let cemi = build_write(0x29, dest, &[0x00]).unwrap();
        assert_eq!(cemi[0], 0x29);
        assert_eq!(cemi[3], 0x50);
        assert_eq!(&cemi[6..8], &[0x11, 0x05]);
    }

    #[test]
    fn test_build_write_rejects() {
        assert!(build_write(0, group(1, 2, 3), &[]).unwrap_err().is_invalid_data_value());
        let big = [0x40u8; MAX_PAYLOAD_LEN + 1];
        assert!(build_write(0, group(1, 2, 3), &big).unwrap_err().is_invalid_data_value());
        assert!(build_write(0, group(1, 2, 3), &big[..MAX_PAYLOAD_LEN]).is_ok());
    }

    #[test]
    fn test_build_read() {
        let cemi = build_read(0, group(1, 2, 3)).unwrap();
        assert_eq!(
            cemi.as_slice(),
            &[0x11, 0x00, 0xAC, 0xF0, 0x00, 0x00, 0x0A, 0x03, 0x01, 0x00, 0x00]
        );
    }
}
