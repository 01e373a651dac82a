//! The datagram envelope.
//!
//! Every datagram opens with `06 10 ss ss ll ll`: header length, protocol
//! version 1.0, the service type and the total length (header included),
//! both big-endian. This module parses that header, builds outbound
//! datagrams, encodes HPAI endpoint blocks and classifies inbound traffic
//! by service type.
//!
//! ## Example
//!
//! ```rust
//! use knx_tunnel::protocol::constants::ServiceType;
//! use knx_tunnel::protocol::frame::{classify, FrameBuilder};
//!
//! let frame = FrameBuilder::new(ServiceType::TunnellingAck)
//!     .push(&[0x04, 0x12, 0x00, 0x00])?
//!     .finish()?;
//! assert_eq!(frame.as_slice(), &[0x06, 0x10, 0x04, 0x21, 0x00, 0x0A, 0x04, 0x12, 0x00, 0x00]);
//! assert_eq!(classify(&frame), Some(ServiceType::TunnellingAck));
//! # Ok::<(), knx_tunnel::KnxError>(())
//! ```

use crate::error::{KnxError, Result};
use crate::net::{Endpoint, Ipv4Addr};
use crate::protocol::constants::{
    ServiceType, HEADER_SIZE_10, IPV4_UDP, KNXNETIP_VERSION_10, MAX_FRAME_SIZE,
};

/// Owned buffer holding one outbound datagram.
pub type FrameBuf = heapless::Vec<u8, MAX_FRAME_SIZE>;

/// The fixed six-byte datagram header.
///
/// The service type is kept raw so that unknown services still parse and
/// can be logged by their code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnxnetIpHeader {
    /// Always 0x06
    pub header_length: u8,
    /// Always 0x10
    pub protocol_version: u8,
    /// Raw service type identifier
    pub service_type: u16,
    /// Header plus body, in bytes
    pub total_length: u16,
}

impl KnxnetIpHeader {
    /// Encoded size
    pub const SIZE: usize = 6;

    /// Header for a body of `body_length` bytes
    pub const fn new(service_type: ServiceType, body_length: u16) -> Self {
        Self {
            header_length: HEADER_SIZE_10,
            protocol_version: KNXNETIP_VERSION_10,
            service_type: service_type.to_u16(),
            total_length: Self::SIZE as u16 + body_length,
        }
    }

    /// Read the header at the start of `data`.
    ///
    /// Fails on short input, a header length other than 6, or a protocol
    /// version other than 1.0.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let Some(&[header_length, protocol_version, st_hi, st_lo, len_hi, len_lo]) =
            data.first_chunk::<6>()
        else {
            return Err(KnxError::buffer_too_small());
        };

        if header_length != HEADER_SIZE_10 {
            return Err(KnxError::invalid_frame());
        }
        if protocol_version != KNXNETIP_VERSION_10 {
            return Err(KnxError::unsupported_version());
        }

        Ok(Self {
            header_length,
            protocol_version,
            service_type: u16::from_be_bytes([st_hi, st_lo]),
            total_length: u16::from_be_bytes([len_hi, len_lo]),
        })
    }

    /// Write the header into the first six bytes of `buf`.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let out = buf
            .get_mut(..Self::SIZE)
            .ok_or_else(KnxError::buffer_too_small)?;

        out[0] = self.header_length;
        out[1] = self.protocol_version;
        out[2..4].copy_from_slice(&self.service_type.to_be_bytes());
        out[4..6].copy_from_slice(&self.total_length.to_be_bytes());

        Ok(Self::SIZE)
    }

    /// The known service type, if any
    pub const fn service(&self) -> Option<ServiceType> {
        ServiceType::from_u16(self.service_type)
    }

    /// Declared body length
    pub const fn body_length(&self) -> u16 {
        self.total_length.saturating_sub(Self::SIZE as u16)
    }
}

/// Borrowed view of one inbound datagram.
#[derive(Debug)]
pub struct KnxnetIpFrame<'a> {
    /// Received bytes, possibly longer than the datagram
    data: &'a [u8],
    /// Parsed header
    header: KnxnetIpHeader,
}

impl<'a> KnxnetIpFrame<'a> {
    /// Validate the header and the declared length
    ///
    /// # Errors
    ///
    /// Returns error if the header is invalid or the datagram is shorter
    /// than its declared total length.
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        let header = KnxnetIpHeader::parse(data)?;

        let total = usize::from(header.total_length);
        if total < KnxnetIpHeader::SIZE || data.len() < total {
            return Err(KnxError::invalid_frame());
        }

        Ok(Self { data, header })
    }

    /// Get the frame header
    pub const fn header(&self) -> &KnxnetIpHeader {
        &self.header
    }

    /// The known service type, if any
    pub const fn service_type(&self) -> Option<ServiceType> {
        self.header.service()
    }

    /// Body bytes after the header, bounded by the total length
    pub fn body(&self) -> &'a [u8] {
        self.data
            .get(KnxnetIpHeader::SIZE..usize::from(self.header.total_length))
            .unwrap_or_default()
    }

    /// The complete frame including header
    pub fn data(&self) -> &'a [u8] {
        self.data
            .get(..usize::from(self.header.total_length))
            .unwrap_or_default()
    }
}

/// Classify an inbound datagram by its service type bytes.
///
/// Returns `None` for datagrams that are malformed or carry a service this
/// client does not handle.
pub fn classify(datagram: &[u8]) -> Option<ServiceType> {
    KnxnetIpFrame::parse(datagram).ok()?.service_type()
}

/// Builder for outbound KNXnet/IP frames.
///
/// Body pieces are appended in order; [`finish`](Self::finish) writes the
/// header with the final total length.
#[derive(Debug)]
pub struct FrameBuilder {
    service_type: ServiceType,
    buf: FrameBuf,
}

impl FrameBuilder {
    /// Start a frame; the header is reserved and written on finish.
    pub fn new(service_type: ServiceType) -> Self {
        Self {
            service_type,
            buf: FrameBuf::from_iter([0u8; KnxnetIpHeader::SIZE]),
        }
    }

    /// Append raw body bytes
    pub fn push(mut self, bytes: &[u8]) -> Result<Self> {
        self.buf
            .extend_from_slice(bytes)
            .map_err(|_full| KnxError::buffer_too_small())?;
        Ok(self)
    }

    /// Append an HPAI block
    pub fn push_hpai(self, hpai: &Hpai) -> Result<Self> {
        let mut block = [0u8; Hpai::SIZE];
        hpai.encode(&mut block)?;
        self.push(&block)
    }

    /// Bytes written so far, header included
    pub fn size(&self) -> usize {
        self.buf.len()
    }

    /// Write the header and hand out the finished datagram
    pub fn finish(mut self) -> Result<FrameBuf> {
        let body_len = self.buf.len() - KnxnetIpHeader::SIZE;
        let body_len = u16::try_from(body_len).map_err(|_len| KnxError::buffer_too_small())?;
        KnxnetIpHeader::new(self.service_type, body_len).encode(&mut self.buf)?;
        Ok(self.buf)
    }
}

/// HPAI endpoint block: `08 01 a b c d pp pp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hpai {
    /// Block length, 8 for IPv4
    pub structure_length: u8,
    /// Host protocol code
    pub host_protocol: u8,
    /// IPv4 octets
    pub ip_address: [u8; 4],
    /// UDP port
    pub port: u16,
}

impl Hpai {
    /// Encoded size
    pub const SIZE: usize = 8;

    /// UDP over IPv4 block for the given host and port
    pub const fn new(ip_address: [u8; 4], port: u16) -> Self {
        Self {
            structure_length: Self::SIZE as u8,
            host_protocol: IPV4_UDP,
            ip_address,
            port,
        }
    }

    /// HPAI describing a local or remote endpoint
    pub const fn from_endpoint(endpoint: &Endpoint) -> Self {
        Self::new(endpoint.host.octets(), endpoint.port)
    }

    /// The endpoint this block describes
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(Ipv4Addr::from(self.ip_address), self.port)
    }

    /// Parse HPAI from bytes
    pub fn parse(data: &[u8]) -> Result<Self> {
        let Some(&[structure_length, host_protocol, a, b, c, d, p_hi, p_lo]) =
            data.first_chunk::<8>()
        else {
            return Err(KnxError::buffer_too_small());
        };

        if usize::from(structure_length) != Self::SIZE {
            return Err(KnxError::invalid_frame());
        }

        Ok(Self {
            structure_length,
            host_protocol,
            ip_address: [a, b, c, d],
            port: u16::from_be_bytes([p_hi, p_lo]),
        })
    }

    /// Write the block into `buf`
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let out = buf
            .get_mut(..Self::SIZE)
            .ok_or_else(KnxError::buffer_too_small)?;

        out[0] = self.structure_length;
        out[1] = self.host_protocol;
        out[2..6].copy_from_slice(&self.ip_address);
        out[6..8].copy_from_slice(&self.port.to_be_bytes());

        Ok(Self::SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_parse() {
        let data = [
            0x06, // header length
            0x10, // protocol version
            0x02, 0x07, // service type (CONNECTIONSTATE_REQUEST)
            0x00, 0x10, // total length (16 bytes)
        ];

        let header = KnxnetIpHeader::parse(&data).unwrap();
        assert_eq!(header.header_length, 0x06);
        assert_eq!(header.protocol_version, 0x10);
        assert_eq!(header.service(), Some(ServiceType::ConnectionstateRequest));
        assert_eq!(header.total_length, 16);
        assert_eq!(header.body_length(), 10);
    }

    #[test]
    fn test_header_rejects() {
        assert!(KnxnetIpHeader::parse(&[0x06, 0x10, 0x02]).is_err());
        assert_eq!(
            KnxnetIpHeader::parse(&[0x05, 0x10, 0x02, 0x05, 0x00, 0x06]).unwrap_err(),
            KnxError::invalid_frame()
        );
        assert_eq!(
            KnxnetIpHeader::parse(&[0x06, 0x20, 0x02, 0x05, 0x00, 0x06]).unwrap_err(),
            KnxError::unsupported_version()
        );
    }

    #[test]
    fn test_frame_builder() {
        let frame = FrameBuilder::new(ServiceType::DisconnectRequest)
            .push(&[0x12, 0x00])
            .unwrap()
            .push_hpai(&Hpai::new([10, 0, 0, 5], 3671))
            .unwrap()
            .finish()
            .unwrap();

        assert_eq!(
            frame.as_slice(),
            &[
                0x06, 0x10, // header
                0x02, 0x09, // DISCONNECT_REQUEST
                0x00, 0x10, // total length = 16
                0x12, 0x00, // channel, reserved
                0x08, 0x01, 10, 0, 0, 5, 0x0E, 0x57, // HPAI
            ]
        );
    }

    #[test]
    fn test_frame_builder_overflow() {
        let big = [0u8; MAX_FRAME_SIZE];
        assert_eq!(
            FrameBuilder::new(ServiceType::TunnellingRequest)
                .push(&big)
                .unwrap_err(),
            KnxError::buffer_too_small()
        );
    }

    #[test]
    fn test_hpai_parse() {
        let data = [
            0x08, // structure length
            0x01, // IPv4 UDP
            192, 168, 1, 100, // IP address
            0x0E, 0x57, // port 3671
        ];

        let hpai = Hpai::parse(&data).unwrap();
        assert_eq!(hpai.ip_address, [192, 168, 1, 100]);
        assert_eq!(hpai.port, 3671);
        assert_eq!(hpai.endpoint().to_string(), "192.168.1.100:3671");
    }

    #[test]
    fn test_frame_parse() {
        let data = [
            0x06, 0x10, // header
            0x02, 0x08, // CONNECTIONSTATE_RESPONSE
            0x00, 0x08, // total length = 8
            0x12, 0x00, // body
            0xFF, // trailing garbage beyond total length
        ];

        let frame = KnxnetIpFrame::parse(&data).unwrap();
        assert_eq!(frame.service_type(), Some(ServiceType::ConnectionstateResponse));
        assert_eq!(frame.body(), &[0x12, 0x00]);
        assert_eq!(frame.data().len(), 8);
    }

    #[test]
    fn test_frame_parse_truncated() {
        let data = [0x06, 0x10, 0x04, 0x20, 0x00, 0x15, 0x04];
        assert_eq!(KnxnetIpFrame::parse(&data).unwrap_err(), KnxError::invalid_frame());
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            classify(&[0x06, 0x10, 0x04, 0x21, 0x00, 0x0A, 0x04, 0x01, 0x00, 0x00]),
            Some(ServiceType::TunnellingAck)
        );
        // SEARCH_REQUEST is valid KNXnet/IP but not a tunneling service
        assert_eq!(classify(&[0x06, 0x10, 0x02, 0x01, 0x00, 0x06]), None);
        assert_eq!(classify(&[0xDE, 0xAD]), None);
    }
}
