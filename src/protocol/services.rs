//! KNXnet/IP service request and response codecs.
//!
//! Builders produce complete datagrams in a [`FrameBuf`]; parsers take the
//! frame *body* (everything after the 6-byte header).
//!
//! Connect, connection-state and disconnect run on the control endpoint;
//! tunneling requests and their acks carry the telegrams. This client uses
//! one local endpoint for both.
//!
//! ## Example
//!
//! ```rust
//! use knx_tunnel::protocol::frame::Hpai;
//! use knx_tunnel::protocol::services::ConnectRequest;
//!
//! let local = Hpai::new([10, 0, 0, 5], 3671);
//! let frame = ConnectRequest::new(local, local).build()?;
//! assert_eq!(frame.len(), 26);
//! # Ok::<(), knx_tunnel::KnxError>(())
//! ```

use crate::error::{KnxError, Result};
use crate::protocol::constants::{
    ServiceType, E_CONNECTION_ID, E_NO_ERROR, E_NO_MORE_CONNECTIONS, TUNNEL_CONNECTION,
    TUNNEL_LINKLAYER,
};
use crate::protocol::frame::{FrameBuf, FrameBuilder, Hpai};

/// CRI block requesting a link-layer tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionRequestInfo {
    /// 0x04, tunnel connection
    pub connection_type: u8,
    /// 0x02, link layer
    pub knx_layer: u8,
}

impl ConnectionRequestInfo {
    /// Size of the CRI block
    pub const SIZE: usize = 4;

    /// CRI for a tunnel on the link layer
    pub const fn tunnel_link_layer() -> Self {
        Self {
            connection_type: TUNNEL_CONNECTION,
            knx_layer: TUNNEL_LINKLAYER,
        }
    }

    /// Wire form: length, type, layer, reserved
    pub const fn to_bytes(&self) -> [u8; 4] {
        [Self::SIZE as u8, self.connection_type, self.knx_layer, 0x00]
    }
}

/// Service 0x0205, `CONNECT_REQUEST`.
#[derive(Debug, Clone, Copy)]
pub struct ConnectRequest {
    /// Where the gateway sends control responses
    pub control_endpoint: Hpai,
    /// Where the gateway sends tunneled telegrams
    pub data_endpoint: Hpai,
    /// Requested connection type
    pub cri: ConnectionRequestInfo,
}

impl ConnectRequest {
    /// New `CONNECT_REQUEST`
    pub const fn new(control_endpoint: Hpai, data_endpoint: Hpai) -> Self {
        Self {
            control_endpoint,
            data_endpoint,
            cri: ConnectionRequestInfo::tunnel_link_layer(),
        }
    }

    /// Build the complete 26-byte frame
    pub fn build(&self) -> Result<FrameBuf> {
        FrameBuilder::new(ServiceType::ConnectRequest)
            .push_hpai(&self.control_endpoint)?
            .push_hpai(&self.data_endpoint)?
            .push(&self.cri.to_bytes())?
            .finish()
    }
}

/// Service 0x0206, `CONNECT_RESPONSE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectResponse {
    /// Channel assigned by the gateway
    pub channel_id: u8,
    /// Status code
    pub status: u8,
    /// Data endpoint assigned by the gateway, when present
    pub data_endpoint: Option<Hpai>,
}

impl ConnectResponse {
    /// Parse from frame body.
    ///
    /// Only channel and status are required; rejections usually omit the
    /// endpoint block.
    pub fn parse(body: &[u8]) -> Result<Self> {
        let Some(&[channel_id, status]) = body.first_chunk::<2>() else {
            return Err(KnxError::buffer_too_small());
        };

        Ok(Self {
            channel_id,
            status,
            data_endpoint: body.get(2..).and_then(|rest| Hpai::parse(rest).ok()),
        })
    }

    /// Gateway has no free tunneling slot (channel 0, status 0x24)
    pub const fn is_no_more_connections(&self) -> bool {
        self.channel_id == 0 && self.status == E_NO_MORE_CONNECTIONS
    }
}

/// Service 0x0207, `CONNECTIONSTATE_REQUEST`.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionStateRequest {
    /// Channel assigned by the gateway
    pub channel_id: u8,
    /// Our control endpoint
    pub control_endpoint: Hpai,
}

impl ConnectionStateRequest {
    /// New `CONNECTIONSTATE_REQUEST`
    pub const fn new(channel_id: u8, control_endpoint: Hpai) -> Self {
        Self {
            channel_id,
            control_endpoint,
        }
    }

    /// Build the complete 16-byte frame
    pub fn build(&self) -> Result<FrameBuf> {
        FrameBuilder::new(ServiceType::ConnectionstateRequest)
            .push(&[self.channel_id, 0x00])?
            .push_hpai(&self.control_endpoint)?
            .finish()
    }
}

/// Service 0x0208, `CONNECTIONSTATE_RESPONSE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStateResponse {
    /// Channel assigned by the gateway
    pub channel_id: u8,
    /// Status code
    pub status: u8,
}

impl ConnectionStateResponse {
    /// Read from the datagram body
    pub fn parse(body: &[u8]) -> Result<Self> {
        let Some(&[channel_id, status]) = body.first_chunk::<2>() else {
            return Err(KnxError::buffer_too_small());
        };
        Ok(Self { channel_id, status })
    }

    /// Anything but "unknown channel" confirms liveness
    pub const fn is_alive(&self) -> bool {
        self.status != E_CONNECTION_ID
    }
}

/// Service 0x0209, `DISCONNECT_REQUEST`.
#[derive(Debug, Clone, Copy)]
pub struct DisconnectRequest {
    /// Channel assigned by the gateway
    pub channel_id: u8,
    /// Our control endpoint
    pub control_endpoint: Hpai,
}

impl DisconnectRequest {
    /// New `DISCONNECT_REQUEST`
    pub const fn new(channel_id: u8, control_endpoint: Hpai) -> Self {
        Self {
            channel_id,
            control_endpoint,
        }
    }

    /// Build the complete 16-byte frame
    pub fn build(&self) -> Result<FrameBuf> {
        FrameBuilder::new(ServiceType::DisconnectRequest)
            .push(&[self.channel_id, 0x00])?
            .push_hpai(&self.control_endpoint)?
            .finish()
    }

    /// Parse a gateway-initiated request from the frame body
    pub fn parse(body: &[u8]) -> Result<Self> {
        let Some(&[channel_id, _reserved]) = body.first_chunk::<2>() else {
            return Err(KnxError::buffer_too_small());
        };
        let control_endpoint = match body.get(2..) {
            Some(rest) if !rest.is_empty() => Hpai::parse(rest)?,
            _ => Hpai::new([0; 4], 0),
        };
        Ok(Self {
            channel_id,
            control_endpoint,
        })
    }
}

/// Service 0x020A, `DISCONNECT_RESPONSE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisconnectResponse {
    /// Channel assigned by the gateway
    pub channel_id: u8,
    /// Status code
    pub status: u8,
}

impl DisconnectResponse {
    /// Acknowledge a disconnect for `channel_id`
    pub const fn ok(channel_id: u8) -> Self {
        Self {
            channel_id,
            status: E_NO_ERROR,
        }
    }

    /// Build the complete 8-byte frame
    pub fn build(&self) -> Result<FrameBuf> {
        FrameBuilder::new(ServiceType::DisconnectResponse)
            .push(&[self.channel_id, self.status])?
            .finish()
    }

    /// Read from the datagram body
    pub fn parse(body: &[u8]) -> Result<Self> {
        let Some(&[channel_id, status]) = body.first_chunk::<2>() else {
            return Err(KnxError::buffer_too_small());
        };
        Ok(Self { channel_id, status })
    }
}

/// Connection header for tunneling requests and acks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionHeader {
    /// Channel assigned by the gateway
    pub channel_id: u8,
    /// Sequence counter
    pub sequence_counter: u8,
}

impl ConnectionHeader {
    /// Size of the connection header
    pub const SIZE: usize = 4;

    /// Header for `channel_id` and `sequence_counter`
    pub const fn new(channel_id: u8, sequence_counter: u8) -> Self {
        Self {
            channel_id,
            sequence_counter,
        }
    }

    /// Wire form: length, channel, sequence, reserved
    pub const fn to_bytes(&self) -> [u8; 4] {
        [Self::SIZE as u8, self.channel_id, self.sequence_counter, 0x00]
    }

    /// Decode from bytes
    pub fn decode(data: &[u8]) -> Result<Self> {
        let Some(&[len, channel_id, sequence_counter, _reserved]) = data.first_chunk::<4>() else {
            return Err(KnxError::buffer_too_small());
        };
        if usize::from(len) != Self::SIZE {
            return Err(KnxError::invalid_frame());
        }
        Ok(Self {
            channel_id,
            sequence_counter,
        })
    }
}

/// Service 0x0420, `TUNNELING_REQUEST`.
#[derive(Debug)]
pub struct TunnelingRequest<'a> {
    /// Connection header
    pub connection_header: ConnectionHeader,
    /// cEMI frame data
    pub cemi_data: &'a [u8],
}

impl<'a> TunnelingRequest<'a> {
    /// New `TUNNELING_REQUEST`
    pub const fn new(connection_header: ConnectionHeader, cemi_data: &'a [u8]) -> Self {
        Self {
            connection_header,
            cemi_data,
        }
    }

    /// Encode as a full datagram
    pub fn build(&self) -> Result<FrameBuf> {
        FrameBuilder::new(ServiceType::TunnellingRequest)
            .push(&self.connection_header.to_bytes())?
            .push(self.cemi_data)?
            .finish()
    }

    /// Read from the datagram body
    pub fn parse(body: &'a [u8]) -> Result<Self> {
        let connection_header = ConnectionHeader::decode(body)?;
        Ok(Self {
            connection_header,
            cemi_data: body.get(ConnectionHeader::SIZE..).unwrap_or_default(),
        })
    }
}

/// Service 0x0421, `TUNNELING_ACK`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TunnelingAck {
    /// Connection header (status travels in its reserved byte)
    pub connection_header: ConnectionHeader,
    /// Status code (0 = OK)
    pub status: u8,
}

impl TunnelingAck {
    /// New `TUNNELING_ACK`
    pub const fn new(connection_header: ConnectionHeader, status: u8) -> Self {
        Self {
            connection_header,
            status,
        }
    }

    /// Build the complete 10-byte frame
    pub fn build(&self) -> Result<FrameBuf> {
        let mut header = self.connection_header.to_bytes();
        header[3] = self.status;
        FrameBuilder::new(ServiceType::TunnellingAck)
            .push(&header)?
            .finish()
    }

    /// Read from the datagram body
    pub fn parse(body: &[u8]) -> Result<Self> {
        let connection_header = ConnectionHeader::decode(body)?;
        Ok(Self {
            connection_header,
            status: body[3],
        })
    }

    /// Status is `E_NO_ERROR`
    pub const fn is_ok(&self) -> bool {
        self.status == E_NO_ERROR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_request_build() {
        let local = Hpai::new([10, 0, 0, 5], 3671);
        let frame = ConnectRequest::new(local, local).build().unwrap();

        assert_eq!(
            frame.as_slice(),
            &[
                0x06, 0x10, 0x02, 0x05, 0x00, 0x1A, // header, total 26
                0x08, 0x01, 10, 0, 0, 5, 0x0E, 0x57, // control HPAI
                0x08, 0x01, 10, 0, 0, 5, 0x0E, 0x57, // data HPAI
                0x04, 0x04, 0x02, 0x00, // CRI: tunnel, link layer
            ]
        );
    }

    #[test]
    fn test_connect_response_parse() {
        let body = [
            0x12, 0x00, // channel, status
            0x08, 0x01, 192, 168, 1, 10, 0x0E, 0x57, // data endpoint
            0x04, 0x04, 0x11, 0x05, // CRD
        ];
        let resp = ConnectResponse::parse(&body).unwrap();
        assert_eq!(resp.channel_id, 0x12);
        assert_eq!(resp.status, 0x00);
        assert_eq!(resp.data_endpoint.map(|h| h.port), Some(3671));
        assert!(!resp.is_no_more_connections());
    }

    #[test]
    fn test_connect_response_rejection() {
        let resp = ConnectResponse::parse(&[0x00, 0x24]).unwrap();
        assert!(resp.is_no_more_connections());
        assert_eq!(resp.data_endpoint, None);
        assert!(ConnectResponse::parse(&[0x00]).is_err());
    }

    #[test]
    fn test_connection_state_request() {
        let frame = ConnectionStateRequest::new(0x12, Hpai::new([10, 0, 0, 5], 3671))
            .build()
            .unwrap();
        assert_eq!(
            frame.as_slice(),
            &[0x06, 0x10, 0x02, 0x07, 0x00, 0x10, 0x12, 0x00, 0x08, 0x01, 10, 0, 0, 5, 0x0E, 0x57]
        );
    }

    #[test]
    fn test_connection_state_response() {
        assert!(ConnectionStateResponse::parse(&[0x12, 0x00]).unwrap().is_alive());
        // any status other than E_CONNECTION_ID confirms the gateway is there
        assert!(ConnectionStateResponse::parse(&[0x12, 0x26]).unwrap().is_alive());
        assert!(!ConnectionStateResponse::parse(&[0x12, 0x21]).unwrap().is_alive());
    }

    #[test]
    fn test_disconnect_request_roundtrip_body() {
        let frame = DisconnectRequest::new(0x07, Hpai::new([192, 168, 1, 10], 3671))
            .build()
            .unwrap();
        let parsed = DisconnectRequest::parse(&frame[6..]).unwrap();
        assert_eq!(parsed.channel_id, 0x07);
        assert_eq!(parsed.control_endpoint.ip_address, [192, 168, 1, 10]);
    }

    #[test]
    fn test_disconnect_response_build() {
        let frame = DisconnectResponse::ok(0x12).build().unwrap();
        assert_eq!(frame.as_slice(), &[0x06, 0x10, 0x02, 0x0A, 0x00, 0x08, 0x12, 0x00]);
    }

    #[test]
    fn test_connection_header() {
        let bytes = ConnectionHeader::new(5, 10).to_bytes();
        assert_eq!(bytes, [0x04, 5, 10, 0x00]);

        let decoded = ConnectionHeader::decode(&bytes).unwrap();
        assert_eq!(decoded.channel_id, 5);
        assert_eq!(decoded.sequence_counter, 10);

        assert!(ConnectionHeader::decode(&[0x05, 5, 10, 0x00]).is_err());
    }

    #[test]
    fn test_tunneling_request_parse() {
        let body = [0x04, 0x12, 0x07, 0x00, 0x29, 0x00];
        let req = TunnelingRequest::parse(&body).unwrap();
        assert_eq!(req.connection_header, ConnectionHeader::new(0x12, 0x07));
        assert_eq!(req.cemi_data, &[0x29, 0x00]);
    }

    #[test]
    fn test_tunneling_ack() {
        let ack = TunnelingAck::new(ConnectionHeader::new(0x12, 0x00), 0);
        let frame = ack.build().unwrap();

        assert_eq!(
            frame.as_slice(),
            &[0x06, 0x10, 0x04, 0x21, 0x00, 0x0A, 0x04, 0x12, 0x00, 0x00]
        );
        assert!(TunnelingAck::parse(&frame[6..]).unwrap().is_ok());
    }
}
