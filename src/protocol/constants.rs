//! KNXnet/IP protocol constants and service type identifiers.

use core::time::Duration;

/// KNXnet/IP protocol version 1.0
pub const KNXNETIP_VERSION_10: u8 = 0x10;

/// Header size for KNXnet/IP version 1.0
pub const HEADER_SIZE_10: u8 = 0x06;

/// Default KNXnet/IP port
pub const KNXNETIP_DEFAULT_PORT: u16 = 3671;

/// Capacity of an outbound datagram buffer
pub const MAX_FRAME_SIZE: usize = 256;

/// Receive buffer size; inbound datagrams may exceed what we send
pub const MAX_PACKET_SIZE: usize = 512;

/// Fixed part of a tunneling request around the APDU: header (6),
/// connection header (4), CEMI fields up to the data length byte (9) and
/// the TPCI byte (1)
pub const TUNNELING_OVERHEAD: usize = 20;

/// Longest raw payload accepted by the CEMI builder
pub const MAX_PAYLOAD_LEN: usize = MAX_FRAME_SIZE - TUNNELING_OVERHEAD - 1;

// =============================================================================
// Default timings
// =============================================================================

/// Bound on waiting for a connect response
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Period of the keepalive cycle
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

/// Consecutive unanswered state requests before the tunnel is rebuilt
pub const MISSED_ALIVE_LIMIT: u32 = 3;

// =============================================================================
// Service Type Identifiers
// =============================================================================

/// KNXnet/IP service types used by a tunneling client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ServiceType {
    /// Open a tunnel (client -> gateway)
    ConnectRequest = 0x0205,
    /// Channel assignment (gateway -> client)
    ConnectResponse = 0x0206,
    /// Heartbeat probe (client -> gateway)
    ConnectionstateRequest = 0x0207,
    /// Heartbeat answer (gateway -> client)
    ConnectionstateResponse = 0x0208,
    /// Close a tunnel (either direction)
    DisconnectRequest = 0x0209,
    /// Close confirmation (either direction)
    DisconnectResponse = 0x020A,
    /// CEMI frame transport (either direction)
    TunnellingRequest = 0x0420,
    /// Receipt for a tunneling request
    TunnellingAck = 0x0421,
}

impl ServiceType {
    /// Convert from u16 value
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0205 => Some(Self::ConnectRequest),
            0x0206 => Some(Self::ConnectResponse),
            0x0207 => Some(Self::ConnectionstateRequest),
            0x0208 => Some(Self::ConnectionstateResponse),
            0x0209 => Some(Self::DisconnectRequest),
            0x020A => Some(Self::DisconnectResponse),
            0x0420 => Some(Self::TunnellingRequest),
            0x0421 => Some(Self::TunnellingAck),
            _ => None,
        }
    }

    /// Convert to u16 value
    pub const fn to_u16(self) -> u16 {
        self as u16
    }
}

// =============================================================================
// Connection Type and Host Protocol Codes
// =============================================================================

/// Tunnel connection (CRI connection type)
pub const TUNNEL_CONNECTION: u8 = 0x04;

/// Tunnel on the data link layer (CRI layer)
pub const TUNNEL_LINKLAYER: u8 = 0x02;

/// IPv4 UDP (HPAI host protocol)
pub const IPV4_UDP: u8 = 0x01;

// =============================================================================
// Status Codes
// =============================================================================

/// Operation successful
pub const E_NO_ERROR: u8 = 0x00;

/// Gateway has no session for the given channel
pub const E_CONNECTION_ID: u8 = 0x21;

/// All tunneling slots of the gateway are in use
pub const E_NO_MORE_CONNECTIONS: u8 = 0x24;

// =============================================================================
// cEMI Message Codes
// =============================================================================

/// cEMI message codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CEMIMessageCode {
    /// L_Data.req - Data request
    LDataReq = 0x11,
    /// L_Data.ind - Data indication
    LDataInd = 0x29,
    /// L_Data.con - Data confirmation
    LDataCon = 0x2E,
}

impl CEMIMessageCode {
    /// Convert from u8 value
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x11 => Some(Self::LDataReq),
            0x29 => Some(Self::LDataInd),
            0x2E => Some(Self::LDataCon),
            _ => None,
        }
    }

    /// Convert to u8 value
    pub const fn to_u8(self) -> u8 {
        self as u8
    }
}

// =============================================================================
// KNX Priority
// =============================================================================

/// KNX telegram priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Priority {
    /// System priority (highest)
    System = 0b00,
    /// Normal priority
    #[default]
    Normal = 0b01,
    /// Urgent priority
    Urgent = 0b10,
    /// Low priority (lowest)
    Low = 0b11,
}

impl Priority {
    /// Decode from the two priority bits
    pub const fn from_u8(value: u8) -> Self {
        match value & 0b11 {
            0b00 => Self::System,
            0b01 => Self::Normal,
            0b10 => Self::Urgent,
            _ => Self::Low,
        }
    }

    /// Convert to u8 value
    pub const fn to_u8(self) -> u8 {
        self as u8
    }
}
