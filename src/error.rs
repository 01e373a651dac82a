//! Error types for KNX tunneling operations.
//!
//! Every fallible operation in the crate returns [`KnxError`]. Errors are
//! grouped by category; each category wraps a small struct holding a private
//! kind, and callers branch on the `is_*` predicates rather than the kinds.

use core::fmt;

/// Result type alias for KNX operations.
pub type Result<T> = core::result::Result<T, KnxError>;

// =============================================================================
// Error Kind Enums (Internal)
// =============================================================================

/// Protocol error variants (internal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProtocolErrorKind {
    InvalidFrame,
    UnsupportedVersion,
    BufferTooSmall,
}

/// Connection error variants (internal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectionErrorKind {
    ConnectTimeout,
    NoConnectionsAvailable,
    StaleConnection,
    NotConnected,
    ResponseTimeout,
}

/// Transport error variants (internal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TransportErrorKind {
    OpenFailed,
    SendFailed,
    ReceiveFailed,
    Closed,
    InvalidEndpoint,
}

/// Addressing error variants (internal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AddressingErrorKind {
    InvalidFormat,
    OutOfRange,
}

/// DPT error variants (internal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DptErrorKind {
    InvalidData,
    InvalidDataValue,
    UnsupportedType,
}

/// Configuration error variants (internal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConfigErrorKind {
    MissingKey,
    InvalidValue,
}

// =============================================================================
// Main Error Type
// =============================================================================

/// KNX tunneling error types.
///
/// This is the main error type returned by all operations of the crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KnxError {
    /// Datagram or CEMI frame could not be decoded or encoded
    Protocol(ProtocolError),
    /// Session level failures (connect, keepalive, requests)
    Connection(ConnectionError),
    /// Socket level failures
    Transport(TransportError),
    /// Malformed or out-of-range KNX addresses
    Addressing(AddressingError),
    /// Datapoint type encoding and decoding errors
    Dpt(DptError),
    /// Invalid or missing configuration values
    Config(ConfigError),
}

// =============================================================================
// Structured Error Types
// =============================================================================

/// Protocol error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolError {
    kind: ProtocolErrorKind,
}

impl ProtocolError {
    /// Check if this is an invalid frame error
    pub fn is_invalid_frame(&self) -> bool {
        matches!(self.kind, ProtocolErrorKind::InvalidFrame)
    }

    /// Check if this is an unsupported version error
    pub fn is_unsupported_version(&self) -> bool {
        matches!(self.kind, ProtocolErrorKind::UnsupportedVersion)
    }

    /// Check if an output buffer was too small for the frame
    pub fn is_buffer_too_small(&self) -> bool {
        matches!(self.kind, ProtocolErrorKind::BufferTooSmall)
    }
}

/// Connection error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionError {
    kind: ConnectionErrorKind,
}

impl ConnectionError {
    /// No connect response arrived in time
    pub fn is_connect_timeout(&self) -> bool {
        matches!(self.kind, ConnectionErrorKind::ConnectTimeout)
    }

    /// Gateway answered with channel 0 and status `E_NO_MORE_CONNECTIONS`
    pub fn is_no_connections_available(&self) -> bool {
        matches!(self.kind, ConnectionErrorKind::NoConnectionsAvailable)
    }

    /// Too many keepalive probes went unanswered
    pub fn is_stale_connection(&self) -> bool {
        matches!(self.kind, ConnectionErrorKind::StaleConnection)
    }

    /// Operation requires an established tunnel
    pub fn is_not_connected(&self) -> bool {
        matches!(self.kind, ConnectionErrorKind::NotConnected)
    }

    /// A request (alive probe, status read) was not answered in time
    pub fn is_response_timeout(&self) -> bool {
        matches!(self.kind, ConnectionErrorKind::ResponseTimeout)
    }
}

/// Transport error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportError {
    kind: TransportErrorKind,
}

impl TransportError {
    /// Socket could not be created or bound
    pub fn is_open_failed(&self) -> bool {
        matches!(self.kind, TransportErrorKind::OpenFailed)
    }

    /// Datagram could not be handed to the socket
    pub fn is_send_failed(&self) -> bool {
        matches!(self.kind, TransportErrorKind::SendFailed)
    }

    /// Socket was closed while waiting for data
    pub fn is_closed(&self) -> bool {
        matches!(self.kind, TransportErrorKind::Closed)
    }

    /// Endpoint text or socket address is not IPv4
    pub fn is_invalid_endpoint(&self) -> bool {
        matches!(self.kind, TransportErrorKind::InvalidEndpoint)
    }
}

/// Addressing error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressingError {
    kind: AddressingErrorKind,
}

impl AddressingError {
    /// Text does not follow `a.l.d`, `m/s` or `m/m/s` notation
    pub fn is_invalid_format(&self) -> bool {
        matches!(self.kind, AddressingErrorKind::InvalidFormat)
    }

    /// Check if address is out of range
    pub fn is_out_of_range(&self) -> bool {
        matches!(self.kind, AddressingErrorKind::OutOfRange)
    }
}

/// DPT error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DptError {
    kind: DptErrorKind,
}

impl DptError {
    /// Payload too short or otherwise undecodable
    pub fn is_invalid_data(&self) -> bool {
        matches!(self.kind, DptErrorKind::InvalidData)
    }

    /// Value cannot be represented by the target datapoint type
    pub fn is_invalid_data_value(&self) -> bool {
        matches!(self.kind, DptErrorKind::InvalidDataValue)
    }

    /// Datapoint type identifier is not supported
    pub fn is_unsupported_type(&self) -> bool {
        matches!(self.kind, DptErrorKind::UnsupportedType)
    }
}

/// Configuration error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigError {
    kind: ConfigErrorKind,
    key: &'static str,
}

impl ConfigError {
    /// A required key was absent
    pub fn is_missing_key(&self) -> bool {
        matches!(self.kind, ConfigErrorKind::MissingKey)
    }

    /// A value could not be parsed
    pub fn is_invalid_value(&self) -> bool {
        matches!(self.kind, ConfigErrorKind::InvalidValue)
    }

    /// Name of the offending key
    pub fn key(&self) -> &'static str {
        self.key
    }
}

// =============================================================================
// Convenience Constructors for KnxError
// =============================================================================

impl KnxError {
    // Protocol errors
    #[inline]
    pub(crate) const fn invalid_frame() -> Self {
        Self::Protocol(ProtocolError { kind: ProtocolErrorKind::InvalidFrame })
    }

    #[inline]
    pub(crate) const fn unsupported_version() -> Self {
        Self::Protocol(ProtocolError { kind: ProtocolErrorKind::UnsupportedVersion })
    }

    #[inline]
    pub(crate) const fn buffer_too_small() -> Self {
        Self::Protocol(ProtocolError { kind: ProtocolErrorKind::BufferTooSmall })
    }

    // Connection errors
    pub(crate) const fn connect_timeout() -> Self {
        Self::Connection(ConnectionError { kind: ConnectionErrorKind::ConnectTimeout })
    }

    pub(crate) const fn no_connections_available() -> Self {
        Self::Connection(ConnectionError { kind: ConnectionErrorKind::NoConnectionsAvailable })
    }

    pub(crate) const fn stale_connection() -> Self {
        Self::Connection(ConnectionError { kind: ConnectionErrorKind::StaleConnection })
    }

    pub(crate) const fn not_connected() -> Self {
        Self::Connection(ConnectionError { kind: ConnectionErrorKind::NotConnected })
    }

    pub(crate) const fn response_timeout() -> Self {
        Self::Connection(ConnectionError { kind: ConnectionErrorKind::ResponseTimeout })
    }

    // Transport errors
    pub(crate) const fn transport_open_failed() -> Self {
        Self::Transport(TransportError { kind: TransportErrorKind::OpenFailed })
    }

    pub(crate) const fn send_failed() -> Self {
        Self::Transport(TransportError { kind: TransportErrorKind::SendFailed })
    }

    pub(crate) const fn receive_failed() -> Self {
        Self::Transport(TransportError { kind: TransportErrorKind::ReceiveFailed })
    }

    pub(crate) const fn transport_closed() -> Self {
        Self::Transport(TransportError { kind: TransportErrorKind::Closed })
    }

    pub(crate) const fn invalid_endpoint() -> Self {
        Self::Transport(TransportError { kind: TransportErrorKind::InvalidEndpoint })
    }

    // Addressing errors
    pub(crate) const fn invalid_address_format() -> Self {
        Self::Addressing(AddressingError { kind: AddressingErrorKind::InvalidFormat })
    }

    pub(crate) const fn address_out_of_range() -> Self {
        Self::Addressing(AddressingError { kind: AddressingErrorKind::OutOfRange })
    }

    // DPT errors
    pub(crate) const fn invalid_dpt_data() -> Self {
        Self::Dpt(DptError { kind: DptErrorKind::InvalidData })
    }

    pub(crate) const fn invalid_data_value() -> Self {
        Self::Dpt(DptError { kind: DptErrorKind::InvalidDataValue })
    }

    pub(crate) const fn unsupported_dpt() -> Self {
        Self::Dpt(DptError { kind: DptErrorKind::UnsupportedType })
    }

    // Configuration errors
    pub(crate) const fn missing_config_key(key: &'static str) -> Self {
        Self::Config(ConfigError { kind: ConfigErrorKind::MissingKey, key })
    }

    pub(crate) const fn invalid_config_value(key: &'static str) -> Self {
        Self::Config(ConfigError { kind: ConfigErrorKind::InvalidValue, key })
    }
}

// =============================================================================
// Category Predicates
// =============================================================================

impl KnxError {
    /// Malformed textual address (never retried)
    pub fn is_invalid_address_format(&self) -> bool {
        matches!(self, Self::Addressing(e) if e.is_invalid_format())
    }

    /// Value outside the representable range of the target DPT
    pub fn is_invalid_data_value(&self) -> bool {
        matches!(self, Self::Dpt(e) if e.is_invalid_data_value())
    }

    /// Socket could not be created or bound
    pub fn is_transport_open_failed(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_open_failed())
    }

    /// No connect response within the connect timeout
    pub fn is_connect_timeout(&self) -> bool {
        matches!(self, Self::Connection(e) if e.is_connect_timeout())
    }

    /// Gateway has no free tunneling channel
    pub fn is_no_connections_available(&self) -> bool {
        matches!(self, Self::Connection(e) if e.is_no_connections_available())
    }

    /// Keepalive gave up on the current channel
    pub fn is_stale_connection(&self) -> bool {
        matches!(self, Self::Connection(e) if e.is_stale_connection())
    }

    /// Operation needs an established tunnel
    pub fn is_not_connected(&self) -> bool {
        matches!(self, Self::Connection(e) if e.is_not_connected())
    }

    /// Request was not answered within its timeout
    pub fn is_response_timeout(&self) -> bool {
        matches!(self, Self::Connection(e) if e.is_response_timeout())
    }
}

// =============================================================================
// Display Implementation
// =============================================================================

impl fmt::Display for KnxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KnxError::Protocol(e) => write!(f, "Protocol error: {:?}", e.kind),
            KnxError::Connection(e) => write!(f, "Connection error: {:?}", e.kind),
            KnxError::Transport(e) => write!(f, "Transport error: {:?}", e.kind),
            KnxError::Addressing(e) => write!(f, "Addressing error: {:?}", e.kind),
            KnxError::Dpt(e) => write!(f, "DPT error: {:?}", e.kind),
            KnxError::Config(e) => write!(f, "Config error: {:?} ({})", e.kind, e.key),
        }
    }
}

impl std::error::Error for KnxError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy_predicates() {
        assert!(KnxError::invalid_address_format().is_invalid_address_format());
        assert!(KnxError::invalid_data_value().is_invalid_data_value());
        assert!(KnxError::transport_open_failed().is_transport_open_failed());
        assert!(KnxError::connect_timeout().is_connect_timeout());
        assert!(KnxError::no_connections_available().is_no_connections_available());
        assert!(KnxError::stale_connection().is_stale_connection());

        assert!(!KnxError::connect_timeout().is_no_connections_available());
        assert!(!KnxError::address_out_of_range().is_invalid_address_format());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            KnxError::connect_timeout().to_string(),
            "Connection error: ConnectTimeout"
        );
        assert_eq!(
            KnxError::missing_config_key("KNX_GATEWAY_IP").to_string(),
            "Config error: MissingKey (KNX_GATEWAY_IP)"
        );
    }

    #[test]
    fn test_errors_compare_by_kind() {
        assert_eq!(KnxError::not_connected(), KnxError::not_connected());
        assert_ne!(KnxError::not_connected(), KnxError::response_timeout());
    }
}
