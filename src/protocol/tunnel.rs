//! Tunneling session state.
//!
//! [`Session`] is the bookkeeping half of the connection state machine: the
//! lifecycle state, the channel assigned by the gateway, sequence numbers
//! and liveness counters. It performs no I/O; the async driver in
//! [`async_tunnel`](super::async_tunnel) owns one behind a lock and feeds it
//! the datagrams and timeouts it observes.
//!
//! ## State Machine
//!
//! ```text
//! Disconnected → Connecting → Connected → Disconnecting → Disconnected
//!                    ↓ (timeout, rejection)
//!               Disconnected
//! ```

use crate::error::{KnxError, Result};
use crate::protocol::sequence::{InboundSeq, SequenceManager};
use crate::protocol::services::ConnectResponse;
use tokio::time::Instant;

/// Lifecycle of a tunneling connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No tunnel; initial and terminal state
    #[default]
    Disconnected,
    /// Connect request sent, waiting for the response
    Connecting,
    /// Channel assigned, telegrams flow
    Connected,
    /// Teardown in progress
    Disconnecting,
}

/// What to do with an inbound tunneling request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    /// Not for this session: no ACK, no state change
    Ignore,
    /// Retransmission: ACK only
    Duplicate,
    /// New telegram: ACK and dispatch
    Process,
}

/// Mutable session state, mutated only by the connection driver.
#[derive(Debug, Default)]
pub struct Session {
    state: ConnectionState,
    connected: bool,
    channel_id: u8,
    sequence: SequenceManager,
    last_inbound: Option<Instant>,
    missed_alive: u32,
}

impl Session {
    /// A disconnected session
    pub fn new() -> Self {
        Self::default()
    }

    /// Current lifecycle state
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Connectedness is tracked explicitly; channel 0 is a legal id.
    pub const fn is_connected(&self) -> bool {
        self.connected
    }

    /// Channel of the live tunnel
    pub const fn channel_id(&self) -> Option<u8> {
        if self.connected {
            Some(self.channel_id)
        } else {
            None
        }
    }

    /// Sequence number the next outbound request will carry
    pub const fn next_sequence(&self) -> u8 {
        self.sequence.peek()
    }

    /// When the gateway was last heard from
    pub const fn last_inbound(&self) -> Option<Instant> {
        self.last_inbound
    }

    /// Consecutive unanswered state requests
    pub const fn missed_alive(&self) -> u32 {
        self.missed_alive
    }

    /// Enter `Connecting`, dropping whatever the previous cycle left.
    pub fn begin_connect(&mut self) {
        self.state = ConnectionState::Connecting;
        self.connected = false;
    }

    /// Apply the gateway's answer to a connect request.
    ///
    /// Channel 0 with status 0x24 is a rejection; anything else assigns the
    /// channel, restarts numbering and enters `Connected`.
    pub fn apply_connect_response(&mut self, response: &ConnectResponse) -> Result<u8> {
        if response.is_no_more_connections() {
            self.state = ConnectionState::Disconnected;
            return Err(KnxError::no_connections_available());
        }

        self.channel_id = response.channel_id;
        self.sequence.reset();
        self.connected = true;
        self.missed_alive = 0;
        self.state = ConnectionState::Connected;
        Ok(self.channel_id)
    }

    /// Enter `Disconnecting`; returns the channel to close if the tunnel
    /// was up.
    pub fn begin_disconnect(&mut self) -> Option<u8> {
        let channel = self.channel_id();
        self.state = ConnectionState::Disconnecting;
        channel
    }

    /// Back to `Disconnected`.
    pub fn finish_disconnect(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.connected = false;
    }

    /// Classify an inbound tunneling request by channel and sequence.
    pub fn accept_tunneling(&mut self, channel_id: u8, seq: u8) -> Inbound {
        if self.channel_id() != Some(channel_id) {
            return Inbound::Ignore;
        }
        match self.sequence.accept_inbound(seq) {
            InboundSeq::Process => Inbound::Process,
            InboundSeq::Duplicate => Inbound::Duplicate,
        }
    }

    /// Record traffic from the gateway; clears missed keepalives.
    pub fn mark_inbound(&mut self, now: Instant) {
        self.last_inbound = Some(now);
        self.missed_alive = 0;
    }

    /// Count one unanswered state request; returns the new total.
    pub fn record_missed_alive(&mut self) -> u32 {
        self.missed_alive = self.missed_alive.saturating_add(1);
        self.missed_alive
    }

    /// Allocate a sequence number for an outbound request and encode it.
    ///
    /// `build` gets the channel and sequence number. If it fails the number
    /// is handed back so the gateway never sees a gap.
    pub fn allocate_request<T>(&mut self, build: impl FnOnce(u8, u8) -> Result<T>) -> Result<T> {
        let channel = self.channel_id().ok_or_else(KnxError::not_connected)?;
        let seq = self.sequence.next();
        build(channel, seq).inspect_err(|_encode| self.sequence.revert_last())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accepted(channel_id: u8) -> ConnectResponse {
        ConnectResponse {
            channel_id,
            status: 0x00,
            data_endpoint: None,
        }
    }

    fn connected(channel_id: u8) -> Session {
        let mut session = Session::new();
        session.begin_connect();
        session.apply_connect_response(&accepted(channel_id)).unwrap();
        session
    }

    #[test]
    fn test_connect_transitions() {
        let mut session = Session::new();
        assert_eq!(session.state(), ConnectionState::Disconnected);

        session.begin_connect();
        assert_eq!(session.state(), ConnectionState::Connecting);
        assert_eq!(session.channel_id(), None);

        assert_eq!(session.apply_connect_response(&accepted(0x12)).unwrap(), 0x12);
        assert_eq!(session.state(), ConnectionState::Connected);
        assert_eq!(session.channel_id(), Some(0x12));
        assert_eq!(session.next_sequence(), 0);
    }

    #[test]
    fn test_channel_zero_is_connected() {
        let session = connected(0);
        assert!(session.is_connected());
        assert_eq!(session.channel_id(), Some(0));
    }

    #[test]
    fn test_no_more_connections() {
        let mut session = Session::new();
        session.begin_connect();
        let rejected = ConnectResponse {
            channel_id: 0,
            status: 0x24,
            data_endpoint: None,
        };
        assert!(session
            .apply_connect_response(&rejected)
            .unwrap_err()
            .is_no_connections_available());
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(!session.is_connected());
    }

    #[test]
    fn test_status_24_on_nonzero_channel_is_success() {
        let mut session = Session::new();
        session.begin_connect();
        let odd = ConnectResponse {
            channel_id: 3,
            status: 0x24,
            data_endpoint: None,
        };
        assert_eq!(session.apply_connect_response(&odd).unwrap(), 3);
    }

    #[test]
    fn test_disconnect_transitions() {
        let mut session = connected(0x12);
        assert_eq!(session.begin_disconnect(), Some(0x12));
        assert_eq!(session.state(), ConnectionState::Disconnecting);
        session.finish_disconnect();
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert_eq!(session.channel_id(), None);

        // teardown of a session that never connected has nothing to close
        let mut idle = Session::new();
        assert_eq!(idle.begin_disconnect(), None);
    }

    #[test]
    fn test_accept_tunneling() {
        let mut session = connected(0x12);
        assert_eq!(session.accept_tunneling(0x13, 0), Inbound::Ignore);
        assert_eq!(session.accept_tunneling(0x12, 0), Inbound::Process);
        assert_eq!(session.accept_tunneling(0x12, 0), Inbound::Duplicate);
        assert_eq!(session.accept_tunneling(0x12, 1), Inbound::Process);

        session.finish_disconnect();
        assert_eq!(session.accept_tunneling(0x12, 2), Inbound::Ignore);
    }

    #[test]
    fn test_reconnect_resets_sequences() {
        let mut session = connected(0x12);
        session.allocate_request(|_, seq| Ok(seq)).unwrap();
        session.accept_tunneling(0x12, 7);

        session.finish_disconnect();
        session.begin_connect();
        session.apply_connect_response(&accepted(0x20)).unwrap();
        assert_eq!(session.next_sequence(), 0);
        assert_eq!(session.accept_tunneling(0x20, 0), Inbound::Process);
    }

    #[test]
    fn test_allocate_request() {
        let mut session = connected(0x12);
        assert_eq!(session.allocate_request(|ch, seq| Ok((ch, seq))).unwrap(), (0x12, 0));
        assert_eq!(session.next_sequence(), 1);

        let failed: Result<()> = session.allocate_request(|_, _| Err(KnxError::invalid_data_value()));
        assert!(failed.unwrap_err().is_invalid_data_value());
        assert_eq!(session.next_sequence(), 1);

        let mut idle = Session::new();
        let err = idle.allocate_request(|_, seq| Ok(seq)).unwrap_err();
        assert!(err.is_not_connected());
    }

    #[test]
    fn test_missed_alive_reset_by_traffic() {
        let mut session = connected(1);
        assert_eq!(session.record_missed_alive(), 1);
        assert_eq!(session.record_missed_alive(), 2);
        session.mark_inbound(Instant::now());
        assert_eq!(session.missed_alive(), 0);
        assert!(session.last_inbound().is_some());
    }
}
