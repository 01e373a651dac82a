//! Mock transport for testing.
//!
//! [`MockTransport`] stands in for the UDP transport so the connection can
//! be driven without a network or a gateway:
//! - every datagram sent is recorded and can be inspected
//! - a *responder* closure plays the gateway, answering sent datagrams
//! - datagrams can be injected as if the gateway sent them unprompted
//! - receive errors can be injected the same way
//! - opening can be made to fail
//!
//! ## Example
//!
//! ```rust
//! use knx_tunnel::net::mock_transport::{self, MockTransport};
//! use knx_tunnel::net::{Endpoint, FrameReceiver, FrameSender, Transport};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> knx_tunnel::Result<()> {
//! let mock = MockTransport::with_responder(mock_transport::gateway(0x12, true));
//! let socket = mock.open(Endpoint::unspecified()).await?;
//!
//! socket.send_to(&[0x06, 0x10, 0x02, 0x05, 0x00, 0x06], Endpoint::gateway([10, 0, 0, 1])).await?;
//!
//! let mut buf = [0u8; 64];
//! let (len, _) = socket.recv_from(&mut buf).await?;
//! assert_eq!(&buf[2..4], &[0x02, 0x06]); // CONNECT_RESPONSE
//! assert_eq!(mock.sent_packets().len(), 1);
//! # let _ = len;
//! # Ok(())
//! # }
//! ```

use crate::error::{KnxError, Result};
use crate::net::transport::{FrameReceiver, FrameSender, Transport};
use crate::net::Endpoint;
use crate::protocol::constants::{ServiceType, E_NO_ERROR};
use crate::protocol::frame::classify;
use core::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

/// Gateway stand-in: maps each sent datagram to the datagrams sent back.
pub type Responder = Box<dyn FnMut(&[u8]) -> Vec<Vec<u8>> + Send>;

#[derive(Default)]
struct MockState {
    sent: Vec<(Vec<u8>, Endpoint)>,
    opens: usize,
    fail_open: bool,
    generation: u64,
    inbound: Option<mpsc::UnboundedSender<Result<Vec<u8>>>>,
    peer: Endpoint,
    responder: Option<Responder>,
}

impl fmt::Debug for MockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockState")
            .field("sent", &self.sent.len())
            .field("opens", &self.opens)
            .field("fail_open", &self.fail_open)
            .field("responder", &self.responder.is_some())
            .finish_non_exhaustive()
    }
}

/// Mock transport; clones share the same recorded state.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    shared: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// A transport whose gateway never answers
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose gateway answers through `responder`
    pub fn with_responder(responder: impl FnMut(&[u8]) -> Vec<Vec<u8>> + Send + 'static) -> Self {
        let mock = Self::new();
        mock.set_responder(responder);
        mock
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the gateway behaviour
    pub fn set_responder(&self, responder: impl FnMut(&[u8]) -> Vec<Vec<u8>> + Send + 'static) {
        self.state().responder = Some(Box::new(responder));
    }

    /// Make subsequent `open` calls fail
    pub fn set_fail_open(&self, fail: bool) {
        self.state().fail_open = fail;
    }

    /// Deliver a datagram to the most recently opened socket.
    ///
    /// Returns `false` when no open socket is listening.
    pub fn inject(&self, datagram: &[u8]) -> bool {
        self.state()
            .inbound
            .as_ref()
            .is_some_and(|tx| tx.send(Ok(datagram.to_vec())).is_ok())
    }

    /// Make the next `count` receives on the open socket fail.
    ///
    /// Returns `false` when no open socket is listening.
    pub fn inject_receive_errors(&self, count: usize) -> bool {
        let state = self.state();
        let Some(tx) = state.inbound.as_ref() else {
            return false;
        };
        (0..count).all(|_| tx.send(Err(KnxError::receive_failed())).is_ok())
    }

    /// Every datagram sent so far, with its destination
    pub fn sent_packets(&self) -> Vec<(Vec<u8>, Endpoint)> {
        self.state().sent.clone()
    }

    /// Sent datagrams of one service type
    pub fn sent_of(&self, service: ServiceType) -> Vec<Vec<u8>> {
        self.state()
            .sent
            .iter()
            .filter(|(data, _)| classify(data) == Some(service))
            .map(|(data, _)| data.clone())
            .collect()
    }

    /// The last datagram sent
    pub fn last_sent(&self) -> Option<Vec<u8>> {
        self.state().sent.last().map(|(data, _)| data.clone())
    }

    /// Forget recorded datagrams
    pub fn clear_sent(&self) {
        self.state().sent.clear();
    }

    /// Number of successful `open` calls
    pub fn open_count(&self) -> usize {
        self.state().opens
    }
}

/// A socket opened by [`MockTransport`].
#[derive(Debug)]
pub struct MockSocket {
    shared: Arc<Mutex<MockState>>,
    generation: u64,
    local: Endpoint,
    tx: Mutex<Option<mpsc::UnboundedSender<Result<Vec<u8>>>>>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Result<Vec<u8>>>>,
}

impl MockSocket {
    fn state(&self) -> MutexGuard<'_, MockState> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Endpoint the socket was opened on
    pub const fn local_endpoint(&self) -> Endpoint {
        self.local
    }
}

impl Transport for MockTransport {
    type Socket = MockSocket;

    async fn open(&self, local: Endpoint) -> Result<MockSocket> {
        let mut state = self.state();
        if state.fail_open {
            knx_log!(error, "mock open on {local} refused");
            return Err(KnxError::transport_open_failed());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state.opens += 1;
        state.generation += 1;
        state.inbound = Some(tx.clone());

        Ok(MockSocket {
            shared: Arc::clone(&self.shared),
            generation: state.generation,
            local,
            tx: Mutex::new(Some(tx)),
            rx: tokio::sync::Mutex::new(rx),
        })
    }
}

impl FrameSender for MockSocket {
    async fn send_to(&self, data: &[u8], dest: Endpoint) -> Result<()> {
        let replies = {
            let mut state = self.state();
            state.sent.push((data.to_vec(), dest));
            state.peer = dest;
            state
                .responder
                .as_mut()
                .map(|respond| respond(data))
                .unwrap_or_default()
        };

        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = tx.as_ref() else {
            return Err(KnxError::transport_closed());
        };
        for reply in replies {
            if tx.send(Ok(reply)).is_err() {
                knx_log!(trace, "mock reply dropped, receiver gone");
            }
        }
        Ok(())
    }
}

impl FrameReceiver for MockSocket {
    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, Endpoint)> {
        let datagram = self.rx.lock().await.recv().await;
        let datagram = datagram.unwrap_or_else(|| Err(KnxError::transport_closed()))?;

        let len = datagram.len().min(buf.len());
        buf[..len].copy_from_slice(&datagram[..len]);
        Ok((len, self.state().peer))
    }

    fn close(&self) {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
        let mut state = self.state();
        if state.generation == self.generation {
            state.inbound = None;
        }
    }
}

/// A responder that behaves like a gateway with one free channel.
///
/// Connect requests are accepted with `channel_id`; state requests are
/// answered only when `answer_alive` is set; disconnects are confirmed.
pub fn gateway(channel_id: u8, answer_alive: bool) -> impl FnMut(&[u8]) -> Vec<Vec<u8>> + Send + 'static {
    move |datagram| match classify(datagram) {
        Some(ServiceType::ConnectRequest) => vec![replies::connect_response(channel_id, E_NO_ERROR)],
        Some(ServiceType::ConnectionstateRequest) if answer_alive => {
            vec![replies::state_response(channel_id, E_NO_ERROR)]
        }
        Some(ServiceType::DisconnectRequest) => vec![replies::disconnect_response(channel_id)],
        _ => Vec::new(),
    }
}

/// Datagrams a gateway sends, for responders and injection.
pub mod replies {
    fn with_header(service: [u8; 2], body: &[u8]) -> Vec<u8> {
        let total = (6 + body.len()) as u16;
        let [len_hi, len_lo] = total.to_be_bytes();
        let mut out = vec![0x06, 0x10, service[0], service[1], len_hi, len_lo];
        out.extend_from_slice(body);
        out
    }

    /// `CONNECT_RESPONSE` with a data endpoint and a CRD for 1.1.255
    pub fn connect_response(channel_id: u8, status: u8) -> Vec<u8> {
        with_header(
            [0x02, 0x06],
            &[
                channel_id, status, // channel, status
                0x08, 0x01, 127, 0, 0, 1, 0x0E, 0x57, // data endpoint
                0x04, 0x04, 0x11, 0xFF, // CRD
            ],
        )
    }

    /// `CONNECTIONSTATE_RESPONSE`
    pub fn state_response(channel_id: u8, status: u8) -> Vec<u8> {
        with_header([0x02, 0x08], &[channel_id, status])
    }

    /// Gateway-initiated `DISCONNECT_REQUEST`
    pub fn disconnect_request(channel_id: u8) -> Vec<u8> {
        with_header(
            [0x02, 0x09],
            &[channel_id, 0x00, 0x08, 0x01, 127, 0, 0, 1, 0x0E, 0x57],
        )
    }

    /// `DISCONNECT_RESPONSE`
    pub fn disconnect_response(channel_id: u8) -> Vec<u8> {
        with_header([0x02, 0x0A], &[channel_id, 0x00])
    }

    /// `TUNNELING_REQUEST` carrying `cemi`
    pub fn tunneling_request(channel_id: u8, seq: u8, cemi: &[u8]) -> Vec<u8> {
        let mut body = vec![0x04, channel_id, seq, 0x00];
        body.extend_from_slice(cemi);
        with_header([0x04, 0x20], &body)
    }

    /// L_Data.ind cEMI from 1.1.1 to the group `dest`
    pub fn group_indication(dest: [u8; 2], apdu: &[u8]) -> Vec<u8> {
        let data_length = apdu.len().saturating_sub(1) as u8;
        let mut cemi = vec![0x29, 0x00, 0xBC, 0xE0, 0x11, 0x01, dest[0], dest[1], data_length];
        cemi.extend_from_slice(apdu);
        cemi
    }
}
