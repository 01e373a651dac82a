//! Async KNXnet/IP tunneling connection.
//!
//! [`TunnelingConnection`] drives a [`Session`] over a [`Transport`]: it
//! opens the socket, runs the receive loop, answers the gateway, dispatches
//! bus telegrams as [`ConnectionEvent`]s and, when enabled, supervises the
//! tunnel with periodic connection state requests.
//!
//! ## Features
//!
//! - Connect handshake bounded by the configured timeout
//! - Inbound tunneling requests acknowledged, duplicates suppressed
//! - Group value writes and reads with typed addresses or text
//! - Keepalive with automatic reconnect and randomised backoff
//! - Generic over the transport, so it runs against a mock in tests
//!
//! ## Example
//!
//! ```rust,no_run
//! use knx_tunnel::{DptValue, Endpoint, TunnelConfig, TunnelingConnection};
//!
//! # async fn demo() -> knx_tunnel::Result<()> {
//! let config = TunnelConfig::new(Endpoint::gateway([192, 168, 1, 10]));
//! let connection = TunnelingConnection::new(config);
//! connection.connect().await?;
//!
//! // Switch a light
//! connection.write_value("1/2/3", "1.001", &DptValue::Bool(true)).await?;
//!
//! // Ask a sensor for its temperature
//! let frame = connection.read("1/2/10").await?;
//! println!("temperature: {}", frame.value("9.001")?);
//!
//! connection.disconnect().await?;
//! # Ok(())
//! # }
//! ```

use crate::addressing::ToAddress;
use crate::config::TunnelConfig;
use crate::dpt::{self, DptValue};
use crate::error::{KnxError, Result};
use crate::events::{ConnectionEvent, EventBus};
use crate::net::{FrameReceiver, FrameSender, Transport, UdpTransport};
use crate::protocol::cemi::{self, CemiFrame, TelegramKind};
use crate::protocol::constants::{ServiceType, E_NO_ERROR, MAX_PACKET_SIZE};
use crate::protocol::frame::{Hpai, KnxnetIpFrame};
use crate::protocol::keepalive::{self, Backoff};
use crate::protocol::services::{
    ConnectRequest, ConnectResponse, ConnectionHeader, ConnectionStateRequest,
    ConnectionStateResponse, DisconnectRequest, DisconnectResponse, TunnelingAck,
    TunnelingRequest,
};
use crate::protocol::tunnel::{ConnectionState, Inbound, Session};
use core::fmt;
use core::time::Duration;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

/// A KNXnet/IP tunneling connection to one gateway.
///
/// Cheap to clone; clones share the same tunnel. Background tasks hold only
/// weak references, so dropping the last clone stops them.
pub struct TunnelingConnection<T: Transport = UdpTransport> {
    inner: Arc<Inner<T>>,
}

impl<T: Transport> Clone for TunnelingConnection<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport> fmt::Debug for TunnelingConnection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TunnelingConnection")
            .field("gateway", &self.inner.config.gateway)
            .field("state", &self.state())
            .field("channel_id", &self.channel_id())
            .finish_non_exhaustive()
    }
}

/// Non-owning handle held by background tasks.
pub(crate) struct WeakConnection<T: Transport>(Weak<Inner<T>>);

impl<T: Transport> WeakConnection<T> {
    pub(crate) fn upgrade(&self) -> Option<TunnelingConnection<T>> {
        self.0.upgrade().map(|inner| TunnelingConnection { inner })
    }
}

struct Inner<T: Transport> {
    config: TunnelConfig,
    transport: T,
    shared: Mutex<Shared<T::Socket>>,
    events: EventBus,
    /// One connect attempt at a time
    connect_lock: tokio::sync::Mutex<()>,
    /// One teardown at a time
    disconnect_lock: tokio::sync::Mutex<()>,
}

/// State touched by both callers and background tasks. Never held across
/// an await.
struct Shared<S> {
    session: Session,
    socket: Option<Arc<S>>,
    receiver: Option<JoinHandle<()>>,
    keepalive: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
    pending_connect: Option<oneshot::Sender<ConnectResponse>>,
    /// Every probe waiting for the next alive answer
    pending_alive: Vec<oneshot::Sender<()>>,
}

impl<T: Transport> Drop for Inner<T> {
    fn drop(&mut self) {
        let shared = self.shared.get_mut().unwrap_or_else(PoisonError::into_inner);
        for handle in [shared.receiver.take(), shared.keepalive.take(), shared.reconnect.take()]
            .into_iter()
            .flatten()
        {
            handle.abort();
        }
        if let Some(socket) = shared.socket.take() {
            knx_log!(debug, "connection dropped while bound, releasing socket");
            socket.close();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

impl TunnelingConnection<UdpTransport> {
    /// A connection over UDP. Nothing is sent until [`connect`](Self::connect).
    pub fn new(config: TunnelConfig) -> Self {
        Self::with_transport(config, UdpTransport)
    }
}

impl<T: Transport> TunnelingConnection<T> {
    /// A connection over a custom transport.
    pub fn with_transport(config: TunnelConfig, transport: T) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                transport,
                shared: Mutex::new(Shared {
                    session: Session::new(),
                    socket: None,
                    receiver: None,
                    keepalive: None,
                    reconnect: None,
                    pending_connect: None,
                    pending_alive: Vec::new(),
                }),
                events: EventBus::new(),
                connect_lock: tokio::sync::Mutex::new(()),
                disconnect_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    fn with_shared<R>(&self, f: impl FnOnce(&mut Shared<T::Socket>) -> R) -> R {
        let mut shared = self.inner.shared.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut shared)
    }

    pub(crate) fn downgrade(&self) -> WeakConnection<T> {
        WeakConnection(Arc::downgrade(&self.inner))
    }

    /// Settings the connection was created with
    pub fn config(&self) -> &TunnelConfig {
        &self.inner.config
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        self.with_shared(|s| s.session.state())
    }

    /// Whether a tunnel channel is open
    pub fn is_connected(&self) -> bool {
        self.with_shared(|s| s.session.is_connected())
    }

    /// Channel assigned by the gateway, while connected
    pub fn channel_id(&self) -> Option<u8> {
        self.with_shared(|s| s.session.channel_id())
    }

    /// Sequence number the next outbound telegram will carry
    pub fn next_sequence(&self) -> u8 {
        self.with_shared(|s| s.session.next_sequence())
    }

    /// When the gateway was last heard from
    pub fn last_inbound(&self) -> Option<Instant> {
        self.with_shared(|s| s.session.last_inbound())
    }

    /// Consecutive unanswered state requests
    pub fn missed_alive_count(&self) -> u32 {
        self.with_shared(|s| s.session.missed_alive())
    }

    /// Receive every lifecycle event and bus telegram from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.events.subscribe()
    }

    /// Receive group value writes addressed to `address`.
    pub fn subscribe_event(&self, address: impl ToAddress) -> Result<mpsc::UnboundedReceiver<CemiFrame>> {
        Ok(self.inner.events.listen(TelegramKind::Event, address.to_address()?))
    }

    /// Receive group value responses from `address`.
    pub fn subscribe_status(&self, address: impl ToAddress) -> Result<mpsc::UnboundedReceiver<CemiFrame>> {
        Ok(self.inner.events.listen(TelegramKind::Status, address.to_address()?))
    }

    /// Listeners registered for telegrams of `kind` to `address`.
    pub fn listener_count(&self, kind: TelegramKind, address: impl ToAddress) -> Result<usize> {
        Ok(self.inner.events.listener_count(kind, address.to_address()?))
    }

    /// Open the transport and perform the connect handshake.
    ///
    /// Succeeds immediately when already connected. Concurrent calls are
    /// serialised, so only one socket is ever opened per attempt.
    ///
    /// # Errors
    ///
    /// - `TransportOpenFailed` if the socket cannot be bound
    /// - `ConnectTimeout` if the gateway does not answer in time
    /// - `NoConnectionsAvailable` if the gateway has no free channel
    pub async fn connect(&self) -> Result<()> {
        let _attempt = self.inner.connect_lock.lock().await;
        if self.with_shared(|s| s.session.is_connected() && s.socket.is_some()) {
            return Ok(());
        }

        let config = &self.inner.config;
        let hpai = Hpai::from_endpoint(&config.local);
        let request = ConnectRequest::new(hpai, hpai).build()?;

        self.with_shared(|s| s.session.begin_connect());
        knx_log!(info, "connecting to {}", config.gateway);
        self.inner.events.emit(ConnectionEvent::Connecting);

        let socket = match self.inner.transport.open(config.local).await {
            Ok(socket) => Arc::new(socket),
            Err(e) => {
                knx_log!(error, "cannot open transport on {}: {e}", config.local);
                self.with_shared(|s| s.session.finish_disconnect());
                return Err(e);
            }
        };

        let (tx, rx) = oneshot::channel();
        let receiver = tokio::spawn(receive_loop(self.downgrade(), Arc::clone(&socket)));
        self.with_shared(|s| {
            s.socket = Some(Arc::clone(&socket));
            if let Some(stale) = s.receiver.replace(receiver) {
                stale.abort();
            }
            s.pending_connect = Some(tx);
        });

        if let Err(e) = socket.send_to(&request, config.gateway).await {
            self.with_shared(|s| s.pending_connect = None);
            self.release().await;
            return Err(e);
        }
        knx_log!(debug, "connect request sent to {}", config.gateway);
        self.inner.events.emit(ConnectionEvent::Connect);

        let response = match time::timeout(config.connect_timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_receiver_gone)) => {
                knx_log!(warn, "transport closed during connect");
                self.release().await;
                return Err(KnxError::transport_closed());
            }
            Err(_elapsed) => {
                knx_log!(warn, "no connect response within {:?}", config.connect_timeout);
                self.with_shared(|s| s.pending_connect = None);
                self.release().await;
                return Err(KnxError::connect_timeout());
            }
        };

        let applied = self.with_shared(|s| {
            let applied = s.session.apply_connect_response(&response);
            if applied.is_ok() {
                s.session.mark_inbound(Instant::now());
            }
            applied
        });
        match applied {
            Ok(channel) => {
                knx_log!(info, "connected to {} on channel {channel}", config.gateway);
                self.inner.events.emit(ConnectionEvent::Connected);
                if config.keepalive {
                    self.start_keepalive();
                }
                Ok(())
            }
            Err(e) => {
                knx_log!(error, "gateway {} has no free tunneling channel", config.gateway);
                self.release().await;
                Err(e)
            }
        }
    }

    /// [`connect`](Self::connect) until it succeeds, sleeping a randomised,
    /// growing delay between attempts.
    ///
    /// # Errors
    ///
    /// Only `NoConnectionsAvailable` ends the loop early.
    pub async fn connect_with_retry(&self) -> Result<()> {
        let mut backoff = Backoff::from_config(&self.inner.config);
        loop {
            match self.connect().await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_no_connections_available() => return Err(e),
                Err(e) => {
                    let delay = backoff.next_delay();
                    knx_log!(warn, "connect failed: {e}; retrying in {delay:?}");
                    time::sleep(delay).await;
                }
            }
        }
    }

    /// Close the tunnel and stop all background work.
    ///
    /// Teardown always completes and emits `Close`, `Disconnect` and
    /// `Disconnected`; the result only reports whether the disconnect
    /// request reached the socket.
    pub async fn disconnect(&self) -> Result<()> {
        self.with_shared(|s| {
            if let Some(reconnect) = s.reconnect.take() {
                reconnect.abort();
            }
        });
        self.release().await
    }

    /// Tear down the binding: stop keepalive, tell the gateway if a channel
    /// is open, stop the receive loop and close the socket.
    pub(crate) async fn release(&self) -> Result<()> {
        let _teardown = self.inner.disconnect_lock.lock().await;
        let (channel, socket, receiver) = self.with_shared(|s| {
            if let Some(keepalive) = s.keepalive.take() {
                keepalive.abort();
            }
            s.pending_alive.clear();
            (s.session.begin_disconnect(), s.socket.take(), s.receiver.take())
        });

        let mut sent = Ok(());
        if let (Some(channel), Some(socket)) = (channel, socket.as_ref()) {
            knx_log!(info, "disconnecting channel {channel}");
            let hpai = Hpai::from_endpoint(&self.inner.config.local);
            sent = match DisconnectRequest::new(channel, hpai).build() {
                Ok(frame) => socket.send_to(&frame, self.inner.config.gateway).await,
                Err(e) => Err(e),
            };
            if let Err(e) = &sent {
                knx_log!(warn, "disconnect request for channel {channel} failed: {e}");
            }
        }

        if let Some(receiver) = receiver {
            receiver.abort();
        }
        if let Some(socket) = socket {
            socket.close();
        }
        self.with_shared(|s| s.session.finish_disconnect());

        self.inner.events.emit(ConnectionEvent::Close);
        self.inner.events.emit(ConnectionEvent::Disconnect);
        self.inner.events.emit(ConnectionEvent::Disconnected);
        sent
    }

    /// Whether a teardown has anything left to release
    pub(crate) fn is_bound(&self) -> bool {
        self.with_shared(|s| s.socket.is_some() || s.session.state() != ConnectionState::Disconnected)
    }

    /// Send one connection state request and wait for the answer.
    ///
    /// # Errors
    ///
    /// `NotConnected` without a tunnel (or if it closes meanwhile),
    /// `ResponseTimeout` if the gateway stays silent for the alive timeout.
    pub async fn probe_alive(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        let (socket, channel) = self
            .with_shared(|s| {
                let channel = s.session.channel_id()?;
                let socket = s.socket.as_ref().map(Arc::clone)?;
                s.pending_alive.push(tx);
                Some((socket, channel))
            })
            .ok_or_else(KnxError::not_connected)?;

        let hpai = Hpai::from_endpoint(&self.inner.config.local);
        let request = ConnectionStateRequest::new(channel, hpai).build()?;
        socket.send_to(&request, self.inner.config.gateway).await?;

        let answer = time::timeout(self.inner.config.alive_timeout, rx).await;
        match answer {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_cleared)) => Err(KnxError::not_connected()),
            Err(_elapsed) => {
                // drop our waiter and any other abandoned one
                self.with_shared(|s| s.pending_alive.retain(|waiter| !waiter.is_closed()));
                Err(KnxError::response_timeout())
            }
        }
    }

    /// Write raw payload bytes to `address` as a group value write.
    ///
    /// A single byte below 0x40 travels inside the APCI byte; anything else
    /// follows it.
    ///
    /// # Errors
    ///
    /// `InvalidAddressFormat` for bad text, `InvalidDataValue` for an empty
    /// or oversized payload, `NotConnected` without a tunnel.
    pub async fn write(&self, address: impl ToAddress, payload: &[u8]) -> Result<()> {
        let dest = address.to_address()?;
        let frame = cemi::build_write(self.inner.config.action_message_code, dest, payload)?;
        knx_log!(debug, "write {} bytes to {dest}", payload.len());
        self.send_cemi(&frame).await
    }

    /// Encode `value` as `dpt_id` and write it to `address`.
    pub async fn write_value(&self, address: impl ToAddress, dpt_id: &str, value: &DptValue) -> Result<()> {
        let dest = address.to_address()?;
        let payload = dpt::encode(dpt_id, value)?;
        self.write(dest, &payload).await
    }

    /// Send a group value read to `address` without waiting for the answer.
    pub async fn request_status(&self, address: impl ToAddress) -> Result<()> {
        let dest = address.to_address()?;
        let frame = cemi::build_read(self.inner.config.action_message_code, dest)?;
        knx_log!(debug, "status request to {dest}");
        self.send_cemi(&frame).await
    }

    /// Request the status of `address` and wait for its response.
    ///
    /// # Errors
    ///
    /// `ResponseTimeout` if no response arrives within the read timeout.
    pub async fn read(&self, address: impl ToAddress) -> Result<CemiFrame> {
        let dest = address.to_address()?;
        let mut responses = self.inner.events.listen(TelegramKind::Status, dest);
        let sent = self.request_status(dest).await;
        let answer = match sent {
            Ok(()) => time::timeout(self.inner.config.read_timeout, responses.recv())
                .await
                .ok()
                .flatten(),
            Err(_) => None,
        };
        drop(responses);
        self.inner.events.prune(TelegramKind::Status, dest);

        sent?;
        answer.ok_or_else(KnxError::response_timeout)
    }

    async fn send_cemi(&self, cemi: &[u8]) -> Result<()> {
        let (socket, frame) = self.with_shared(|s| {
            let socket = s.socket.as_ref().map(Arc::clone).ok_or_else(KnxError::not_connected)?;
            let frame = s.session.allocate_request(|channel, seq| {
                TunnelingRequest::new(ConnectionHeader::new(channel, seq), cemi).build()
            })?;
            Ok::<_, KnxError>((socket, frame))
        })?;
        socket.send_to(&frame, self.inner.config.gateway).await
    }

    fn start_keepalive(&self) {
        let handle = tokio::spawn(keepalive::supervise(self.downgrade()));
        self.with_shared(|s| {
            if let Some(previous) = s.keepalive.replace(handle) {
                previous.abort();
            }
        });
    }

    /// Forget the keepalive handle without aborting it; the supervisor
    /// calls this on itself before it hands over to a reconnect.
    pub(crate) fn detach_keepalive(&self) {
        self.with_shared(|s| s.keepalive = None);
    }

    pub(crate) fn record_missed_alive(&self) -> u32 {
        self.with_shared(|s| s.session.record_missed_alive())
    }

    /// Spawn a teardown-and-reconnect task unless one is already running.
    pub(crate) fn schedule_reconnect(&self) {
        self.with_shared(|s| {
            if s.reconnect.as_ref().is_some_and(|task| !task.is_finished()) {
                knx_log!(debug, "reconnect already scheduled");
                return;
            }
            s.reconnect = Some(tokio::spawn(keepalive::reconnect_task(self.downgrade())));
        });
    }

    async fn handle_datagram(&self, socket: &T::Socket, datagram: &[u8]) -> Flow {
        let frame = match KnxnetIpFrame::parse(datagram) {
            Ok(frame) => frame,
            Err(e) => {
                knx_log!(debug, "dropping malformed datagram ({} bytes): {e}", datagram.len());
                return Flow::Continue;
            }
        };
        let Some(service) = frame.service_type() else {
            knx_log!(debug, "dropping unknown service type {:#06x}", frame.header().service_type);
            return Flow::Continue;
        };

        let body = frame.body();
        match service {
            ServiceType::ConnectResponse => self.on_connect_response(body),
            ServiceType::ConnectionstateResponse => self.on_state_response(body),
            ServiceType::DisconnectRequest => return self.on_disconnect_request(socket, body).await,
            ServiceType::DisconnectResponse => match DisconnectResponse::parse(body) {
                Ok(response) => {
                    self.with_shared(|s| s.session.mark_inbound(Instant::now()));
                    knx_log!(
                        debug,
                        "disconnect response for channel {} (status {:#04x})",
                        response.channel_id,
                        response.status
                    );
                }
                Err(e) => knx_log!(debug, "dropping disconnect response: {e}"),
            },
            ServiceType::TunnellingRequest => self.on_tunneling_request(socket, body).await,
            ServiceType::TunnellingAck => self.on_tunneling_ack(body),
            ServiceType::ConnectRequest | ServiceType::ConnectionstateRequest => {
                knx_log!(debug, "ignoring client-side service {service:?} from gateway");
            }
        }
        Flow::Continue
    }

    fn on_connect_response(&self, body: &[u8]) {
        let response = match ConnectResponse::parse(body) {
            Ok(response) => response,
            Err(e) => {
                knx_log!(warn, "dropping malformed connect response: {e}");
                return;
            }
        };
        knx_log!(
            debug,
            "connect response: channel {} status {:#04x}",
            response.channel_id,
            response.status
        );
        match self.with_shared(|s| s.pending_connect.take()) {
            Some(waiter) => {
                if waiter.send(response).is_err() {
                    knx_log!(debug, "connect response arrived after the attempt ended");
                }
            }
            None => knx_log!(debug, "unsolicited connect response"),
        }
    }

    fn on_state_response(&self, body: &[u8]) {
        let response = match ConnectionStateResponse::parse(body) {
            Ok(response) => response,
            Err(e) => {
                knx_log!(debug, "dropping malformed state response: {e}");
                return;
            }
        };
        if self.channel_id() != Some(response.channel_id) {
            knx_log!(debug, "state response for foreign channel {}", response.channel_id);
            return;
        }

        self.with_shared(|s| s.session.mark_inbound(Instant::now()));
        if response.is_alive() {
            let waiters = self.with_shared(|s| core::mem::take(&mut s.pending_alive));
            knx_log!(trace, "channel {} alive", response.channel_id);
            self.inner.events.emit(ConnectionEvent::Alive);
            for waiter in waiters {
                if waiter.send(()).is_err() {
                    knx_log!(trace, "alive arrived after a probe timed out");
                }
            }
        } else {
            knx_log!(warn, "gateway no longer knows channel {}", response.channel_id);
            self.schedule_reconnect();
        }
    }

    async fn on_disconnect_request(&self, socket: &T::Socket, body: &[u8]) -> Flow {
        let request = match DisconnectRequest::parse(body) {
            Ok(request) => request,
            Err(e) => {
                knx_log!(debug, "dropping malformed disconnect request: {e}");
                return Flow::Continue;
            }
        };
        if self.channel_id() != Some(request.channel_id) {
            knx_log!(debug, "disconnect request for foreign channel {}", request.channel_id);
            return Flow::Continue;
        }

        knx_log!(info, "gateway closed channel {}", request.channel_id);
        let answered = match DisconnectResponse::ok(request.channel_id).build() {
            Ok(frame) => socket.send_to(&frame, self.inner.config.gateway).await,
            Err(e) => Err(e),
        };
        if let Err(e) = answered {
            knx_log!(warn, "disconnect response failed: {e}");
        }

        let released = self.with_shared(|s| {
            // this task is the receiver; its handle is dropped, not aborted
            s.receiver = None;
            if let Some(keepalive) = s.keepalive.take() {
                keepalive.abort();
            }
            s.pending_alive.clear();
            s.session.finish_disconnect();
            s.socket.take()
        });
        if let Some(released) = released {
            released.close();
        }
        self.inner.events.emit(ConnectionEvent::Close);
        self.inner.events.emit(ConnectionEvent::Disconnect);
        self.inner.events.emit(ConnectionEvent::Disconnected);

        if self.inner.config.auto_reconnect {
            self.schedule_reconnect();
        }
        Flow::Stop
    }

    async fn on_tunneling_request(&self, socket: &T::Socket, body: &[u8]) {
        let request = match TunnelingRequest::parse(body) {
            Ok(request) => request,
            Err(e) => {
                knx_log!(debug, "dropping malformed tunneling request: {e}");
                return;
            }
        };
        let header = request.connection_header;
        let verdict = self.with_shared(|s| {
            let verdict = s.session.accept_tunneling(header.channel_id, header.sequence_counter);
            if verdict != Inbound::Ignore {
                s.session.mark_inbound(Instant::now());
            }
            verdict
        });

        match verdict {
            Inbound::Ignore => {
                knx_log!(debug, "tunneling request for channel {} ignored", header.channel_id);
                return;
            }
            Inbound::Duplicate => {
                knx_log!(trace, "duplicate sequence {}, acknowledging only", header.sequence_counter);
            }
            Inbound::Process => {}
        }

        let acked = match TunnelingAck::new(header, E_NO_ERROR).build() {
            Ok(ack) => socket.send_to(&ack, self.inner.config.gateway).await,
            Err(e) => Err(e),
        };
        if let Err(e) = acked {
            knx_log!(warn, "ack for sequence {} failed: {e}", header.sequence_counter);
        }

        if verdict == Inbound::Process {
            self.dispatch(request.cemi_data);
        }
    }

    fn on_tunneling_ack(&self, body: &[u8]) {
        match TunnelingAck::parse(body) {
            Ok(ack) => {
                let ours = self.with_shared(|s| {
                    let ours = s.session.channel_id() == Some(ack.connection_header.channel_id);
                    if ours {
                        s.session.mark_inbound(Instant::now());
                    }
                    ours
                });
                if ours && !ack.is_ok() {
                    knx_log!(
                        warn,
                        "gateway rejected sequence {} (status {:#04x})",
                        ack.connection_header.sequence_counter,
                        ack.status
                    );
                } else {
                    knx_log!(trace, "ack for sequence {}", ack.connection_header.sequence_counter);
                }
            }
            Err(e) => knx_log!(debug, "dropping malformed ack: {e}"),
        }
    }

    fn dispatch(&self, cemi_data: &[u8]) {
        let frame = match CemiFrame::parse(cemi_data, self.inner.config.three_level_addressing) {
            Ok(frame) => frame,
            Err(e) => {
                knx_log!(debug, "dropping undecodable cEMI frame: {e}");
                return;
            }
        };
        if !frame.is_indication() {
            knx_log!(debug, "ignoring cEMI message code {:#04x}", frame.message_code);
            return;
        }
        match frame.telegram_kind() {
            Some(kind) => {
                knx_log!(trace, "{kind:?} telegram for {}", frame.destination_text);
                self.inner.events.publish(kind, frame);
            }
            None => knx_log!(
                debug,
                "dropping telegram type {:?} for {}",
                frame.apci_type(),
                frame.destination_text
            ),
        }
    }
}

/// Consecutive receive errors after which the receive loop gives up
const RECEIVE_FAILURE_LIMIT: u32 = 10;
/// Pause after the first receive error, growing with each further one
const RECEIVE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Reads datagrams until the socket closes, the connection is dropped, or
/// receiving keeps failing. Once it stops, unanswered keepalives lead to a
/// reconnect.
async fn receive_loop<T: Transport>(connection: WeakConnection<T>, socket: Arc<T::Socket>) {
    let mut buf = [0u8; MAX_PACKET_SIZE];
    let mut failures = 0u32;
    loop {
        let (len, from) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(KnxError::Transport(e)) if e.is_closed() => {
                knx_log!(debug, "receive loop stopped, socket closed");
                return;
            }
            Err(e) => {
                failures += 1;
                if failures >= RECEIVE_FAILURE_LIMIT {
                    knx_log!(error, "receive failed {failures} times in a row, giving up: {e}");
                    return;
                }
                knx_log!(warn, "receive failed: {e}");
                time::sleep(RECEIVE_RETRY_DELAY * failures).await;
                continue;
            }
        };
        failures = 0;
        let Some(connection) = connection.upgrade() else {
            return;
        };
        knx_log!(trace, "{len} bytes from {from}");
        if connection.handle_datagram(&socket, &buf[..len]).await == Flow::Stop {
            return;
        }
    }
}
