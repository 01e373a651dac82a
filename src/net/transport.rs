//! Transport abstraction for KNXnet/IP communication.
//!
//! The connection is generic over a [`Transport`], which opens datagram
//! sockets; a socket implements [`FrameSender`] and [`FrameReceiver`]. This
//! keeps the state machine testable against
//! [`MockTransport`](super::MockTransport) and lets
//! [`UdpTransport`](super::UdpTransport) stay a thin wrapper over tokio.
//!
//! ## Design Pattern
//!
//! - High-level code (`TunnelingConnection`) depends on these traits
//! - Socket implementations depend on the same traits
//! - Both can vary independently
//!
//! ## Example
//!
//! ```rust,no_run
//! use knx_tunnel::net::{Endpoint, FrameSender, Transport, UdpTransport};
//!
//! # async fn demo() -> knx_tunnel::Result<()> {
//! let socket = UdpTransport.open(Endpoint::unspecified()).await?;
//! socket.send_to(&[0x06, 0x10], Endpoint::gateway([192, 168, 1, 10])).await?;
//! # Ok(())
//! # }
//! ```

use crate::error::Result;
use crate::net::Endpoint;
use core::future::Future;

/// Factory for datagram sockets.
///
/// `open` is called once per connect attempt; the returned socket is shared
/// between the receive task and senders, hence `&self` methods throughout.
pub trait Transport: Send + Sync + 'static {
    /// Socket type produced by [`open`](Self::open)
    type Socket: FrameSender + FrameReceiver + Send + Sync + 'static;

    /// Bind a socket to `local` (port 0 picks any free port).
    ///
    /// # Errors
    ///
    /// `TransportOpenFailed` if the socket cannot be created or bound.
    fn open(&self, local: Endpoint) -> impl Future<Output = Result<Self::Socket>> + Send;
}

/// Outbound half of a datagram socket.
pub trait FrameSender {
    /// Send one datagram to `dest`.
    ///
    /// Completion is the returned result; failures are `SendFailed`.
    fn send_to(&self, data: &[u8], dest: Endpoint) -> impl Future<Output = Result<()>> + Send;
}

/// Inbound half of a datagram socket.
pub trait FrameReceiver {
    /// Wait for the next datagram; returns its length and sender.
    ///
    /// Fails with `TransportClosed` once the socket is closed.
    fn recv_from(&self, buf: &mut [u8]) -> impl Future<Output = Result<(usize, Endpoint)>> + Send;

    /// Release the binding. Default is a no-op for sockets that close on drop.
    fn close(&self) {}
}
