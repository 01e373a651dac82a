//! KNXnet/IP protocol implementation.
//!
//! Codecs for datagrams, services and cEMI frames, the sans-IO session
//! state, and the async connection that drives it over a transport.

pub mod async_tunnel;
pub mod cemi;
pub mod constants;
pub mod frame;
pub mod keepalive;
pub mod sequence;
pub mod services;
pub mod tunnel;

pub use async_tunnel::TunnelingConnection;
pub use cemi::*;
pub use constants::*;
pub use frame::*;
pub use keepalive::Backoff;
pub use sequence::*;
pub use services::*;
pub use tunnel::*;
