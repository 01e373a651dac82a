#![doc = include_str!("../README.md")]

//! ## Crate layout
//!
//! - [`addressing`]: group and individual addresses
//! - [`dpt`]: datapoint value codecs (DPT 1, 5 and 9)
//! - [`protocol`]: datagram, service and cEMI codecs, session state and
//!   the async [`TunnelingConnection`]
//! - [`events`]: lifecycle events and per-address telegram listeners
//! - [`net`]: endpoints and the transport traits, with UDP and mock
//!   implementations
//! - [`config`]: connection settings
//! - [`error`]: the [`KnxError`] taxonomy

// Macro modules (must be declared before use)
#[macro_use]
mod logging;
#[macro_use]
pub mod macros;

pub mod addressing;
pub mod config;
pub mod dpt;
pub mod error;
pub mod events;
pub mod net;
pub mod protocol;

#[doc(hidden)]
pub use log as __log;

// Re-export commonly used types
#[doc(inline)]
pub use addressing::{GroupAddress, IndividualAddress, KnxAddress, ToAddress};
#[doc(inline)]
pub use config::TunnelConfig;
#[doc(inline)]
pub use dpt::{Dpt1, Dpt5, Dpt9, DptDecode, DptEncode, DptValue};
#[doc(inline)]
pub use error::{KnxError, Result};
#[doc(inline)]
pub use events::ConnectionEvent;
#[doc(inline)]
pub use net::{Endpoint, Ipv4Addr};
#[doc(inline)]
pub use protocol::async_tunnel::TunnelingConnection;
#[doc(inline)]
pub use protocol::cemi::CemiFrame;
#[doc(inline)]
pub use protocol::tunnel::ConnectionState;
