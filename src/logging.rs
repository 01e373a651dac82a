//! Logging macro for the tunneling client.
//!
//! All diagnostics go through the [`log`] facade so applications can pick
//! any logger implementation (or none).
//!
//! # Usage
//!
//! ```rust
//! use knx_tunnel::knx_log;
//!
//! knx_log!(info, "Connection established");
//! knx_log!(debug, "Received {} bytes", 42);
//! knx_log!(warn, "Timeout occurred");
//! ```

/// Unified logging macro.
///
/// The first token selects the level (`trace`, `debug`, `info`, `warn`,
/// `error`), the rest is passed to the matching `log` macro.
#[macro_export]
macro_rules! knx_log {
    (info, $($arg:tt)*) => { $crate::__log::info!($($arg)*) };
    (debug, $($arg:tt)*) => { $crate::__log::debug!($($arg)*) };
    (warn, $($arg:tt)*) => { $crate::__log::warn!($($arg)*) };
    (error, $($arg:tt)*) => { $crate::__log::error!($($arg)*) };
    (trace, $($arg:tt)*) => { $crate::__log::trace!($($arg)*) };
}
