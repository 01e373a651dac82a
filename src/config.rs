//! Connection configuration.
//!
//! [`TunnelConfig`] carries the gateway endpoint, addressing style and all
//! timings of a [`TunnelingConnection`](crate::TunnelingConnection). Timings
//! not set explicitly derive from the connect timeout.
//!
//! Configuration can also be read from `KEY=VALUE` text or the process
//! environment:
//!
//! ```text
//! # gateway in the living room
//! KNX_GATEWAY_IP=192.168.1.10
//! KNX_GATEWAY_PORT=3671
//! KNX_THREE_LEVEL=true
//! KNX_CONNECT_TIMEOUT_MS=5000
//! ```

use crate::error::{KnxError, Result};
use crate::net::{Endpoint, Ipv4Addr};
use crate::protocol::constants::{
    CONNECT_TIMEOUT, HEARTBEAT_INTERVAL, KNXNETIP_DEFAULT_PORT, MISSED_ALIVE_LIMIT,
};
use core::time::Duration;

const GATEWAY_IP: &str = "KNX_GATEWAY_IP";
const GATEWAY_PORT: &str = "KNX_GATEWAY_PORT";
const LOCAL_IP: &str = "KNX_LOCAL_IP";
const LOCAL_PORT: &str = "KNX_LOCAL_PORT";
const THREE_LEVEL: &str = "KNX_THREE_LEVEL";
const ACTION_MESSAGE_CODE: &str = "KNX_ACTION_MESSAGE_CODE";
const CONNECT_TIMEOUT_MS: &str = "KNX_CONNECT_TIMEOUT_MS";
const KEEPALIVE_INTERVAL_MS: &str = "KNX_KEEPALIVE_INTERVAL_MS";
const MISSED_ALIVE: &str = "KNX_MISSED_ALIVE_LIMIT";
const AUTO_RECONNECT: &str = "KNX_AUTO_RECONNECT";

/// Settings for one tunneling connection.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TunnelConfig {
    /// Gateway control endpoint
    pub gateway: Endpoint,
    /// Local binding; `0.0.0.0:0` lets the OS choose
    pub local: Endpoint,
    /// Render group addresses as `main/middle/sub` instead of `main/sub`
    pub three_level_addressing: bool,
    /// Message code for outbound L_Data requests; 0 means L_Data.req
    pub action_message_code: u8,
    /// Bound on the connect handshake
    pub connect_timeout: Duration,
    /// Bound on one connection state round trip
    pub alive_timeout: Duration,
    /// Period of the keepalive cycle
    pub keepalive_interval: Duration,
    /// Consecutive unanswered state requests before the tunnel is stale
    pub missed_alive_limit: u32,
    /// Lower bound of the reconnect backoff
    pub reconnect_min_delay: Duration,
    /// Upper bound of the reconnect backoff
    pub reconnect_max_delay: Duration,
    /// Bound on [`read`](crate::TunnelingConnection::read)
    pub read_timeout: Duration,
    /// Run the keepalive supervisor while connected
    pub keepalive: bool,
    /// Reconnect after a stale or gateway-closed tunnel
    pub auto_reconnect: bool,
}

impl TunnelConfig {
    /// Defaults for the given gateway.
    pub fn new(gateway: Endpoint) -> Self {
        Self {
            gateway,
            local: Endpoint::unspecified(),
            three_level_addressing: true,
            action_message_code: 0,
            connect_timeout: CONNECT_TIMEOUT,
            alive_timeout: CONNECT_TIMEOUT * 2,
            keepalive_interval: HEARTBEAT_INTERVAL,
            missed_alive_limit: MISSED_ALIVE_LIMIT,
            reconnect_min_delay: CONNECT_TIMEOUT * 3,
            reconnect_max_delay: CONNECT_TIMEOUT * 10,
            read_timeout: CONNECT_TIMEOUT,
            keepalive: true,
            auto_reconnect: true,
        }
    }

    #[must_use]
    pub fn with_local(mut self, local: Endpoint) -> Self {
        self.local = local;
        self
    }

    #[must_use]
    pub fn with_three_level_addressing(mut self, three_level: bool) -> Self {
        self.three_level_addressing = three_level;
        self
    }

    #[must_use]
    pub fn with_action_message_code(mut self, code: u8) -> Self {
        self.action_message_code = code;
        self
    }

    /// Set the connect timeout and re-derive the alive, reconnect and read
    /// timeouts from it.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self.alive_timeout = timeout * 2;
        self.reconnect_min_delay = timeout * 3;
        self.reconnect_max_delay = timeout * 10;
        self.read_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_alive_timeout(mut self, timeout: Duration) -> Self {
        self.alive_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    #[must_use]
    pub fn with_missed_alive_limit(mut self, limit: u32) -> Self {
        self.missed_alive_limit = limit;
        self
    }

    #[must_use]
    pub fn with_reconnect_delay(mut self, min: Duration, max: Duration) -> Self {
        self.reconnect_min_delay = min;
        self.reconnect_max_delay = max.max(min);
        self
    }

    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_keepalive(mut self, enabled: bool) -> Self {
        self.keepalive = enabled;
        self
    }

    #[must_use]
    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Parse `KEY=VALUE` lines. Blank lines and `#` comments are skipped.
    pub fn from_config_str(text: &str) -> Result<Self> {
        Self::from_lookup(|key| lookup_line(text, key))
    }

    /// Read the same keys from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; only `KNX_GATEWAY_IP` is required.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let gateway_ip = lookup(GATEWAY_IP).ok_or(KnxError::missing_config_key(GATEWAY_IP))?;
        let gateway_port = parse_or(&lookup, GATEWAY_PORT, KNXNETIP_DEFAULT_PORT)?;
        let mut config = Self::new(Endpoint::new(parse_value::<Ipv4Addr>(GATEWAY_IP, &gateway_ip)?, gateway_port));

        let local_ip = parse_or(&lookup, LOCAL_IP, Ipv4Addr::UNSPECIFIED)?;
        let local_port = parse_or(&lookup, LOCAL_PORT, 0)?;
        config.local = Endpoint::new(local_ip, local_port);

        if let Some(ms) = parse_opt::<u64>(&lookup, CONNECT_TIMEOUT_MS)? {
            config = config.with_connect_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = parse_opt::<u64>(&lookup, KEEPALIVE_INTERVAL_MS)? {
            config.keepalive_interval = Duration::from_millis(ms);
        }
        config.three_level_addressing = parse_or(&lookup, THREE_LEVEL, true)?;
        config.missed_alive_limit = parse_or(&lookup, MISSED_ALIVE, MISSED_ALIVE_LIMIT)?;
        config.auto_reconnect = parse_or(&lookup, AUTO_RECONNECT, true)?;
        config.action_message_code = match lookup(ACTION_MESSAGE_CODE) {
            Some(raw) => parse_code(&raw)?,
            None => 0,
        };

        knx_log!(debug, "configuration loaded for gateway {}", config.gateway);
        Ok(config)
    }
}

fn lookup_line(text: &str, key: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .find(|(k, _)| k.trim() == key)
        .map(|(_, value)| value.trim().to_owned())
}

fn parse_value<T: core::str::FromStr>(key: &'static str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_parse| KnxError::invalid_config_value(key))
}

fn parse_opt<T: core::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>> {
    lookup(key).map(|raw| parse_value(key, &raw)).transpose()
}

fn parse_or<T: core::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T> {
    Ok(parse_opt(lookup, key)?.unwrap_or(default))
}

fn parse_code(raw: &str) -> Result<u8> {
    let raw = raw.trim();
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => raw.parse(),
    };
    parsed.map_err(|_parse| KnxError::invalid_config_value(ACTION_MESSAGE_CODE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_derive_from_connect_timeout() {
        let config = TunnelConfig::new(Endpoint::gateway([192, 168, 1, 10]));
        assert_eq!(config.gateway.port, 3671);
        assert_eq!(config.local, Endpoint::unspecified());
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.alive_timeout, Duration::from_secs(10));
        assert_eq!(config.reconnect_min_delay, Duration::from_secs(15));
        assert_eq!(config.reconnect_max_delay, Duration::from_secs(50));
        assert_eq!(config.keepalive_interval, Duration::from_secs(60));
        assert_eq!(config.missed_alive_limit, 3);
        assert!(config.three_level_addressing);
        assert!(config.auto_reconnect);
    }

    #[test]
    fn test_with_connect_timeout() {
        let config = TunnelConfig::new(Endpoint::gateway([10, 0, 0, 1]))
            .with_connect_timeout(Duration::from_secs(2));
        assert_eq!(config.alive_timeout, Duration::from_secs(4));
        assert_eq!(config.read_timeout, Duration::from_secs(2));
        assert_eq!(config.reconnect_max_delay, Duration::from_secs(20));
    }

    #[test]
    fn test_from_config_str() {
        let text = "
            # gateway
            KNX_GATEWAY_IP=192.168.1.10
            KNX_GATEWAY_PORT = 3672
            KNX_LOCAL_IP=10.0.0.5
            KNX_LOCAL_PORT=3671
            KNX_THREE_LEVEL=false
            KNX_ACTION_MESSAGE_CODE=0x29
            KNX_CONNECT_TIMEOUT_MS=1000
            KNX_MISSED_ALIVE_LIMIT=5
        ";
        let config = TunnelConfig::from_config_str(text).unwrap();
        assert_eq!(config.gateway, Endpoint::new([192, 168, 1, 10], 3672));
        assert_eq!(config.local, Endpoint::new([10, 0, 0, 5], 3671));
        assert!(!config.three_level_addressing);
        assert_eq!(config.action_message_code, 0x29);
        assert_eq!(config.alive_timeout, Duration::from_secs(2));
        assert_eq!(config.missed_alive_limit, 5);
    }

    #[test]
    fn test_missing_gateway() {
        let err = TunnelConfig::from_config_str("KNX_GATEWAY_PORT=3671").unwrap_err();
        assert_eq!(err, KnxError::missing_config_key("KNX_GATEWAY_IP"));
    }

    #[test]
    fn test_invalid_values() {
        let err = TunnelConfig::from_config_str("KNX_GATEWAY_IP=192.168.1").unwrap_err();
        assert_eq!(err, KnxError::invalid_config_value("KNX_GATEWAY_IP"));

        let err = TunnelConfig::from_config_str("KNX_GATEWAY_IP=10.0.0.1\nKNX_AUTO_RECONNECT=maybe")
            .unwrap_err();
        assert_eq!(err, KnxError::invalid_config_value("KNX_AUTO_RECONNECT"));
    }

    #[test]
    fn test_decimal_message_code() {
        let config = TunnelConfig::from_lookup(|key| match key {
            "KNX_GATEWAY_IP" => Some("10.0.0.1".into()),
            "KNX_ACTION_MESSAGE_CODE" => Some("17".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.action_message_code, 0x11);
    }
}
