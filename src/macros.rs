//! Convenience macros for addresses and connection calls.

/// Creates a [`GroupAddress`](crate::addressing::GroupAddress) from 3-level notation.
///
/// # Syntax
///
/// ```text
/// ga!(main/middle/sub)
/// ```
///
/// - `main`: Main group (0-31)
/// - `middle`: Middle group (0-7)
/// - `sub`: Sub group (0-255)
///
/// # Examples
///
/// ```rust
/// use knx_tunnel::{ga, GroupAddress};
///
/// let light = ga!(1/2/3);
/// assert_eq!(light, GroupAddress::new(1, 2, 3).unwrap());
/// assert_eq!(light.to_string(), "1/2/3");
/// ```
///
/// # Compile-Time Validation
///
/// ```compile_fail
/// // main group > 31
/// let addr = knx_tunnel::ga!(32/0/0);
/// ```
///
/// ```compile_fail
/// // middle group > 7
/// let addr = knx_tunnel::ga!(1/8/0);
/// ```
#[macro_export]
macro_rules! ga {
    ($main:literal / $middle:literal / $sub:literal) => {{
        const _: () = {
            if $main > 31 {
                panic!("Main group must be 0-31");
            }
            if $middle > 7 {
                panic!("Middle group must be 0-7");
            }
            if $sub > 255 {
                panic!("Sub group must be 0-255");
            }
        };

        // MMMMMIII SSSSSSSS
        const RAW: u16 = (($main & 0x1F) << 11) | (($middle & 0x07) << 8) | ($sub & 0xFF);
        $crate::addressing::GroupAddress::from(RAW)
    }};
}

/// Write to a group address given in 3-level notation.
///
/// With a DPT id the value is encoded first
/// ([`write_value`](crate::TunnelingConnection::write_value)); without one
/// the expression is sent as raw payload bytes
/// ([`write`](crate::TunnelingConnection::write)).
///
/// # Examples
///
/// ```no_run
/// use knx_tunnel::{knx_write, DptValue, Endpoint, TunnelConfig, TunnelingConnection};
///
/// # async fn demo() -> knx_tunnel::Result<()> {
/// let connection = TunnelingConnection::new(TunnelConfig::new(Endpoint::gateway([192, 168, 1, 10])));
/// connection.connect().await?;
///
/// // Turn on a light
/// knx_write!(connection, 1/2/3, "1.001", DptValue::Bool(true)).await?;
///
/// // Dimmer to 50% as a raw byte
/// knx_write!(connection, 2/1/5, &[0x80]).await?;
/// # Ok(())
/// # }
/// ```
#[macro_export]
macro_rules! knx_write {
    ($connection:expr, $main:literal / $middle:literal / $sub:literal, $dpt:literal, $value:expr) => {
        $connection.write_value($crate::ga!($main / $middle / $sub), $dpt, &$value)
    };
    ($connection:expr, $main:literal / $middle:literal / $sub:literal, $payload:expr) => {
        $connection.write($crate::ga!($main / $middle / $sub), $payload)
    };
}

/// Read a group address given in 3-level notation and wait for the
/// response ([`read`](crate::TunnelingConnection::read)).
///
/// # Examples
///
/// ```no_run
/// use knx_tunnel::{knx_read, Endpoint, TunnelConfig, TunnelingConnection};
///
/// # async fn demo() -> knx_tunnel::Result<()> {
/// let connection = TunnelingConnection::new(TunnelConfig::new(Endpoint::gateway([192, 168, 1, 10])));
/// connection.connect().await?;
///
/// let frame = knx_read!(connection, 1/2/10).await?;
/// println!("temperature: {}", frame.value("9.001")?);
/// # Ok(())
/// # }
/// ```
#[macro_export]
macro_rules! knx_read {
    ($connection:expr, $main:literal / $middle:literal / $sub:literal) => {
        $connection.read($crate::ga!($main / $middle / $sub))
    };
}
