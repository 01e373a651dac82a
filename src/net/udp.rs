//! UDP transport over tokio sockets.

use crate::error::{KnxError, Result};
use crate::net::transport::{FrameReceiver, FrameSender, Transport};
use crate::net::Endpoint;
use std::net::SocketAddr;
use tokio::net::UdpSocket;

/// Opens tokio UDP sockets.
#[derive(Debug, Clone, Copy, Default)]
pub struct UdpTransport;

/// A bound UDP socket.
#[derive(Debug)]
pub struct UdpLink {
    socket: UdpSocket,
}

impl UdpLink {
    /// Address the socket is bound to
    pub fn local_endpoint(&self) -> Result<Endpoint> {
        let addr = self.socket.local_addr().map_err(|e| {
            knx_log!(warn, "local_addr failed: {e}");
            KnxError::invalid_endpoint()
        })?;
        Endpoint::try_from(addr)
    }
}

impl Transport for UdpTransport {
    type Socket = UdpLink;

    async fn open(&self, local: Endpoint) -> Result<UdpLink> {
        match UdpSocket::bind(SocketAddr::from(local)).await {
            Ok(socket) => {
                knx_log!(debug, "bound UDP socket on {local}");
                Ok(UdpLink { socket })
            }
            Err(e) => {
                knx_log!(error, "cannot bind UDP socket on {local}: {e}");
                Err(KnxError::transport_open_failed())
            }
        }
    }
}

impl FrameSender for UdpLink {
    async fn send_to(&self, data: &[u8], dest: Endpoint) -> Result<()> {
        match self.socket.send_to(data, SocketAddr::from(dest)).await {
            Ok(_) => Ok(()),
            Err(e) => {
                knx_log!(warn, "send of {} bytes to {dest} failed: {e}", data.len());
                Err(KnxError::send_failed())
            }
        }
    }
}

impl FrameReceiver for UdpLink {
    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, Endpoint)> {
        let (len, from) = self.socket.recv_from(buf).await.map_err(|e| {
            knx_log!(warn, "receive failed: {e}");
            KnxError::receive_failed()
        })?;
        Ok((len, Endpoint::try_from(from)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_loopback_roundtrip() {
        let a = UdpTransport.open(Endpoint::new([127, 0, 0, 1], 0)).await.unwrap();
        let b = UdpTransport.open(Endpoint::new([127, 0, 0, 1], 0)).await.unwrap();
        let b_addr = b.local_endpoint().unwrap();

        a.send_to(&[0x06, 0x10, 0x04, 0x21], b_addr).await.unwrap();

        let mut buf = [0u8; 16];
        let (len, from) = b.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], &[0x06, 0x10, 0x04, 0x21]);
        assert_eq!(from, a.local_endpoint().unwrap());
    }
}
