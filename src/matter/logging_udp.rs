//! UDP socket wrapper that traces Matter transport packets.
//!
//! Packet sizes and peers are logged at debug level, the first bytes of each
//! payload at trace level (`RUST_LOG=matter_sensor_node::matter=trace`).

use std::net::{SocketAddr, UdpSocket};

use async_io::Async;
use log::{debug, error, log_enabled, trace};

use rs_matter::error::{Error, ErrorCode};
use rs_matter::transport::network::{Address, NetworkReceive, NetworkSend};

/// Bytes of payload included in trace output
const PREVIEW_LEN: usize = 64;

/// Logging wrapper around the transport socket.
pub struct LoggingUdpSocket<'a> {
    inner: &'a Async<UdpSocket>,
}

impl<'a> LoggingUdpSocket<'a> {
    pub fn new(socket: &'a Async<UdpSocket>) -> Self {
        Self { inner: socket }
    }

    async fn send(&self, data: &[u8], addr: Address) -> Result<(), Error> {
        debug!("[UDP TX] {} bytes to {}", data.len(), addr);
        trace_payload("TX", data);

        let socket_addr = addr.udp().ok_or(ErrorCode::NoNetworkInterface)?;
        self.inner.send_to(data, socket_addr).await?;
        Ok(())
    }

    async fn readable(&self) -> Result<(), Error> {
        trace!("[UDP] Waiting for packet");
        self.inner.readable().await?;
        Ok(())
    }

    async fn recv(&self, buffer: &mut [u8]) -> Result<(usize, Address), Error> {
        let (len, addr): (usize, SocketAddr) = self.inner.recv_from(buffer).await.map_err(|e| {
            error!("[UDP RX] Error receiving packet: {:?}", e);
            e
        })?;

        debug!("[UDP RX] {} bytes from {}", len, addr);
        trace_payload("RX", &buffer[..len]);
        Ok((len, Address::Udp(addr)))
    }
}

fn trace_payload(direction: &str, data: &[u8]) {
    if log_enabled!(log::Level::Trace) {
        let preview = &data[..data.len().min(PREVIEW_LEN)];
        trace!("[UDP {}] payload: {:02x?}", direction, preview);
    }
}

impl NetworkSend for LoggingUdpSocket<'_> {
    async fn send_to(&mut self, data: &[u8], addr: Address) -> Result<(), Error> {
        self.send(data, addr).await
    }
}

impl NetworkReceive for LoggingUdpSocket<'_> {
    async fn wait_available(&mut self) -> Result<(), Error> {
        self.readable().await
    }

    async fn recv_from(&mut self, buffer: &mut [u8]) -> Result<(usize, Address), Error> {
        self.recv(buffer).await
    }
}

// Shared-reference impls so one wrapper serves as both send and receive half
impl NetworkSend for &LoggingUdpSocket<'_> {
    async fn send_to(&mut self, data: &[u8], addr: Address) -> Result<(), Error> {
        self.send(data, addr).await
    }
}

impl NetworkReceive for &LoggingUdpSocket<'_> {
    async fn wait_available(&mut self) -> Result<(), Error> {
        self.readable().await
    }

    async fn recv_from(&mut self, buffer: &mut [u8]) -> Result<(usize, Address), Error> {
        self.recv(buffer).await
    }
}
