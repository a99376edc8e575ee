//! Transport to the controller.
//!
//! Each call to the transport opens its own TCP connection and closes it when
//! done. The controller keeps a single variable selection for all clients, so
//! holding connections open buys nothing and stale sockets are avoided.

use super::frame::{Request, LENGTH_OFFSET, MAX_RESPONSE_LENGTH};
use crate::error::{ClientError, ProtocolError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::trace;
use ventlink_core::DeviceConfig;

/// Raw answer of the device to a variable query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reading {
    /// Variable name echoed by the device.
    pub name: String,
    /// Undecoded value string.
    pub value: String,
}

/// A channel to the controller's variable interface.
///
/// Implementations perform a single attempt; retries and serialization are
/// the caller's concern.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Select `name` and read back `name=value` with `size` value bytes.
    async fn read_variable(&self, name: &str, size: usize) -> Result<Reading>;

    /// Send a `name=value` assignment.
    async fn write_variable(&self, assignment: &str) -> Result<()>;
}

/// Shared transport handle.
pub type DynTransport = Arc<dyn Transport>;

/// Modbus-TCP transport opening one connection per exchange.
pub struct TcpTransport {
    address: String,
    unit_id: u8,
    timeout: Duration,
    transaction_id: AtomicU16,
}

impl TcpTransport {
    /// Create a transport for `address` (`host:port`).
    pub fn new(address: impl Into<String>, unit_id: u8, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            unit_id,
            timeout,
            transaction_id: AtomicU16::new(rand::random()),
        }
    }

    pub fn from_config(config: &DeviceConfig) -> Self {
        Self::new(config.address(), config.unit_id, config.timeout())
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Advance the transaction counter. Wraps at 65536.
    fn next_transaction_id(&self) -> u16 {
        self.transaction_id
            .fetch_add(1, Ordering::Relaxed)
            .wrapping_add(1)
    }

    async fn connect(&self) -> Result<Connection> {
        let stream = timeout(self.timeout, TcpStream::connect(&self.address))
            .await
            .map_err(|_| ClientError::timeout("connect", self.timeout))??;
        stream.set_nodelay(true)?;
        trace!(address = %self.address, "Connected");

        Ok(Connection {
            stream,
            timeout: self.timeout,
        })
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn read_variable(&self, name: &str, size: usize) -> Result<Reading> {
        let mut connection = self.connect().await?;
        let result = self.query(&mut connection, name, size).await;
        connection.close().await;
        result
    }

    async fn write_variable(&self, assignment: &str) -> Result<()> {
        let request = Request::write(self.next_transaction_id(), self.unit_id, assignment)?;
        let mut connection = self.connect().await?;
        let result = connection
            .exchange(&request)
            .await
            .and_then(|raw| Ok(request.decode_write_response(&raw)?));
        connection.close().await;
        result
    }
}

impl TcpTransport {
    /// Select the variable, then read its answer over the same connection.
    async fn query(&self, connection: &mut Connection, name: &str, size: usize) -> Result<Reading> {
        let select = Request::write(self.next_transaction_id(), self.unit_id, name)?;
        let raw = connection.exchange(&select).await?;
        select.decode_write_response(&raw)?;

        let read = Request::read(self.next_transaction_id(), self.unit_id, name.len() + 1 + size)?;
        let raw = connection.exchange(&read).await?;
        let response = read.decode_read_response(&raw)?;

        let (echoed, value) = response.split(name.len());
        Ok(Reading {
            name: echoed.to_string(),
            value: value.to_string(),
        })
    }
}

/// One open connection. Dropping it closes the socket.
struct Connection {
    stream: TcpStream,
    timeout: Duration,
}

impl Connection {
    /// Send a request and read exactly one response frame.
    async fn exchange(&mut self, request: &Request) -> Result<Vec<u8>> {
        let bytes = request.as_bytes();
        timeout(self.timeout, self.stream.write_all(bytes))
            .await
            .map_err(|_| ClientError::timeout("write", self.timeout))??;

        let mut frame = vec![0u8; LENGTH_OFFSET];
        timeout(self.timeout, self.stream.read_exact(&mut frame))
            .await
            .map_err(|_| ClientError::timeout("read", self.timeout))??;

        let length = u16::from_be_bytes([frame[4], frame[5]]) as usize;
        if length < 2 || length > MAX_RESPONSE_LENGTH {
            return Err(ProtocolError::new(
                format!("Invalid length field {} in response header", length),
                bytes,
                &frame,
            )
            .into());
        }

        frame.resize(LENGTH_OFFSET + length, 0);
        timeout(self.timeout, self.stream.read_exact(&mut frame[LENGTH_OFFSET..]))
            .await
            .map_err(|_| ClientError::timeout("read", self.timeout))??;

        trace!(
            transaction_id = request.transaction_id(),
            request = %hex::encode(bytes),
            response = %hex::encode(&frame),
            "Exchanged frame"
        );
        Ok(frame)
    }

    async fn close(mut self) {
        let _ = timeout(self.timeout, self.stream.shutdown()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_id_wraps() {
        let transport = TcpTransport::new("127.0.0.1:502", 180, Duration::from_secs(1));
        transport.transaction_id.store(u16::MAX - 1, Ordering::Relaxed);

        assert_eq!(transport.next_transaction_id(), u16::MAX);
        assert_eq!(transport.next_transaction_id(), 0);
        assert_eq!(transport.next_transaction_id(), 1);
    }

    #[test]
    fn test_from_config() {
        let config = DeviceConfig::new("kwl.local").with_port(5020);
        let transport = TcpTransport::from_config(&config);
        assert_eq!(transport.address(), "kwl.local:5020");
        assert_eq!(transport.unit_id, 180);
    }
}
