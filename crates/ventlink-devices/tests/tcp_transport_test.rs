//! TcpTransport against an in-process fake controller.
//!
//! The fake speaks the wire format directly so the frame codec is checked
//! against an independent implementation.
//!
//! Run with: cargo test -p ventlink-devices --test tcp_transport_test

use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use ventlink_core::catalog::TEMPERATURE_OUTSIDE_AIR;
use ventlink_core::Value;
use ventlink_devices::{ClientError, Reading, TcpTransport, Transport, VariableClient};

#[derive(Clone, Copy, PartialEq)]
enum Behaviour {
    Normal,
    /// Answer every request with illegal data address.
    Exception,
    /// Accept connections, never answer.
    Silent,
}

struct FakeDevice {
    addr: SocketAddr,
    connections: Arc<AtomicUsize>,
    /// Connections the client has closed.
    closed: Arc<AtomicUsize>,
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl FakeDevice {
    async fn spawn(behaviour: Behaviour, values: &[(&str, &str)]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicUsize::new(0));
        let values = Arc::new(Mutex::new(
            values
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        ));

        let counter = Arc::clone(&connections);
        let closed_counter = Arc::clone(&closed);
        let state = Arc::clone(&values);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let closed = Arc::clone(&closed_counter);
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    serve(stream, behaviour, state).await;
                    closed.fetch_add(1, Ordering::SeqCst);
                });
            }
        });

        Self {
            addr,
            connections,
            closed,
            values,
        }
    }

    fn transport(&self, timeout: Duration) -> TcpTransport {
        TcpTransport::new(self.addr.to_string(), 180, timeout)
    }

    fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Wait until every accepted connection was closed by the client.
    ///
    /// The fake notices the close asynchronously, so poll for up to two
    /// seconds.
    async fn assert_all_closed(&self) {
        for _ in 0..200 {
            if self.closed.load(Ordering::SeqCst) == self.connections() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "{} of {} connections still open",
            self.connections() - self.closed.load(Ordering::SeqCst),
            self.connections()
        );
    }
}

async fn serve(mut stream: TcpStream, behaviour: Behaviour, values: Arc<Mutex<HashMap<String, String>>>) {
    let mut selected = String::new();
    loop {
        let mut header = [0u8; 6];
        if stream.read_exact(&mut header).await.is_err() {
            return;
        }
        let length = u16::from_be_bytes([header[4], header[5]]) as usize;
        let mut body = vec![0u8; length];
        if stream.read_exact(&mut body).await.is_err() {
            return;
        }
        assert_eq!(&header[2..4], &[0, 0], "protocol id");
        assert_eq!(body[0], 180, "unit id");

        let mut reply = header[..4].to_vec();
        let function = body[1];
        let payload = match behaviour {
            Behaviour::Silent => continue,
            Behaviour::Exception => vec![body[0], function | 0x80, 0x02],
            Behaviour::Normal if function == 16 => {
                let text = String::from_utf8_lossy(&body[7..])
                    .trim_end_matches('\0')
                    .to_string();
                match text.split_once('=') {
                    Some((name, value)) => {
                        values.lock().insert(name.to_string(), value.to_string());
                    }
                    None => selected = text,
                }
                let mut ack = vec![body[0], 16];
                ack.extend_from_slice(&body[2..6]);
                ack
            }
            Behaviour::Normal => {
                let quantity = u16::from_be_bytes([body[4], body[5]]) as usize;
                let value = values.lock().get(&selected).cloned().unwrap_or_default();
                let mut data = format!("{}={}", selected, value).into_bytes();
                data.resize(quantity * 2, 0);
                let mut answer = vec![body[0], 3, data.len() as u8];
                answer.extend_from_slice(&data);
                answer
            }
        };
        reply.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        reply.extend_from_slice(&payload);
        if stream.write_all(&reply).await.is_err() {
            return;
        }
    }
}

#[tokio::test]
async fn test_read_variable_over_one_connection() {
    let device = FakeDevice::spawn(Behaviour::Normal, &[("v00104", "12.5")]).await;
    let transport = device.transport(Duration::from_secs(2));

    let reading = transport.read_variable("v00104", 7).await.unwrap();

    assert_eq!(
        reading,
        Reading {
            name: "v00104".into(),
            value: "12.5".into(),
        }
    );
    assert_eq!(device.connections(), 1);
    device.assert_all_closed().await;
}

#[tokio::test]
async fn test_write_then_read_uses_fresh_connections() {
    let device = FakeDevice::spawn(Behaviour::Normal, &[]).await;
    let transport = device.transport(Duration::from_secs(2));

    transport.write_variable("v00102=3").await.unwrap();
    assert_eq!(device.values.lock().get("v00102").map(String::as_str), Some("3"));

    let reading = transport.read_variable("v00102", 1).await.unwrap();
    assert_eq!(reading.value, "3");
    assert_eq!(device.connections(), 2);
    device.assert_all_closed().await;
}

#[tokio::test]
async fn test_exception_response_is_protocol_error() {
    let device = FakeDevice::spawn(Behaviour::Exception, &[]).await;
    let transport = device.transport(Duration::from_secs(2));

    match transport.write_variable("v00102=3").await {
        Err(ClientError::Protocol(e)) => {
            assert!(e.message.contains("exception"), "{}", e);
            assert_eq!(e.response[7], 0x90);
        }
        other => panic!("expected protocol error, got {:?}", other),
    }
    assert_eq!(device.connections(), 1);
    device.assert_all_closed().await;
}

#[tokio::test]
async fn test_silent_device_times_out() {
    let device = FakeDevice::spawn(Behaviour::Silent, &[]).await;
    let transport = device.transport(Duration::from_millis(100));

    let err = transport.read_variable("v00102", 1).await.unwrap_err();
    assert!(
        matches!(err, ClientError::Timeout { operation: "read", timeout_ms: 100 }),
        "{}",
        err
    );
    assert_eq!(device.connections(), 1);
    device.assert_all_closed().await;
}

#[tokio::test]
async fn test_refused_connection_is_io_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let transport = TcpTransport::new(addr.to_string(), 180, Duration::from_secs(2));
    let err = transport.write_variable("v00102=1").await.unwrap_err();
    assert!(matches!(err, ClientError::Io(_)), "{}", err);
}

#[tokio::test]
async fn test_client_decodes_through_tcp() {
    let device = FakeDevice::spawn(Behaviour::Normal, &[("v00104", "-3.5")]).await;
    let client = VariableClient::new(Arc::new(device.transport(Duration::from_secs(2))));

    assert_eq!(client.get(&TEMPERATURE_OUTSIDE_AIR).await, Some(Value::Float(-3.5)));
    device.assert_all_closed().await;
}
