//! Shared test doubles.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use ventlink_core::{Value, VariableDescriptor};
use ventlink_devices::{ClientError, Listener, Reading, Transport};

/// In-memory controller.
///
/// Scripted results are consumed first; afterwards reads answer from the
/// value table and unknown variables time out.
#[derive(Default)]
pub struct MockTransport {
    values: Mutex<HashMap<String, String>>,
    read_script: Mutex<VecDeque<Result<Reading, ClientError>>>,
    write_script: Mutex<VecDeque<Result<(), ClientError>>>,
    delays: Mutex<HashMap<String, Duration>>,
    reads: Mutex<Vec<String>>,
    writes: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_values(values: &[(&str, &str)]) -> Arc<Self> {
        let transport = Self::default();
        for (name, value) in values {
            transport.set_value(name, value);
        }
        Arc::new(transport)
    }

    pub fn set_value(&self, name: &str, value: &str) {
        self.values.lock().insert(name.to_string(), value.to_string());
    }

    pub fn script_read(&self, result: Result<Reading, ClientError>) {
        self.read_script.lock().push_back(result);
    }

    pub fn script_write(&self, result: Result<(), ClientError>) {
        self.write_script.lock().push_back(result);
    }

    pub fn delay(&self, name: &str, delay: Duration) {
        self.delays.lock().insert(name.to_string(), delay);
    }

    /// Variable names read so far, in order.
    pub fn reads(&self) -> Vec<String> {
        self.reads.lock().clone()
    }

    /// Assignments written so far, in order.
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn read_variable(&self, name: &str, _size: usize) -> Result<Reading, ClientError> {
        self.enter();
        self.reads.lock().push(name.to_string());

        let delay = self.delays.lock().get(name).copied();
        match delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }

        let scripted = self.read_script.lock().pop_front();
        let result = scripted.unwrap_or_else(|| {
            let value = self.values.lock().get(name).cloned();
            value
                .map(|value| Reading {
                    name: name.to_string(),
                    value,
                })
                .ok_or(ClientError::Timeout {
                    operation: "read",
                    timeout_ms: 10_000,
                })
        });

        self.leave();
        result
    }

    async fn write_variable(&self, assignment: &str) -> Result<(), ClientError> {
        self.enter();
        self.writes.lock().push(assignment.to_string());
        tokio::task::yield_now().await;

        let scripted = self.write_script.lock().pop_front();
        let result = scripted.unwrap_or_else(|| {
            if let Some((name, value)) = assignment.split_once('=') {
                self.set_value(name, value);
            }
            Ok(())
        });

        self.leave();
        result
    }
}

pub type Deliveries = Arc<Mutex<Vec<(String, Option<Value>)>>>;

/// A listener recording every delivery.
pub fn recorder() -> (Listener, Deliveries) {
    let deliveries: Deliveries = Arc::default();
    let sink = Arc::clone(&deliveries);
    let listener: Listener = Arc::new(move |variable: &VariableDescriptor, value: Option<&Value>| {
        sink.lock().push((variable.name().to_string(), value.cloned()));
    });
    (listener, deliveries)
}
