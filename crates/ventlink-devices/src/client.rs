//! High-level access to controller variables.
//!
//! The controller keeps one variable selection shared by every client, so two
//! overlapping exchanges can answer each other's queries. [`VariableClient`]
//! serializes all of its exchanges through a [`DeviceLock`] and retries
//! conflicting or failed attempts after a random backoff. Failures never
//! escape: `get` degrades to `None` and `set` to `false`.

use crate::error::{ClientError, Result};
use crate::protocol::{DynTransport, TcpTransport};
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use ventlink_core::config::defaults;
use ventlink_core::variable::{padded_len, MAX_PAYLOAD_LEN};
use ventlink_core::{DeviceConfig, Value, VariableDescriptor, WritableVariable};

/// Mutual exclusion for one physical device.
///
/// Share the same lock between every client talking to the same controller.
pub type DeviceLock = Arc<Mutex<()>>;

/// Retry behaviour for get and set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: defaults::RETRY_ATTEMPTS,
            backoff_min: Duration::from_millis(defaults::BACKOFF_MIN_MS),
            backoff_max: Duration::from_millis(defaults::BACKOFF_MAX_MS),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &DeviceConfig) -> Self {
        let (backoff_min, backoff_max) = config.backoff();
        Self {
            attempts: config.retry_attempts.max(1),
            backoff_min,
            backoff_max: backoff_max.max(backoff_min),
        }
    }

    /// Random delay before the next attempt.
    pub fn backoff(&self) -> Duration {
        if self.backoff_max <= self.backoff_min {
            return self.backoff_min;
        }
        rand::thread_rng().gen_range(self.backoff_min..=self.backoff_max)
    }
}

/// Reads and writes controller variables.
#[derive(Clone)]
pub struct VariableClient {
    transport: DynTransport,
    lock: DeviceLock,
    retry: RetryPolicy,
}

impl VariableClient {
    /// Create a client with its own device lock.
    pub fn new(transport: DynTransport) -> Self {
        Self::with_lock(transport, DeviceLock::default())
    }

    /// Create a client sharing an existing device lock.
    pub fn with_lock(transport: DynTransport, lock: DeviceLock) -> Self {
        Self {
            transport,
            lock,
            retry: RetryPolicy::default(),
        }
    }

    /// Create a TCP client from configuration.
    pub fn from_config(config: &DeviceConfig) -> Self {
        Self::new(Arc::new(TcpTransport::from_config(config))).with_retry(RetryPolicy::from_config(config))
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The lock guarding this client's device.
    pub fn lock(&self) -> DeviceLock {
        Arc::clone(&self.lock)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Read and decode a variable.
    ///
    /// Returns `None` once every attempt has failed.
    pub async fn get(&self, variable: &VariableDescriptor) -> Option<Value> {
        self.read_with_retry(variable, || self.try_get(variable)).await
    }

    /// Read the raw text of a variable.
    ///
    /// Attempts whose answer does not decode under `variable` are retried like
    /// any other failure, so the text can be decoded again with another view
    /// of the same register.
    pub async fn get_raw(&self, variable: &VariableDescriptor) -> Option<String> {
        self.read_with_retry(variable, || self.try_get_raw(variable)).await
    }

    async fn read_with_retry<T, F, Fut>(&self, variable: &VariableDescriptor, mut attempt_once: F) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        for attempt in 1..=self.retry.attempts {
            if attempt > 1 {
                tokio::time::sleep(self.retry.backoff()).await;
            }

            match attempt_once().await {
                Ok(value) => return Some(value),
                Err(e) => debug!(
                    variable = %variable.name(),
                    attempt,
                    conflict = e.is_conflict(),
                    "Get attempt failed: {}",
                    e
                ),
            }
        }

        warn!(
            variable = %variable.name(),
            attempts = self.retry.attempts,
            "Giving up reading variable"
        );
        None
    }

    /// Encode and write a value.
    ///
    /// Returns `false` if the value cannot be encoded or every attempt failed.
    pub async fn set(&self, variable: &WritableVariable, value: &Value) -> bool {
        let assignment = match variable.assignment(value) {
            Ok(assignment) => assignment,
            Err(e) => {
                warn!(variable = %variable.name(), "Cannot write variable: {}", e);
                return false;
            }
        };
        if padded_len(assignment.len()) > MAX_PAYLOAD_LEN {
            warn!(variable = %variable.name(), len = assignment.len(), "Assignment exceeds frame limit");
            return false;
        }

        for attempt in 1..=self.retry.attempts {
            if attempt > 1 {
                tokio::time::sleep(self.retry.backoff()).await;
            }

            match self.try_set(&assignment).await {
                Ok(()) => {
                    debug!(variable = %variable.name(), value = %value, "Variable written");
                    return true;
                }
                Err(e) => debug!(
                    variable = %variable.name(),
                    attempt,
                    "Set attempt failed: {}",
                    e
                ),
            }
        }

        warn!(
            variable = %variable.name(),
            attempts = self.retry.attempts,
            "Giving up writing variable"
        );
        false
    }

    /// A single read attempt under the device lock.
    pub async fn try_get(&self, variable: &VariableDescriptor) -> Result<Value> {
        let raw = self.exchange(variable).await?;
        Ok(variable.decode(&raw)?)
    }

    /// A single raw read attempt. The answer must decode under `variable`.
    pub async fn try_get_raw(&self, variable: &VariableDescriptor) -> Result<String> {
        let raw = self.exchange(variable).await?;
        variable.decode(&raw)?;
        Ok(raw)
    }

    async fn exchange(&self, variable: &VariableDescriptor) -> Result<String> {
        let reading = {
            let _guard = self.lock.lock().await;
            self.transport
                .read_variable(variable.name(), variable.size())
                .await?
        };

        if reading.name != variable.name() {
            return Err(ClientError::VariableMismatch {
                expected: variable.name().to_string(),
                received: reading.name,
            });
        }
        Ok(reading.value)
    }

    /// A single write attempt under the device lock.
    async fn try_set(&self, assignment: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.transport.write_variable(assignment).await
    }
}
