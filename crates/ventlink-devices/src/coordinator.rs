//! Polling coordinator.
//!
//! The coordinator owns a priority queue of variables to refresh and a
//! registry of listeners keyed by variable name. Every drain cycle empties the
//! queue, fetching each variable that somebody listens to and delivering the
//! result. Each listener receives the reading decoded with the descriptor it
//! registered, so views sharing one register (a bit flag and its integer)
//! are served by a single read. Periodic items go back into the queue after their refresh
//! interval, at routine priority. Explicit update requests are queued urgent
//! and therefore overtake the routine refreshes.
//!
//! Drain cycles never overlap: the next one is scheduled only after the
//! previous one finished.

use crate::client::VariableClient;
use crate::error::CoordinatorError;
use crate::identity::DeviceIdentity;
use parking_lot::{Mutex, RwLock};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use ventlink_core::{catalog, PollingConfig, Value, VariableDescriptor, VentlinkConfig, WritableVariable};

/// Callback receiving fresh values. `None` means the read failed.
///
/// The descriptor passed in is the one the listener was registered with.
///
/// Listeners run on the drain task and must return quickly.
pub type Listener = Arc<dyn Fn(&VariableDescriptor, Option<&Value>) + Send + Sync>;

/// Queue priority. Lower rank drains first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    /// Explicit update requests and first-time polls.
    Urgent = 1,
    /// Periodic refreshes.
    Routine = 10,
}

impl Priority {
    pub fn rank(self) -> u8 {
        self as u8
    }
}

/// A variable waiting to be refreshed.
#[derive(Debug, Clone)]
pub struct PollItem {
    pub variable: VariableDescriptor,
    /// Zero for one-shot updates.
    pub refresh_interval: Duration,
}

impl PollItem {
    /// Refresh once.
    pub fn once(variable: VariableDescriptor) -> Self {
        Self {
            variable,
            refresh_interval: Duration::ZERO,
        }
    }

    /// Refresh every `interval`.
    pub fn every(variable: VariableDescriptor, interval: Duration) -> Self {
        Self {
            variable,
            refresh_interval: interval,
        }
    }

    pub fn is_periodic(&self) -> bool {
        !self.refresh_interval.is_zero()
    }
}

#[derive(Debug)]
struct QueuedItem {
    priority: Priority,
    /// Insertion order, breaks remaining ties.
    sequence: u64,
    item: PollItem,
}

impl QueuedItem {
    fn key(&self) -> (u8, &str, u64) {
        (self.priority.rank(), self.item.variable.name(), self.sequence)
    }
}

impl PartialEq for QueuedItem {
    fn eq(&self, other: &Self) -> bool {
        self.sequence == other.sequence
    }
}

impl Eq for QueuedItem {}

impl PartialOrd for QueuedItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedItem {
    // Reversed: the heap pops the smallest (rank, name, sequence) first.
    fn cmp(&self, other: &Self) -> Ordering {
        other.key().cmp(&self.key())
    }
}

/// Pending poll items, ordered by priority then variable name.
#[derive(Debug, Default)]
pub struct PollQueue {
    heap: BinaryHeap<QueuedItem>,
    sequence: u64,
}

impl PollQueue {
    pub fn push(&mut self, item: PollItem, priority: Priority) {
        let sequence = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);
        self.heap.push(QueuedItem {
            priority,
            sequence,
            item,
        });
    }

    pub fn pop(&mut self) -> Option<(Priority, PollItem)> {
        self.heap.pop().map(|queued| (queued.priority, queued.item))
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

/// A listener together with the view it registered for.
#[derive(Clone)]
pub struct Registration {
    pub variable: VariableDescriptor,
    pub listener: Listener,
}

impl Registration {
    /// Decode a raw reading for this listener and call it.
    pub fn deliver(&self, raw: Option<&str>) {
        let value = raw.and_then(|raw| match self.variable.decode(raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(variable = %self.variable.name(), "Cannot decode reading for listener: {}", e);
                None
            }
        });
        (self.listener)(&self.variable, value.as_ref());
    }
}

/// Listeners by variable name, in registration order.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: HashMap<String, Vec<Registration>>,
}

impl ListenerRegistry {
    pub fn add(&mut self, variable: &VariableDescriptor, listener: Listener) {
        self.listeners
            .entry(variable.name().to_string())
            .or_default()
            .push(Registration {
                variable: variable.clone(),
                listener,
            });
    }

    /// Remove a listener by identity. Unknown listeners are ignored.
    pub fn remove(&mut self, variable: &VariableDescriptor, listener: &Listener) -> bool {
        let Some(list) = self.listeners.get_mut(variable.name()) else {
            return false;
        };
        let before = list.len();
        list.retain(|r| !Arc::ptr_eq(&r.listener, listener));
        let removed = list.len() != before;
        if list.is_empty() {
            self.listeners.remove(variable.name());
        }
        removed
    }

    /// Snapshot of the registrations for a variable name.
    pub fn listeners_for(&self, name: &str) -> Vec<Registration> {
        self.listeners.get(name).cloned().unwrap_or_default()
    }

    pub fn has_listeners(&self, name: &str) -> bool {
        self.listeners.get(name).is_some_and(|l| !l.is_empty())
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
    }

    /// Total number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

/// Outcome of one drain cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Items fetched and delivered with a value.
    pub updated: usize,
    /// Items delivered as absent after a failed read or timeout.
    pub failed: usize,
    /// Items nobody listened to.
    pub skipped: usize,
}

struct Inner {
    client: VariableClient,
    identity: DeviceIdentity,
    config: PollingConfig,
    queue: Mutex<PollQueue>,
    listeners: RwLock<ListenerRegistry>,
    /// Register names with a periodic item in flight.
    polled: Mutex<HashSet<String>>,
    disposed: AtomicBool,
    drain_task: Mutex<Option<JoinHandle<()>>>,
}

/// Polls one controller on behalf of many listeners.
///
/// Cheap to clone; clones share state. Call [`Coordinator::unload`] to stop
/// polling.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl Coordinator {
    /// Create an idle coordinator with an empty queue.
    ///
    /// Nothing is polled until [`Coordinator::run_drain_cycle`] is called or
    /// the loop is started with [`Coordinator::start`].
    pub fn new(client: VariableClient, identity: DeviceIdentity, config: PollingConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                identity,
                config,
                queue: Mutex::new(PollQueue::default()),
                listeners: RwLock::new(ListenerRegistry::default()),
                polled: Mutex::new(HashSet::new()),
                disposed: AtomicBool::new(false),
                drain_task: Mutex::new(None),
            }),
        }
    }

    /// Connect to the device described by `config` and start polling.
    pub async fn connect(config: &VentlinkConfig) -> Result<Self, CoordinatorError> {
        config.validate()?;
        let client = VariableClient::from_config(&config.device);
        Self::start(client, config.polling.clone()).await
    }

    /// Read the device identity, queue the default poll set, run a first
    /// drain cycle and start the background loop.
    pub async fn start(client: VariableClient, config: PollingConfig) -> Result<Self, CoordinatorError> {
        let identity = DeviceIdentity::read(&client).await?;
        info!(
            category = "coordinator",
            model = %identity.model,
            serial_number = %identity.serial_number,
            firmware = %identity.firmware_version,
            "Controller identified"
        );

        let refresh = config.refresh_interval();
        let coordinator = Self::new(client, identity, config);
        for variable in catalog::default_poll_set() {
            coordinator.schedule_poll(variable, refresh);
        }

        coordinator.run_drain_cycle().await;
        coordinator.spawn_drain_loop();
        Ok(coordinator)
    }

    fn spawn_drain_loop(&self) {
        let coordinator = self.clone();
        let interval = self.inner.config.drain_interval();

        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if coordinator.is_disposed() {
                    break;
                }
                coordinator.run_drain_cycle().await;
            }
            debug!(category = "coordinator", "Drain loop stopped");
        });

        if let Some(previous) = self.inner.drain_task.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Queue a one-shot refresh ahead of all routine work.
    pub fn schedule_update(&self, variable: &VariableDescriptor) {
        self.enqueue(PollItem::once(variable.clone()), Priority::Urgent);
    }

    /// Queue a variable for periodic refresh.
    ///
    /// The first poll is urgent; refreshes afterwards are routine. A register
    /// is polled by at most one periodic item: returns `false` and queues
    /// nothing if it already is, or if the coordinator was unloaded.
    pub fn schedule_poll(&self, variable: VariableDescriptor, interval: Duration) -> bool {
        if self.is_disposed() {
            return false;
        }
        if !self.inner.polled.lock().insert(variable.name().to_string()) {
            trace!(variable = %variable.name(), "Already polled");
            return false;
        }
        self.enqueue(PollItem::every(variable, interval), Priority::Urgent);
        true
    }

    /// Whether a periodic item exists for this register.
    pub fn is_polled(&self, variable: &VariableDescriptor) -> bool {
        self.inner.polled.lock().contains(variable.name())
    }

    fn enqueue(&self, item: PollItem, priority: Priority) {
        if self.is_disposed() {
            trace!(variable = %item.variable.name(), "Coordinator unloaded, not queueing");
            return;
        }
        self.inner.queue.lock().push(item, priority);
    }

    /// Register a listener for a variable.
    pub fn add_listener(&self, variable: &VariableDescriptor, listener: Listener) {
        self.inner.listeners.write().add(variable, listener);
    }

    /// Remove a previously registered listener. Unknown listeners are ignored.
    pub fn remove_listener(&self, variable: &VariableDescriptor, listener: &Listener) {
        if !self.inner.listeners.write().remove(variable, listener) {
            trace!(variable = %variable.name(), "Listener not registered");
        }
    }

    /// Drain the queue once.
    pub async fn run_drain_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();
        let mut periodic = Vec::new();

        loop {
            if self.is_disposed() {
                break;
            }
            // Bind first so the queue lock is released before fetching.
            let next = self.inner.queue.lock().pop();
            let Some((_, item)) = next else {
                break;
            };

            let listeners = self.inner.listeners.read().listeners_for(item.variable.name());
            if listeners.is_empty() {
                trace!(variable = %item.variable.name(), "No listener, skipping");
                report.skipped += 1;
            } else {
                let raw = self.fetch(&item.variable).await;
                if raw.is_some() {
                    report.updated += 1;
                } else {
                    report.failed += 1;
                }
                if !self.is_disposed() {
                    for registration in &listeners {
                        registration.deliver(raw.as_deref());
                    }
                }
            }

            if item.is_periodic() {
                periodic.push(item);
            }
        }

        for item in periodic {
            self.schedule_refresh(item);
        }

        if report != CycleReport::default() {
            debug!(
                category = "coordinator",
                updated = report.updated,
                failed = report.failed,
                skipped = report.skipped,
                "Drain cycle finished"
            );
        }
        report
    }

    async fn fetch(&self, variable: &VariableDescriptor) -> Option<String> {
        let item_timeout = self.inner.config.item_timeout();
        match tokio::time::timeout(item_timeout, self.inner.client.get_raw(variable)).await {
            Ok(value) => value,
            Err(_) => {
                warn!(
                    variable = %variable.name(),
                    timeout_ms = u64::try_from(item_timeout.as_millis()).unwrap_or(u64::MAX),
                    "Timeout while updating variable"
                );
                None
            }
        }
    }

    /// Put a periodic item back after its interval.
    fn schedule_refresh(&self, item: PollItem) {
        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(item.refresh_interval).await;
            let Some(inner) = inner.upgrade() else {
                return;
            };
            if inner.disposed.load(AtomicOrdering::Acquire) {
                return;
            }
            inner.queue.lock().push(item, Priority::Routine);
        });
    }

    /// Stop polling and drop all listeners.
    ///
    /// Pending refreshes become no-ops. Calling it twice is harmless.
    pub fn unload(&self) {
        if self.inner.disposed.swap(true, AtomicOrdering::AcqRel) {
            return;
        }
        if let Some(handle) = self.inner.drain_task.lock().take() {
            handle.abort();
        }
        self.inner.listeners.write().clear();
        self.inner.queue.lock().heap.clear();
        self.inner.polled.lock().clear();
        info!(category = "coordinator", "Coordinator unloaded");
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(AtomicOrdering::Acquire)
    }

    /// Number of queued items.
    pub fn pending(&self) -> usize {
        self.inner.queue.lock().len()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.read().len()
    }

    /// Read a variable directly, outside the queue.
    pub async fn get_variable(&self, variable: &VariableDescriptor) -> Option<Value> {
        self.inner.client.get(variable).await
    }

    /// Write a variable directly.
    pub async fn set_variable(&self, variable: &WritableVariable, value: &Value) -> bool {
        self.inner.client.set(variable, value).await
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.inner.identity
    }

    pub fn mac(&self) -> &str {
        &self.inner.identity.mac
    }

    pub fn serial_number(&self) -> &str {
        &self.inner.identity.serial_number
    }

    pub fn model(&self) -> &str {
        &self.inner.identity.model
    }

    pub fn firmware_version(&self) -> &str {
        &self.inner.identity.firmware_version
    }

    pub fn maximum_air_flow(&self) -> f64 {
        self.inner.identity.maximum_air_flow
    }
}
