//! Device access for ventlink.
//!
//! Layers, bottom up:
//!
//! - [`protocol`]: Modbus-TCP frame codec and a connection-per-exchange
//!   [`TcpTransport`]
//! - [`client`]: [`VariableClient`], serialized and retried variable reads
//!   and writes
//! - [`coordinator`]: [`Coordinator`], priority-queued polling with listener
//!   fan-out

pub mod client;
pub mod coordinator;
pub mod error;
pub mod identity;
pub mod protocol;

pub use client::{DeviceLock, RetryPolicy, VariableClient};
pub use coordinator::{Coordinator, CycleReport, Listener, PollItem, Priority, Registration};
pub use error::{ClientError, CoordinatorError, FrameError, ProtocolError};
pub use identity::DeviceIdentity;
pub use protocol::{DynTransport, Reading, TcpTransport, Transport};
