//! Wire protocol: frame codec and TCP transport.

pub mod frame;
pub mod transport;

pub use frame::{FunctionCode, ReadResponse, Request};
pub use transport::{DynTransport, Reading, TcpTransport, Transport};
