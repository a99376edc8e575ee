//! Core types for ventlink.
//!
//! This crate defines the variable model shared by the device protocol and
//! everything consuming it:
//!
//! - [`VariableDescriptor`]: a named controller register with its converter
//! - [`Value`]: the decoded value of a register
//! - [`catalog`]: the static register table and named features of the controller
//! - [`config`]: connection and polling settings
//!
//! Nothing in this crate performs I/O other than reading configuration files.

pub mod catalog;
pub mod config;
pub mod error;
pub mod value;
pub mod variable;

pub use config::{DeviceConfig, PollingConfig, VentlinkConfig};
pub use error::{ConfigError, ConvertError, DescriptorError};
pub use value::Value;
pub use variable::{Access, Converter, VariableDescriptor, WritableVariable};

/// Re-exports commonly used types.
pub mod prelude {
    pub use crate::catalog::{self, Feature};
    pub use crate::config::{DeviceConfig, PollingConfig, VentlinkConfig};
    pub use crate::error::{ConfigError, ConvertError, DescriptorError};
    pub use crate::value::Value;
    pub use crate::variable::{Access, Converter, VariableDescriptor, WritableVariable};
}
