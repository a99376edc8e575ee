//! Error types for descriptors, value conversion and configuration.

use std::path::PathBuf;

/// Invalid variable descriptor.
///
/// These are programming errors in the variable catalog or in a caller-built
/// descriptor. They surface when the descriptor (or its writable handle) is
/// constructed, never during an exchange with the device.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DescriptorError {
    /// The variable name is empty.
    #[error("Variable name must not be empty")]
    EmptyName,

    /// The variable name contains non-ASCII characters.
    #[error("Variable name is not ASCII: {0}")]
    NonAsciiName(String),

    /// The declared value size is zero.
    #[error("Variable {0} declares a zero value size")]
    ZeroSize(String),

    /// The declared size does not match what the converter produces.
    #[error("Variable {name} declares size {size}, converter requires {expected}")]
    SizeMismatch {
        name: String,
        size: usize,
        expected: usize,
    },

    /// Name and value do not fit into a single response frame.
    #[error("Variable {name} needs {len} payload bytes, a frame holds at most {max}")]
    FrameOverflow { name: String, len: usize, max: usize },

    /// A write was requested on a variable without an encoder.
    #[error("Variable {0} is read-only")]
    ReadOnly(String),
}

/// Conversion between a wire string and a [`crate::Value`] failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConvertError {
    /// The device returned a string the converter cannot parse.
    #[error("Cannot decode {raw:?} as {expected}")]
    Decode { raw: String, expected: &'static str },

    /// The caller passed a value of the wrong shape to an encoder.
    #[error("Cannot encode {value} as {expected}")]
    Encode { value: String, expected: &'static str },
}

/// Configuration loading error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for the expected schema.
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// An environment override could not be parsed.
    #[error("Invalid value for {var}: {value:?}")]
    Env { var: &'static str, value: String },

    /// The settings are syntactically valid but unusable.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
