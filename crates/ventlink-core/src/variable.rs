//! Variable descriptors.
//!
//! A controller register is addressed by a short ASCII name (`v00102`) and
//! transmits its value as an ASCII string of bounded length. A
//! [`VariableDescriptor`] carries the name, that length and a [`Converter`]
//! describing how the string maps to a [`Value`].

use crate::error::{ConvertError, DescriptorError};
use crate::value::Value;
use std::borrow::Cow;
use std::fmt;

/// Largest register payload a single frame can carry.
///
/// The response `byte_count` field is one byte and payloads are padded to an
/// even length.
pub const MAX_PAYLOAD_LEN: usize = 254;

/// Length of a register payload after null padding.
///
/// The payload always keeps at least one trailing null byte.
pub const fn padded_len(len: usize) -> usize {
    (len + 2) / 2 * 2
}

/// Conversion between the wire string and a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Converter {
    /// `"1"` / `"0"`.
    Bool,
    /// Signed integer.
    Int,
    /// Floating point number.
    Float,
    /// Raw string, passed through unchanged.
    Text,
    /// Integer-coded bit set; decodes to whether all bits of the mask are set.
    Flag(u64),
    /// Minutes on the wire, hours (two decimals) in memory.
    OperationHours,
}

impl Converter {
    /// Name of the decoded shape, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "integer",
            Self::Float => "float",
            Self::Text => "text",
            Self::Flag(_) => "flag",
            Self::OperationHours => "operation hours",
        }
    }

    /// Whether the converter can encode values at all.
    pub const fn has_encoder(&self) -> bool {
        !matches!(self, Self::Flag(_))
    }

    /// Decode a value string received from the device.
    pub fn decode(&self, raw: &str) -> Result<Value, ConvertError> {
        let trimmed = raw.trim();
        let fail = || ConvertError::Decode {
            raw: raw.to_string(),
            expected: self.kind(),
        };

        match self {
            Self::Bool => match trimmed {
                "1" => Ok(Value::Bool(true)),
                "0" => Ok(Value::Bool(false)),
                _ => Err(fail()),
            },
            Self::Int => trimmed.parse().map(Value::Int).map_err(|_| fail()),
            Self::Float => trimmed.parse().map(Value::Float).map_err(|_| fail()),
            Self::Text => Ok(Value::Text(raw.to_string())),
            Self::Flag(mask) => {
                let bits: i64 = trimmed.parse().map_err(|_| fail())?;
                Ok(Value::Bool((bits as u64 & mask) == *mask))
            }
            Self::OperationHours => {
                let minutes: i64 = trimmed.parse().map_err(|_| fail())?;
                Ok(Value::Float(round2(minutes as f64 / 60.0)))
            }
        }
    }

    /// Encode a value into the string sent to the device.
    pub fn encode(&self, value: &Value) -> Result<String, ConvertError> {
        let fail = || ConvertError::Encode {
            value: format!("{} {}", value.kind(), value),
            expected: self.kind(),
        };

        match (self, value) {
            (Self::Bool, Value::Bool(b)) => Ok(if *b { "1" } else { "0" }.to_string()),
            (Self::Int, Value::Int(i)) => Ok(i.to_string()),
            (Self::Float, Value::Float(_) | Value::Int(_)) => Ok(value.to_string()),
            (Self::Text, Value::Text(s)) => Ok(s.clone()),
            (Self::OperationHours, Value::Float(_) | Value::Int(_)) => {
                let hours = value.as_f64().ok_or_else(fail)?;
                Ok(((hours * 60.0).round() as i64).to_string())
            }
            _ => Err(fail()),
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Whether a variable can be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

/// A named controller register.
///
/// Descriptors are immutable. The catalog builds them in `const` context, so
/// an inconsistent descriptor there is a compile error; descriptors built at
/// runtime go through [`VariableDescriptor::try_new`].
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDescriptor {
    name: Cow<'static, str>,
    size: usize,
    converter: Converter,
    access: Access,
}

#[derive(Clone, Copy)]
enum Violation {
    EmptyName,
    NonAsciiName,
    ZeroSize,
    SizeMismatch(usize),
    FrameOverflow(usize),
}

impl Violation {
    const fn fail(self) -> ! {
        match self {
            Self::EmptyName => panic!("variable name must not be empty"),
            Self::NonAsciiName => panic!("variable name must be printable ASCII"),
            Self::ZeroSize => panic!("variable size must not be zero"),
            Self::SizeMismatch(_) => panic!("variable size does not match its converter"),
            Self::FrameOverflow(_) => panic!("variable does not fit into a single frame"),
        }
    }

    fn into_error(self, name: &str, size: usize) -> DescriptorError {
        match self {
            Self::EmptyName => DescriptorError::EmptyName,
            Self::NonAsciiName => DescriptorError::NonAsciiName(name.to_string()),
            Self::ZeroSize => DescriptorError::ZeroSize(name.to_string()),
            Self::SizeMismatch(expected) => DescriptorError::SizeMismatch {
                name: name.to_string(),
                size,
                expected,
            },
            Self::FrameOverflow(len) => DescriptorError::FrameOverflow {
                name: name.to_string(),
                len,
                max: MAX_PAYLOAD_LEN,
            },
        }
    }
}

const fn check(name: &str, size: usize, converter: Converter) -> Option<Violation> {
    let bytes = name.as_bytes();
    if bytes.is_empty() {
        return Some(Violation::EmptyName);
    }
    let mut i = 0;
    while i < bytes.len() {
        if !bytes[i].is_ascii_graphic() || bytes[i] == b'=' {
            return Some(Violation::NonAsciiName);
        }
        i += 1;
    }
    if size == 0 {
        return Some(Violation::ZeroSize);
    }
    if matches!(converter, Converter::Bool) && size != 1 {
        return Some(Violation::SizeMismatch(1));
    }
    let answer = bytes.len() + 1 + size;
    if padded_len(answer) > MAX_PAYLOAD_LEN {
        return Some(Violation::FrameOverflow(answer));
    }
    None
}

impl VariableDescriptor {
    /// Create a descriptor in `const` context.
    ///
    /// # Panics
    ///
    /// Panics (a compile error when evaluated in a `const` item) if the name is
    /// empty or not printable ASCII, the size is zero or inconsistent with the
    /// converter, or the payload cannot fit a frame. A [`Converter::Flag`] is
    /// always read-only regardless of `access`.
    pub const fn new(
        name: &'static str,
        size: usize,
        converter: Converter,
        access: Access,
    ) -> Self {
        if let Some(violation) = check(name, size, converter) {
            violation.fail();
        }
        let access = if converter.has_encoder() {
            access
        } else {
            Access::ReadOnly
        };
        Self {
            name: Cow::Borrowed(name),
            size,
            converter,
            access,
        }
    }

    /// Create a descriptor at runtime, validating it.
    pub fn try_new(
        name: impl Into<Cow<'static, str>>,
        size: usize,
        converter: Converter,
        access: Access,
    ) -> Result<Self, DescriptorError> {
        let name = name.into();
        if let Some(violation) = check(&name, size, converter) {
            return Err(violation.into_error(&name, size));
        }
        let access = if converter.has_encoder() {
            access
        } else {
            Access::ReadOnly
        };
        Ok(Self {
            name,
            size,
            converter,
            access,
        })
    }

    /// Boolean register (`"1"` / `"0"`), one character wide.
    pub const fn boolean(name: &'static str) -> Self {
        Self::new(name, 1, Converter::Bool, Access::ReadWrite)
    }

    /// Writable integer register.
    pub const fn integer(name: &'static str, size: usize) -> Self {
        Self::new(name, size, Converter::Int, Access::ReadWrite)
    }

    /// Writable floating point register.
    pub const fn float(name: &'static str, size: usize) -> Self {
        Self::new(name, size, Converter::Float, Access::ReadWrite)
    }

    /// Read-only string register.
    pub const fn text(name: &'static str, size: usize) -> Self {
        Self::new(name, size, Converter::Text, Access::ReadOnly)
    }

    /// Read-only flag test against an integer-coded bit set.
    pub const fn flag(name: &'static str, size: usize, mask: u64) -> Self {
        Self::new(name, size, Converter::Flag(mask), Access::ReadOnly)
    }

    /// Operation hours counter (minutes on the wire).
    pub const fn operation_hours(name: &'static str, size: usize) -> Self {
        Self::new(name, size, Converter::OperationHours, Access::ReadWrite)
    }

    /// Register name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Maximum length of the value string.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Value converter.
    pub fn converter(&self) -> Converter {
        self.converter
    }

    /// Access mode.
    pub fn access(&self) -> Access {
        self.access
    }

    /// Whether the variable accepts writes.
    pub fn is_writable(&self) -> bool {
        self.access == Access::ReadWrite
    }

    /// Length of the `name<sep>value` answer the device returns.
    pub fn answer_len(&self) -> usize {
        self.name.len() + 1 + self.size
    }

    /// Decode a value string received from the device.
    pub fn decode(&self, raw: &str) -> Result<Value, ConvertError> {
        self.converter.decode(raw)
    }

    /// Get a writable handle, failing if the variable is read-only.
    pub fn writable(&self) -> Result<WritableVariable, DescriptorError> {
        WritableVariable::try_from(self.clone())
    }
}

impl fmt::Display for VariableDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.name, self.size)
    }
}

/// A variable proven to have an encoder.
///
/// Writes take this type, so a write against a read-only register is rejected
/// when the handle is created rather than at exchange time.
#[derive(Debug, Clone, PartialEq)]
pub struct WritableVariable(VariableDescriptor);

impl WritableVariable {
    /// The underlying descriptor.
    pub fn descriptor(&self) -> &VariableDescriptor {
        &self.0
    }

    /// Register name.
    pub fn name(&self) -> &str {
        self.0.name()
    }

    /// Encode a value into the `name=value` assignment sent to the device.
    pub fn assignment(&self, value: &Value) -> Result<String, ConvertError> {
        let encoded = self.0.converter.encode(value)?;
        Ok(format!("{}={}", self.0.name, encoded))
    }
}

impl TryFrom<VariableDescriptor> for WritableVariable {
    type Error = DescriptorError;

    fn try_from(descriptor: VariableDescriptor) -> Result<Self, Self::Error> {
        if descriptor.is_writable() {
            Ok(Self(descriptor))
        } else {
            Err(DescriptorError::ReadOnly(descriptor.name.to_string()))
        }
    }
}
