//! Modbus-TCP frames as spoken by the controller.
//!
//! Every frame starts with the 7 byte MBAP header:
//!
//! ```text
//! 0..2  transaction id   (u16 BE)
//! 2..4  protocol id      (u16 BE, always 0)
//! 4..6  length           (u16 BE, bytes following this field)
//! 6     unit id
//! 7     function code
//! ```
//!
//! The controller only understands two functions: writing a variable
//! selection or assignment as ASCII into the register block (16), and reading
//! the answer back from it (3).

use crate::error::{FrameError, ProtocolError};
use ventlink_core::variable::{padded_len, MAX_PAYLOAD_LEN};

/// Size of the MBAP header including the unit id.
pub const HEADER_LEN: usize = 7;

/// Bytes preceding the length-counted part of a frame.
pub const LENGTH_OFFSET: usize = 6;

/// The controller exposes its variable interface at register 1.
pub const STARTING_ADDRESS: u16 = 1;

const PROTOCOL_ID: u16 = 0;
const EXCEPTION_BIT: u8 = 0x80;

/// Largest length field a response may carry.
pub const MAX_RESPONSE_LENGTH: usize = 3 + MAX_PAYLOAD_LEN;

/// Function codes used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FunctionCode {
    ReadHoldingRegisters = 0x03,
    WriteMultipleRegisters = 0x10,
}

impl FunctionCode {
    /// Get the function code.
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// An encoded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    function: FunctionCode,
    bytes: Vec<u8>,
}

impl Request {
    /// Read the answer to a previously selected variable.
    ///
    /// `answer_len` is the length of `name=value` the device will return.
    pub fn read(transaction_id: u16, unit_id: u8, answer_len: usize) -> Result<Self, FrameError> {
        let data_len = padded_len(answer_len);
        if data_len > MAX_PAYLOAD_LEN {
            return Err(FrameError::PayloadTooLarge {
                len: data_len,
                max: MAX_PAYLOAD_LEN,
            });
        }

        let mut bytes = header(transaction_id, unit_id, FunctionCode::ReadHoldingRegisters);
        bytes.extend_from_slice(&STARTING_ADDRESS.to_be_bytes());
        bytes.extend_from_slice(&((data_len / 2) as u16).to_be_bytes());
        finish(&mut bytes);

        Ok(Self {
            function: FunctionCode::ReadHoldingRegisters,
            bytes,
        })
    }

    /// Write a variable selection (`name`) or assignment (`name=value`).
    ///
    /// The payload is null padded to an even length with at least one
    /// terminating null byte.
    pub fn write(transaction_id: u16, unit_id: u8, payload: &str) -> Result<Self, FrameError> {
        if !payload.is_ascii() {
            return Err(FrameError::NonAscii(payload.to_string()));
        }
        let data_len = padded_len(payload.len());
        if data_len > MAX_PAYLOAD_LEN {
            return Err(FrameError::PayloadTooLarge {
                len: data_len,
                max: MAX_PAYLOAD_LEN,
            });
        }

        let mut bytes = header(transaction_id, unit_id, FunctionCode::WriteMultipleRegisters);
        bytes.extend_from_slice(&STARTING_ADDRESS.to_be_bytes());
        bytes.extend_from_slice(&((data_len / 2) as u16).to_be_bytes());
        bytes.push(data_len as u8);
        bytes.extend_from_slice(payload.as_bytes());
        bytes.resize(bytes.len() + data_len - payload.len(), 0);
        finish(&mut bytes);

        Ok(Self {
            function: FunctionCode::WriteMultipleRegisters,
            bytes,
        })
    }

    pub fn function(&self) -> FunctionCode {
        self.function
    }

    pub fn transaction_id(&self) -> u16 {
        u16::from_be_bytes([self.bytes[0], self.bytes[1]])
    }

    /// Number of registers addressed by the request.
    pub fn quantity(&self) -> u16 {
        u16::from_be_bytes([self.bytes[10], self.bytes[11]])
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn error(&self, message: impl Into<String>, response: &[u8]) -> ProtocolError {
        ProtocolError::new(message, &self.bytes, response)
    }

    /// Validate the header of a response and return its body after the
    /// function code.
    fn check_response<'a>(&self, raw: &'a [u8]) -> Result<&'a [u8], ProtocolError> {
        if raw.len() < HEADER_LEN + 1 {
            return Err(self.error(
                format!("Response too short ({} bytes)", raw.len()),
                raw,
            ));
        }

        let length = u16::from_be_bytes([raw[4], raw[5]]) as usize;
        if length != raw.len() - LENGTH_OFFSET {
            return Err(self.error(
                format!(
                    "Length field {} does not match frame size {}",
                    length,
                    raw.len() - LENGTH_OFFSET
                ),
                raw,
            ));
        }

        let function = raw[HEADER_LEN];
        if function == self.function.code() | EXCEPTION_BIT {
            let exception = raw.get(HEADER_LEN + 1).copied().unwrap_or_default();
            return Err(self.error(
                format!("Modbus exception {:#04x} for function {}", exception, self.function.code()),
                raw,
            ));
        }
        if function != self.function.code() {
            return Err(self.error(
                format!("Unexpected function code {} in response", function),
                raw,
            ));
        }

        Ok(&raw[HEADER_LEN + 1..])
    }

    /// Check the acknowledgement of a write request.
    pub fn decode_write_response(&self, raw: &[u8]) -> Result<(), ProtocolError> {
        let body = self.check_response(raw)?;
        if body.len() != 4 {
            return Err(self.error(
                format!("Write acknowledgement has {} bytes, expected 4", body.len()),
                raw,
            ));
        }
        Ok(())
    }

    /// Decode the register block of a read response.
    pub fn decode_read_response(&self, raw: &[u8]) -> Result<ReadResponse, ProtocolError> {
        let body = self.check_response(raw)?;
        let Some((&byte_count, registers)) = body.split_first() else {
            return Err(self.error("Read response carries no byte count", raw));
        };
        if byte_count as usize != registers.len() {
            return Err(self.error(
                format!(
                    "Byte count {} does not match {} register bytes",
                    byte_count,
                    registers.len()
                ),
                raw,
            ));
        }

        let trimmed = match registers.iter().rposition(|&b| b != 0) {
            Some(last) => &registers[..=last],
            None => &[][..],
        };
        if !trimmed.is_ascii() {
            return Err(self.error("Register block is not ASCII", raw));
        }

        Ok(ReadResponse {
            transaction_id: u16::from_be_bytes([raw[0], raw[1]]),
            answer: String::from_utf8_lossy(trimmed).into_owned(),
        })
    }
}

/// A decoded read response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadResponse {
    /// Transaction id echoed by the device.
    pub transaction_id: u16,
    /// Register block with trailing nulls removed.
    pub answer: String,
}

impl ReadResponse {
    /// Split the answer into the echoed variable name and its value.
    ///
    /// The name occupies the first `name_len` characters, one separator
    /// follows, the rest is the value.
    pub fn split(&self, name_len: usize) -> (&str, &str) {
        let name = self.answer.get(..name_len).unwrap_or(&self.answer);
        let value = self.answer.get(name_len + 1..).unwrap_or("");
        (name, value)
    }
}

fn header(transaction_id: u16, unit_id: u8, function: FunctionCode) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER_LEN + 6 + MAX_PAYLOAD_LEN);
    bytes.extend_from_slice(&transaction_id.to_be_bytes());
    bytes.extend_from_slice(&PROTOCOL_ID.to_be_bytes());
    bytes.extend_from_slice(&[0, 0]);
    bytes.push(unit_id);
    bytes.push(function.code());
    bytes
}

/// Fill in the length field.
fn finish(bytes: &mut [u8]) {
    let length = (bytes.len() - LENGTH_OFFSET) as u16;
    bytes[4..6].copy_from_slice(&length.to_be_bytes());
}
