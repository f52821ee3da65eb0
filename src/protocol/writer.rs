//! RESP Protocol Writer
//!
//! Encodes a [`RespValue`] onto any [`Write`] sink. The encoding is
//! deterministic and is the exact inverse of the parser: for every value
//! `v` that the writer accepts, `parse(encode(v)) == v`.

use crate::protocol::types::{prefix, RespValue, CRLF};
use std::io::{self, Write};
use thiserror::Error;

/// Errors that can occur while encoding a value.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The value cannot be represented on the wire without corrupting framing
    #[error("cannot encode {kind}: {reason}")]
    InvalidValue { kind: &'static str, reason: String },

    /// The sink failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Writes `value` to `sink`.
///
/// Simple strings and errors are line-terminated, so text containing CR or
/// LF is rejected with [`EncodeError::InvalidValue`] rather than written.
/// Nothing is written for a rejected value when it is the top-level value;
/// for a rejected array element, the elements before it have already been
/// written.
pub fn write<W: Write>(sink: &mut W, value: &RespValue) -> Result<(), EncodeError> {
    match value {
        RespValue::SimpleString(s) => write_simple(sink, prefix::SIMPLE_STRING, s, value),
        RespValue::Error(s) => write_simple(sink, prefix::ERROR, s, value),
        RespValue::Integer(n) => {
            write_line(sink, prefix::INTEGER, n.to_string().as_bytes())?;
            Ok(())
        }
        RespValue::BulkString(data) => {
            write_line(sink, prefix::BULK_STRING, data.len().to_string().as_bytes())?;
            sink.write_all(data)?;
            sink.write_all(CRLF)?;
            Ok(())
        }
        RespValue::NullBulkString => {
            write_line(sink, prefix::BULK_STRING, b"-1")?;
            Ok(())
        }
        RespValue::Array(values) => {
            write_line(sink, prefix::ARRAY, values.len().to_string().as_bytes())?;
            for value in values {
                write(sink, value)?;
            }
            Ok(())
        }
        RespValue::NullArray => {
            write_line(sink, prefix::ARRAY, b"-1")?;
            Ok(())
        }
    }
}

/// Encodes `value` into a freshly allocated buffer.
pub fn encode(value: &RespValue) -> Result<Vec<u8>, EncodeError> {
    let mut buf = Vec::new();
    write(&mut buf, value)?;
    Ok(buf)
}

fn write_simple<W: Write>(
    sink: &mut W,
    type_byte: u8,
    text: &str,
    value: &RespValue,
) -> Result<(), EncodeError> {
    if text.bytes().any(|b| b == b'\r' || b == b'\n') {
        return Err(EncodeError::InvalidValue {
            kind: value.kind(),
            reason: "text contains CR or LF".to_string(),
        });
    }
    write_line(sink, type_byte, text.as_bytes())?;
    Ok(())
}

#[inline]
fn write_line<W: Write>(sink: &mut W, type_byte: u8, body: &[u8]) -> io::Result<()> {
    sink.write_all(&[type_byte])?;
    sink.write_all(body)?;
    sink.write_all(CRLF)
}
