//! Streaming RESP Protocol Parser
//!
//! This module decodes exactly one RESP value from a buffered byte source.
//! The source only needs two capabilities, both provided by [`BufRead`]:
//!
//! 1. **Peek**: look at the next byte without consuming it (`fill_buf`)
//! 2. **Read**: consume raw bytes, either up to a delimiter or an exact count
//!
//! ## How the Parser Works
//!
//! The leading byte of every value selects the decoder. Line-based values
//! (`+`, `-`, `:`) are read up to CR and must be followed by LF. Bulk strings
//! and arrays carry an explicit length, so their payload is never scanned for
//! terminators: a bulk string may contain CRLF freely.
//!
//! The parser has no notion of "wait for more data". When the source runs
//! dry the error says so (see [`ParseError::is_incomplete`]), and the caller
//! decides whether that means "read more from the socket" or "the peer is
//! gone".
//!
//! ## Nesting
//!
//! Arrays are decoded recursively. The recursion depth is bounded by
//! [`RespParser::max_depth`] so a hostile client cannot blow the stack with
//! `*1\r\n*1\r\n*1\r\n...`.

use crate::protocol::types::{prefix, RespValue};
use bytes::Bytes;
use std::io::{self, BufRead, Read};
use thiserror::Error;

/// Errors that can occur during RESP parsing.
#[derive(Debug, Error)]
pub enum ParseError {
    /// No bytes were available before a value began
    #[error("end of stream")]
    EndOfStream,

    /// The source ran dry in the middle of a line or terminator
    #[error("unexpected end of stream inside a value")]
    UnexpectedEof,

    /// Unknown type prefix byte
    #[error("unknown type prefix: {0:#04x}")]
    UnknownType(u8),

    /// Malformed terminator, non-numeric integer or length, invalid UTF-8
    #[error("protocol error: {0}")]
    Format(String),

    /// Fewer payload bytes than the bulk string header declared
    #[error("expected a bulk string of {expected} bytes but only read {actual}")]
    Length { expected: usize, actual: usize },

    /// Bulk string header declares more than we are willing to buffer
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Arrays nested deeper than the configured maximum
    #[error("maximum nesting depth exceeded: {max}")]
    NestingTooDeep { max: usize },

    /// The underlying reader failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ParseError {
    /// Returns true if the error was caused only by running out of input.
    ///
    /// For a socket that is still open this means "read more and retry";
    /// once the peer has closed the stream the same error is fatal.
    pub fn is_incomplete(&self) -> bool {
        matches!(
            self,
            ParseError::EndOfStream | ParseError::UnexpectedEof | ParseError::Length { .. }
        )
    }
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Default maximum array nesting depth
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Upper bound on what a length header may make us allocate up front.
/// Anything bigger grows as bytes actually arrive.
const PREALLOC_LIMIT: usize = 64 * 1024;

/// A RESP parser with a configurable nesting limit.
///
/// The parser holds no per-message state, so one instance can be reused for
/// every message on a connection.
///
/// # Example
///
/// ```
/// use redlite::protocol::{RespParser, RespValue};
/// use std::io::Cursor;
///
/// let parser = RespParser::new();
/// let mut input = Cursor::new(&b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n"[..]);
///
/// let value = parser.parse(&mut input).unwrap();
/// assert_eq!(
///     value,
///     RespValue::array(vec![
///         RespValue::bulk_string("GET"),
///         RespValue::bulk_string("name"),
///     ])
/// );
/// ```
#[derive(Debug, Clone)]
pub struct RespParser {
    max_depth: usize,
}

impl Default for RespParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RespParser {
    /// Creates a parser with the default nesting limit.
    pub fn new() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Creates a parser that rejects arrays nested more than `max_depth` levels.
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Reads exactly one complete value from `reader`.
    ///
    /// On success the reader is positioned right after the value. On error
    /// the reader position is unspecified.
    pub fn parse<R: BufRead>(&self, reader: &mut R) -> ParseResult<RespValue> {
        self.parse_value(reader, 0)
    }

    fn parse_value<R: BufRead>(&self, reader: &mut R, depth: usize) -> ParseResult<RespValue> {
        let type_byte = match peek_byte(reader)? {
            Some(byte) => byte,
            None => return Err(ParseError::EndOfStream),
        };

        match type_byte {
            prefix::SIMPLE_STRING => {
                reader.consume(1);
                Ok(RespValue::SimpleString(read_text_line(reader)?))
            }
            prefix::ERROR => {
                reader.consume(1);
                Ok(RespValue::Error(read_text_line(reader)?))
            }
            prefix::INTEGER => {
                reader.consume(1);
                let line = read_line(reader)?;
                Ok(RespValue::Integer(parse_integer(&line)?))
            }
            prefix::BULK_STRING => {
                reader.consume(1);
                self.parse_bulk_string(reader)
            }
            prefix::ARRAY => {
                reader.consume(1);
                self.parse_array(reader, depth)
            }
            other => Err(ParseError::UnknownType(other)),
        }
    }

    /// Parses the remainder of a bulk string: `<length>\r\n<data>\r\n`
    fn parse_bulk_string<R: BufRead>(&self, reader: &mut R) -> ParseResult<RespValue> {
        let length = parse_integer(&read_line(reader)?)?;

        // Any negative length is the null bulk string; no payload follows.
        if length < 0 {
            return Ok(RespValue::NullBulkString);
        }

        let length = usize::try_from(length).map_err(|_| ParseError::MessageTooLarge {
            size: usize::MAX,
            max: MAX_BULK_SIZE,
        })?;

        if length > MAX_BULK_SIZE {
            return Err(ParseError::MessageTooLarge {
                size: length,
                max: MAX_BULK_SIZE,
            });
        }

        let mut data = Vec::with_capacity(length.min(PREALLOC_LIMIT));
        let actual = reader.by_ref().take(length as u64).read_to_end(&mut data)?;
        if actual < length {
            return Err(ParseError::Length {
                expected: length,
                actual,
            });
        }

        expect_byte(reader, b'\r', "bulk string missing trailing CRLF")?;
        expect_byte(reader, b'\n', "bulk string missing trailing CRLF")?;

        Ok(RespValue::BulkString(Bytes::from(data)))
    }

    /// Parses the remainder of an array: `<count>\r\n<elements...>`
    fn parse_array<R: BufRead>(&self, reader: &mut R, depth: usize) -> ParseResult<RespValue> {
        let count = parse_integer(&read_line(reader)?)?;

        if count < 0 {
            return Ok(RespValue::NullArray);
        }

        if depth >= self.max_depth {
            return Err(ParseError::NestingTooDeep {
                max: self.max_depth,
            });
        }

        let count = count as u64;
        let mut elements = Vec::with_capacity(count.min(PREALLOC_LIMIT as u64) as usize);

        for _ in 0..count {
            match self.parse_value(reader, depth + 1) {
                Ok(value) => elements.push(value),
                // The array already started, so running dry here is mid-value.
                Err(ParseError::EndOfStream) => return Err(ParseError::UnexpectedEof),
                Err(e) => return Err(e),
            }
        }

        Ok(RespValue::Array(elements))
    }
}

/// Looks at the next byte without consuming it.
fn peek_byte<R: BufRead>(reader: &mut R) -> ParseResult<Option<u8>> {
    loop {
        match reader.fill_buf() {
            Ok(buf) => return Ok(buf.first().copied()),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Consumes one byte and checks it against `expected`.
fn expect_byte<R: BufRead>(reader: &mut R, expected: u8, context: &str) -> ParseResult<()> {
    match peek_byte(reader)? {
        Some(byte) if byte == expected => {
            reader.consume(1);
            Ok(())
        }
        Some(byte) => Err(ParseError::Format(format!(
            "{}: expected {:#04x}, found {:#04x}",
            context, expected, byte
        ))),
        None => Err(ParseError::UnexpectedEof),
    }
}

/// Reads raw bytes up to CR, then requires LF. The CRLF is consumed but not
/// returned.
fn read_line<R: BufRead>(reader: &mut R) -> ParseResult<Vec<u8>> {
    let mut line = Vec::new();
    reader.read_until(b'\r', &mut line)?;

    if line.pop() != Some(b'\r') {
        return Err(ParseError::UnexpectedEof);
    }

    expect_byte(reader, b'\n', "line terminator")?;
    Ok(line)
}

fn read_text_line<R: BufRead>(reader: &mut R) -> ParseResult<String> {
    let line = read_line(reader)?;
    String::from_utf8(line).map_err(|e| ParseError::Format(format!("invalid UTF-8: {}", e)))
}

/// Parses a base-10 signed integer. A leading `+` is accepted.
fn parse_integer(line: &[u8]) -> ParseResult<i64> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| {
            ParseError::Format(format!(
                "invalid integer: {:?}",
                String::from_utf8_lossy(line)
            ))
        })
}

/// Parses a single RESP value with the default parser settings.
pub fn parse<R: BufRead>(reader: &mut R) -> ParseResult<RespValue> {
    RespParser::new().parse(reader)
}
