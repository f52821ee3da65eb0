//! RESP Protocol Implementation
//!
//! This module provides the codec for the Redis Serialization Protocol (RESP):
//! the value model, a parser that reads one value from a buffered byte
//! source, and a writer that encodes a value onto a byte sink.
//!
//! ## Modules
//!
//! - `types`: Defines the `RespValue` enum
//! - `parser`: Decodes one `RespValue` from any `BufRead`
//! - `writer`: Encodes a `RespValue` onto any `Write`
//!
//! ## Example
//!
//! ```
//! use redlite::protocol::{encode, parse, RespValue};
//! use std::io::Cursor;
//!
//! // Parsing incoming data
//! let mut input = Cursor::new(&b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n"[..]);
//! let value = parse(&mut input).unwrap();
//! assert_eq!(value.as_array().map(|a| a.len()), Some(2));
//!
//! // Creating responses
//! let response = RespValue::bulk_string("Ariz");
//! assert_eq!(encode(&response).unwrap(), b"$4\r\nAriz\r\n");
//! ```

pub mod parser;
pub mod types;
pub mod writer;

// Re-export commonly used types for convenience
pub use parser::{parse, ParseError, ParseResult, RespParser};
pub use types::RespValue;
pub use writer::{encode, write, EncodeError};
