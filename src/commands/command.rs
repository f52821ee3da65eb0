//! Command decoding.
//!
//! A request arrives as a RESP array of bulk strings. It is validated and
//! turned into a [`Command`] exactly once; everything downstream works with
//! typed arguments instead of raw frames.

use crate::protocol::RespValue;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

/// A validated client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `PING`
    Ping,
    /// `ECHO message`
    Echo { message: Bytes },
    /// `SET key value [PX milliseconds | EX seconds]`
    Set {
        key: Bytes,
        value: Bytes,
        ttl: Option<Duration>,
    },
    /// `GET key`
    Get { key: Bytes },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Ping => "ping",
            Command::Echo { .. } => "echo",
            Command::Set { .. } => "set",
            Command::Get { .. } => "get",
        }
    }
}

/// Why a request could not be turned into a [`Command`].
///
/// The `Display` text is what the client receives as a simple error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("ERR protocol error: expected array, got {0}")]
    NotAnArray(&'static str),

    #[error("ERR empty command")]
    EmptyCommand,

    #[error("ERR protocol error: expected bulk string argument, got {0}")]
    NotABulkString(&'static str),

    #[error("ERR unknown command '{0}'")]
    UnknownCommand(String),

    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArity(&'static str),

    #[error("ERR value is not an integer or out of range")]
    NotAnInteger,

    #[error("ERR syntax error")]
    Syntax,
}

impl TryFrom<RespValue> for Command {
    type Error = CommandError;

    fn try_from(request: RespValue) -> Result<Self, Self::Error> {
        // Clients send commands as RESP arrays of bulk strings.
        let items = match request {
            RespValue::Array(items) => items,
            other => return Err(CommandError::NotAnArray(other.kind())),
        };

        if items.is_empty() {
            return Err(CommandError::EmptyCommand);
        }

        let mut parts = Vec::with_capacity(items.len());
        for item in items {
            match item {
                RespValue::BulkString(bytes) => parts.push(bytes),
                other => return Err(CommandError::NotABulkString(other.kind())),
            }
        }

        let name = parts.remove(0);
        let args = parts;

        match String::from_utf8_lossy(&name).to_ascii_uppercase().as_str() {
            "PING" => {
                let [] = exact_args::<0>(args, "ping")?;
                Ok(Command::Ping)
            }
            "ECHO" => {
                let [message] = exact_args::<1>(args, "echo")?;
                Ok(Command::Echo { message })
            }
            "GET" => {
                let [key] = exact_args::<1>(args, "get")?;
                Ok(Command::Get { key })
            }
            "SET" => parse_set(args),
            // Escaped so the name cannot break the line-framed error reply
            _ => Err(CommandError::UnknownCommand(name.escape_ascii().to_string())),
        }
    }
}

fn exact_args<const N: usize>(
    args: Vec<Bytes>,
    command: &'static str,
) -> Result<[Bytes; N], CommandError> {
    <[Bytes; N]>::try_from(args).map_err(|_| CommandError::WrongArity(command))
}

fn parse_set(args: Vec<Bytes>) -> Result<Command, CommandError> {
    let mut args = args.into_iter();

    let (key, value) = match (args.next(), args.next()) {
        (Some(key), Some(value)) => (key, value),
        _ => return Err(CommandError::WrongArity("set")),
    };

    let mut ttl = None;
    while let Some(option) = args.next() {
        let unit: fn(u64) -> Duration = if option.eq_ignore_ascii_case(b"PX") {
            Duration::from_millis
        } else if option.eq_ignore_ascii_case(b"EX") {
            Duration::from_secs
        } else {
            return Err(CommandError::Syntax);
        };

        // Only one expiration option may be given
        if ttl.is_some() {
            return Err(CommandError::Syntax);
        }

        let amount = args.next().ok_or(CommandError::Syntax)?;
        ttl = Some(unit(parse_non_negative(&amount)?));
    }

    Ok(Command::Set { key, value, ttl })
}

fn parse_non_negative(arg: &[u8]) -> Result<u64, CommandError> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or(CommandError::NotAnInteger)
}
