use std::fmt;
use std::io;

use r9link_driver::{ConfigError, DriverError};
use r9link_transport::TransportError;
use r9link_wire::DecodeError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => FAILURE,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::AddrInUse
        | io::ErrorKind::AddrNotAvailable => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Timeout { .. } => CliError::new(TIMEOUT, format!("{context}: {err}")),
        TransportError::Cancelled { .. } => CliError::new(FAILURE, format!("{context}: {err}")),
        TransportError::Io(source) => io_error(context, source),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn decode_error(context: &str, err: DecodeError) -> CliError {
    CliError::new(DATA_INVALID, format!("{context}: {err}"))
}

pub fn config_error(err: ConfigError) -> CliError {
    match err {
        ConfigError::Io { source, .. } if source.kind() == io::ErrorKind::NotFound => {
            CliError::new(USAGE, format!("configuration file not found: {source}"))
        }
        other => CliError::new(USAGE, format!("invalid configuration: {other}")),
    }
}

pub fn driver_error(context: &str, err: DriverError) -> CliError {
    match err {
        DriverError::Transport(err) => transport_error(context, err),
        DriverError::Decode(err) => decode_error(context, err),
        DriverError::Config(err) => config_error(err),
        DriverError::Range(_)
        | DriverError::ReplyEncoding { .. }
        | DriverError::NoNumericReply { .. }
        | DriverError::InvalidReply { .. }
        | DriverError::NoSamples { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        DriverError::Cancelled { .. } => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}
