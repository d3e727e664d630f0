use std::net::SocketAddr;

use crate::config::ConfigError;
use crate::parameter::BoundedParameter;

/// A bounded parameter's magnitude fell outside its configured range.
///
/// Raised before any command is written.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{parameter} |{value}| outside [{min}, {max}] {unit}", unit = .parameter.unit())]
pub struct RangeError {
    pub parameter: BoundedParameter,
    pub value: f64,
    pub min: f64,
    pub max: f64,
}

/// Why a single reply could not be read as a number.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplyParseError {
    #[error("empty reply")]
    Empty,
    #[error("non-numeric reply `{0}`")]
    NotNumeric(String),
}

/// Errors surfaced by the driver and telemetry listener.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// Local validation rejected a bounded parameter.
    #[error(transparent)]
    Range(#[from] RangeError),

    /// Socket-level failure.
    #[error("transport error: {0}")]
    Transport(#[from] r9link_transport::TransportError),

    /// The reply bytes were not UTF-8.
    #[error("reply to `{command}` is not valid UTF-8: {source}")]
    ReplyEncoding {
        command: String,
        source: std::string::FromUtf8Error,
    },

    /// Every attempt of a numeric query failed to parse.
    #[error("no numeric reply to `{command}` after {attempts} attempt(s) (last reply: {last_reply:?})")]
    NoNumericReply {
        command: String,
        attempts: u32,
        last_reply: Option<String>,
    },

    /// A numeric reply parsed but does not fit the expected type.
    #[error("reply {value} to `{command}` is not a valid {expected}")]
    InvalidReply {
        command: String,
        value: f64,
        expected: &'static str,
    },

    /// The telemetry datagram could not be decoded.
    #[error("telemetry decode error: {0}")]
    Decode(#[from] r9link_wire::DecodeError),

    /// The telemetry packet decoded but contained no samples to average.
    #[error("telemetry packet from {from} carried no samples")]
    NoSamples { from: SocketAddr },

    /// The caller cancelled the operation.
    #[error("{operation} cancelled")]
    Cancelled { operation: &'static str },

    /// Configuration could not be loaded or is inconsistent.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl DriverError {
    /// Whether the operation ended because the caller cancelled it.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            DriverError::Cancelled { .. }
                | DriverError::Transport(r9link_transport::TransportError::Cancelled { .. })
        )
    }

    /// Whether a bounded wait expired.
    pub fn is_timeout(&self) -> bool {
        matches!(self, DriverError::Transport(err) if err.is_timeout())
    }
}

pub type Result<T> = std::result::Result<T, DriverError>;
