use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

/// Wire stage at which a transport operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Connect,
    Write,
    Read,
    Bind,
    Receive,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Connect => "connect",
            Stage::Write => "write",
            Stage::Read => "read",
            Stage::Bind => "bind",
            Stage::Receive => "receive",
        };
        f.write_str(name)
    }
}

/// Errors that can occur on the command or telemetry sockets.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The configured host/port could not be turned into a socket address.
    #[error("failed to resolve {addr}: {source}")]
    Resolve {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to open the command connection.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Failed to write a command line.
    #[error("failed to write command to {addr}: {source}")]
    Write {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Failed to read the reply.
    #[error("failed to read reply from {addr}: {source}")]
    Read {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Failed to bind the telemetry socket.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Failed to receive a telemetry datagram.
    #[error("failed to receive datagram on {addr}: {source}")]
    Receive {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// A bounded wait expired.
    #[error("{stage} on {addr} timed out after {after:?}")]
    Timeout {
        stage: Stage,
        addr: SocketAddr,
        after: Duration,
    },

    /// The caller cancelled the operation.
    #[error("{stage} on {addr} cancelled")]
    Cancelled { stage: Stage, addr: SocketAddr },

    /// An I/O error occurred while configuring a socket.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// The wire stage this error belongs to, when known.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            TransportError::Connect { .. } => Some(Stage::Connect),
            TransportError::Write { .. } => Some(Stage::Write),
            TransportError::Read { .. } => Some(Stage::Read),
            TransportError::Bind { .. } => Some(Stage::Bind),
            TransportError::Receive { .. } => Some(Stage::Receive),
            TransportError::Timeout { stage, .. } | TransportError::Cancelled { stage, .. } => {
                Some(*stage)
            }
            TransportError::Resolve { .. } | TransportError::Io(_) => None,
        }
    }

    /// Whether this error is an expired timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout { .. })
    }
}

pub(crate) fn is_timeout_kind(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

pub type Result<T> = std::result::Result<T, TransportError>;
