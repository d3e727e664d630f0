use std::net::SocketAddr;
use std::time::Duration;

use r9link_transport::{
    sleep_cancellable, CancellationToken, CommandConnection, Stage, TransportError,
};
use tracing::debug;

use crate::config::InstrumentConfig;
use crate::error::{DriverError, Result};

/// One-shot request/reply exchange with the controller.
///
/// The seam between command semantics and the socket; tests substitute a
/// scripted implementation.
pub trait CommandTransport {
    /// Send one command as-is and return the decoded reply.
    fn send_command(&self, command: &str) -> Result<String>;

    /// [`send_command`](Self::send_command) that gives up once `cancel` fires.
    ///
    /// The default only checks the token before sending.
    fn send_command_with_cancel(
        &self,
        command: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        if cancel.is_cancelled() {
            return Err(DriverError::Cancelled { operation: "command" });
        }
        self.send_command(command)
    }
}

impl<T: CommandTransport + ?Sized> CommandTransport for &T {
    fn send_command(&self, command: &str) -> Result<String> {
        (**self).send_command(command)
    }

    fn send_command_with_cancel(
        &self,
        command: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        (**self).send_command_with_cancel(command, cancel)
    }
}

/// The real command channel: a fresh TCP connection per command.
#[derive(Debug, Clone)]
pub struct TcpCommandChannel {
    addr: SocketAddr,
    buffer_size: usize,
    settle_delay: Duration,
    connect_timeout: Option<Duration>,
    io_timeout: Option<Duration>,
}

impl TcpCommandChannel {
    /// Build a channel from configuration, resolving the controller address once.
    pub fn from_config(config: &InstrumentConfig) -> Result<Self> {
        Ok(Self {
            addr: config.command_addr()?,
            buffer_size: config.command_buffer_size,
            settle_delay: config.settle_delay,
            connect_timeout: config.connect_timeout,
            io_timeout: config.io_timeout,
        })
    }

    /// Address of the controller's command port.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl TcpCommandChannel {
    /// Connect, wait the settle delay, write once, read once, close.
    ///
    /// The connection is closed on every path when it goes out of scope.
    fn exchange(&self, command: &str, cancel: Option<&CancellationToken>) -> Result<String> {
        let mut conn = CommandConnection::connect(self.addr, self.connect_timeout)?;
        // The controller drops writes that arrive right after accept.
        if !sleep_cancellable(self.settle_delay, cancel) {
            return Err(TransportError::Cancelled {
                stage: Stage::Write,
                addr: self.addr,
            }
            .into());
        }
        conn.set_io_timeout(self.io_timeout)?;
        conn.write_command(command.as_bytes())?;
        let reply = conn.read_reply_with_cancel(self.buffer_size, cancel)?;
        drop(conn);

        let reply = String::from_utf8(reply.to_vec()).map_err(|source| {
            DriverError::ReplyEncoding {
                command: command.trim_end().to_string(),
                source,
            }
        })?;
        debug!(
            addr = %self.addr,
            command = command.trim_end(),
            reply = reply.as_str(),
            "command exchanged"
        );
        Ok(reply)
    }
}

impl CommandTransport for TcpCommandChannel {
    fn send_command(&self, command: &str) -> Result<String> {
        self.exchange(command, None)
    }

    fn send_command_with_cancel(
        &self,
        command: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        self.exchange(command, Some(cancel))
    }
}
