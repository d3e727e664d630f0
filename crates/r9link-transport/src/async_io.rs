//! Tokio counterparts of the blocking sockets (feature `async`).
//!
//! Cancellation is expressed with `tokio::select!` against the token rather
//! than by polling.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tracing::{debug, trace};

use crate::cancel::CancellationToken;
use crate::error::{Result, Stage, TransportError};
use crate::udp::{Datagram, ReceiveOptions};

/// Async single-use TCP connection to the command port.
pub struct AsyncCommandConnection {
    stream: TcpStream,
    peer: SocketAddr,
    io_timeout: Option<Duration>,
}

impl AsyncCommandConnection {
    /// Connect to the command port.
    pub async fn connect(addr: SocketAddr, connect_timeout: Option<Duration>) -> Result<Self> {
        let connecting = TcpStream::connect(addr);
        let stream = match connect_timeout {
            Some(after) => tokio::time::timeout(after, connecting)
                .await
                .map_err(|_| TransportError::Timeout {
                    stage: Stage::Connect,
                    addr,
                    after,
                })?,
            None => connecting.await,
        }
        .map_err(|source| TransportError::Connect { addr, source })?;
        stream.set_nodelay(true)?;
        debug!(%addr, "connected to command port");
        Ok(Self {
            stream,
            peer: addr,
            io_timeout: None,
        })
    }

    /// Bound both the write and the read of this exchange.
    pub fn set_io_timeout(&mut self, timeout: Option<Duration>) {
        self.io_timeout = timeout;
    }

    /// Write a full command line.
    pub async fn write_command(&mut self, line: &[u8]) -> Result<()> {
        trace!(addr = %self.peer, bytes = line.len(), "writing command");
        let peer = self.peer;
        let write = async {
            self.stream.write_all(line).await?;
            self.stream.flush().await
        };
        with_timeout(self.io_timeout, Stage::Write, peer, write)
            .await?
            .map_err(|source| TransportError::Write { addr: peer, source })
    }

    /// Read the reply with a single read of at most `max_len` bytes.
    pub async fn read_reply(&mut self, max_len: usize) -> Result<Bytes> {
        let peer = self.peer;
        let mut buf = vec![0u8; max_len];
        let n = with_timeout(self.io_timeout, Stage::Read, peer, self.stream.read(&mut buf))
            .await?
            .map_err(|source| TransportError::Read { addr: peer, source })?;
        buf.truncate(n);
        trace!(addr = %peer, bytes = n, "read reply");
        Ok(Bytes::from(buf))
    }

    /// Address of the controller this connection talks to.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

/// Async bound UDP socket for telemetry datagrams.
pub struct AsyncTelemetrySocket {
    socket: UdpSocket,
    local: SocketAddr,
}

impl AsyncTelemetrySocket {
    /// Bind to a local address.
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| TransportError::Bind { addr, source })?;
        let local = socket.local_addr()?;
        debug!(%local, "bound telemetry socket");
        Ok(Self { socket, local })
    }

    /// The address the socket is actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    /// Wait for exactly one datagram, bounded by the timeout and the token.
    pub async fn recv_datagram(
        &self,
        options: &ReceiveOptions,
        cancel: Option<&CancellationToken>,
    ) -> Result<Datagram> {
        let local = self.local;
        let mut buf = vec![0u8; options.max_len];
        let never = CancellationToken::new();
        let token = cancel.unwrap_or(&never);

        let received = tokio::select! {
            _ = token.cancelled() => {
                debug!(%local, "telemetry receive cancelled");
                return Err(TransportError::Cancelled { stage: Stage::Receive, addr: local });
            }
            received = with_timeout(options.timeout, Stage::Receive, local, self.socket.recv_from(&mut buf)) => received?,
        };
        let (n, source) =
            received.map_err(|source| TransportError::Receive { addr: local, source })?;
        buf.truncate(n);
        trace!(%local, %source, bytes = n, "received datagram");
        Ok(Datagram {
            payload: Bytes::from(buf),
            source,
        })
    }
}

async fn with_timeout<F: std::future::Future>(
    timeout: Option<Duration>,
    stage: Stage,
    addr: SocketAddr,
    fut: F,
) -> Result<F::Output> {
    match timeout {
        Some(after) => tokio::time::timeout(after, fut)
            .await
            .map_err(|_| TransportError::Timeout { stage, addr, after }),
        None => Ok(fut.await),
    }
}
