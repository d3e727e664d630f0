use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, trace};

use crate::cancel::CancellationToken;
use crate::error::{is_timeout_kind, Result, Stage, TransportError};

/// Read slice used while a cancellation token is attached.
const CANCEL_POLL: Duration = Duration::from_millis(20);

/// Smallest read timeout handed to the OS; a zero timeout means "block forever".
const MIN_WAIT: Duration = Duration::from_millis(1);

/// A single-use TCP connection to the controller's command port.
///
/// Opened per command, used for one write and one read, then dropped.
/// Dropping the value closes the socket.
pub struct CommandConnection {
    stream: TcpStream,
    peer: SocketAddr,
    io_timeout: Option<Duration>,
}

impl CommandConnection {
    /// Connect to the command port (blocking).
    ///
    /// With `connect_timeout = None` the OS default connect timeout applies.
    pub fn connect(addr: SocketAddr, connect_timeout: Option<Duration>) -> Result<Self> {
        let result = match connect_timeout {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
            None => TcpStream::connect(addr),
        };
        let stream = result.map_err(|source| match connect_timeout {
            Some(after) if is_timeout_kind(&source) => TransportError::Timeout {
                stage: Stage::Connect,
                addr,
                after,
            },
            _ => TransportError::Connect { addr, source },
        })?;
        stream.set_nodelay(true)?;
        debug!(%addr, "connected to command port");
        Ok(Self {
            stream,
            peer: addr,
            io_timeout: None,
        })
    }

    /// Bound both the write and the read of this exchange.
    pub fn set_io_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.stream.set_read_timeout(timeout)?;
        self.stream.set_write_timeout(timeout)?;
        self.io_timeout = timeout;
        Ok(())
    }

    /// Write a full command line.
    pub fn write_command(&mut self, line: &[u8]) -> Result<()> {
        trace!(addr = %self.peer, bytes = line.len(), "writing command");
        let written = self.stream.write_all(line).and_then(|()| self.stream.flush());
        written.map_err(|source| self.stage_error(Stage::Write, source))
    }

    /// Read the reply with a single `read` of at most `max_len` bytes.
    ///
    /// The controller sends its whole reply in one segment and never
    /// terminates it, so no framing is attempted. An empty result means the
    /// peer closed without replying.
    pub fn read_reply(&mut self, max_len: usize) -> Result<Bytes> {
        self.read_reply_with_cancel(max_len, None)
    }

    /// [`read_reply`](Self::read_reply) that returns
    /// [`TransportError::Cancelled`] as soon as `cancel` fires.
    ///
    /// The wait is still bounded by the I/O timeout as a whole; with a token
    /// attached it is taken in short slices so the token is seen promptly.
    pub fn read_reply_with_cancel(
        &mut self,
        max_len: usize,
        cancel: Option<&CancellationToken>,
    ) -> Result<Bytes> {
        let deadline = self.io_timeout.map(|timeout| Instant::now() + timeout);
        let mut buf = vec![0u8; max_len];

        loop {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                debug!(addr = %self.peer, "command read cancelled");
                return Err(TransportError::Cancelled {
                    stage: Stage::Read,
                    addr: self.peer,
                });
            }

            let remaining = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(TransportError::Timeout {
                            stage: Stage::Read,
                            addr: self.peer,
                            after: self.io_timeout.unwrap_or_default(),
                        });
                    }
                    Some(remaining)
                }
                None => None,
            };

            let wait = match (remaining, cancel) {
                (Some(remaining), Some(_)) => Some(remaining.min(CANCEL_POLL)),
                (Some(remaining), None) => Some(remaining),
                (None, Some(_)) => Some(CANCEL_POLL),
                (None, None) => None,
            };
            self.stream.set_read_timeout(wait.map(|w| w.max(MIN_WAIT)))?;

            match self.stream.read(&mut buf) {
                Ok(n) => {
                    buf.truncate(n);
                    trace!(addr = %self.peer, bytes = n, "read reply");
                    return Ok(Bytes::from(buf));
                }
                Err(err) if err.kind() == ErrorKind::Interrupted || is_timeout_kind(&err) => {
                    continue
                }
                Err(source) => {
                    return Err(TransportError::Read {
                        addr: self.peer,
                        source,
                    })
                }
            }
        }
    }

    /// Address of the controller this connection talks to.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    fn stage_error(&self, stage: Stage, source: std::io::Error) -> TransportError {
        match self.io_timeout {
            Some(after) if is_timeout_kind(&source) => TransportError::Timeout {
                stage,
                addr: self.peer,
                after,
            },
            _ => match stage {
                Stage::Write => TransportError::Write {
                    addr: self.peer,
                    source,
                },
                _ => TransportError::Read {
                    addr: self.peer,
                    source,
                },
            },
        }
    }
}

impl Drop for CommandConnection {
    fn drop(&mut self) {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
        trace!(addr = %self.peer, "closed command connection");
    }
}

impl std::fmt::Debug for CommandConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandConnection")
            .field("peer", &self.peer)
            .field("io_timeout", &self.io_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn local_listener() -> (TcpListener, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr)
    }

    #[test]
    fn write_then_read_single_reply() {
        let (listener, addr) = local_listener();
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 64];
            let n = stream.read(&mut buf).unwrap();
            assert_eq!(&buf[..n], b"GetSWParameter, Measure Item, Status\n");
            stream.write_all(b"Idle").unwrap();
        });

        let mut conn = CommandConnection::connect(addr, Some(Duration::from_secs(2))).unwrap();
        conn.set_io_timeout(Some(Duration::from_secs(2))).unwrap();
        conn.write_command(b"GetSWParameter, Measure Item, Status\n")
            .unwrap();
        let reply = conn.read_reply(4096).unwrap();
        assert_eq!(reply.as_ref(), b"Idle");

        server.join().unwrap();
    }

    #[test]
    fn reply_is_capped_at_buffer_size() {
        let (listener, addr) = local_listener();
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(b"0123456789").unwrap();
            std::thread::sleep(Duration::from_millis(50));
        });

        let mut conn = CommandConnection::connect(addr, None).unwrap();
        conn.set_io_timeout(Some(Duration::from_secs(2))).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        let reply = conn.read_reply(4).unwrap();
        assert_eq!(reply.as_ref(), b"0123");

        server.join().unwrap();
    }

    #[test]
    fn closed_peer_yields_empty_reply() {
        let (listener, addr) = local_listener();
        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            drop(stream);
        });

        let mut conn = CommandConnection::connect(addr, None).unwrap();
        conn.set_io_timeout(Some(Duration::from_secs(2))).unwrap();
        server.join().unwrap();
        let reply = conn.read_reply(4096).unwrap();
        assert!(reply.is_empty());
    }

    #[test]
    fn silent_peer_times_out_on_read() {
        let (listener, addr) = local_listener();
        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            std::thread::sleep(Duration::from_millis(300));
            drop(stream);
        });

        let mut conn = CommandConnection::connect(addr, None).unwrap();
        conn.set_io_timeout(Some(Duration::from_millis(50))).unwrap();
        let err = conn.read_reply(4096).unwrap_err();
        assert!(matches!(
            err,
            TransportError::Timeout {
                stage: Stage::Read,
                ..
            }
        ));

        server.join().unwrap();
    }

    #[test]
    fn cancel_interrupts_a_stalled_read() {
        let (listener, addr) = local_listener();
        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            std::thread::sleep(Duration::from_millis(800));
            drop(stream);
        });

        let token = CancellationToken::new();
        let canceller = {
            let token = token.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(50));
                token.cancel();
            })
        };

        let mut conn = CommandConnection::connect(addr, None).unwrap();
        conn.set_io_timeout(Some(Duration::from_secs(10))).unwrap();
        let started = Instant::now();
        let err = conn.read_reply_with_cancel(4096, Some(&token)).unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(matches!(
            err,
            TransportError::Cancelled {
                stage: Stage::Read,
                ..
            }
        ));
        canceller.join().unwrap();
        server.join().unwrap();
    }

    #[test]
    fn refused_connection_reports_connect_stage() {
        let (listener, addr) = local_listener();
        drop(listener);

        let err = CommandConnection::connect(addr, Some(Duration::from_secs(1))).unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Connect));
    }
}
