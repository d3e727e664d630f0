use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, trace};

use crate::cancel::CancellationToken;
use crate::error::{is_timeout_kind, Result, Stage, TransportError};

/// Smallest read timeout handed to the OS; a zero timeout means "block forever".
const MIN_WAIT: Duration = Duration::from_millis(1);

/// One received datagram and the address it came from.
#[derive(Debug, Clone)]
pub struct Datagram {
    pub payload: Bytes,
    pub source: SocketAddr,
}

/// Options for a single bounded receive.
#[derive(Debug, Clone, Copy)]
pub struct ReceiveOptions {
    /// Maximum datagram size accepted. Longer datagrams are truncated by the OS.
    pub max_len: usize,
    /// Upper bound on the whole wait. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// How often a cancellation token is checked while waiting.
    pub poll_interval: Duration,
}

impl Default for ReceiveOptions {
    fn default() -> Self {
        Self {
            max_len: 2048,
            timeout: Some(Duration::from_secs(5)),
            poll_interval: Duration::from_millis(50),
        }
    }
}

/// A bound UDP socket for telemetry datagrams.
///
/// The socket is closed when this value is dropped.
pub struct TelemetrySocket {
    socket: UdpSocket,
    local: SocketAddr,
}

impl TelemetrySocket {
    /// Bind to a local address.
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr).map_err(|source| TransportError::Bind { addr, source })?;
        let local = socket.local_addr()?;
        debug!(%local, "bound telemetry socket");
        Ok(Self { socket, local })
    }

    /// The address the socket is actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    /// Wait for exactly one datagram.
    ///
    /// Returns [`TransportError::Timeout`] once `options.timeout` elapses and
    /// [`TransportError::Cancelled`] as soon as `cancel` fires.
    pub fn recv_datagram(
        &self,
        options: &ReceiveOptions,
        cancel: Option<&CancellationToken>,
    ) -> Result<Datagram> {
        let started = Instant::now();
        let deadline = options.timeout.map(|timeout| started + timeout);
        let mut buf = vec![0u8; options.max_len];

        loop {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                debug!(local = %self.local, "telemetry receive cancelled");
                return Err(TransportError::Cancelled {
                    stage: Stage::Receive,
                    addr: self.local,
                });
            }

            let remaining = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(TransportError::Timeout {
                            stage: Stage::Receive,
                            addr: self.local,
                            after: options.timeout.unwrap_or_default(),
                        });
                    }
                    Some(remaining)
                }
                None => None,
            };

            let wait = match (remaining, cancel) {
                (Some(remaining), Some(_)) => Some(remaining.min(options.poll_interval)),
                (Some(remaining), None) => Some(remaining),
                (None, Some(_)) => Some(options.poll_interval),
                (None, None) => None,
            };
            self.socket.set_read_timeout(wait.map(|w| w.max(MIN_WAIT)))?;

            match self.socket.recv_from(&mut buf) {
                Ok((n, source)) => {
                    buf.truncate(n);
                    trace!(local = %self.local, %source, bytes = n, "received datagram");
                    return Ok(Datagram {
                        payload: Bytes::from(buf),
                        source,
                    });
                }
                Err(err) if err.kind() == ErrorKind::Interrupted || is_timeout_kind(&err) => {
                    continue
                }
                Err(source) => {
                    return Err(TransportError::Receive {
                        addr: self.local,
                        source,
                    })
                }
            }
        }
    }
}

impl std::fmt::Debug for TelemetrySocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetrySocket")
            .field("local", &self.local)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[test]
    fn receives_one_datagram() {
        let socket = TelemetrySocket::bind(loopback()).unwrap();
        let target = socket.local_addr();

        let sender = UdpSocket::bind(loopback()).unwrap();
        sender.send_to(b"\x01\x02\x03\x04", target).unwrap();

        let datagram = socket
            .recv_datagram(&ReceiveOptions::default(), None)
            .unwrap();
        assert_eq!(datagram.payload.as_ref(), b"\x01\x02\x03\x04");
        assert_eq!(datagram.source, sender.local_addr().unwrap());
    }

    #[test]
    fn times_out_without_traffic() {
        let socket = TelemetrySocket::bind(loopback()).unwrap();
        let options = ReceiveOptions {
            timeout: Some(Duration::from_millis(60)),
            ..ReceiveOptions::default()
        };

        let start = Instant::now();
        let err = socket.recv_datagram(&options, None).unwrap_err();
        assert!(matches!(
            err,
            TransportError::Timeout {
                stage: Stage::Receive,
                ..
            }
        ));
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn cancellation_interrupts_wait() {
        let socket = TelemetrySocket::bind(loopback()).unwrap();
        let token = CancellationToken::new();
        let remote = token.clone();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(40));
            remote.cancel();
        });

        let options = ReceiveOptions {
            timeout: None,
            poll_interval: Duration::from_millis(10),
            ..ReceiveOptions::default()
        };
        let err = socket.recv_datagram(&options, Some(&token)).unwrap_err();
        assert!(matches!(err, TransportError::Cancelled { .. }));

        canceller.join().unwrap();
    }

    #[test]
    fn oversized_datagram_is_truncated_to_max_len() {
        let socket = TelemetrySocket::bind(loopback()).unwrap();
        let sender = UdpSocket::bind(loopback()).unwrap();
        sender.send_to(&[7u8; 64], socket.local_addr()).unwrap();

        let options = ReceiveOptions {
            max_len: 16,
            ..ReceiveOptions::default()
        };
        match socket.recv_datagram(&options, None) {
            Ok(datagram) => assert_eq!(datagram.payload.len(), 16),
            // Windows reports truncation as an error instead.
            Err(err) => assert!(matches!(err, TransportError::Receive { .. })),
        }
    }

    #[test]
    fn bind_conflict_reports_bind_stage() {
        let first = TelemetrySocket::bind(loopback()).unwrap();
        let err = TelemetrySocket::bind(first.local_addr()).unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Bind));
    }
}
