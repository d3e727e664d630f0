//! TCP and UDP transports for talking to an R9 controller.
//!
//! Two independent socket types live here:
//! - [`CommandConnection`]: one short-lived TCP connection per command
//! - [`TelemetrySocket`]: a bound UDP socket that waits for one datagram
//!
//! Both release their OS resource on drop, so every exit path (including
//! errors and cancellation) closes the socket. Higher layers never hold a
//! connection across calls.

pub mod addr;
pub mod cancel;
pub mod error;
pub mod tcp;
pub mod udp;

#[cfg(feature = "async")]
pub mod async_io;

pub use addr::resolve;
pub use cancel::{sleep_cancellable, CancellationToken};
pub use error::{Result, Stage, TransportError};
pub use tcp::CommandConnection;
pub use udp::{Datagram, ReceiveOptions, TelemetrySocket};

#[cfg(feature = "async")]
pub use async_io::{AsyncCommandConnection, AsyncTelemetrySocket};
