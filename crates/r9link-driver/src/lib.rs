//! High-level access to an R9 controller.
//!
//! [`Driver`] issues commands over the TCP command channel: raw commands,
//! range-checked bias/setpoint changes, retrying numeric queries, procedure
//! control and the unvalidated scan setters. [`TelemetryListener`] waits for
//! one UDP telemetry packet and reduces it to a single value.
//!
//! Every call opens and closes its own socket. Nothing is cached between
//! calls, so a `Driver` can be shared freely; serializing commands that
//! must not interleave on the instrument is up to the caller.

pub mod channel;
pub mod config;
pub mod driver;
pub mod error;
pub mod parameter;
pub mod retry;
pub mod telemetry;

#[cfg(feature = "async")]
pub mod async_driver;

pub use channel::{CommandTransport, TcpCommandChannel};
pub use config::{ConfigError, InstrumentConfig, ParameterRange, RangeTable, TelemetryConfig};
pub use driver::Driver;
pub use error::{DriverError, RangeError, ReplyParseError, Result};
pub use parameter::{Ack, BoundedParameter};
pub use retry::{parse_numeric_reply, RetryPolicy};
pub use telemetry::TelemetryListener;

pub use r9link_transport::CancellationToken;

#[cfg(feature = "async")]
pub use async_driver::{AsyncDriver, AsyncTelemetryListener};
