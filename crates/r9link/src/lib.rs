//! Interface to RHK R9 scanning probe microscope controllers.
//!
//! The controller exposes two channels: an ASCII request/reply command port
//! over TCP and a stream of binary telemetry datagrams over UDP. This crate
//! re-exports the layered implementation.
//!
//! # Crate Structure
//!
//! - [`transport`]: blocking (and, with `async`, tokio) TCP/UDP sockets
//! - [`wire`]: command line builders and the telemetry packet codec
//! - [`driver`]: [`Driver`] and [`TelemetryListener`], configuration and errors
//!
//! ```no_run
//! use r9link::{Driver, InstrumentConfig, TelemetryListener};
//!
//! # fn main() -> Result<(), r9link::DriverError> {
//! let config = InstrumentConfig::from_json_file("r9.json")?;
//! let driver = Driver::from_config(&config)?;
//! driver.set_bias(0.3)?;
//!
//! let current = TelemetryListener::from_config(&config).fetch_averaged_value(12700)?;
//! println!("current: {current}");
//! # Ok(())
//! # }
//! ```

/// Re-export transport types.
pub mod transport {
    pub use r9link_transport::*;
}

/// Re-export wire format types.
pub mod wire {
    pub use r9link_wire::*;
}

/// Re-export driver types.
pub mod driver {
    pub use r9link_driver::*;
}

pub use r9link_driver::{
    Ack, BoundedParameter, CancellationToken, Driver, DriverError, InstrumentConfig, RangeError,
    TelemetryListener,
};
pub use r9link_wire::{DecodedSample, TelemetryPacket};

#[cfg(feature = "async")]
pub use r9link_driver::{AsyncDriver, AsyncTelemetryListener};
