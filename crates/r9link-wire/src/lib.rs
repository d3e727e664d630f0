//! Wire formats spoken by the R9 controller.
//!
//! Two unrelated formats share this crate:
//! - ASCII command lines sent over TCP: `Verb, Target[, Sub[, Field]], Value\n`
//! - binary little-endian telemetry packets received over UDP
//!
//! Telemetry packet layout:
//! ```text
//! ┌────────────┬───────────┬──────────┬──────┬────────────┬────────────────┐
//! │ packet_len │ timestamp │ interval │ gain │ label_size │ label          │
//! │ u32        │ u64       │ f32      │ f32  │ u32        │ label_size × 2 │
//! ├────────────┼───────────┴──────────┴──────┴────────────┴────────────────┤
//! │ unit_size  │ unit (unit_size × 2) │ data_size u32 │ data i32 × n       │
//! └────────────┴──────────────────────┴───────────────┴────────────────────┘
//! ```
//! No partial packets are returned: a datagram is either decoded into a
//! [`TelemetryPacket`] (possibly carrying [`IntegrityWarning`]s) or rejected
//! with a [`DecodeError`].

pub mod codec;
pub mod command;
pub mod error;
pub mod packet;

pub use codec::{decode_packet, encode_packet, MIN_PACKET_LEN};
pub use command::{format_value, CommandLine, ScanSetting, Verb};
pub use error::{DecodeError, Result};
pub use packet::{DecodedSample, IntegrityWarning, PacketTooLarge, TelemetryPacket};
