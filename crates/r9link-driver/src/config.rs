use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use r9link_transport::udp::ReceiveOptions;
use serde::{Deserialize, Serialize};

use crate::error::RangeError;
use crate::parameter::BoundedParameter;
use crate::retry::RetryPolicy;

/// Errors loading or validating an [`InstrumentConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {origin}: {source}")]
    Parse {
        origin: String,
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Closed range applied to the magnitude of a bounded parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterRange {
    pub min: f64,
    pub max: f64,
}

impl ParameterRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Whether `|value|` lies in `[min, max]`. NaN never does.
    pub fn contains_magnitude(&self, value: f64) -> bool {
        (self.min..=self.max).contains(&value.abs())
    }
}

/// Per-parameter ranges. Firmware revisions changed these, so they are
/// configuration rather than constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RangeTable {
    pub bias: ParameterRange,
    pub setpoint: ParameterRange,
}

impl Default for RangeTable {
    fn default() -> Self {
        Self {
            bias: ParameterRange::new(0.1, 0.5),
            setpoint: ParameterRange::new(50e-12, 2000e-12),
        }
    }
}

impl RangeTable {
    pub fn range(&self, parameter: BoundedParameter) -> ParameterRange {
        match parameter {
            BoundedParameter::Bias => self.bias,
            BoundedParameter::Setpoint => self.setpoint,
        }
    }

    /// Validate a value against the parameter's range.
    pub fn check(&self, parameter: BoundedParameter, value: f64) -> Result<(), RangeError> {
        let range = self.range(parameter);
        if range.contains_magnitude(value) {
            Ok(())
        } else {
            Err(RangeError {
                parameter,
                value,
                min: range.min,
                max: range.max,
            })
        }
    }
}

/// Telemetry listener settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryConfig {
    /// Local address the UDP socket binds to.
    pub bind_address: String,
    /// Largest datagram accepted.
    pub buffer_size: usize,
    /// Upper bound on waiting for one datagram. `null` waits forever.
    #[serde(rename = "receive_timeout_ms", with = "opt_duration_ms")]
    pub receive_timeout: Option<Duration>,
    /// How often a cancellation token is checked while waiting.
    #[serde(rename = "poll_interval_ms", with = "duration_ms")]
    pub poll_interval: Duration,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            buffer_size: 2048,
            receive_timeout: Some(Duration::from_secs(5)),
            poll_interval: Duration::from_millis(50),
        }
    }
}

impl TelemetryConfig {
    pub fn receive_options(&self) -> ReceiveOptions {
        ReceiveOptions {
            max_len: self.buffer_size,
            timeout: self.receive_timeout,
            poll_interval: self.poll_interval,
        }
    }
}

/// Everything needed to talk to one controller.
///
/// Read-only once built; every call reads from it and nothing writes back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InstrumentConfig {
    /// Host of the PC running the R9 software.
    pub address: String,
    /// TCP port of the command interface.
    pub command_port: u16,
    /// Maximum reply size read in one go.
    pub command_buffer_size: usize,
    /// Pause after connecting before the controller accepts a write.
    #[serde(rename = "settle_delay_ms", with = "duration_ms")]
    pub settle_delay: Duration,
    #[serde(rename = "connect_timeout_ms", with = "opt_duration_ms")]
    pub connect_timeout: Option<Duration>,
    /// Bound on the write and the read of one exchange.
    #[serde(rename = "io_timeout_ms", with = "opt_duration_ms")]
    pub io_timeout: Option<Duration>,
    pub retry: RetryPolicy,
    pub ranges: RangeTable,
    pub telemetry: TelemetryConfig,
    /// Procedure started and stopped by the image-scan helpers.
    pub image_scan_procedure: String,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            command_port: 12600,
            command_buffer_size: 4096,
            settle_delay: Duration::from_millis(100),
            connect_timeout: Some(Duration::from_secs(5)),
            io_timeout: Some(Duration::from_secs(10)),
            retry: RetryPolicy::default(),
            ranges: RangeTable::default(),
            telemetry: TelemetryConfig::default(),
            image_scan_procedure: "Image Scan".to_string(),
        }
    }
}

impl InstrumentConfig {
    /// Parse and validate a JSON document. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|source| ConfigError::Parse {
            origin: "configuration".to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            origin: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would make every call fail or misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for parameter in [BoundedParameter::Bias, BoundedParameter::Setpoint] {
            let range = self.ranges.range(parameter);
            if !range.min.is_finite() || !range.max.is_finite() {
                return Err(ConfigError::Invalid(format!(
                    "{parameter} range bounds must be finite"
                )));
            }
            if range.min < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{parameter} range applies to magnitudes; min {} is negative",
                    range.min
                )));
            }
            if range.min > range.max {
                return Err(ConfigError::Invalid(format!(
                    "{parameter} range min {} exceeds max {}",
                    range.min, range.max
                )));
            }
        }
        if self.command_buffer_size == 0 {
            return Err(ConfigError::Invalid(
                "command_buffer_size must be greater than zero".to_string(),
            ));
        }
        if self.telemetry.buffer_size == 0 {
            return Err(ConfigError::Invalid(
                "telemetry.buffer_size must be greater than zero".to_string(),
            ));
        }
        if self.telemetry.poll_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "telemetry.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.retry.max_retries == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_retries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Socket address of the command port.
    pub fn command_addr(&self) -> r9link_transport::Result<SocketAddr> {
        r9link_transport::resolve(&self.address, self.command_port)
    }
}

pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

pub(crate) mod opt_duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_most_recent_firmware() {
        let config = InstrumentConfig::default();
        assert_eq!(config.command_buffer_size, 4096);
        assert_eq!(config.settle_delay, Duration::from_millis(100));
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.backoff, Duration::from_millis(100));
        assert_eq!(config.ranges.bias, ParameterRange::new(0.1, 0.5));
        assert_eq!(config.ranges.setpoint, ParameterRange::new(50e-12, 2000e-12));
        assert_eq!(config.telemetry.buffer_size, 2048);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = InstrumentConfig::from_json_str(
            r#"{
                "address": "192.168.0.20",
                "command_port": 12345,
                "ranges": { "bias": { "min": 0.1, "max": 1.5 } },
                "telemetry": { "receive_timeout_ms": null }
            }"#,
        )
        .unwrap();

        assert_eq!(config.address, "192.168.0.20");
        assert_eq!(config.command_port, 12345);
        assert_eq!(config.ranges.bias, ParameterRange::new(0.1, 1.5));
        assert_eq!(config.ranges.setpoint, RangeTable::default().setpoint);
        assert_eq!(config.telemetry.receive_timeout, None);
        assert_eq!(config.telemetry.buffer_size, 2048);
    }

    #[test]
    fn json_roundtrip_preserves_durations() {
        let config = InstrumentConfig {
            settle_delay: Duration::from_millis(250),
            io_timeout: None,
            ..InstrumentConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"settle_delay_ms\":250"));
        assert!(json.contains("\"io_timeout_ms\":null"));
        assert_eq!(InstrumentConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = InstrumentConfig::from_json_str(r#"{ "adress": "10.0.0.1" }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn inverted_range_is_invalid() {
        let err = InstrumentConfig::from_json_str(
            r#"{ "ranges": { "setpoint": { "min": 2e-9, "max": 5e-11 } } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("setpoint")));
    }

    #[test]
    fn negative_minimum_is_invalid() {
        let config = InstrumentConfig {
            ranges: RangeTable {
                bias: ParameterRange::new(-0.5, 0.5),
                ..RangeTable::default()
            },
            ..InstrumentConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_retries_is_invalid() {
        let err = InstrumentConfig::from_json_str(r#"{ "retry": { "max_retries": 0 } }"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = InstrumentConfig::from_json_file("/nonexistent/r9link.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/r9link.json"));
    }

    #[test]
    fn range_check_uses_magnitude_and_keeps_bounds_inclusive() {
        let table = RangeTable::default();
        assert!(table.check(BoundedParameter::Bias, 0.1).is_ok());
        assert!(table.check(BoundedParameter::Bias, -0.5).is_ok());
        assert!(table.check(BoundedParameter::Bias, 0.05).is_err());
        assert!(table.check(BoundedParameter::Bias, -0.51).is_err());
        assert!(table.check(BoundedParameter::Bias, f64::NAN).is_err());
        assert!(table.check(BoundedParameter::Setpoint, 1e-10).is_ok());
        assert!(table.check(BoundedParameter::Setpoint, -3e-9).is_err());
    }

    #[test]
    fn receive_options_follow_telemetry_config() {
        let telemetry = TelemetryConfig {
            buffer_size: 512,
            receive_timeout: Some(Duration::from_millis(750)),
            ..TelemetryConfig::default()
        };
        let options = telemetry.receive_options();
        assert_eq!(options.max_len, 512);
        assert_eq!(options.timeout, Some(Duration::from_millis(750)));
    }
}
