use r9link_transport::CancellationToken;
use r9link_wire::{CommandLine, ScanSetting};
use tracing::info;

use crate::channel::{CommandTransport, TcpCommandChannel};
use crate::config::{InstrumentConfig, RangeTable};
use crate::error::{DriverError, Result};
use crate::parameter::{Ack, BoundedParameter};
use crate::retry::{query_with_retry, RetryPolicy};

/// Command-channel client for one controller.
///
/// Holds only read-only configuration. Every method performs its own
/// request/reply exchange and returns the result directly.
#[derive(Debug, Clone)]
pub struct Driver<T = TcpCommandChannel> {
    transport: T,
    ranges: RangeTable,
    retry: RetryPolicy,
    image_scan_procedure: String,
}

impl Driver<TcpCommandChannel> {
    /// Driver over TCP for the configured controller.
    pub fn from_config(config: &InstrumentConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_transport(
            TcpCommandChannel::from_config(config)?,
            config,
        ))
    }
}

impl<T: CommandTransport> Driver<T> {
    /// Driver over any command transport.
    pub fn with_transport(transport: T, config: &InstrumentConfig) -> Self {
        Self {
            transport,
            ranges: config.ranges,
            retry: config.retry,
            image_scan_procedure: config.image_scan_procedure.clone(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn ranges(&self) -> &RangeTable {
        &self.ranges
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Send a raw command and return the decoded reply. No retry.
    pub fn send_command(&self, command: &str) -> Result<String> {
        self.transport.send_command(command)
    }

    /// Send a typed command line.
    pub fn send(&self, line: &CommandLine) -> Result<String> {
        self.transport.send_command(&line.to_wire())
    }

    /// Repeat `command` up to `max_retries` times until the reply is numeric.
    pub fn query_numeric(&self, command: &str, max_retries: u32) -> Result<f64> {
        query_with_retry(
            command.trim_end(),
            max_retries,
            self.retry.backoff,
            None,
            || self.transport.send_command(command),
        )
    }

    /// [`query_numeric`](Self::query_numeric) that gives up once `cancel` fires.
    pub fn query_numeric_with_cancel(
        &self,
        command: &str,
        max_retries: u32,
        cancel: &CancellationToken,
    ) -> Result<f64> {
        query_with_retry(
            command.trim_end(),
            max_retries,
            self.retry.backoff,
            Some(cancel),
            || self.transport.send_command_with_cancel(command, cancel),
        )
    }

    /// Numeric query of a typed line using the configured retry policy.
    pub fn query(&self, line: &CommandLine) -> Result<f64> {
        self.query_numeric(&line.to_wire(), self.retry.max_retries)
    }

    /// Range-check `|value|` and, if it passes, send it with its sign intact.
    ///
    /// An out-of-range value returns [`DriverError::Range`] without touching
    /// the socket.
    pub fn set_bounded_parameter(&self, parameter: BoundedParameter, value: f64) -> Result<Ack> {
        self.ranges.check(parameter, value)?;
        info!(%parameter, value, unit = parameter.unit(), "setting bounded parameter");
        self.send(&bounded_parameter_line(parameter, value))
            .map(Ack::new)
    }

    /// STM bias in volts.
    pub fn set_bias(&self, volts: f64) -> Result<Ack> {
        self.set_bounded_parameter(BoundedParameter::Bias, volts)
    }

    /// Z PI controller setpoint in amps.
    pub fn set_setpoint(&self, amps: f64) -> Result<Ack> {
        self.set_bounded_parameter(BoundedParameter::Setpoint, amps)
    }

    pub fn start_procedure(&self, name: &str) -> Result<Ack> {
        info!(procedure = name, "start procedure");
        self.send(&CommandLine::start_procedure(name)).map(Ack::new)
    }

    pub fn stop_procedure(&self, name: &str) -> Result<Ack> {
        info!(procedure = name, "stop procedure");
        self.send(&CommandLine::stop_procedure(name)).map(Ack::new)
    }

    /// Start the configured image-scan procedure.
    pub fn start_image_scan(&self) -> Result<Ack> {
        self.start_procedure(&self.image_scan_procedure)
    }

    /// Stop the configured image-scan procedure.
    pub fn stop_image_scan(&self) -> Result<Ack> {
        self.stop_procedure(&self.image_scan_procedure)
    }

    pub fn set_scan_setting(&self, setting: ScanSetting, value: f64) -> Result<Ack> {
        self.send(&scan_setting_line(setting, value)).map(Ack::new)
    }

    pub fn set_scan_size(&self, size: f64) -> Result<Ack> {
        self.set_scan_setting(ScanSetting::ScanSize, size)
    }

    pub fn set_x_offset(&self, offset: f64) -> Result<Ack> {
        self.set_scan_setting(ScanSetting::XOffset, offset)
    }

    pub fn set_y_offset(&self, offset: f64) -> Result<Ack> {
        self.set_scan_setting(ScanSetting::YOffset, offset)
    }

    pub fn set_rotation(&self, degrees: f64) -> Result<Ack> {
        self.set_scan_setting(ScanSetting::Rotation, degrees)
    }

    pub fn set_lines_per_frame(&self, lines: u32) -> Result<Ack> {
        self.send(&CommandLine::lines_per_frame(lines)).map(Ack::new)
    }

    /// Time per scan line, seconds.
    pub fn set_line_time(&self, seconds: f64) -> Result<Ack> {
        self.set_scan_setting(ScanSetting::LineTime, seconds)
    }

    pub fn set_modulation_amplitude(&self, amplitude: f64) -> Result<Ack> {
        self.send(&CommandLine::set_modulation_amplitude(amplitude))
            .map(Ack::new)
    }

    pub fn measure_save_enable(&self) -> Result<Ack> {
        self.send(&CommandLine::measure_save(true)).map(Ack::new)
    }

    pub fn measure_save_disable(&self) -> Result<Ack> {
        self.send(&CommandLine::measure_save(false)).map(Ack::new)
    }

    /// Measurement status as reported by the controller.
    pub fn get_status(&self) -> Result<String> {
        self.send(&CommandLine::get_status())
    }

    /// Index the next saved measurement file will use.
    pub fn get_save_index(&self) -> Result<u32> {
        let line = CommandLine::get_save_index();
        let value = self.query(&line)?;
        save_index_from(&line, value)
    }

    /// Current STM bias in volts.
    pub fn get_bias(&self) -> Result<f64> {
        self.query(&CommandLine::get_bias())
    }

    /// Current setpoint in amps.
    pub fn get_setpoint(&self) -> Result<f64> {
        self.query(&CommandLine::get_setpoint())
    }
}

/// The setter line for a bounded parameter. The value is sent with its sign.
pub(crate) fn bounded_parameter_line(parameter: BoundedParameter, value: f64) -> CommandLine {
    match parameter {
        BoundedParameter::Bias => CommandLine::set_bias(value),
        BoundedParameter::Setpoint => CommandLine::set_setpoint(value),
    }
}

/// Lines per frame goes out as an integer when it is one that fits `u32`.
pub(crate) fn scan_setting_line(setting: ScanSetting, value: f64) -> CommandLine {
    match as_u32(value) {
        Some(lines) if setting == ScanSetting::LinesPerFrame => {
            CommandLine::lines_per_frame(lines)
        }
        _ => CommandLine::scan_setting(setting, value),
    }
}

pub(crate) fn save_index_from(line: &CommandLine, value: f64) -> Result<u32> {
    as_u32(value).ok_or_else(|| DriverError::InvalidReply {
        command: line.to_string(),
        value,
        expected: "file index",
    })
}

fn as_u32(value: f64) -> Option<u32> {
    let whole = value.fract() == 0.0 && (0.0..=f64::from(u32::MAX)).contains(&value);
    whole.then_some(value as u32)
}
