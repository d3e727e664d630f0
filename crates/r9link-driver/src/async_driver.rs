//! Tokio variants of [`Driver`](crate::Driver) and
//! [`TelemetryListener`](crate::TelemetryListener).
//!
//! Same wire behavior and error values as the blocking API; waits are
//! expressed with `tokio::select!` against the cancellation token.

use std::net::SocketAddr;
use std::time::Duration;

use r9link_transport::{
    resolve, AsyncCommandConnection, AsyncTelemetrySocket, CancellationToken, ReceiveOptions,
};
use r9link_wire::{decode_packet, CommandLine, DecodedSample, ScanSetting, TelemetryPacket};
use tracing::{debug, info};

use crate::config::{InstrumentConfig, RangeTable, TelemetryConfig};
use crate::driver::{bounded_parameter_line, save_index_from, scan_setting_line};
use crate::error::{DriverError, Result};
use crate::parameter::{Ack, BoundedParameter};
use crate::retry::{QueryAttempts, RetryPolicy};
use crate::telemetry::reduce;

/// Async command-channel client. One TCP connection per command.
#[derive(Debug, Clone)]
pub struct AsyncDriver {
    addr: SocketAddr,
    buffer_size: usize,
    settle_delay: Duration,
    connect_timeout: Option<Duration>,
    io_timeout: Option<Duration>,
    ranges: RangeTable,
    retry: RetryPolicy,
    image_scan_procedure: String,
}

impl AsyncDriver {
    pub fn from_config(config: &InstrumentConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            addr: config.command_addr()?,
            buffer_size: config.command_buffer_size,
            settle_delay: config.settle_delay,
            connect_timeout: config.connect_timeout,
            io_timeout: config.io_timeout,
            ranges: config.ranges,
            retry: config.retry,
            image_scan_procedure: config.image_scan_procedure.clone(),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Send a raw command and return the decoded reply. No retry.
    pub async fn send_command(&self, command: &str) -> Result<String> {
        let mut conn = AsyncCommandConnection::connect(self.addr, self.connect_timeout).await?;
        tokio::time::sleep(self.settle_delay).await;
        conn.set_io_timeout(self.io_timeout);
        conn.write_command(command.as_bytes()).await?;
        let reply = conn.read_reply(self.buffer_size).await?;
        drop(conn);

        let reply = String::from_utf8(reply.to_vec()).map_err(|source| {
            DriverError::ReplyEncoding {
                command: command.trim_end().to_string(),
                source,
            }
        })?;
        debug!(addr = %self.addr, command = command.trim_end(), reply = reply.as_str(), "command exchanged");
        Ok(reply)
    }

    pub async fn send(&self, line: &CommandLine) -> Result<String> {
        self.send_command(&line.to_wire()).await
    }

    pub async fn query_numeric(&self, command: &str, max_retries: u32) -> Result<f64> {
        self.query_inner(command, max_retries, None).await
    }

    pub async fn query_numeric_with_cancel(
        &self,
        command: &str,
        max_retries: u32,
        cancel: &CancellationToken,
    ) -> Result<f64> {
        self.query_inner(command, max_retries, Some(cancel)).await
    }

    async fn query_inner(
        &self,
        command: &str,
        max_retries: u32,
        cancel: Option<&CancellationToken>,
    ) -> Result<f64> {
        let never = CancellationToken::new();
        let token = cancel.unwrap_or(&never);
        let mut attempts = QueryAttempts::new(command.trim_end(), max_retries);

        for attempt in 1..=max_retries {
            if token.is_cancelled() {
                return Err(QueryAttempts::cancelled());
            }

            let reply = tokio::select! {
                _ = token.cancelled() => return Err(QueryAttempts::cancelled()),
                reply = self.send_command(command) => reply?,
            };
            if let Some(value) = attempts.record(attempt, reply) {
                return Ok(value);
            }

            if attempts.has_next(attempt) {
                tokio::select! {
                    _ = token.cancelled() => return Err(QueryAttempts::cancelled()),
                    _ = tokio::time::sleep(self.retry.backoff) => {}
                }
            }
        }

        Err(attempts.exhausted())
    }

    pub async fn query(&self, line: &CommandLine) -> Result<f64> {
        self.query_numeric(&line.to_wire(), self.retry.max_retries)
            .await
    }

    /// Range-check `|value|`; nothing is sent when it fails.
    pub async fn set_bounded_parameter(
        &self,
        parameter: BoundedParameter,
        value: f64,
    ) -> Result<Ack> {
        self.ranges.check(parameter, value)?;
        info!(%parameter, value, unit = parameter.unit(), "setting bounded parameter");
        self.send(&bounded_parameter_line(parameter, value))
            .await
            .map(Ack::new)
    }

    pub async fn set_bias(&self, volts: f64) -> Result<Ack> {
        self.set_bounded_parameter(BoundedParameter::Bias, volts)
            .await
    }

    pub async fn set_setpoint(&self, amps: f64) -> Result<Ack> {
        self.set_bounded_parameter(BoundedParameter::Setpoint, amps)
            .await
    }

    pub async fn start_procedure(&self, name: &str) -> Result<Ack> {
        info!(procedure = name, "start procedure");
        self.send(&CommandLine::start_procedure(name))
            .await
            .map(Ack::new)
    }

    pub async fn stop_procedure(&self, name: &str) -> Result<Ack> {
        info!(procedure = name, "stop procedure");
        self.send(&CommandLine::stop_procedure(name))
            .await
            .map(Ack::new)
    }

    pub async fn start_image_scan(&self) -> Result<Ack> {
        self.start_procedure(&self.image_scan_procedure).await
    }

    pub async fn stop_image_scan(&self) -> Result<Ack> {
        self.stop_procedure(&self.image_scan_procedure).await
    }

    pub async fn set_scan_setting(&self, setting: ScanSetting, value: f64) -> Result<Ack> {
        self.send(&scan_setting_line(setting, value))
            .await
            .map(Ack::new)
    }

    pub async fn set_scan_size(&self, size: f64) -> Result<Ack> {
        self.set_scan_setting(ScanSetting::ScanSize, size).await
    }

    pub async fn set_x_offset(&self, offset: f64) -> Result<Ack> {
        self.set_scan_setting(ScanSetting::XOffset, offset).await
    }

    pub async fn set_y_offset(&self, offset: f64) -> Result<Ack> {
        self.set_scan_setting(ScanSetting::YOffset, offset).await
    }

    pub async fn set_rotation(&self, degrees: f64) -> Result<Ack> {
        self.set_scan_setting(ScanSetting::Rotation, degrees).await
    }

    pub async fn set_lines_per_frame(&self, lines: u32) -> Result<Ack> {
        self.send(&CommandLine::lines_per_frame(lines))
            .await
            .map(Ack::new)
    }

    pub async fn set_line_time(&self, seconds: f64) -> Result<Ack> {
        self.set_scan_setting(ScanSetting::LineTime, seconds).await
    }

    pub async fn set_modulation_amplitude(&self, amplitude: f64) -> Result<Ack> {
        self.send(&CommandLine::set_modulation_amplitude(amplitude))
            .await
            .map(Ack::new)
    }

    pub async fn measure_save_enable(&self) -> Result<Ack> {
        self.send(&CommandLine::measure_save(true))
            .await
            .map(Ack::new)
    }

    pub async fn measure_save_disable(&self) -> Result<Ack> {
        self.send(&CommandLine::measure_save(false))
            .await
            .map(Ack::new)
    }

    pub async fn get_status(&self) -> Result<String> {
        self.send(&CommandLine::get_status()).await
    }

    pub async fn get_save_index(&self) -> Result<u32> {
        let line = CommandLine::get_save_index();
        let value = self.query(&line).await?;
        save_index_from(&line, value)
    }

    pub async fn get_bias(&self) -> Result<f64> {
        self.query(&CommandLine::get_bias()).await
    }

    pub async fn get_setpoint(&self) -> Result<f64> {
        self.query(&CommandLine::get_setpoint()).await
    }
}

/// Async single-packet telemetry listener.
#[derive(Debug, Clone)]
pub struct AsyncTelemetryListener {
    bind_host: String,
    options: ReceiveOptions,
}

impl AsyncTelemetryListener {
    pub fn new(config: &TelemetryConfig) -> Self {
        Self {
            bind_host: config.bind_address.clone(),
            options: config.receive_options(),
        }
    }

    pub fn from_config(config: &InstrumentConfig) -> Self {
        Self::new(&config.telemetry)
    }

    pub fn with_options(mut self, options: ReceiveOptions) -> Self {
        self.options = options;
        self
    }

    pub async fn fetch_packet(&self, port: u16) -> Result<TelemetryPacket> {
        self.receive(port, None).await.map(|(packet, _)| packet)
    }

    pub async fn fetch_packet_with_cancel(
        &self,
        port: u16,
        cancel: &CancellationToken,
    ) -> Result<TelemetryPacket> {
        self.receive(port, Some(cancel))
            .await
            .map(|(packet, _)| packet)
    }

    pub async fn fetch_sample(&self, port: u16) -> Result<DecodedSample> {
        let (packet, from) = self.receive(port, None).await?;
        reduce(packet, from)
    }

    pub async fn fetch_sample_with_cancel(
        &self,
        port: u16,
        cancel: &CancellationToken,
    ) -> Result<DecodedSample> {
        let (packet, from) = self.receive(port, Some(cancel)).await?;
        reduce(packet, from)
    }

    pub async fn fetch_averaged_value(&self, port: u16) -> Result<f64> {
        self.fetch_sample(port).await.map(|sample| sample.value)
    }

    pub async fn fetch_averaged_value_with_cancel(
        &self,
        port: u16,
        cancel: &CancellationToken,
    ) -> Result<f64> {
        self.fetch_sample_with_cancel(port, cancel)
            .await
            .map(|sample| sample.value)
    }

    async fn receive(
        &self,
        port: u16,
        cancel: Option<&CancellationToken>,
    ) -> Result<(TelemetryPacket, SocketAddr)> {
        let addr = resolve(&self.bind_host, port)?;
        let datagram = {
            let socket = AsyncTelemetrySocket::bind(addr).await?;
            socket.recv_datagram(&self.options, cancel).await?
        };
        let packet = decode_packet(&datagram.payload)?;
        debug!(from = %datagram.source, samples = packet.data.len(), "decoded telemetry packet");
        Ok((packet, datagram.source))
    }
}
