use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use r9link_driver::{Driver, InstrumentConfig};

use crate::exit::{config_error, driver_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod control;
pub mod decode;
pub mod fetch;
pub mod query;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send a raw command line and print the reply.
    Send(SendArgs),
    /// Send a command and retry until the reply is numeric.
    Query(QueryArgs),
    /// Read back the bias or setpoint.
    Get(GetArgs),
    /// Set the STM bias (volts), range-checked.
    SetBias(ValueArgs),
    /// Set the Z PI controller setpoint (amps), range-checked.
    SetSetpoint(ValueArgs),
    /// Set a scan or lock-in field without range checking.
    Set(SetArgs),
    /// Start a named procedure.
    Start(ProcedureArgs),
    /// Stop a named procedure.
    Stop(ProcedureArgs),
    /// Start or stop the image scan procedure.
    Scan(ScanArgs),
    /// Enable or disable saving of measurements.
    MeasureSave(MeasureSaveArgs),
    /// Print the measurement status.
    Status,
    /// Print the index of the next saved file.
    SaveIndex,
    /// Receive telemetry packets and print their averaged values.
    Fetch(FetchArgs),
    /// Decode a telemetry datagram stored in a file.
    Decode(DecodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

/// Where the instrument configuration comes from, plus command-line overrides.
#[derive(Debug, Default)]
pub struct ConfigSource {
    pub path: Option<PathBuf>,
    pub address: Option<String>,
    pub command_port: Option<u16>,
}

impl ConfigSource {
    pub fn load(&self) -> CliResult<InstrumentConfig> {
        let mut config = match &self.path {
            Some(path) => InstrumentConfig::from_json_file(path).map_err(config_error)?,
            None => InstrumentConfig::default(),
        };
        if let Some(address) = &self.address {
            config.address = address.clone();
        }
        if let Some(port) = self.command_port {
            config.command_port = port;
        }
        config.validate().map_err(config_error)?;
        Ok(config)
    }

    pub fn driver(&self) -> CliResult<Driver> {
        let config = self.load()?;
        Driver::from_config(&config).map_err(|err| driver_error("connect setup failed", err))
    }
}

pub fn run(command: Command, source: &ConfigSource, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Send(args) => query::send(args, source, format),
        Command::Query(args) => query::query(args, source, format),
        Command::Get(args) => query::get(args, source, format),
        Command::Status => query::status(source, format),
        Command::SaveIndex => query::save_index(source, format),
        Command::SetBias(args) => control::set_bias(args, source, format),
        Command::SetSetpoint(args) => control::set_setpoint(args, source, format),
        Command::Set(args) => control::set_field(args, source, format),
        Command::Start(args) => control::start(args, source, format),
        Command::Stop(args) => control::stop(args, source, format),
        Command::Scan(args) => control::scan(args, source, format),
        Command::MeasureSave(args) => control::measure_save(args, source, format),
        Command::Fetch(args) => fetch::run(args, source, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Command line, e.g. "GetSWParameter, STM Bias, Value". A trailing LF is added.
    pub command: String,
}

#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Command line to send.
    pub command: String,
    /// Attempts before giving up. Defaults to the configured retry policy.
    #[arg(long)]
    pub retries: Option<u32>,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum Readback {
    Bias,
    Setpoint,
}

#[derive(Args, Debug)]
pub struct GetArgs {
    pub parameter: Readback,
}

#[derive(Args, Debug)]
pub struct ValueArgs {
    /// New value; sign is preserved, magnitude is range-checked.
    #[arg(allow_hyphen_values = true)]
    pub value: f64,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum Field {
    ScanSize,
    XOffset,
    YOffset,
    Rotation,
    LinesPerFrame,
    LineTime,
    ModulationAmplitude,
}

#[derive(Args, Debug)]
pub struct SetArgs {
    pub field: Field,
    /// Accepts exponent forms such as -2.5e-8.
    #[arg(allow_hyphen_values = true)]
    pub value: f64,
}

#[derive(Args, Debug)]
pub struct ProcedureArgs {
    /// Procedure name as shown by the controller, e.g. "Image Scan".
    pub name: String,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum ScanAction {
    Start,
    Stop,
}

#[derive(Args, Debug)]
pub struct ScanArgs {
    pub action: ScanAction,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum Toggle {
    Enable,
    Disable,
}

#[derive(Args, Debug)]
pub struct MeasureSaveArgs {
    pub state: Toggle,
}

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Local UDP port the controller streams telemetry to.
    #[arg(long, short = 'p')]
    pub port: u16,
    /// Number of packets to receive.
    #[arg(long, short = 'n', default_value = "1")]
    pub count: usize,
    /// Receive timeout per packet (e.g. 5s, 500ms). Defaults to the configured value.
    #[arg(long)]
    pub timeout: Option<String>,
    /// Print every decoded header field instead of the averaged value.
    #[arg(long)]
    pub packet: bool,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// File holding exactly one datagram.
    pub file: PathBuf,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
