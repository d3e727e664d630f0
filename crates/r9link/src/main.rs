mod cmd;
mod exit;
mod logging;
mod output;

use std::path::PathBuf;

use clap::Parser;

use crate::cmd::{Command, ConfigSource};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "r9link", version, about = "R9 controller command and telemetry CLI")]
struct Cli {
    /// Instrument configuration file (JSON).
    #[arg(long, value_name = "FILE", env = "R9LINK_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Controller host, overriding the configuration.
    #[arg(long, value_name = "HOST", global = true)]
    address: Option<String>,

    /// Controller command port, overriding the configuration.
    #[arg(long, value_name = "PORT", global = true)]
    command_port: Option<u16>,

    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let source = ConfigSource {
        path: cli.config,
        address: cli.address,
        command_port: cli.command_port,
    };
    let result = cmd::run(cli.command, &source, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}
