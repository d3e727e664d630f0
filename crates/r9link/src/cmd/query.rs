use r9link_wire::CommandLine;

use crate::cmd::{ConfigSource, GetArgs, QueryArgs, Readback, SendArgs};
use crate::exit::{driver_error, CliResult, SUCCESS};
use crate::output::{print_reply, print_value, OutputFormat};

/// Terminate a user-typed command with exactly one LF.
fn wire_line(command: &str) -> String {
    format!("{}\n", command.trim_end_matches(['\r', '\n']))
}

pub fn send(args: SendArgs, source: &ConfigSource, format: OutputFormat) -> CliResult<i32> {
    let driver = source.driver()?;
    let line = wire_line(&args.command);
    let reply = driver
        .send_command(&line)
        .map_err(|err| driver_error("send failed", err))?;
    print_reply(&line, &reply, format);
    Ok(SUCCESS)
}

pub fn query(args: QueryArgs, source: &ConfigSource, format: OutputFormat) -> CliResult<i32> {
    let driver = source.driver()?;
    let line = wire_line(&args.command);
    let retries = args
        .retries
        .unwrap_or(driver.retry_policy().max_retries);
    let value = driver
        .query_numeric(&line, retries)
        .map_err(|err| driver_error("query failed", err))?;
    print_value(line.trim_end(), value, None, format);
    Ok(SUCCESS)
}

pub fn get(args: GetArgs, source: &ConfigSource, format: OutputFormat) -> CliResult<i32> {
    let driver = source.driver()?;
    let (name, unit, result) = match args.parameter {
        Readback::Bias => ("bias", "V", driver.get_bias()),
        Readback::Setpoint => ("setpoint", "A", driver.get_setpoint()),
    };
    let value = result.map_err(|err| driver_error("query failed", err))?;
    print_value(name, value, Some(unit), format);
    Ok(SUCCESS)
}

pub fn status(source: &ConfigSource, format: OutputFormat) -> CliResult<i32> {
    let driver = source.driver()?;
    let reply = driver
        .get_status()
        .map_err(|err| driver_error("status failed", err))?;
    print_reply(CommandLine::get_status().as_str(), &reply, format);
    Ok(SUCCESS)
}

pub fn save_index(source: &ConfigSource, format: OutputFormat) -> CliResult<i32> {
    let driver = source.driver()?;
    let index = driver
        .get_save_index()
        .map_err(|err| driver_error("save-index failed", err))?;
    print_value("save_index", f64::from(index), None, format);
    Ok(SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_line_adds_single_terminator() {
        assert_eq!(wire_line("StartProcedure, Image Scan"), "StartProcedure, Image Scan\n");
        assert_eq!(wire_line("StartProcedure, Image Scan\n"), "StartProcedure, Image Scan\n");
        assert_eq!(wire_line("StartProcedure, Image Scan\r\n"), "StartProcedure, Image Scan\n");
    }
}
