use r9link_driver::{Ack, BoundedParameter, Driver, Result as DriverResult};

use crate::cmd::{
    ConfigSource, Field, MeasureSaveArgs, ProcedureArgs, ScanAction, ScanArgs, SetArgs, Toggle,
    ValueArgs,
};
use crate::exit::{driver_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_reply, OutputFormat};

fn acknowledge(
    context: &str,
    action: &str,
    result: DriverResult<Ack>,
    format: OutputFormat,
) -> CliResult<i32> {
    let ack = result.map_err(|err| driver_error(context, err))?;
    print_reply(action, ack.as_str(), format);
    Ok(SUCCESS)
}

fn set_bounded(
    parameter: BoundedParameter,
    value: f64,
    source: &ConfigSource,
    format: OutputFormat,
) -> CliResult<i32> {
    let driver = source.driver()?;
    let action = format!("set {parameter} {value} {}", parameter.unit());
    let context = format!("set {parameter} failed");
    acknowledge(
        &context,
        &action,
        driver.set_bounded_parameter(parameter, value),
        format,
    )
}

pub fn set_bias(args: ValueArgs, source: &ConfigSource, format: OutputFormat) -> CliResult<i32> {
    set_bounded(BoundedParameter::Bias, args.value, source, format)
}

pub fn set_setpoint(
    args: ValueArgs,
    source: &ConfigSource,
    format: OutputFormat,
) -> CliResult<i32> {
    set_bounded(BoundedParameter::Setpoint, args.value, source, format)
}

fn apply_field(driver: &Driver, field: Field, value: f64) -> CliResult<DriverResult<Ack>> {
    Ok(match field {
        Field::ScanSize => driver.set_scan_size(value),
        Field::XOffset => driver.set_x_offset(value),
        Field::YOffset => driver.set_y_offset(value),
        Field::Rotation => driver.set_rotation(value),
        Field::LinesPerFrame => driver.set_lines_per_frame(lines_per_frame(value)?),
        Field::LineTime => driver.set_line_time(value),
        Field::ModulationAmplitude => driver.set_modulation_amplitude(value),
    })
}

fn lines_per_frame(value: f64) -> CliResult<u32> {
    if value.fract() != 0.0 || value < 1.0 || value > f64::from(u32::MAX) {
        return Err(CliError::new(
            USAGE,
            format!("lines-per-frame must be a positive integer, got {value}"),
        ));
    }
    Ok(value as u32)
}

pub fn set_field(args: SetArgs, source: &ConfigSource, format: OutputFormat) -> CliResult<i32> {
    let driver = source.driver()?;
    let result = apply_field(&driver, args.field, args.value)?;
    let action = format!("set {:?} {}", args.field, args.value);
    acknowledge("set failed", &action, result, format)
}

pub fn start(args: ProcedureArgs, source: &ConfigSource, format: OutputFormat) -> CliResult<i32> {
    let driver = source.driver()?;
    let action = format!("start {}", args.name);
    acknowledge("start failed", &action, driver.start_procedure(&args.name), format)
}

pub fn stop(args: ProcedureArgs, source: &ConfigSource, format: OutputFormat) -> CliResult<i32> {
    let driver = source.driver()?;
    let action = format!("stop {}", args.name);
    acknowledge("stop failed", &action, driver.stop_procedure(&args.name), format)
}

pub fn scan(args: ScanArgs, source: &ConfigSource, format: OutputFormat) -> CliResult<i32> {
    let driver = source.driver()?;
    match args.action {
        ScanAction::Start => acknowledge(
            "scan start failed",
            "scan start",
            driver.start_image_scan(),
            format,
        ),
        ScanAction::Stop => acknowledge(
            "scan stop failed",
            "scan stop",
            driver.stop_image_scan(),
            format,
        ),
    }
}

pub fn measure_save(
    args: MeasureSaveArgs,
    source: &ConfigSource,
    format: OutputFormat,
) -> CliResult<i32> {
    let driver = source.driver()?;
    match args.state {
        Toggle::Enable => acknowledge(
            "measure-save failed",
            "measure-save enable",
            driver.measure_save_enable(),
            format,
        ),
        Toggle::Disable => acknowledge(
            "measure-save failed",
            "measure-save disable",
            driver.measure_save_disable(),
            format,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_per_frame_must_be_whole() {
        assert_eq!(lines_per_frame(512.0).unwrap(), 512);
        assert_eq!(lines_per_frame(256.5).unwrap_err().code, USAGE);
        assert_eq!(lines_per_frame(0.0).unwrap_err().code, USAGE);
        assert_eq!(lines_per_frame(-4.0).unwrap_err().code, USAGE);
    }
}
