use r9link_driver::{CancellationToken, TelemetryListener};

use crate::cmd::{parse_duration, ConfigSource, FetchArgs};
use crate::exit::{driver_error, CliError, CliResult, INTERNAL, SUCCESS, USAGE};
use crate::output::{print_packet, print_sample, OutputFormat};

pub fn run(args: FetchArgs, source: &ConfigSource, format: OutputFormat) -> CliResult<i32> {
    if args.count == 0 {
        return Err(CliError::new(USAGE, "--count must be at least 1"));
    }

    let config = source.load()?;
    let mut listener = TelemetryListener::from_config(&config);
    if let Some(timeout) = &args.timeout {
        let mut options = *listener.options();
        options.timeout = Some(parse_duration(timeout)?);
        listener = listener.with_options(options);
    }

    let cancel = CancellationToken::new();
    install_ctrlc_handler(cancel.clone())?;

    for _ in 0..args.count {
        let printed = if args.packet {
            listener
                .fetch_packet_with_cancel(args.port, &cancel)
                .map(|packet| print_packet(&packet, format))
        } else {
            listener
                .fetch_sample_with_cancel(args.port, &cancel)
                .map(|sample| print_sample(&sample, format))
        };

        match printed {
            Ok(()) => {}
            Err(err) if err.is_cancelled() => {
                tracing::info!("fetch interrupted");
                break;
            }
            Err(err) => return Err(driver_error("fetch failed", err)),
        }
    }

    Ok(SUCCESS)
}

fn install_ctrlc_handler(cancel: CancellationToken) -> CliResult<()> {
    ctrlc::set_handler(move || cancel.cancel()).map_err(|err| {
        CliError::new(INTERNAL, format!("signal handler setup failed: {err}"))
    })
}
