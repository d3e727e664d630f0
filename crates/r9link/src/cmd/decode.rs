use std::fs;

use r9link_wire::decode_packet;

use crate::cmd::DecodeArgs;
use crate::exit::{decode_error, io_error, CliResult, SUCCESS};
use crate::output::{print_packet, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let datagram = fs::read(&args.file)
        .map_err(|err| io_error(&format!("failed reading {}", args.file.display()), err))?;
    let packet = decode_packet(&datagram).map_err(|err| decode_error("decode failed", err))?;
    print_packet(&packet, format);
    Ok(SUCCESS)
}
