use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use r9link_wire::{DecodedSample, IntegrityWarning, TelemetryPacket};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct ReplyOutput<'a> {
    command: &'a str,
    reply: &'a str,
}

/// Print a raw controller reply to a command.
pub fn print_reply(command: &str, reply: &str, format: OutputFormat) {
    let command = command.trim_end();
    match format {
        OutputFormat::Json => print_json(&ReplyOutput { command, reply }),
        OutputFormat::Table => {
            print_table(
                vec!["COMMAND", "REPLY"],
                vec![vec![command.to_string(), reply.to_string()]],
            );
        }
        OutputFormat::Pretty => println!("{command} -> {reply}"),
        OutputFormat::Raw => print_raw(reply.as_bytes()),
    }
}

#[derive(Serialize)]
struct ValueOutput<'a> {
    name: &'a str,
    value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    unit: Option<&'a str>,
}

/// Print one named scalar.
pub fn print_value(name: &str, value: f64, unit: Option<&str>, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&ValueOutput { name, value, unit }),
        OutputFormat::Table => {
            print_table(
                vec!["NAME", "VALUE", "UNIT"],
                vec![vec![
                    name.to_string(),
                    value.to_string(),
                    unit.unwrap_or("").to_string(),
                ]],
            );
        }
        OutputFormat::Pretty => match unit {
            Some(unit) => println!("{name} = {value} {unit}"),
            None => println!("{name} = {value}"),
        },
        OutputFormat::Raw => println!("{value}"),
    }
}

#[derive(Serialize)]
struct SampleOutput<'a> {
    label: &'a str,
    unit: &'a str,
    value: f64,
    mean: f64,
    gain: f32,
    timestamp: u64,
    sample_count: usize,
    warnings: Vec<String>,
}

pub fn print_sample(sample: &DecodedSample, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&SampleOutput {
            label: &sample.label,
            unit: &sample.unit,
            value: sample.value,
            mean: sample.mean,
            gain: sample.gain,
            timestamp: sample.timestamp,
            sample_count: sample.sample_count,
            warnings: warning_text(&sample.warnings),
        }),
        OutputFormat::Table => {
            print_table(
                vec!["TIMESTAMP", "LABEL", "VALUE", "UNIT", "SAMPLES", "WARNINGS"],
                vec![vec![
                    sample.timestamp.to_string(),
                    sample.label.clone(),
                    sample.value.to_string(),
                    sample.unit.clone(),
                    sample.sample_count.to_string(),
                    sample.warnings.len().to_string(),
                ]],
            );
        }
        OutputFormat::Pretty => {
            println!(
                "t={} {}={} {} (mean={} gain={} n={})",
                sample.timestamp,
                sample.label,
                sample.value,
                sample.unit,
                sample.mean,
                sample.gain,
                sample.sample_count
            );
            for warning in &sample.warnings {
                println!("  warning: {warning}");
            }
        }
        OutputFormat::Raw => println!("{}", sample.value),
    }
}

#[derive(Serialize)]
struct PacketOutput<'a> {
    packet_len: u32,
    timestamp: u64,
    interval: f32,
    gain: f32,
    label: &'a str,
    unit: &'a str,
    data_size: u32,
    data: &'a [i32],
    averaged_value: Option<f64>,
    warnings: Vec<String>,
}

/// Print every header field of a decoded packet.
pub fn print_packet(packet: &TelemetryPacket, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&PacketOutput {
            packet_len: packet.packet_len,
            timestamp: packet.timestamp,
            interval: packet.interval,
            gain: packet.gain,
            label: &packet.label,
            unit: &packet.unit,
            data_size: packet.data_size,
            data: &packet.data,
            averaged_value: packet.averaged_value(),
            warnings: warning_text(&packet.warnings),
        }),
        OutputFormat::Table => {
            let averaged = packet
                .averaged_value()
                .map(|v| v.to_string())
                .unwrap_or_else(|| "-".to_string());
            let mut rows = vec![
                vec!["packet_len".to_string(), packet.packet_len.to_string()],
                vec!["timestamp".to_string(), packet.timestamp.to_string()],
                vec!["interval".to_string(), packet.interval.to_string()],
                vec!["gain".to_string(), packet.gain.to_string()],
                vec!["label".to_string(), packet.label.clone()],
                vec!["unit".to_string(), packet.unit.clone()],
                vec!["data_size".to_string(), packet.data_size.to_string()],
                vec!["samples".to_string(), packet.data.len().to_string()],
                vec!["averaged_value".to_string(), averaged],
            ];
            for warning in &packet.warnings {
                rows.push(vec!["warning".to_string(), warning.to_string()]);
            }
            print_table(vec!["FIELD", "VALUE"], rows);
        }
        OutputFormat::Pretty => {
            println!("Telemetry Packet:");
            println!("  Length:     {}", packet.packet_len);
            println!("  Timestamp:  {}", packet.timestamp);
            println!("  Interval:   {}", packet.interval);
            println!("  Gain:       {}", packet.gain);
            println!("  Label:      {} [{}]", packet.label, packet.unit);
            println!(
                "  Samples:    {} (declared {})",
                packet.data.len(),
                packet.data_size
            );
            match packet.averaged_value() {
                Some(value) => println!("  Value:      {value}"),
                None => println!("  Value:      unavailable"),
            }
            for warning in &packet.warnings {
                println!("  Warning:    {warning}");
            }
        }
        OutputFormat::Raw => {
            for sample in &packet.data {
                println!("{sample}");
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    if !data.ends_with(b"\n") {
        let _ = out.write_all(b"\n");
    }
    let _ = out.flush();
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn print_table(header: Vec<&str>, rows: Vec<Vec<String>>) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    for row in rows {
        table.add_row(row);
    }
    println!("{table}");
}

fn warning_text(warnings: &[IntegrityWarning]) -> Vec<String> {
    warnings.iter().map(ToString::to_string).collect()
}
