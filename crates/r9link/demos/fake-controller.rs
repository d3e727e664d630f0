//! Loopback stand-in for an R9 controller.
//!
//! Answers command lines on TCP and streams telemetry packets over UDP, so
//! the CLI can be tried without hardware.
//!
//! Run with:
//!   cargo run -p r9link --example fake-controller -- 12600 12700
//!
//! In another terminal:
//!   cargo run -p r9link --features cli -- --command-port 12600 set-bias 0.3
//!   cargo run -p r9link --features cli -- fetch --port 12700 --count 5

use std::io::{Read, Write};
use std::net::{TcpListener, UdpSocket};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::BytesMut;
use r9link::wire::{encode_packet, format_value, TelemetryPacket};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let command_port: u16 = args.next().map(|p| p.parse()).transpose()?.unwrap_or(12600);
    let telemetry_port: u16 = args.next().map(|p| p.parse()).transpose()?.unwrap_or(12700);

    let bias = Arc::new(Mutex::new(0.3_f64));
    spawn_telemetry(telemetry_port, bias.clone())?;

    let listener = TcpListener::bind(("127.0.0.1", command_port))?;
    eprintln!("Commands on 127.0.0.1:{command_port}, telemetry to 127.0.0.1:{telemetry_port}");

    for stream in listener.incoming() {
        let mut stream = stream?;
        let mut buf = [0u8; 4096];
        let n = stream.read(&mut buf)?;
        let line = String::from_utf8_lossy(&buf[..n]);
        let line = line.trim_end();
        eprintln!("<- {line}");

        let reply = answer(line, &bias);
        eprintln!("-> {reply}");
        stream.write_all(reply.as_bytes())?;
    }
    Ok(())
}

fn answer(line: &str, bias: &Mutex<f64>) -> String {
    let tokens: Vec<&str> = line.split(", ").collect();
    match tokens.as_slice() {
        ["SetSWParameter", "STM Bias", "Value", value] => match value.parse::<f64>() {
            Ok(value) => {
                if let Ok(mut bias) = bias.lock() {
                    *bias = value;
                }
                "Done".to_string()
            }
            Err(_) => "Error".to_string(),
        },
        ["GetSWParameter", "STM Bias", "Value"] => bias
            .lock()
            .map(|bias| format_value(*bias))
            .unwrap_or_else(|_| "Busy".to_string()),
        ["GetSWParameter", "Measure Item", "Status"] => "Idle".to_string(),
        [_, "Scan Area Window", "MeasureSave", "File Name Index"] => "1".to_string(),
        [verb, ..] if verb.starts_with("Get") => "0.0".to_string(),
        _ => "Done".to_string(),
    }
}

/// Send one packet every 100 ms whose value tracks the current bias.
fn spawn_telemetry(port: u16, bias: Arc<Mutex<f64>>) -> std::io::Result<()> {
    let socket = UdpSocket::bind("127.0.0.1:0")?;
    thread::spawn(move || loop {
        let volts = bias.lock().map(|b| *b).unwrap_or_default();
        let counts = (volts * 1.0e4) as i32;
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        let packet = match TelemetryPacket::new(
            timestamp,
            0.1,
            1.0e-13,
            "Current",
            "A",
            vec![counts - 1, counts, counts + 1],
        ) {
            Ok(packet) => packet,
            Err(err) => {
                eprintln!("telemetry packet not sent: {err}");
                break;
            }
        };

        let mut buf = BytesMut::new();
        encode_packet(&packet, &mut buf);
        let _ = socket.send_to(&buf, ("127.0.0.1", port));
        thread::sleep(Duration::from_millis(100));
    });
    Ok(())
}
