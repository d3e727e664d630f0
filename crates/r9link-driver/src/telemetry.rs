use std::net::SocketAddr;

use r9link_transport::{resolve, CancellationToken, ReceiveOptions, TelemetrySocket};
use r9link_wire::{decode_packet, DecodedSample, TelemetryPacket};
use tracing::{debug, info};

use crate::config::{InstrumentConfig, TelemetryConfig};
use crate::error::{DriverError, Result};

/// Waits for single telemetry packets on a UDP port.
///
/// Each fetch binds a fresh socket, receives exactly one datagram, and
/// closes the socket before decoding.
#[derive(Debug, Clone)]
pub struct TelemetryListener {
    bind_host: String,
    options: ReceiveOptions,
}

impl Default for TelemetryListener {
    fn default() -> Self {
        Self::new(&TelemetryConfig::default())
    }
}

impl TelemetryListener {
    pub fn new(config: &TelemetryConfig) -> Self {
        Self {
            bind_host: config.bind_address.clone(),
            options: config.receive_options(),
        }
    }

    pub fn from_config(config: &InstrumentConfig) -> Self {
        Self::new(&config.telemetry)
    }

    /// Replace the receive options, e.g. to override the timeout per call site.
    pub fn with_options(mut self, options: ReceiveOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &ReceiveOptions {
        &self.options
    }

    /// Receive and decode one packet.
    pub fn fetch_packet(&self, port: u16) -> Result<TelemetryPacket> {
        self.receive(port, None).map(|(packet, _)| packet)
    }

    pub fn fetch_packet_with_cancel(
        &self,
        port: u16,
        cancel: &CancellationToken,
    ) -> Result<TelemetryPacket> {
        self.receive(port, Some(cancel)).map(|(packet, _)| packet)
    }

    /// Receive one packet and reduce it to its averaged value with context.
    pub fn fetch_sample(&self, port: u16) -> Result<DecodedSample> {
        let (packet, from) = self.receive(port, None)?;
        reduce(packet, from)
    }

    pub fn fetch_sample_with_cancel(
        &self,
        port: u16,
        cancel: &CancellationToken,
    ) -> Result<DecodedSample> {
        let (packet, from) = self.receive(port, Some(cancel))?;
        reduce(packet, from)
    }

    /// `mean(data) × gain` of the next packet on `port`.
    pub fn fetch_averaged_value(&self, port: u16) -> Result<f64> {
        self.fetch_sample(port).map(|sample| sample.value)
    }

    pub fn fetch_averaged_value_with_cancel(
        &self,
        port: u16,
        cancel: &CancellationToken,
    ) -> Result<f64> {
        self.fetch_sample_with_cancel(port, cancel)
            .map(|sample| sample.value)
    }

    fn receive(
        &self,
        port: u16,
        cancel: Option<&CancellationToken>,
    ) -> Result<(TelemetryPacket, SocketAddr)> {
        let addr = resolve(&self.bind_host, port)?;
        let datagram = {
            let socket = TelemetrySocket::bind(addr)?;
            socket.recv_datagram(&self.options, cancel)?
        };
        let packet = decode_packet(&datagram.payload)?;
        debug!(
            from = %datagram.source,
            bytes = datagram.payload.len(),
            samples = packet.data.len(),
            warnings = packet.warnings.len(),
            "decoded telemetry packet"
        );
        Ok((packet, datagram.source))
    }
}

pub(crate) fn reduce(packet: TelemetryPacket, from: SocketAddr) -> Result<DecodedSample> {
    let sample = DecodedSample::from_packet(packet).ok_or(DriverError::NoSamples { from })?;
    info!(
        label = sample.label.as_str(),
        unit = sample.unit.as_str(),
        value = sample.value,
        samples = sample.sample_count,
        "telemetry sample"
    );
    Ok(sample)
}

#[cfg(test)]
mod tests {
    use std::net::UdpSocket;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use bytes::BytesMut;
    use r9link_wire::encode_packet;

    use super::*;

    fn free_udp_port() -> u16 {
        UdpSocket::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    /// Send `payload` to `port` repeatedly until `stop` is set, so the
    /// datagram lands regardless of when the listener binds.
    fn spray(port: u16, payload: Vec<u8>) -> (Arc<AtomicBool>, thread::JoinHandle<()>) {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let handle = thread::spawn(move || {
            let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
            while !flag.load(Ordering::Relaxed) {
                let _ = sender.send_to(&payload, ("127.0.0.1", port));
                thread::sleep(Duration::from_millis(5));
            }
        });
        (stop, handle)
    }

    fn encoded(packet: &TelemetryPacket) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_packet(packet, &mut buf);
        buf.to_vec()
    }

    fn listener() -> TelemetryListener {
        TelemetryListener::default().with_options(ReceiveOptions {
            timeout: Some(Duration::from_secs(5)),
            ..ReceiveOptions::default()
        })
    }

    #[test]
    fn averaged_value_is_mean_times_gain() {
        let port = free_udp_port();
        let packet =
            TelemetryPacket::new(42, 0.001, 2.0, "Current", "A", vec![1, 2, 3, 6]).unwrap();
        let (stop, handle) = spray(port, encoded(&packet));

        let value = listener().fetch_averaged_value(port).unwrap();
        stop.store(true, Ordering::Relaxed);
        handle.join().unwrap();

        assert_eq!(value, 6.0);
    }

    #[test]
    fn sample_carries_labels() {
        let port = free_udp_port();
        let packet = TelemetryPacket::new(7, 0.5, 0.5, "Z", "m", vec![4, 4]).unwrap();
        let (stop, handle) = spray(port, encoded(&packet));

        let sample = listener().fetch_sample(port).unwrap();
        stop.store(true, Ordering::Relaxed);
        handle.join().unwrap();

        assert_eq!(sample.label, "Z");
        assert_eq!(sample.unit, "m");
        assert_eq!(sample.timestamp, 7);
        assert_eq!(sample.sample_count, 2);
        assert_eq!(sample.value, 2.0);
        assert!(sample.warnings.is_empty());
    }

    #[test]
    fn empty_packet_reports_no_samples() {
        let port = free_udp_port();
        let packet = TelemetryPacket::new(1, 0.1, 1.0, "I", "A", Vec::new()).unwrap();
        let (stop, handle) = spray(port, encoded(&packet));

        let err = listener().fetch_averaged_value(port).unwrap_err();
        stop.store(true, Ordering::Relaxed);
        handle.join().unwrap();

        assert!(matches!(err, DriverError::NoSamples { .. }));
    }

    #[test]
    fn garbage_datagram_is_a_decode_error() {
        let port = free_udp_port();
        let (stop, handle) = spray(port, vec![1, 2, 3]);

        let err = listener().fetch_packet(port).unwrap_err();
        stop.store(true, Ordering::Relaxed);
        handle.join().unwrap();

        assert!(matches!(err, DriverError::Decode(_)));
    }

    #[test]
    fn silent_port_times_out() {
        let port = free_udp_port();
        let listener = TelemetryListener::default().with_options(ReceiveOptions {
            timeout: Some(Duration::from_millis(100)),
            ..ReceiveOptions::default()
        });

        let err = listener.fetch_averaged_value(port).unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn cancel_ends_the_wait() {
        let port = free_udp_port();
        let token = CancellationToken::new();
        let canceller = {
            let token = token.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                token.cancel();
            })
        };

        let listener = TelemetryListener::default().with_options(ReceiveOptions {
            timeout: None,
            poll_interval: Duration::from_millis(10),
            ..ReceiveOptions::default()
        });
        let err = listener
            .fetch_averaged_value_with_cancel(port, &token)
            .unwrap_err();
        canceller.join().unwrap();

        assert!(err.is_cancelled());
    }

    #[test]
    fn socket_is_released_after_fetch() {
        let port = free_udp_port();
        let listener = TelemetryListener::default().with_options(ReceiveOptions {
            timeout: Some(Duration::from_millis(30)),
            ..ReceiveOptions::default()
        });

        assert!(listener.fetch_packet(port).is_err());
        UdpSocket::bind(("127.0.0.1", port)).unwrap();
    }
}
