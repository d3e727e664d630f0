use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::{trace, warn};

use crate::error::{DecodeError, Result};
use crate::packet::{decode_text, IntegrityWarning, TelemetryPacket};

/// Smallest possible packet: every fixed field, empty text, no samples.
///
/// packet_len (4) + timestamp (8) + interval (4) + gain (4) + label_size (4)
/// + unit_size (4) + data_size (4).
pub const MIN_PACKET_LEN: usize = 32;

const SAMPLE_WIDTH: usize = 4;

/// Sequential little-endian reader that reports which field ran short.
struct FieldReader<'a> {
    src: &'a [u8],
    offset: usize,
}

impl<'a> FieldReader<'a> {
    fn new(src: &'a [u8]) -> Self {
        Self { src, offset: 0 }
    }

    fn ensure(&self, field: &'static str, needed: u64) -> Result<()> {
        if (self.src.remaining() as u64) < needed {
            return Err(DecodeError::Truncated {
                field,
                offset: self.offset,
                needed,
                available: self.src.remaining(),
            });
        }
        Ok(())
    }

    fn u32(&mut self, field: &'static str) -> Result<u32> {
        self.ensure(field, 4)?;
        self.offset += 4;
        Ok(self.src.get_u32_le())
    }

    fn u64(&mut self, field: &'static str) -> Result<u64> {
        self.ensure(field, 8)?;
        self.offset += 8;
        Ok(self.src.get_u64_le())
    }

    fn f32(&mut self, field: &'static str) -> Result<f32> {
        self.ensure(field, 4)?;
        self.offset += 4;
        Ok(self.src.get_f32_le())
    }

    /// Read a text field of `chars` characters at two bytes each.
    fn text(&mut self, field: &'static str, chars: u32) -> Result<Bytes> {
        let needed = u64::from(chars) * 2;
        self.ensure(field, needed)?;
        let len = needed as usize;
        let raw = Bytes::copy_from_slice(&self.src[..len]);
        self.src.advance(len);
        self.offset += len;
        Ok(raw)
    }
}

/// Decode one telemetry datagram.
///
/// Single pass, no backtracking. Samples run from the data offset to the end
/// of the datagram. Length inconsistencies are attached to the packet as
/// [`IntegrityWarning`]s and logged; only a datagram too short for a fixed
/// or text field is rejected.
pub fn decode_packet(datagram: &[u8]) -> Result<TelemetryPacket> {
    let mut reader = FieldReader::new(datagram);

    let packet_len = reader.u32("packet_len")?;
    let timestamp = reader.u64("timestamp")?;
    let interval = reader.f32("interval")?;
    let gain = reader.f32("gain")?;
    let label_size = reader.u32("label_size")?;
    let label_raw = reader.text("label", label_size)?;
    let unit_size = reader.u32("unit_size")?;
    let unit_raw = reader.text("unit", unit_size)?;
    let data_size = reader.u32("data_size")?;

    let mut warnings = Vec::new();

    let required = u64::from(data_size) * SAMPLE_WIDTH as u64 + reader.offset as u64;
    if required > u64::from(packet_len) {
        warnings.push(IntegrityWarning::SampleCountExceedsLength {
            declared: data_size,
            required,
            packet_len,
        });
    }
    if datagram.len() != packet_len as usize {
        warnings.push(IntegrityWarning::LengthMismatch {
            declared: packet_len,
            received: datagram.len(),
        });
    }

    let mut tail = reader.src;
    let partial = tail.remaining() % SAMPLE_WIDTH;
    if partial != 0 {
        warnings.push(IntegrityWarning::PartialSample { count: partial });
    }

    let mut data = Vec::with_capacity(tail.remaining() / SAMPLE_WIDTH);
    while tail.remaining() >= SAMPLE_WIDTH {
        data.push(tail.get_i32_le());
    }

    for warning in &warnings {
        warn!(%warning, "telemetry packet integrity");
    }
    trace!(
        packet_len,
        data_size,
        samples = data.len(),
        "decoded telemetry packet"
    );

    Ok(TelemetryPacket {
        packet_len,
        timestamp,
        interval,
        gain,
        label_size,
        label: decode_text(&label_raw),
        label_raw,
        unit_size,
        unit: decode_text(&unit_raw),
        unit_raw,
        data_size,
        data,
        warnings,
    })
}

/// Encode a packet into the wire layout.
///
/// Header fields are written as stored, so a deliberately inconsistent
/// packet (wrong `packet_len` or `data_size`) is reproduced byte for byte.
pub fn encode_packet(packet: &TelemetryPacket, dst: &mut BytesMut) {
    dst.reserve(
        MIN_PACKET_LEN + packet.label_raw.len() + packet.unit_raw.len() + packet.data.len() * 4,
    );
    dst.put_u32_le(packet.packet_len);
    dst.put_u64_le(packet.timestamp);
    dst.put_f32_le(packet.interval);
    dst.put_f32_le(packet.gain);
    dst.put_u32_le(packet.label_size);
    dst.put_slice(&packet.label_raw);
    dst.put_u32_le(packet.unit_size);
    dst.put_slice(&packet.unit_raw);
    dst.put_u32_le(packet.data_size);
    for &sample in &packet.data {
        dst.put_i32_le(sample);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(packet: &TelemetryPacket) -> BytesMut {
        let mut buf = BytesMut::new();
        encode_packet(packet, &mut buf);
        buf
    }

    #[test]
    fn encode_decode_roundtrip() {
        let original = TelemetryPacket::new(
            123_456_789_012,
            0.005,
            1.5e-10,
            "Current",
            "A",
            vec![100, -250, 0, i32::MAX, i32::MIN],
        )
        .unwrap();
        let wire = encoded(&original);
        assert_eq!(wire.len(), original.packet_len as usize);

        let decoded = decode_packet(&wire).unwrap();
        assert_eq!(decoded, original);
        assert!(decoded.is_consistent());
    }

    #[test]
    fn spec_scenario_declared_len_34() {
        let mut wire = BytesMut::new();
        wire.put_u32_le(34);
        wire.put_u64_le(1);
        wire.put_f32_le(0.1);
        wire.put_f32_le(2.0);
        wire.put_u32_le(0);
        wire.put_u32_le(0);
        wire.put_u32_le(2);
        wire.put_i32_le(10);
        wire.put_i32_le(-2);

        let packet = decode_packet(&wire).unwrap();
        assert_eq!(packet.data, vec![10, -2]);
        assert_eq!(packet.mean(), Some(4.0));
        assert_eq!(packet.averaged_value(), Some(8.0));
        assert!(packet.warnings.contains(&IntegrityWarning::SampleCountExceedsLength {
            declared: 2,
            required: 40,
            packet_len: 34,
        }));
    }

    #[test]
    fn truncated_tail_returns_partial_samples_with_warning() {
        let mut packet = TelemetryPacket::new(9, 1.0, 1.0, "I", "A", vec![5, 6]).unwrap();
        packet.data_size = 5;
        let wire = encoded(&packet);

        let decoded = decode_packet(&wire).unwrap();
        assert_eq!(decoded.data, vec![5, 6]);
        assert_eq!(decoded.data_size, 5);
        assert_eq!(decoded.warnings.len(), 1);
        assert!(matches!(
            decoded.warnings[0],
            IntegrityWarning::SampleCountExceedsLength { declared: 5, .. }
        ));
    }

    #[test]
    fn trailing_odd_bytes_are_ignored_with_warning() {
        let packet = TelemetryPacket::new(0, 1.0, 1.0, "", "", vec![1]).unwrap();
        let mut wire = encoded(&packet);
        wire.put_slice(&[0xAA, 0xBB]);

        let decoded = decode_packet(&wire).unwrap();
        assert_eq!(decoded.data, vec![1]);
        assert!(decoded
            .warnings
            .contains(&IntegrityWarning::PartialSample { count: 2 }));
        assert!(decoded
            .warnings
            .contains(&IntegrityWarning::LengthMismatch {
                declared: 36,
                received: 38,
            }));
    }

    #[test]
    fn shorter_than_header_is_rejected() {
        let packet = TelemetryPacket::new(0, 1.0, 1.0, "", "", Vec::new()).unwrap();
        let wire = encoded(&packet);

        for len in 0..MIN_PACKET_LEN {
            let err = decode_packet(&wire[..len]).unwrap_err();
            assert!(matches!(err, DecodeError::Truncated { .. }), "len {len}");
        }
        assert!(decode_packet(&wire).is_ok());
    }

    #[test]
    fn truncation_names_the_field() {
        let packet = TelemetryPacket::new(0, 1.0, 1.0, "", "", Vec::new()).unwrap();
        let wire = encoded(&packet);

        let err = decode_packet(&wire[..10]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::Truncated {
                field: "timestamp",
                offset: 4,
                needed: 8,
                available: 6,
            }
        );
    }

    #[test]
    fn oversized_label_is_a_decode_error() {
        let mut wire = BytesMut::new();
        wire.put_u32_le(64);
        wire.put_u64_le(0);
        wire.put_f32_le(1.0);
        wire.put_f32_le(1.0);
        wire.put_u32_le(1_000);
        wire.put_slice(b"ab");

        let err = decode_packet(&wire).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Truncated {
                field: "label",
                offset: 24,
                needed: 2_000,
                available: 2,
            }
        ));
    }

    #[test]
    fn utf16_ascii_label_and_unit_decode_to_text() {
        let packet = TelemetryPacket::new(0, 1.0, 1.0, "Tunneling Current", "nA", vec![3]).unwrap();
        let decoded = decode_packet(&encoded(&packet)).unwrap();
        assert_eq!(decoded.label, "Tunneling Current");
        assert_eq!(decoded.unit, "nA");
        assert_eq!(decoded.label_raw, packet.label_raw);
    }

    #[test]
    fn header_without_samples_decodes_empty() {
        let packet = TelemetryPacket::new(0, 1.0, 1.0, "", "", Vec::new()).unwrap();
        let decoded = decode_packet(&encoded(&packet)).unwrap();
        assert!(decoded.data.is_empty());
        assert_eq!(decoded.mean(), None);
        assert!(decoded.is_consistent());
    }
}
