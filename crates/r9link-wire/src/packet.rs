use bytes::Bytes;

/// Non-fatal inconsistencies found while decoding a telemetry packet.
///
/// The controller is trusted but occasionally sends padded or short frames,
/// so these never abort decoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntegrityWarning {
    /// `data_size × 4 + offset` exceeds the declared `packet_len`.
    #[error(
        "declared {declared} samples end at byte {required} but packet_len is {packet_len}"
    )]
    SampleCountExceedsLength {
        declared: u32,
        required: u64,
        packet_len: u32,
    },

    /// The datagram length differs from `packet_len`.
    #[error("received {received} bytes but packet_len declares {declared}")]
    LengthMismatch { declared: u32, received: usize },

    /// The sample area does not divide into whole 4-byte samples.
    #[error("ignored {count} trailing bytes that do not form a whole sample")]
    PartialSample { count: usize },
}

/// A decoded telemetry packet.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryPacket {
    /// Total packet length as declared by the controller.
    pub packet_len: u32,
    /// Instrument clock ticks.
    pub timestamp: u64,
    /// Sample spacing.
    pub interval: f32,
    /// Scale factor applied to raw samples.
    pub gain: f32,
    /// Declared character count of `label`.
    pub label_size: u32,
    pub label: String,
    /// The `label_size × 2` bytes exactly as received.
    pub label_raw: Bytes,
    /// Declared character count of `unit`.
    pub unit_size: u32,
    pub unit: String,
    /// The `unit_size × 2` bytes exactly as received.
    pub unit_raw: Bytes,
    /// Declared sample count. May disagree with `data.len()`.
    pub data_size: u32,
    /// Samples actually present in the datagram.
    pub data: Vec<i32>,
    /// Integrity problems noticed while decoding.
    pub warnings: Vec<IntegrityWarning>,
}

impl TelemetryPacket {
    /// Build a self-consistent packet.
    ///
    /// Text is laid out as UTF-16LE, two bytes per character, which is what
    /// the decoder expects for ASCII labels. Fails when a size or the total
    /// length would not fit its `u32` header field.
    pub fn new(
        timestamp: u64,
        interval: f32,
        gain: f32,
        label: &str,
        unit: &str,
        data: Vec<i32>,
    ) -> Result<Self, PacketTooLarge> {
        let (label_size, label_raw) = encode_text("label_size", label)?;
        let (unit_size, unit_raw) = encode_text("unit_size", unit)?;
        let data_size = length_field("data_size", data.len())?;
        let total = data
            .len()
            .checked_mul(4)
            .and_then(|n| n.checked_add(label_raw.len()))
            .and_then(|n| n.checked_add(unit_raw.len()))
            .and_then(|n| n.checked_add(crate::codec::MIN_PACKET_LEN))
            .unwrap_or(usize::MAX);
        let packet_len = length_field("packet_len", total)?;

        Ok(Self {
            packet_len,
            timestamp,
            interval,
            gain,
            label_size,
            label: label.to_string(),
            label_raw,
            unit_size,
            unit: unit.to_string(),
            unit_raw,
            data_size,
            data,
            warnings: Vec::new(),
        })
    }

    /// Arithmetic mean of the samples, `None` when there are none.
    pub fn mean(&self) -> Option<f64> {
        if self.data.is_empty() {
            return None;
        }
        let sum: f64 = self.data.iter().map(|&s| f64::from(s)).sum();
        Some(sum / self.data.len() as f64)
    }

    /// `mean × gain`, the physical value this packet represents.
    pub fn averaged_value(&self) -> Option<f64> {
        self.mean().map(|mean| mean * f64::from(self.gain))
    }

    /// Whether decoding noticed any integrity problem.
    pub fn is_consistent(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// The scalar measurement derived from one packet, with its context.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSample {
    /// `mean × gain`.
    pub value: f64,
    pub mean: f64,
    pub gain: f32,
    pub label: String,
    pub unit: String,
    pub timestamp: u64,
    pub sample_count: usize,
    pub warnings: Vec<IntegrityWarning>,
}

impl DecodedSample {
    /// Reduce a packet to its averaged value. `None` if it has no samples.
    pub fn from_packet(packet: TelemetryPacket) -> Option<Self> {
        let mean = packet.mean()?;
        Some(Self {
            value: mean * f64::from(packet.gain),
            mean,
            gain: packet.gain,
            label: packet.label,
            unit: packet.unit,
            timestamp: packet.timestamp,
            sample_count: packet.data.len(),
            warnings: packet.warnings,
        })
    }
}

/// A packet field too large for its 32-bit header slot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field} of {len} does not fit in a u32 header field")]
pub struct PacketTooLarge {
    pub field: &'static str,
    pub len: usize,
}

fn length_field(field: &'static str, len: usize) -> Result<u32, PacketTooLarge> {
    u32::try_from(len).map_err(|_| PacketTooLarge { field, len })
}

fn encode_text(field: &'static str, text: &str) -> Result<(u32, Bytes), PacketTooLarge> {
    let units: Vec<u16> = text.encode_utf16().collect();
    let size = length_field(field, units.len())?;
    let raw: Vec<u8> = units.iter().flat_map(|unit| unit.to_le_bytes()).collect();
    Ok((size, Bytes::from(raw)))
}

/// Decode a `size × 2` text field.
///
/// NUL bytes are dropped and every other byte becomes one character, so
/// ASCII sent as UTF-16LE comes out intact. Bytes above 0x7F have no
/// defined meaning here and map to U+FFFD.
pub(crate) fn decode_text(raw: &[u8]) -> String {
    raw.iter()
        .filter(|&&b| b != 0)
        .map(|&b| if b.is_ascii() { char::from(b) } else { '\u{FFFD}' })
        .collect()
}
