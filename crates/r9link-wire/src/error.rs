/// Errors that make a telemetry datagram undecodable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The datagram ended before a fixed-width or text field was complete.
    #[error(
        "datagram truncated in `{field}` at offset {offset}: need {needed} bytes, {available} available"
    )]
    Truncated {
        field: &'static str,
        offset: usize,
        needed: u64,
        available: usize,
    },
}

pub type Result<T> = std::result::Result<T, DecodeError>;
