use std::time::Duration;

use r9link_transport::{sleep_cancellable, CancellationToken};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{DriverError, ReplyParseError, Result};

/// How often, and how patiently, a numeric query is repeated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first.
    pub max_retries: u32,
    /// Pause between a failed attempt and the next.
    #[serde(rename = "backoff_ms", with = "crate::config::duration_ms")]
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            backoff: Duration::from_millis(100),
        }
    }
}

/// Interpret a controller reply as a finite floating-point number.
pub fn parse_numeric_reply(reply: &str) -> std::result::Result<f64, ReplyParseError> {
    let trimmed = reply.trim();
    if trimmed.is_empty() {
        return Err(ReplyParseError::Empty);
    }
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(ReplyParseError::NotNumeric(trimmed.to_string())),
    }
}

/// Bookkeeping shared by the blocking and async retry loops.
#[derive(Debug)]
pub(crate) struct QueryAttempts<'a> {
    command: &'a str,
    max_retries: u32,
    last_reply: Option<String>,
}

impl<'a> QueryAttempts<'a> {
    pub(crate) fn new(command: &'a str, max_retries: u32) -> Self {
        Self {
            command,
            max_retries,
            last_reply: None,
        }
    }

    /// Parse the reply to attempt number `attempt`.
    ///
    /// A reply that does not parse is logged and kept for the final error.
    pub(crate) fn record(&mut self, attempt: u32, reply: String) -> Option<f64> {
        match parse_numeric_reply(&reply) {
            Ok(value) => {
                debug!(command = self.command, attempt, value, "numeric reply");
                Some(value)
            }
            Err(err) => {
                warn!(
                    command = self.command,
                    attempt,
                    max_retries = self.max_retries,
                    %err,
                    "numeric reply did not parse"
                );
                self.last_reply = Some(reply);
                None
            }
        }
    }

    /// Whether a backoff should follow attempt number `attempt`.
    pub(crate) fn has_next(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    pub(crate) fn cancelled() -> DriverError {
        DriverError::Cancelled {
            operation: "numeric query",
        }
    }

    /// The failure returned once every attempt has been used.
    pub(crate) fn exhausted(self) -> DriverError {
        DriverError::NoNumericReply {
            command: self.command.to_string(),
            attempts: self.max_retries,
            last_reply: self.last_reply,
        }
    }
}

/// Run `send` until its reply parses as a number.
///
/// Empty, malformed and non-numeric replies all count as parse failures and
/// are retried after `backoff`. Transport errors from `send` end the loop
/// immediately. When every attempt fails the result is
/// [`DriverError::NoNumericReply`]; no fallback value is ever produced.
pub(crate) fn query_with_retry<F>(
    command: &str,
    max_retries: u32,
    backoff: Duration,
    cancel: Option<&CancellationToken>,
    mut send: F,
) -> Result<f64>
where
    F: FnMut() -> Result<String>,
{
    let mut attempts = QueryAttempts::new(command, max_retries);

    for attempt in 1..=max_retries {
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(QueryAttempts::cancelled());
        }

        if let Some(value) = attempts.record(attempt, send()?) {
            return Ok(value);
        }

        if attempts.has_next(attempt) && !sleep_cancellable(backoff, cancel) {
            return Err(QueryAttempts::cancelled());
        }
    }

    Err(attempts.exhausted())
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use r9link_transport::TransportError;

    use super::*;

    fn scripted(replies: &[&str]) -> impl FnMut() -> Result<String> {
        let replies: Vec<String> = replies.iter().map(|r| r.to_string()).collect();
        let mut next = 0usize;
        move || {
            let reply = replies.get(next).cloned().unwrap_or_default();
            next += 1;
            Ok(reply)
        }
    }

    #[test]
    fn parses_plain_and_padded_numbers() {
        assert_eq!(parse_numeric_reply("0.25"), Ok(0.25));
        assert_eq!(parse_numeric_reply(" -1.5e-10\r\n"), Ok(-1.5e-10));
        assert_eq!(parse_numeric_reply("42"), Ok(42.0));
    }

    #[test]
    fn rejects_status_words_and_empty_replies() {
        assert_eq!(parse_numeric_reply(""), Err(ReplyParseError::Empty));
        assert_eq!(parse_numeric_reply("  \n"), Err(ReplyParseError::Empty));
        assert_eq!(
            parse_numeric_reply("Done"),
            Err(ReplyParseError::NotNumeric("Done".to_string()))
        );
        assert!(parse_numeric_reply("NaN").is_err());
        assert!(parse_numeric_reply("inf").is_err());
    }

    #[test]
    fn attempts_keep_the_latest_unparsed_reply() {
        let mut attempts = QueryAttempts::new("GetSWParameter, STM Bias, Value", 2);
        assert_eq!(attempts.record(1, "Busy".to_string()), None);
        assert!(attempts.has_next(1));
        assert_eq!(attempts.record(2, "".to_string()), None);
        assert!(!attempts.has_next(2));

        match attempts.exhausted() {
            DriverError::NoNumericReply {
                attempts,
                last_reply,
                ..
            } => {
                assert_eq!(attempts, 2);
                assert_eq!(last_reply.as_deref(), Some(""));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn attempts_return_first_parsed_value() {
        let mut attempts = QueryAttempts::new("q", 3);
        assert_eq!(attempts.record(1, " 0.125\n".to_string()), Some(0.125));
        assert!(matches!(
            QueryAttempts::cancelled(),
            DriverError::Cancelled { .. }
        ));
    }

    #[test]
    fn succeeds_on_last_allowed_attempt() {
        let calls = Cell::new(0u32);
        let mut inner = scripted(&["", "Busy", "x1", "oops", "3.5"]);
        let value = query_with_retry("q", 5, Duration::ZERO, None, || {
            calls.set(calls.get() + 1);
            inner()
        })
        .unwrap();
        assert_eq!(value, 3.5);
        assert_eq!(calls.get(), 5);
    }

    #[test]
    fn exhausting_attempts_is_an_explicit_failure() {
        let calls = Cell::new(0u32);
        let err = query_with_retry("GetSWParameter, STM Bias, Value", 3, Duration::ZERO, None, || {
            calls.set(calls.get() + 1);
            Ok("Busy".to_string())
        })
        .unwrap_err();

        assert_eq!(calls.get(), 3);
        match err {
            DriverError::NoNumericReply {
                command,
                attempts,
                last_reply,
            } => {
                assert_eq!(command, "GetSWParameter, STM Bias, Value");
                assert_eq!(attempts, 3);
                assert_eq!(last_reply.as_deref(), Some("Busy"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn zero_attempts_never_sends() {
        let err = query_with_retry("q", 0, Duration::ZERO, None, || {
            panic!("must not send");
        })
        .unwrap_err();
        assert!(matches!(
            err,
            DriverError::NoNumericReply {
                attempts: 0,
                last_reply: None,
                ..
            }
        ));
    }

    #[test]
    fn transport_errors_are_not_retried() {
        let calls = Cell::new(0u32);
        let err = query_with_retry("q", 5, Duration::ZERO, None, || {
            calls.set(calls.get() + 1);
            Err(TransportError::Io(std::io::Error::other("reset")).into())
        })
        .unwrap_err();
        assert_eq!(calls.get(), 1);
        assert!(matches!(err, DriverError::Transport(_)));
    }

    #[test]
    fn backoff_is_applied_between_attempts_only() {
        let start = std::time::Instant::now();
        let _ = query_with_retry("q", 3, Duration::from_millis(30), None, scripted(&[]));
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(60));
        assert!(elapsed < Duration::from_millis(2_000));
    }

    #[test]
    fn cancellation_stops_before_next_attempt() {
        let token = CancellationToken::new();
        let calls = Cell::new(0u32);
        let err = query_with_retry("q", 5, Duration::from_millis(5), Some(&token), || {
            calls.set(calls.get() + 1);
            token.cancel();
            Ok("Busy".to_string())
        })
        .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(calls.get(), 1);
    }
}
