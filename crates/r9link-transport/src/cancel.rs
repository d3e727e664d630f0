use std::time::{Duration, Instant};

pub use tokio_util::sync::CancellationToken;

/// Granularity used when sleeping with a cancellation token attached.
const DEFAULT_POLL: Duration = Duration::from_millis(10);

/// Sleep for `duration`, waking early if `cancel` fires.
///
/// Returns `false` when the sleep was cut short by cancellation. Without a
/// token this is a plain `thread::sleep`. The token is polled, so this works
/// outside of any async runtime.
pub fn sleep_cancellable(duration: Duration, cancel: Option<&CancellationToken>) -> bool {
    let Some(token) = cancel else {
        std::thread::sleep(duration);
        return true;
    };

    let deadline = Instant::now() + duration;
    loop {
        if token.is_cancelled() {
            return false;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return true;
        }
        std::thread::sleep(remaining.min(DEFAULT_POLL));
    }
}
