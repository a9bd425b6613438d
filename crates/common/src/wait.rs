//! Bounded polling

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::error::{Error, Result};

/// Options for [`wait_for`]
#[derive(Debug, Clone)]
pub struct WaitOptions {
    /// Give up after this long
    pub timeout: Duration,

    /// Pause between polls
    pub delay: Duration,

    /// What we are waiting for, used in logs and the timeout error
    pub message: String,

    /// Return `Ok(false)` on timeout instead of an error
    pub silent_failure: bool,
}

impl WaitOptions {
    pub fn new(message: impl Into<String>, timeout: Duration) -> Self {
        Self {
            timeout,
            delay: Duration::from_secs(1),
            message: message.into(),
            silent_failure: false,
        }
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent_failure = true;
        self
    }
}

/// Poll `check` until it returns true or the timeout elapses
///
/// The predicate is always evaluated at least once, and once more after the
/// deadline passes so a condition that settles during the last pause is seen.
pub async fn wait_for<F, Fut>(options: &WaitOptions, mut check: F) -> Result<bool>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();
    let mut polls = 0u64;

    loop {
        polls += 1;
        if check().await {
            debug!(
                "Finished waiting for {} after {} poll(s) ({:.1}s)",
                options.message,
                polls,
                start.elapsed().as_secs_f64()
            );
            return Ok(true);
        }

        let elapsed = start.elapsed();
        if elapsed >= options.timeout {
            break;
        }
        sleep(options.delay.min(options.timeout - elapsed)).await;
    }

    if options.silent_failure {
        debug!("Gave up waiting for {} after {} poll(s)", options.message, polls);
        Ok(false)
    } else {
        Err(Error::Timeout {
            message: options.message.clone(),
            seconds: options.timeout.as_secs_f64(),
        })
    }
}

/// Parse a humane duration such as `10s`, `500ms`, `2m`, `1h` or a bare number of seconds
pub fn parse_duration(input: &str) -> Result<Duration> {
    let s = input.trim();
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);

    let value: f64 = number
        .parse()
        .map_err(|_| Error::InvalidDuration(input.to_string()))?;
    if !value.is_finite() || value < 0.0 {
        return Err(Error::InvalidDuration(input.to_string()));
    }

    let seconds = match unit.trim() {
        "" | "s" | "sec" | "secs" => value,
        "ms" => value / 1000.0,
        "m" | "min" | "mins" => value * 60.0,
        "h" => value * 3600.0,
        _ => return Err(Error::InvalidDuration(input.to_string())),
    };

    Duration::try_from_secs_f64(seconds).map_err(|_| Error::InvalidDuration(input.to_string()))
}
