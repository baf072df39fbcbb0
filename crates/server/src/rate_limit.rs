//! Per-session inbound frame rate limiting: a fixed-window counter over
//! audio frames, so one misbehaving client can't flood the ingest worker.
//! Control messages (heartbeat, mute, leave) are not rate limited.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("frame rate limit exceeded")]
    Exceeded,
}

struct Window {
    started_at: Instant,
    count: u32,
}

/// One limiter per connection. Not `Clone` — held behind a `Mutex` inside
/// the owning session task, the same way the rest of this connection's
/// state is owned by a single task.
pub struct RateLimiter {
    max_per_second: u32,
    window: Mutex<Window>,
}

impl RateLimiter {
    pub fn new(max_per_second: u32) -> Self {
        Self {
            max_per_second,
            window: Mutex::new(Window {
                started_at: Instant::now(),
                count: 0,
            }),
        }
    }

    /// Record one frame; `Err` once the current one-second window has
    /// already admitted `max_per_second` frames.
    pub fn check(&self) -> Result<(), RateLimitError> {
        let mut window = self.window.lock();
        if window.started_at.elapsed() >= Duration::from_secs(1) {
            window.started_at = Instant::now();
            window.count = 0;
        }

        if window.count >= self.max_per_second {
            return Err(RateLimitError::Exceeded);
        }
        window.count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_frames_up_to_the_limit() {
        let limiter = RateLimiter::new(3);
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err());
    }

    #[test]
    fn resets_after_the_window_elapses() {
        let limiter = RateLimiter::new(1);
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err());

        {
            let mut window = limiter.window.lock();
            window.started_at = Instant::now() - Duration::from_secs(2);
        }
        assert!(limiter.check().is_ok());
    }
}
