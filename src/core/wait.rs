use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::Result;

/// Cooperative cancellation flag shared between a signal handler and a poll
/// loop. Triggering performs no I/O.
#[derive(Clone, Debug, Default)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// How long a poll loop may keep observing before giving up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitBudget {
    /// At most this many unsuccessful observations.
    Attempts(u32),
    /// Give up once this much time has elapsed since the first observation.
    Timeout(Duration),
}

#[derive(Debug, PartialEq, Eq)]
pub enum Polled<T> {
    Ready(T),
    Exhausted,
    Cancelled,
}

/// Calls `check` every `interval` until it yields a value, the budget runs
/// out, or `shutdown` is triggered. The flag is consulted at the top of each
/// iteration; sleeps are never cut short.
///
/// Errors from `check` end the loop and are returned as-is.
pub fn poll_until<T, F>(
    interval: Duration,
    budget: WaitBudget,
    shutdown: &Shutdown,
    mut check: F,
) -> Result<Polled<T>>
where
    F: FnMut() -> Result<Option<T>>,
{
    let start = Instant::now();
    let mut attempts = 0u32;
    loop {
        if shutdown.is_triggered() {
            return Ok(Polled::Cancelled);
        }
        if let Some(value) = check()? {
            return Ok(Polled::Ready(value));
        }
        attempts = attempts.saturating_add(1);
        let exhausted = match budget {
            WaitBudget::Attempts(max) => attempts >= max,
            WaitBudget::Timeout(limit) => start.elapsed() > limit,
        };
        if exhausted {
            return Ok(Polled::Exhausted);
        }
        std::thread::sleep(interval);
    }
}
