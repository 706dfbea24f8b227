//! # Upload Rate Limiting
//!
//! A token bucket that outbound writers charge per byte. When a transport
//! entity carries a limiter, every write it performs waits for budget, which
//! keeps a single large payload from saturating a shared link.
//!
//! ## Usage
//! ```rust
//! use std::sync::Arc;
//! use std::io::Write;
//! use wirecall::utils::rate_limit::{RateLimitedWriter, TokenBucket};
//!
//! let bucket = Arc::new(TokenBucket::new(1024 * 1024, 64 * 1024));
//! let mut sink = Vec::new();
//! let mut writer = RateLimitedWriter::new(&mut sink, bucket);
//! writer.write_all(b"payload").unwrap();
//! ```

use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Shared budget consumed by outbound writes.
///
/// Implementations must be safe to call from many threads at once.
pub trait RateLimiter: Send + Sync {
    /// Block until `amount` units are available, then consume them.
    fn acquire(&self, amount: u64);

    /// Largest single acquisition the limiter can satisfy; callers split
    /// bigger writes.
    fn max_acquire(&self) -> u64;
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket refilled continuously at `rate` tokens per second up to
/// `capacity`.
#[derive(Debug)]
pub struct TokenBucket {
    rate: f64,
    capacity: u64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// A full bucket. `rate` and `capacity` are clamped to at least 1.
    pub fn new(rate_per_sec: u64, capacity: u64) -> Self {
        let capacity = capacity.max(1);
        Self {
            rate: rate_per_sec.max(1) as f64,
            capacity,
            state: Mutex::new(BucketState {
                tokens: capacity as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Tokens currently available, after refilling.
    pub fn available(&self) -> u64 {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.refill(&mut state);
        state.tokens as u64
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate).min(self.capacity as f64);
        state.last_refill = now;
    }

    /// Take `amount` tokens if present, otherwise report how long to wait.
    fn try_take(&self, amount: u64) -> Option<Duration> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.refill(&mut state);
        let wanted = amount as f64;
        if state.tokens >= wanted {
            state.tokens -= wanted;
            None
        } else {
            let missing = wanted - state.tokens;
            Some(Duration::from_secs_f64(missing / self.rate))
        }
    }
}

impl RateLimiter for TokenBucket {
    fn acquire(&self, amount: u64) {
        let amount = amount.min(self.capacity);
        // try_take releases the lock before we sleep
        while let Some(wait) = self.try_take(amount) {
            std::thread::sleep(wait);
        }
    }

    fn max_acquire(&self) -> u64 {
        self.capacity
    }
}

/// Writer that charges a [`RateLimiter`] for every byte passed through.
pub struct RateLimitedWriter<W: Write> {
    inner: W,
    limiter: Arc<dyn RateLimiter>,
}

impl<W: Write> RateLimitedWriter<W> {
    pub fn new(inner: W, limiter: Arc<dyn RateLimiter>) -> Self {
        Self { inner, limiter }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for RateLimitedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let max = usize::try_from(self.limiter.max_acquire())
            .unwrap_or(usize::MAX)
            .max(1);
        let len = buf.len().min(max);
        self.limiter.acquire(len as u64);
        self.inner.write_all(&buf[..len])?;
        Ok(len)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
