//! # Reconnect backoff
//!
//! [`ReconnectBackoff`] tracks the wait before the next reconnect attempt of a
//! subscription. Delays are whole seconds:
//! - the first failure waits [`ReconnectBackoff::initial`] (1 s by default);
//! - every further failure doubles the delay, clamped to the cap (64 s);
//! - a successful open calls [`ReconnectBackoff::reset`], discarding any
//!   accumulated backoff.
//!
//! There is no jitter and no attempt limit.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use roomcast::backoff::ReconnectBackoff;
//!
//! let mut backoff = ReconnectBackoff::default();
//! assert_eq!(backoff.next_delay(), Duration::from_secs(1));
//! assert_eq!(backoff.next_delay(), Duration::from_secs(2));
//! backoff.reset();
//! assert_eq!(backoff.next_delay(), Duration::from_secs(1));
//! ```

use std::time::Duration;

pub const DEFAULT_INITIAL_SECS: u64 = 1;
pub const DEFAULT_MAX_SECS: u64 = 64;

/// Capped exponential reconnect delay, in whole seconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectBackoff {
    initial: u64,
    max: u64,
    current: u64,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_SECS, DEFAULT_MAX_SECS)
    }
}

impl ReconnectBackoff {
    /// Build a backoff starting at `initial_secs` and capped at `max_secs`.
    ///
    /// `initial_secs` is raised to at least 1 and `max_secs` to at least
    /// `initial_secs`, so the delay always grows and never exceeds the cap.
    pub fn new(initial_secs: u64, max_secs: u64) -> Self {
        let initial = initial_secs.max(1);
        let max = max_secs.max(initial);
        Self {
            initial,
            max,
            current: initial,
        }
    }

    pub fn initial(&self) -> u64 {
        self.initial
    }

    pub fn max(&self) -> u64 {
        self.max
    }

    /// The delay the next failure will wait, in seconds.
    pub fn current(&self) -> u64 {
        self.current
    }

    /// Return the delay for this failure and advance to the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        Duration::from_secs(delay)
    }

    /// Forget accumulated backoff after a successful open.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}
