//! Absolute deadlines for blocking host waits.

use std::time::{Duration, Instant};

/// When a blocking wait must give up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Deadline {
    /// Poll once and never block.
    Immediate,
    /// Give up at the given instant.
    At(Instant),
    /// Wait forever.
    #[default]
    Infinite,
}

impl Deadline {
    /// Deadline `timeout` from now. Saturates to `Infinite` on overflow.
    pub fn from_timeout(timeout: Duration) -> Self {
        if timeout.is_zero() {
            return Self::Immediate;
        }
        Instant::now()
            .checked_add(timeout)
            .map(Self::At)
            .unwrap_or(Self::Infinite)
    }

    /// Whether the deadline has already passed.
    pub fn is_expired(&self) -> bool {
        match self {
            Self::Immediate => true,
            Self::At(instant) => Instant::now() >= *instant,
            Self::Infinite => false,
        }
    }

    /// The instant to pass to a timed wait, `None` for an unbounded wait.
    ///
    /// `Immediate` maps to "now" so a timed wait returns at once.
    pub fn instant(&self) -> Option<Instant> {
        match self {
            Self::Immediate => Some(Instant::now()),
            Self::At(instant) => Some(*instant),
            Self::Infinite => None,
        }
    }
}

impl From<Duration> for Deadline {
    fn from(timeout: Duration) -> Self {
        Self::from_timeout(timeout)
    }
}
