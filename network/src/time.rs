//! Time types with millisecond precision.
//!
//! The client never reads a clock: every entry point that needs the
//! current time takes an [`Instant`] supplied by the caller, which keeps
//! the core independent of the runtime and lets tests drive timers
//! deterministically.

use core::{fmt, ops};

/// A relative amount of time.
#[derive(Debug, Default, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Duration {
    millis: u64,
}

impl Duration {
    pub const ZERO: Duration = Duration::from_millis(0);

    pub const fn from_millis(millis: u64) -> Duration {
        Duration { millis }
    }

    pub const fn from_secs(secs: u64) -> Duration {
        Duration {
            millis: secs * 1000,
        }
    }

    pub const fn total_millis(&self) -> u64 {
        self.millis
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{:03}s", self.millis / 1000, self.millis % 1000)
    }
}

/// A point in time, relative to an arbitrary epoch.
#[derive(Debug, Default, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Instant {
    millis: i64,
}

impl Instant {
    pub const ZERO: Instant = Instant::from_millis(0);

    pub const fn from_millis(millis: i64) -> Instant {
        Instant { millis }
    }

    pub const fn from_secs(secs: i64) -> Instant {
        Instant {
            millis: secs * 1000,
        }
    }

    pub const fn total_millis(&self) -> i64 {
        self.millis
    }

    /// The current time taken from the system clock.
    #[cfg(feature = "std")]
    pub fn now() -> Instant {
        Self::from(std::time::SystemTime::now())
    }

    /// Time elapsed since `earlier`, saturating to zero when `earlier`
    /// lies in the future.
    pub fn duration_since(&self, earlier: Instant) -> Duration {
        if self.millis <= earlier.millis {
            Duration::ZERO
        } else {
            Duration::from_millis((self.millis - earlier.millis) as u64)
        }
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{:03}s", self.millis / 1000, self.millis % 1000)
    }
}

#[cfg(feature = "std")]
impl From<std::time::SystemTime> for Instant {
    fn from(other: std::time::SystemTime) -> Instant {
        let elapsed = other
            .duration_since(std::time::UNIX_EPOCH)
            .expect("clock set before 1970");
        Instant::from_millis(elapsed.as_millis() as i64)
    }
}

#[cfg(feature = "std")]
impl From<Duration> for std::time::Duration {
    fn from(other: Duration) -> std::time::Duration {
        std::time::Duration::from_millis(other.millis)
    }
}

impl ops::Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, rhs: Duration) -> Instant {
        Instant::from_millis(self.millis + rhs.millis as i64)
    }
}

impl ops::Sub<Instant> for Instant {
    type Output = Duration;

    fn sub(self, rhs: Instant) -> Duration {
        self.duration_since(rhs)
    }
}

impl ops::Add<Duration> for Duration {
    type Output = Duration;

    fn add(self, rhs: Duration) -> Duration {
        Duration::from_millis(self.millis + rhs.millis)
    }
}

impl ops::Sub<Duration> for Duration {
    type Output = Duration;

    fn sub(self, rhs: Duration) -> Duration {
        Duration::from_millis(self.millis.saturating_sub(rhs.millis))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn durations_since_saturate() {
        let early = Instant::from_millis(100);
        let late = Instant::from_millis(350);
        assert_eq!(late.duration_since(early), Duration::from_millis(250));
        assert_eq!(early.duration_since(late), Duration::ZERO);
    }

    #[test]
    fn deadlines_add_up() {
        let t = Instant::from_secs(2) + Duration::from_millis(500);
        assert_eq!(t.total_millis(), 2500);
    }
}
