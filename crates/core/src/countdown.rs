//! Pure countdown state. The async driver lives in the services crate.

/// Outcome of a single tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Still counting; carries the seconds left after this tick.
    Running(u32),
    /// Reached zero on this tick. Reported exactly once.
    Expired,
    /// Already expired or stopped; nothing happened.
    Idle,
}

/// Remaining-seconds counter that expires exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Countdown {
    remaining: u32,
    expired: bool,
    stopped: bool,
}

impl Countdown {
    #[must_use]
    pub fn new(remaining: u32) -> Self {
        Self {
            remaining,
            expired: false,
            stopped: false,
        }
    }

    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expired
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.expired && !self.stopped
    }

    /// Advance by one second.
    pub fn tick(&mut self) -> Tick {
        if !self.is_active() {
            return Tick::Idle;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.expired = true;
            Tick::Expired
        } else {
            Tick::Running(self.remaining)
        }
    }

    /// Expire immediately if no time is left. Used when a session loads with
    /// a deadline already in the past.
    pub fn expire_if_due(&mut self) -> Tick {
        if self.is_active() && self.remaining == 0 {
            self.expired = true;
            Tick::Expired
        } else {
            Tick::Idle
        }
    }

    /// Stop counting without expiring.
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    #[must_use]
    pub fn urgency(&self) -> Urgency {
        Urgency::for_remaining(self.remaining)
    }
}

/// How close a session is to its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Urgency {
    Normal,
    /// Under five minutes left.
    Warning,
    /// Under one minute left.
    Critical,
}

impl Urgency {
    #[must_use]
    pub fn for_remaining(secs: u32) -> Self {
        if secs < 60 {
            Self::Critical
        } else if secs < 300 {
            Self::Warning
        } else {
            Self::Normal
        }
    }
}

/// `m:ss` rendering of a second count.
#[must_use]
pub fn format_clock(secs: u32) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}
