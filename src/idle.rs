//! Idle monitor
//!
//! Tracks the time since the last input event. Once the idle timeout elapses
//! with no inhibitor held, the monitor asks for the lock transition, which
//! the server carries out by starting the configured locker.

use log::{debug, info};
use std::time::{Duration, Instant};

/// What the server should do after a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleEvent {
    /// Start the locker.
    Lock,
}

#[derive(Debug)]
pub struct IdleMonitor {
    timeout: Option<Duration>,
    last_activity: Instant,
    inhibitors: u32,
    /// Set once the lock fired for the current idle period.
    fired: bool,
}

impl IdleMonitor {
    /// A zero timeout disables the automatic lock.
    pub fn new(timeout: Duration, now: Instant) -> Self {
        Self {
            timeout: (!timeout.is_zero()).then_some(timeout),
            last_activity: now,
            inhibitors: 0,
            fired: false,
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn inhibitors(&self) -> u32 {
        self.inhibitors
    }

    pub fn is_inhibited(&self) -> bool {
        self.inhibitors > 0
    }

    /// Input happened; restarts the idle period.
    pub fn activity(&mut self, now: Instant) {
        self.last_activity = now;
        self.fired = false;
    }

    pub fn inhibit_begin(&mut self) {
        self.inhibitors += 1;
        debug!("Idle lock inhibited ({} inhibitors)", self.inhibitors);
    }

    /// Saturates at zero.
    pub fn inhibit_end(&mut self, now: Instant) {
        self.inhibitors = self.inhibitors.saturating_sub(1);
        if self.inhibitors == 0 {
            // The idle period starts over once the last inhibitor goes.
            self.activity(now);
        }
        debug!("Idle lock inhibitors: {}", self.inhibitors);
    }

    /// Requests the lock right away, regardless of inhibitors.
    pub fn lock_now(&mut self) -> IdleEvent {
        info!("🔒 Lock requested");
        self.fired = true;
        IdleEvent::Lock
    }

    /// Time left until the lock would fire, if it can fire at all.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        if self.fired || self.is_inhibited() {
            return None;
        }
        let timeout = self.timeout?;
        Some(timeout.saturating_sub(now.saturating_duration_since(self.last_activity)))
    }

    pub fn poll(&mut self, now: Instant) -> Option<IdleEvent> {
        if self.remaining(now)?.is_zero() {
            info!("🔒 Idle for {:?}, locking", self.timeout.unwrap_or_default());
            self.fired = true;
            return Some(IdleEvent::Lock);
        }
        None
    }
}
