//! Configure/ack sequence tracking
//!
//! The compositor proposes state with a configure carrying serial N; the
//! client confirms with an ack of N and a commit. A [`ConfigureQueue`] keeps
//! the state attached to every unacknowledged serial and hands it back, in
//! send order, once a serial at least as new is acknowledged:
//!
//! - An ack of a pending serial releases it and every older pending entry.
//! - An ack of a serial at or below the last acknowledged one is stale and
//!   is dropped without effect.
//! - Any other serial was never sent: a protocol violation.

use log::{debug, warn};
use std::collections::VecDeque;

use super::{serial_at_least, Serial};

/// Maximum number of pending configure events to track per surface
const MAX_PENDING_CONFIGURES: usize = 32;

/// A pending configure event awaiting acknowledgment
#[derive(Debug, Clone, PartialEq)]
pub struct PendingConfigure<T> {
    pub serial: Serial,
    pub state: T,
}

/// Result of acknowledging a serial.
#[derive(Debug, Clone, PartialEq)]
pub enum AckOutcome<T> {
    /// The states released by the ack, oldest first.
    Applied(Vec<T>),
    /// The serial is older than what was already acknowledged.
    Stale,
    /// The serial was never sent.
    Unknown { pending: Vec<Serial> },
}

#[derive(Debug, Clone)]
pub struct ConfigureQueue<T> {
    pending: VecDeque<PendingConfigure<T>>,
    last_acked: Option<Serial>,
}

impl<T> ConfigureQueue<T> {
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            last_acked: None,
        }
    }

    /// Records that a configure event was sent to the client
    pub fn push(&mut self, serial: Serial, state: T) {
        if self.pending.len() >= MAX_PENDING_CONFIGURES {
            warn!(
                "{} configures pending without ack, dropping serial {}",
                self.pending.len(),
                self.pending.front().map(|c| c.serial).unwrap_or_default()
            );
            self.pending.pop_front();
        }
        self.pending.push_back(PendingConfigure { serial, state });
    }

    pub fn ack(&mut self, serial: Serial) -> AckOutcome<T> {
        if let Some(position) = self.pending.iter().position(|c| c.serial == serial) {
            let released: Vec<T> = self
                .pending
                .drain(..=position)
                .map(|configure| configure.state)
                .collect();
            self.last_acked = Some(serial);
            debug!("ack of serial {} released {} configure(s)", serial, released.len());
            return AckOutcome::Applied(released);
        }

        match self.last_acked {
            Some(last) if serial_at_least(last, serial) => AckOutcome::Stale,
            _ => AckOutcome::Unknown {
                pending: self.pending.iter().map(|c| c.serial).collect(),
            },
        }
    }

    pub fn last_acked(&self) -> Option<Serial> {
        self.last_acked
    }

    /// Serial of the newest configure not yet acknowledged.
    pub fn newest_pending(&self) -> Option<Serial> {
        self.pending.back().map(|c| c.serial)
    }

    pub fn newest_pending_state(&self) -> Option<&T> {
        self.pending.back().map(|c| &c.state)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

impl<T> Default for ConfigureQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_configure_ack_flow() {
        let mut queue = ConfigureQueue::new();
        queue.push(100, "first");
        assert_eq!(queue.newest_pending(), Some(100));

        assert_eq!(queue.ack(100), AckOutcome::Applied(vec!["first"]));
        assert_eq!(queue.last_acked(), Some(100));
        assert!(!queue.has_pending());
    }

    #[test]
    fn test_ack_releases_older_configures_in_order() {
        let mut queue = ConfigureQueue::new();
        queue.push(1, 'a');
        queue.push(2, 'b');
        queue.push(3, 'c');

        assert_eq!(queue.ack(2), AckOutcome::Applied(vec!['a', 'b']));
        assert_eq!(queue.newest_pending(), Some(3));
    }

    #[test]
    fn test_stale_ack_is_dropped() {
        let mut queue = ConfigureQueue::new();
        queue.push(1, 'a');
        queue.push(2, 'b');
        assert_eq!(queue.ack(2), AckOutcome::Applied(vec!['a', 'b']));

        assert_eq!(queue.ack(1), AckOutcome::Stale);
        assert_eq!(queue.ack(2), AckOutcome::Stale);
    }

    #[test]
    fn test_invalid_ack_serial() {
        let mut queue = ConfigureQueue::new();
        queue.push(100, ());

        assert_eq!(
            queue.ack(999),
            AckOutcome::Unknown { pending: vec![100] }
        );
        // The pending configure is untouched.
        assert_eq!(queue.ack(100), AckOutcome::Applied(vec![()]));
    }

    #[test]
    fn test_pending_queue_is_bounded() {
        let mut queue = ConfigureQueue::new();
        for serial in 0..(MAX_PENDING_CONFIGURES as u32 + 4) {
            queue.push(serial, serial);
        }
        assert_eq!(queue.len(), MAX_PENDING_CONFIGURES);
        assert!(matches!(queue.ack(0), AckOutcome::Unknown { .. }));
    }
}
