//! Display refresh scheduler.
//!
//! Frame requests fire on the next refresh boundary of a fixed-rate grid
//! anchored at clock zero. Time is passed in by the caller, so tests drive it
//! with a manual clock.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameRequestId(u64);

pub struct FrameScheduler {
    interval: Duration,
    next_id: u64,
    pending: Vec<(FrameRequestId, Duration)>,
}

impl FrameScheduler {
    /// Creates a scheduler for `refresh_rate` frames per second (at least 1).
    pub fn new(refresh_rate: u32) -> Self {
        let rate = refresh_rate.max(1);
        Self {
            interval: Duration::from_nanos(1_000_000_000 / u64::from(rate)),
            next_id: 1,
            pending: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Schedules a callback for the first refresh strictly after `now`.
    pub fn request_frame(&mut self, now: Duration) -> FrameRequestId {
        let id = FrameRequestId(self.next_id);
        self.next_id += 1;
        let interval = self.interval.as_nanos().max(1);
        let ticks = now.as_nanos() / interval + 1;
        let deadline = Duration::from_nanos((ticks * interval) as u64);
        self.pending.push((id, deadline));
        id
    }

    /// Cancels a pending request. Returns `false` if it was not pending.
    pub fn cancel_frame(&mut self, id: FrameRequestId) -> bool {
        let before = self.pending.len();
        self.pending.retain(|(pending, _)| *pending != id);
        self.pending.len() != before
    }

    /// Removes and returns every request due at `now`, oldest first.
    pub fn poll(&mut self, now: Duration) -> Vec<FrameRequestId> {
        let mut due = Vec::new();
        self.pending.retain(|(id, deadline)| {
            if *deadline <= now {
                due.push(*id);
                false
            } else {
                true
            }
        });
        due
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.pending.iter().map(|(_, deadline)| *deadline).min()
    }

    #[cfg(test)]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}
