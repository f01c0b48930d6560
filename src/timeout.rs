//! # Timeout Event
//!
//! Value object describing one pending delay. It lives in a pool slot while
//! the scheduler keeps it in the ordered set, and becomes a `Timeout`
//! [`Event`](crate::event::Event) when it fires.
//!
//! `relative_ticks` is delta-encoded: the ticks between this timeout's next
//! firing and the one before it in the ordered set. Only the head's delta is
//! compared against the hardware counter.

use crate::event::TaskId;
use crate::timer::TickClock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Timeout {
    /// Id meaningful only to the owner.
    pub id: u8,
    /// Task the fired event is routed to.
    pub owner: TaskId,
    /// Originally requested delay.
    pub interval_ms: u32,
    relative_ticks: u32,
    /// Ticks beyond one arm cycle, armed once the current segment elapses.
    overflow: u64,
}

impl Timeout {
    /// Build a timeout, converting the interval with `clock` and splitting
    /// anything past one arm cycle into `overflow`.
    pub fn new(id: u8, interval_ms: u32, owner: TaskId, clock: &TickClock) -> Self {
        let (relative_ticks, overflow) = clock.split(clock.ms_to_ticks(interval_ms));
        Self {
            id,
            owner,
            interval_ms,
            relative_ticks,
            overflow,
        }
    }

    #[inline]
    pub const fn relative_ticks(&self) -> u32 {
        self.relative_ticks
    }

    #[inline]
    pub const fn overflow(&self) -> u64 {
        self.overflow
    }

    /// Cancellation identity.
    #[inline]
    pub fn matches(&self, id: u8, owner: TaskId) -> bool {
        self.id == id && self.owner == owner
    }

    pub fn incr_relative_ticks(&mut self, to_add: u32) {
        self.relative_ticks = self.relative_ticks.saturating_add(to_add);
    }

    /// Saturates at zero: a head whose arm already ran out is simply due.
    pub fn decr_relative_ticks(&mut self, to_subtract: u32) {
        self.relative_ticks = self.relative_ticks.saturating_sub(to_subtract);
    }

    pub(crate) fn set_relative_ticks(&mut self, ticks: u32) {
        self.relative_ticks = ticks;
    }

    /// Load the next segment of an overflowing timeout.
    ///
    /// Returns `false` if there was no overflow left (the timeout is due).
    pub(crate) fn next_segment(&mut self, clock: &TickClock) -> bool {
        if self.overflow == 0 {
            return false;
        }
        let (ticks, rest) = clock.split(self.overflow);
        self.relative_ticks = ticks;
        self.overflow = rest;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLOCK: TickClock = TickClock::new(1000, 0xFFFF, 1);

    #[test]
    fn test_new_converts_interval() {
        let t = Timeout::new(3, 250, TaskId(1), &CLOCK);
        assert_eq!(t.relative_ticks(), 250);
        assert_eq!(t.overflow(), 0);
        assert!(t.matches(3, TaskId(1)));
        assert!(!t.matches(3, TaskId(2)));
    }

    #[test]
    fn test_long_interval_overflows() {
        // 0xFFFF + 0xFFFF + 10 ms at 1 kHz
        let t = Timeout::new(0, 2 * 0xFFFF + 10, TaskId(0), &CLOCK);
        assert_eq!(t.relative_ticks(), 0xFFFF);
        assert_eq!(t.overflow(), 0xFFFF + 10);

        let mut t = t;
        assert!(t.next_segment(&CLOCK));
        assert_eq!((t.relative_ticks(), t.overflow()), (0xFFFF, 10));
        assert!(t.next_segment(&CLOCK));
        assert_eq!((t.relative_ticks(), t.overflow()), (10, 0));
        assert!(!t.next_segment(&CLOCK));
    }

    #[test]
    fn test_decrement_saturates_at_zero() {
        let mut t = Timeout::new(0, 20, TaskId(0), &CLOCK);
        t.decr_relative_ticks(5);
        assert_eq!(t.relative_ticks(), 15);
        t.decr_relative_ticks(100);
        assert_eq!(t.relative_ticks(), 0);
        t.incr_relative_ticks(7);
        assert_eq!(t.relative_ticks(), 7);
    }
}
