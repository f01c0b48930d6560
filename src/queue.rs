//! # Event Queues
//!
//! Two bounded FIFOs feed the dispatcher:
//!
//! - **standard**: fired timeouts, `Initial` events and ordinary signals.
//! - **critical** (feature `critical-queue`): urgent events injected by
//!   producers.
//!
//! ## Priority Leveling
//!
//! The critical queue wins, but not forever. After `threshold` consecutive
//! critical events one standard event is forced through, so a producer
//! flooding the critical queue cannot starve timeouts:
//!
//! ```text
//!   threshold = 3
//!   critical: c1 c2 c3 c4 c5      standard: s1 s2
//!   order:    c1 c2 c3 s1 c4 c5 s2
//! ```

use heapless::Deque;

use crate::config::{DEFAULT_PRIORITY_THRESHOLD, QUEUE_SIZE};
use crate::error::Error;
use crate::event::Event;
use crate::scheduler::EventSink;

/// Bounds how many critical events may be dispatched back to back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PriorityLeveler {
    threshold: u8,
    count: u8,
}

impl PriorityLeveler {
    /// A zero threshold is treated as one.
    pub const fn new(threshold: u8) -> Self {
        Self {
            threshold: if threshold == 0 { 1 } else { threshold },
            count: 0,
        }
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    pub fn set_threshold(&mut self, threshold: u8) {
        self.threshold = threshold.max(1);
        self.count = 0;
    }

    /// True if the next event should come from the standard queue even
    /// though critical events are waiting.
    #[inline]
    fn standard_due(&self) -> bool {
        self.count >= self.threshold
    }
}

impl Default for PriorityLeveler {
    fn default() -> Self {
        Self::new(DEFAULT_PRIORITY_THRESHOLD)
    }
}

/// High-water marks, for sizing `QUEUE_SIZE`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct QueueStats {
    pub standard_high_water: usize,
    pub critical_high_water: usize,
    /// Pushes refused because a queue was full.
    pub rejected: u32,
}

pub struct EventQueues {
    standard: Deque<Event, QUEUE_SIZE>,
    #[cfg(feature = "critical-queue")]
    critical: Deque<Event, QUEUE_SIZE>,
    stats: QueueStats,
}

impl EventQueues {
    pub const fn new() -> Self {
        Self {
            standard: Deque::new(),
            #[cfg(feature = "critical-queue")]
            critical: Deque::new(),
            stats: QueueStats {
                standard_high_water: 0,
                critical_high_water: 0,
                rejected: 0,
            },
        }
    }

    /// Append to the standard queue.
    pub fn push(&mut self, event: Event) -> Result<(), Error> {
        if self.standard.push_back(event).is_err() {
            self.stats.rejected = self.stats.rejected.saturating_add(1);
            warn!("standard queue full, event {} dropped", event.id);
            return Err(Error::QueueFull);
        }
        self.stats.standard_high_water = self.stats.standard_high_water.max(self.standard.len());
        Ok(())
    }

    /// Append to the critical queue.
    #[cfg(feature = "critical-queue")]
    pub fn push_critical(&mut self, event: Event) -> Result<(), Error> {
        if self.critical.push_back(event).is_err() {
            self.stats.rejected = self.stats.rejected.saturating_add(1);
            warn!("critical queue full, event {} dropped", event.id);
            return Err(Error::QueueFull);
        }
        self.stats.critical_high_water = self.stats.critical_high_water.max(self.critical.len());
        Ok(())
    }

    /// Without the `critical-queue` feature urgent events share the
    /// standard queue.
    #[cfg(not(feature = "critical-queue"))]
    pub fn push_critical(&mut self, event: Event) -> Result<(), Error> {
        self.push(event)
    }

    /// Take the next event to dispatch, honouring the leveler.
    pub fn pop_next(&mut self, leveler: &mut PriorityLeveler) -> Option<Event> {
        #[cfg(feature = "critical-queue")]
        {
            if !self.critical.is_empty() {
                if leveler.standard_due() {
                    leveler.count = 0;
                    if let Some(event) = self.standard.pop_front() {
                        return Some(event);
                    }
                }
                leveler.count += 1;
                return self.critical.pop_front();
            }
        }
        leveler.count = 0;
        self.standard.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total queued events.
    pub fn len(&self) -> usize {
        #[cfg(feature = "critical-queue")]
        let critical = self.critical.len();
        #[cfg(not(feature = "critical-queue"))]
        let critical = 0;
        self.standard.len() + critical
    }

    pub fn stats(&self) -> QueueStats {
        self.stats
    }
}

impl Default for EventQueues {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for EventQueues {
    fn deliver(&mut self, event: Event) -> Result<(), Error> {
        self.push(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::TaskId;
    use std::vec::Vec;

    fn sig(n: u8) -> Event {
        Event::signal(n, TaskId(0))
    }

    fn drain(queues: &mut EventQueues, leveler: &mut PriorityLeveler) -> Vec<u8> {
        core::iter::from_fn(|| queues.pop_next(leveler))
            .map(|e| e.id)
            .collect()
    }

    #[test]
    fn test_standard_queue_is_fifo() {
        let mut q = EventQueues::new();
        let mut leveler = PriorityLeveler::default();
        for n in 1..=3 {
            q.push(sig(n)).unwrap();
        }
        assert_eq!(q.len(), 3);
        assert_eq!(drain(&mut q, &mut leveler), [1, 2, 3]);
        assert!(q.is_empty());
    }

    #[test]
    fn test_full_queue_rejects_and_counts() {
        let mut q = EventQueues::new();
        for n in 0..QUEUE_SIZE as u8 {
            q.push(sig(n)).unwrap();
        }
        assert_eq!(q.push(sig(99)), Err(Error::QueueFull));
        assert_eq!(q.stats().standard_high_water, QUEUE_SIZE);
        assert_eq!(q.stats().rejected, 1);
        assert_eq!(q.len(), QUEUE_SIZE);
    }

    #[test]
    fn test_leveler_zero_threshold_means_one() {
        assert_eq!(PriorityLeveler::new(0).threshold(), 1);
        let mut leveler = PriorityLeveler::new(5);
        leveler.set_threshold(0);
        assert_eq!(leveler.threshold(), 1);
    }

    #[cfg(feature = "critical-queue")]
    #[test]
    fn test_critical_first_with_bounded_starvation() {
        let mut q = EventQueues::new();
        let mut leveler = PriorityLeveler::new(3);
        for n in 1..=5 {
            q.push_critical(sig(10 + n)).unwrap();
        }
        q.push(sig(1)).unwrap();
        q.push(sig(2)).unwrap();

        assert_eq!(drain(&mut q, &mut leveler), [11, 12, 13, 1, 14, 15, 2]);
        assert_eq!(q.stats().critical_high_water, 5);
    }

    #[cfg(feature = "critical-queue")]
    #[test]
    fn test_critical_run_continues_when_standard_empty() {
        let mut q = EventQueues::new();
        let mut leveler = PriorityLeveler::new(1);
        for n in 1..=3 {
            q.push_critical(sig(n)).unwrap();
        }
        assert_eq!(drain(&mut q, &mut leveler), [1, 2, 3]);
    }

    #[test]
    fn test_deliver_goes_to_standard_queue() {
        let mut q = EventQueues::new();
        let mut leveler = PriorityLeveler::new(1);
        q.push_critical(sig(7)).unwrap();
        q.deliver(sig(8)).unwrap();
        // Critical first; standard follows
        assert_eq!(drain(&mut q, &mut leveler), [7, 8]);
    }
}
