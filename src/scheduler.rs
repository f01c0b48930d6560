//! # Timeout Scheduler
//!
//! Multiplexes every pending timeout onto the one hardware one-shot timer.
//!
//! ## Delta-Encoded Ordered Set
//!
//! Pending timeouts are kept as slot indices sorted by firing time. Each
//! entry stores only the ticks between its own firing and the entry before
//! it; the head stores the ticks left on the running hardware arm:
//!
//! ```text
//!   now        A(+30)      B(+20)   C(+0)        D(+45)
//!    |───────────|───────────|─────────|────────────|
//!               30          50        50           95   absolute ticks
//! ```
//!
//! For every `k`, the sum of the first `k` deltas is the absolute distance to
//! the `k`-th firing, so an interrupt only ever has to look at the head.
//! Entries sharing a tick (C above) carry a zero delta and are delivered by
//! the same interrupt, in insertion order.
//!
//! ## Algorithm
//!
//! - **schedule**: synchronise the head with the hardware's elapsed ticks,
//!   then walk from the head subtracting deltas until the new timeout's
//!   remaining budget is smaller than the visited delta. Insert there and
//!   take the inserted budget off the following entry. A new head re-arms
//!   the timer.
//! - **unschedule**: donate the removed entry's delta to its successor. Only
//!   removing the head re-arms; removing the last entry stops the timer.
//! - **on_hardware_timeout**: pop the head, then cascade through every entry
//!   whose delta is zero, and re-arm for whatever is left.
//!
//! ## Long Timeouts
//!
//! One arm covers at most `counter_mask` ticks. A longer timeout is inserted
//! with a full-width delta and its remainder kept as `overflow`. When that
//! segment fires, the timeout is reinserted with the next segment instead of
//! being delivered.
//!
//! ## Interrupt Race
//!
//! All operations run inside the kernel's critical section. The only
//! remaining race is a timer interrupt that was already pending when
//! `unschedule` re-armed for a new head: it then delivers that new head one
//! arm early. At most one firing can be affected this way.

use heapless::Vec;

use crate::config::{COMPENSATION_EMPTY_LIST, COMPENSATION_NOT_EMPTY_LIST, MAX_TIMEOUTS};
use crate::error::{Error, Fault, InitError};
use crate::event::{Event, TaskId};
use crate::pool::{SlotId, SlotState, TimeoutPool};
use crate::timeout::Timeout;
use crate::timer::TimerPort;

/// Destination for fired timeouts (the standard event queue).
pub trait EventSink {
    fn deliver(&mut self, event: Event) -> Result<(), Error>;
}

/// Ticks taken off hardware arms to offset the software path's own latency.
///
/// Applied only to the value handed to the timer, never to the stored deltas,
/// so the ordering arithmetic stays exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Compensation {
    /// Arming from an empty set.
    pub empty_list: u32,
    /// Re-arming for a new head of a non-empty set.
    pub not_empty_list: u32,
}

impl Compensation {
    pub const NONE: Compensation = Compensation {
        empty_list: 0,
        not_empty_list: 0,
    };

    pub const DEFAULT: Compensation = Compensation {
        empty_list: COMPENSATION_EMPTY_LIST,
        not_empty_list: COMPENSATION_NOT_EMPTY_LIST,
    };
}

/// One entry of the ordered set as seen from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PendingTimeout {
    pub slot: SlotId,
    pub id: u8,
    pub owner: TaskId,
    pub relative_ticks: u32,
    pub overflow: u64,
}

pub struct TimeoutScheduler<P: TimerPort> {
    port: P,
    pool: TimeoutPool,
    /// Pending slots, sorted by firing time.
    order: Vec<SlotId, MAX_TIMEOUTS>,
    compensation: Compensation,
    /// Ticks of the running arm already taken off the head.
    accounted: u32,
    /// Ticks handed to the hardware for the running arm.
    armed: Option<u32>,
    ready: bool,
}

impl<P: TimerPort> TimeoutScheduler<P> {
    pub const fn new(port: P, compensation: Compensation) -> Self {
        Self {
            port,
            pool: TimeoutPool::new(),
            order: Vec::new(),
            compensation,
            accounted: 0,
            armed: None,
            ready: false,
        }
    }

    /// Bring up the timer port. Idempotent.
    pub fn init(&mut self) -> Result<(), InitError> {
        if self.ready {
            return Ok(());
        }
        let clock = self.port.clock();
        clock.validate()?;
        self.port.init()?;
        self.ready = true;
        info!(
            "timeout scheduler ready: {} Hz, max arm {} ticks",
            clock.hz,
            clock.max_ticks()
        );
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    // -----------------------------------------------------------------------
    // Public operations
    // -----------------------------------------------------------------------

    /// Schedule timeout `id` for `owner` after `interval_ms`.
    ///
    /// A zero interval never touches the ordered set or the timer: the
    /// timeout event is pushed into `sink` before this returns.
    pub fn schedule(
        &mut self,
        id: u8,
        interval_ms: u32,
        owner: TaskId,
        sink: &mut impl EventSink,
    ) -> Result<SlotId, Error> {
        if !self.ready {
            self.init()?;
        }
        let clock = self.port.clock();
        let timeout = Timeout::new(id, interval_ms, owner, &clock);

        if interval_ms == 0 {
            let slot = self.pool.alloc(timeout, SlotState::InFlight)?;
            if let Err(err) = sink.deliver(Event::timeout(id, owner, slot)) {
                let _ = self.pool.free(slot);
                return Err(err);
            }
            trace!("timeout {} fired synchronously", id);
            return Ok(slot);
        }

        let slot = self.pool.alloc(timeout, SlotState::Pending)?;
        trace!(
            "schedule timeout {}: {} ms -> {} ticks (+{} overflow)",
            id,
            interval_ms,
            timeout.relative_ticks(),
            timeout.overflow()
        );

        if self.order.is_empty() {
            self.link(slot)?;
            self.arm(timeout.relative_ticks(), self.compensation.empty_list);
            return Ok(slot);
        }

        self.sync_head();
        if self.link(slot)? == 0 {
            self.arm(timeout.relative_ticks(), self.compensation.not_empty_list);
        }
        Ok(slot)
    }

    /// Cancel timeout `id` of `owner`.
    ///
    /// Removes the first pending match and cancels every fired match whose
    /// event has not been dispatched yet. Unknown ids are a no-op.
    pub fn unschedule(&mut self, id: u8, owner: TaskId) -> Result<(), Error> {
        let cancelled = self.pool.cancel_in_flight(id, owner);
        if cancelled > 0 {
            debug!("cancelled {} in-flight timeout(s) {}", cancelled, id);
        }

        let pool = &self.pool;
        let Some(index) = self
            .order
            .iter()
            .position(|&slot| pool.get(slot).is_some_and(|t| t.matches(id, owner)))
        else {
            trace!("unschedule timeout {}: not pending", id);
            return Ok(());
        };

        self.sync_head();
        let removed = self.order.remove(index);
        let timeout = self.pool.free(removed)?;

        if self.order.is_empty() {
            self.disarm();
        } else {
            if let Some(&next) = self.order.get(index) {
                if let Some(next) = self.pool.get_mut(next) {
                    next.incr_relative_ticks(timeout.relative_ticks());
                }
            }
            if index == 0 {
                let ticks = self.head_ticks();
                self.arm(ticks, self.compensation.not_empty_list);
            }
        }
        trace!("unschedule timeout {}: removed at {}", id, index);
        Ok(())
    }

    /// Hardware timer callback. Delivers the head and every timeout sharing
    /// its tick, then re-arms for the next one.
    ///
    /// If `sink` is full, the undelivered timeout is put back at the head
    /// with a zero delta and the timer is re-armed for the minimum arm so
    /// delivery is retried; the error is returned for the caller to log.
    pub fn on_hardware_timeout(&mut self, sink: &mut impl EventSink) -> Result<usize, Error> {
        self.armed = None;
        self.accounted = 0;

        let mut delivered = 0;
        let mut first = true;
        let result = loop {
            let Some(&head) = self.order.first() else {
                break Ok(());
            };
            if !first && self.ticks_of(head) > 0 {
                break Ok(());
            }
            first = false;
            self.order.remove(0);

            let clock = self.port.clock();
            let Some(timeout) = self.pool.get_mut(head) else {
                continue;
            };
            if timeout.next_segment(&clock) {
                trace!("timeout {}: next segment", timeout.id);
                self.link(head)?;
                continue;
            }

            let event = Event::timeout(timeout.id, timeout.owner, head);
            match sink.deliver(event) {
                Ok(()) => {
                    self.pool.set_state(head, SlotState::InFlight);
                    delivered += 1;
                }
                Err(err) => {
                    timeout.set_relative_ticks(0);
                    // Cannot overflow: the slot was just removed.
                    let _ = self.order.insert(0, head);
                    warn!("timeout {} not delivered, retrying", event.id);
                    break Err(err);
                }
            }
        };

        if self.order.is_empty() {
            self.disarm();
        } else {
            let ticks = self.head_ticks();
            self.arm(ticks, 0);
        }
        result.map(|()| delivered)
    }

    /// Return the slot of a dispatched timeout event to the pool.
    pub fn release(&mut self, slot: SlotId) -> Result<(), Error> {
        match self.pool.state(slot) {
            SlotState::InFlight | SlotState::Cancelled => self.pool.free(slot).map(|_| ()),
            SlotState::Pending | SlotState::Free => {
                warn!("release of slot {} rejected", slot.index());
                Err(Error::InvalidArgument)
            }
        }
    }

    /// True if the timeout in `slot` fired and was cancelled before dispatch.
    pub fn is_cancelled(&self, slot: SlotId) -> bool {
        self.pool.state(slot) == SlotState::Cancelled
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// Number of timeouts in the ordered set.
    pub fn pending(&self) -> usize {
        self.order.len()
    }

    /// Pending timeouts in firing order.
    pub fn iter(&self) -> impl Iterator<Item = PendingTimeout> + '_ {
        self.order.iter().filter_map(move |&slot| {
            self.pool.get(slot).map(|t| PendingTimeout {
                slot,
                id: t.id,
                owner: t.owner,
                relative_ticks: t.relative_ticks(),
                overflow: t.overflow(),
            })
        })
    }

    /// Ticks handed to the hardware for the running arm, if any.
    pub fn armed_ticks(&self) -> Option<u32> {
        self.armed
    }

    pub fn pool(&self) -> &TimeoutPool {
        &self.pool
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn ticks_of(&self, slot: SlotId) -> u32 {
        self.pool.get(slot).map_or(0, Timeout::relative_ticks)
    }

    fn head_ticks(&self) -> u32 {
        self.order.first().map_or(0, |&slot| self.ticks_of(slot))
    }

    /// Take the ticks the running arm consumed since the last sync off the head.
    fn sync_head(&mut self) {
        let Some(&head) = self.order.first() else {
            return;
        };
        let elapsed = self.port.elapsed_ticks();
        let fresh = self.port.clock().wrapping_elapsed(self.accounted, elapsed);
        if fresh == 0 {
            return;
        }
        if let Some(head) = self.pool.get_mut(head) {
            head.decr_relative_ticks(fresh);
        }
        self.accounted = elapsed;
    }

    /// Insert `slot` into the ordered set by its current delta (relative to
    /// now). Returns the insertion index. Ties go after existing entries.
    fn link(&mut self, slot: SlotId) -> Result<usize, Error> {
        let mut remaining = self.ticks_of(slot);
        let mut index = 0;
        while let Some(&entry) = self.order.get(index) {
            let delta = self.ticks_of(entry);
            // Strict: an equal entry stays ahead, so same-tick timeouts fire
            // in the order they were scheduled.
            if remaining < delta {
                break;
            }
            remaining -= delta;
            index += 1;
        }

        if let Some(&next) = self.order.get(index) {
            if let Some(next) = self.pool.get_mut(next) {
                next.decr_relative_ticks(remaining);
            }
        }
        if let Some(timeout) = self.pool.get_mut(slot) {
            timeout.set_relative_ticks(remaining);
        }
        if self.order.insert(index, slot).is_err() {
            let _ = self.pool.free(slot);
            return Err(Error::PoolExhausted);
        }
        Ok(index)
    }

    fn arm(&mut self, ticks: u32, compensation: u32) {
        let armed = self
            .port
            .clock()
            .clamp_arm(ticks.saturating_sub(compensation));
        if let Err(fault) = self.port.start(armed) {
            error!("timer re-arm for {} ticks failed", armed);
            self.port.fatal(Fault::Rearm(fault));
        }
        self.accounted = 0;
        self.armed = Some(armed);
    }

    fn disarm(&mut self) {
        self.port.stop();
        self.accounted = 0;
        self.armed = None;
    }
}
