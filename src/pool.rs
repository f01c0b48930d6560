//! # Timeout Pool
//!
//! Fixed-capacity arena of timeout slots. The scheduler's ordered set holds
//! only slot indices, so inserting and removing never moves a `Timeout` and
//! never touches a heap.
//!
//! ## Slot States
//!
//! ```text
//!            alloc()              fire
//!   Free ──────────────► Pending ─────► InFlight ──┐
//!    ▲                      │               │      │ dispatched
//!    │     unschedule()     │   unschedule()▼      │
//!    ├──────────────────────┘          Cancelled ──┤
//!    └─────────────────────────────────────────────┘
//! ```

use crate::config::MAX_TIMEOUTS;
use crate::error::Error;
use crate::event::TaskId;
use crate::timeout::Timeout;

/// Index of a slot in the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SlotId(pub(crate) u8);

impl SlotId {
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SlotState {
    Free,
    /// In the ordered set, waiting for the hardware timer.
    Pending,
    /// Fired; its event sits in a queue.
    InFlight,
    /// Fired, then unscheduled before the dispatcher reached it.
    Cancelled,
}

#[derive(Clone, Copy)]
struct Slot {
    state: SlotState,
    timeout: Option<Timeout>,
}

impl Slot {
    const EMPTY: Slot = Slot {
        state: SlotState::Free,
        timeout: None,
    };
}

pub struct TimeoutPool {
    slots: [Slot; MAX_TIMEOUTS],
    in_use: usize,
}

impl TimeoutPool {
    pub const fn new() -> Self {
        Self {
            slots: [Slot::EMPTY; MAX_TIMEOUTS],
            in_use: 0,
        }
    }

    pub const fn capacity(&self) -> usize {
        MAX_TIMEOUTS
    }

    /// Occupied slots (pending, in flight or cancelled).
    pub fn in_use(&self) -> usize {
        self.in_use
    }

    /// Take a free slot for `timeout` in the given state.
    pub fn alloc(&mut self, timeout: Timeout, state: SlotState) -> Result<SlotId, Error> {
        debug_assert!(state != SlotState::Free);
        let index = self
            .slots
            .iter()
            .position(|slot| slot.state == SlotState::Free)
            .ok_or(Error::PoolExhausted)?;
        self.slots[index] = Slot {
            state,
            timeout: Some(timeout),
        };
        self.in_use += 1;
        Ok(SlotId(index as u8))
    }

    /// Return a slot to the pool. Freeing a free slot is rejected and
    /// leaves the pool untouched.
    pub fn free(&mut self, id: SlotId) -> Result<Timeout, Error> {
        let slot = self.slots.get_mut(id.index()).ok_or(Error::InvalidArgument)?;
        if slot.state == SlotState::Free {
            return Err(Error::InvalidArgument);
        }
        let timeout = slot.timeout.take().ok_or(Error::InvalidArgument)?;
        slot.state = SlotState::Free;
        self.in_use -= 1;
        Ok(timeout)
    }

    pub fn state(&self, id: SlotId) -> SlotState {
        self.slots
            .get(id.index())
            .map_or(SlotState::Free, |slot| slot.state)
    }

    pub(crate) fn set_state(&mut self, id: SlotId, state: SlotState) {
        if let Some(slot) = self.slots.get_mut(id.index()) {
            debug_assert!(slot.state != SlotState::Free);
            slot.state = state;
        }
    }

    pub fn get(&self, id: SlotId) -> Option<&Timeout> {
        self.slots.get(id.index()).and_then(|slot| slot.timeout.as_ref())
    }

    pub fn get_mut(&mut self, id: SlotId) -> Option<&mut Timeout> {
        self.slots
            .get_mut(id.index())
            .and_then(|slot| slot.timeout.as_mut())
    }

    /// Mark every in-flight timeout `(id, owner)` as cancelled.
    /// Returns how many were caught.
    pub fn cancel_in_flight(&mut self, id: u8, owner: TaskId) -> usize {
        let mut cancelled = 0;
        for slot in self.slots.iter_mut() {
            if slot.state != SlotState::InFlight {
                continue;
            }
            if slot.timeout.is_some_and(|t| t.matches(id, owner)) {
                slot.state = SlotState::Cancelled;
                cancelled += 1;
            }
        }
        cancelled
    }
}

impl Default for TimeoutPool {
    fn default() -> Self {
        Self::new()
    }
}
