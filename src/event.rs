//! # Events and the Reactive Task Contract
//!
//! Everything the dispatcher delivers is an [`Event`]: a small `Copy` value
//! naming its kind, a numeric id, and the task it is routed to. Consumer
//! state machines implement [`Reactive`] and receive events one at a time
//! from the main loop, together with a [`Context`] through which they can
//! schedule timeouts and inject further events.
//!
//! ## Event Lifecycle
//!
//! ```text
//!   attach() ──► Initial ─┐
//!   schedule() ─► timer ──┼─► queue ──► Dispatcher ──► task.process_event()
//!   push_event() ─────────┘                               │
//!                                        release slot ◄───┘ (if must_release)
//! ```

use crate::error::Error;
use crate::pool::SlotId;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Handle of an attached reactive task. Identity is handle equality.
///
/// Only the dispatcher creates task ids (on `attach`), so an id always names
/// a slot of the task table it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TaskId(pub(crate) u8);

impl TaskId {
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EventKind {
    /// One-time setup signal, delivered once after `attach`.
    Initial,
    /// A scheduled timeout expired. `id` is the id given to `schedule`.
    Timeout,
    /// Producer-defined signal (button edge, sample ready, ...). `id` is the
    /// signal number.
    Signal,
    /// Stop the dispatch loop once this event has been processed.
    Terminate,
}

/// What the dispatcher must do with an event's storage after dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Disposal {
    /// Owned elsewhere. The dispatcher frees nothing.
    Retain,
    /// Occupies a timeout pool slot that returns to the pool after dispatch.
    Release(SlotId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Event {
    pub kind: EventKind,
    pub id: u8,
    pub owner: TaskId,
    pub disposal: Disposal,
}

impl Event {
    pub const fn new(kind: EventKind, id: u8, owner: TaskId) -> Self {
        Self {
            kind,
            id,
            owner,
            disposal: Disposal::Retain,
        }
    }

    pub const fn initial(owner: TaskId) -> Self {
        Self::new(EventKind::Initial, 0, owner)
    }

    pub const fn signal(signal: u8, owner: TaskId) -> Self {
        Self::new(EventKind::Signal, signal, owner)
    }

    pub const fn terminate(owner: TaskId) -> Self {
        Self::new(EventKind::Terminate, 0, owner)
    }

    /// A fired timeout holding its pool slot until dispatched.
    pub(crate) const fn timeout(id: u8, owner: TaskId, slot: SlotId) -> Self {
        Self {
            kind: EventKind::Timeout,
            id,
            owner,
            disposal: Disposal::Release(slot),
        }
    }

    /// True if the dispatcher must release the event's storage afterwards.
    #[inline]
    pub const fn must_release(&self) -> bool {
        matches!(self.disposal, Disposal::Release(_))
    }

    /// True for a `Timeout` event carrying `id`.
    #[inline]
    pub fn is_timeout(&self, id: u8) -> bool {
        self.kind == EventKind::Timeout && self.id == id
    }
}

// ---------------------------------------------------------------------------
// Reactive contract
// ---------------------------------------------------------------------------

/// Result of processing one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EventStatus {
    Consumed,
    /// Stop the whole dispatch loop after this call returns.
    Terminate,
}

/// A state machine driven by the dispatcher.
///
/// `process_event` runs on the main loop with no lock held and must not
/// block. A task owning several timeouts tells them apart by `event.id`.
pub trait Reactive {
    fn process_event(&mut self, event: &Event, cx: &mut Context<'_>) -> EventStatus;
}

/// Runtime operations available to producers and tasks.
///
/// Object-safe so a [`Context`] can carry it without naming the timer port.
pub trait Services {
    /// Schedule timeout `id` for `owner` after `interval_ms`.
    fn schedule(&self, id: u8, interval_ms: u32, owner: TaskId) -> Result<(), Error>;
    /// Cancel timeout `id` of `owner`. Unknown ids are a no-op.
    fn unschedule(&self, id: u8, owner: TaskId) -> Result<(), Error>;
    fn push_event(&self, event: Event) -> Result<(), Error>;
    fn push_critical_event(&self, event: Event) -> Result<(), Error>;
}

/// Handle given to a task while it processes an event.
pub struct Context<'a> {
    services: &'a dyn Services,
    me: TaskId,
}

impl<'a> Context<'a> {
    pub fn new(services: &'a dyn Services, me: TaskId) -> Self {
        Self { services, me }
    }

    /// Id of the task being dispatched.
    #[inline]
    pub fn task_id(&self) -> TaskId {
        self.me
    }

    /// Schedule timeout `id` for this task. A zero interval queues the
    /// timeout event before returning.
    pub fn schedule(&mut self, id: u8, interval_ms: u32) -> Result<(), Error> {
        self.services.schedule(id, interval_ms, self.me)
    }

    pub fn unschedule(&mut self, id: u8) -> Result<(), Error> {
        self.services.unschedule(id, self.me)
    }

    pub fn push_event(&mut self, event: Event) -> Result<(), Error> {
        self.services.push_event(event)
    }

    pub fn push_critical_event(&mut self, event: Event) -> Result<(), Error> {
        self.services.push_critical_event(event)
    }

    /// Queue signal `signal` to `target`.
    pub fn signal(&mut self, signal: u8, target: TaskId) -> Result<(), Error> {
        self.services.push_event(Event::signal(signal, target))
    }

    /// Queue a `Terminate` event for this task, ending the loop once it is
    /// dispatched.
    pub fn terminate(&mut self) -> Result<(), Error> {
        self.services.push_event(Event::terminate(self.me))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_pooled_events_must_be_released() {
        let owner = TaskId(2);
        assert!(!Event::initial(owner).must_release());
        assert!(!Event::signal(4, owner).must_release());
        assert!(Event::timeout(1, owner, SlotId(3)).must_release());
    }

    #[test]
    fn test_is_timeout_matches_kind_and_id() {
        let ev = Event::timeout(7, TaskId(0), SlotId(0));
        assert!(ev.is_timeout(7));
        assert!(!ev.is_timeout(6));
        assert!(!Event::signal(7, TaskId(0)).is_timeout(7));
    }
}
