//! # Kernel
//!
//! Shared runtime state and the public API producers, tasks and the timer
//! interrupt call into.
//!
//! The [`Kernel`] bundles the timeout scheduler with the event queues. The
//! [`Runtime`] wraps it in a [`Shared`] cell so that one `static` instance
//! can be reached from the main loop and from interrupt handlers. Every
//! public function takes the critical section for its whole duration.
//!
//! ## Startup Sequence
//!
//! ```text
//! static RUNTIME: Runtime<SysTickPort> = Runtime::new(SysTickPort::new())
//!
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         ├─► RUNTIME.init()          ← Bring the timer port up
//!         ├─► Dispatcher::new(&RUNTIME)
//!         ├─► dispatcher.attach(..)   ← Register tasks, queue Initial (×N)
//!         └─► dispatcher.run(false)   ← Event loop
//!
//! SysTick (one-shot expiry)
//!   └─► RUNTIME.on_hardware_timeout() ← Fired timeouts → standard queue
//! ```

use crate::config::MAX_TASKS;
use crate::error::{Error, InitError};
use crate::event::{Disposal, Event, Services, TaskId};
use crate::pool::SlotId;
use crate::queue::{EventQueues, PriorityLeveler, QueueStats};
use crate::scheduler::{Compensation, TimeoutScheduler};
use crate::sync::Shared;
use crate::timer::TimerPort;

// ---------------------------------------------------------------------------
// Kernel state
// ---------------------------------------------------------------------------

pub struct Kernel<P: TimerPort> {
    pub timeouts: TimeoutScheduler<P>,
    pub queues: EventQueues,
    /// Number of attached tasks; task ids are `0..attached`.
    attached: u8,
}

impl<P: TimerPort> Kernel<P> {
    pub const fn new(port: P, compensation: Compensation) -> Self {
        Self {
            timeouts: TimeoutScheduler::new(port, compensation),
            queues: EventQueues::new(),
            attached: 0,
        }
    }

    pub fn attached(&self) -> usize {
        self.attached as usize
    }

    fn check_owner(&self, owner: TaskId) -> Result<(), Error> {
        if owner.index() < self.attached() {
            Ok(())
        } else {
            warn!("task {} is not attached", owner.index());
            Err(Error::InvalidArgument)
        }
    }

    /// Hand out the next task id and queue its `Initial` event.
    fn register_task(&mut self) -> Result<TaskId, Error> {
        if self.attached() >= MAX_TASKS {
            return Err(Error::TaskTableFull);
        }
        let id = TaskId(self.attached);
        self.queues.push(Event::initial(id))?;
        self.attached += 1;
        Ok(id)
    }

    /// Next event to dispatch. Cancelled timeouts are released here and
    /// never returned. With `wait` set and nothing queued, the port sleeps
    /// before returning `None`.
    fn next_event(&mut self, leveler: &mut PriorityLeveler, wait: bool) -> Option<Event> {
        while let Some(event) = self.queues.pop_next(leveler) {
            if let Some(slot) = cancelled_slot(&self.timeouts, &event) {
                trace!("dropping cancelled timeout {}", event.id);
                let _ = self.timeouts.release(slot);
                continue;
            }
            return Some(event);
        }
        if wait {
            self.timeouts.port_mut().idle_wait();
        }
        None
    }
}

fn cancelled_slot<P: TimerPort>(timeouts: &TimeoutScheduler<P>, event: &Event) -> Option<SlotId> {
    match event.disposal {
        Disposal::Release(slot) if timeouts.is_cancelled(slot) => Some(slot),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Runtime
// ---------------------------------------------------------------------------

/// Interrupt-safe handle to the kernel. Meant to live in a `static`.
pub struct Runtime<P: TimerPort> {
    inner: Shared<Kernel<P>>,
}

impl<P: TimerPort> Runtime<P> {
    /// Runtime with the default arm compensation.
    pub const fn new(port: P) -> Self {
        Self::with_compensation(port, Compensation::DEFAULT)
    }

    pub const fn with_compensation(port: P, compensation: Compensation) -> Self {
        Self {
            inner: Shared::new(Kernel::new(port, compensation)),
        }
    }

    /// Bring the timer port up. Otherwise done lazily by the first
    /// `schedule`; calling it at startup surfaces a broken timer early.
    pub fn init(&self) -> Result<(), InitError> {
        self.inner.lock(|k| k.timeouts.init())
    }

    /// Schedule timeout `id` for `owner` after `interval_ms`.
    ///
    /// # Errors
    /// - `InvalidArgument`: `owner` is not attached.
    /// - `PoolExhausted`: every timeout slot is in use.
    /// - `QueueFull`: zero interval and the standard queue is full.
    /// - `Init(_)`: lazy timer initialisation failed.
    pub fn schedule(&self, id: u8, interval_ms: u32, owner: TaskId) -> Result<(), Error> {
        self.inner.lock(|k| {
            k.check_owner(owner)?;
            k.timeouts
                .schedule(id, interval_ms, owner, &mut k.queues)
                .map(|_| ())
        })
    }

    /// Cancel timeout `id` of `owner`. Once this returns, `owner` receives
    /// no further event for it. Unknown ids are a no-op.
    pub fn unschedule(&self, id: u8, owner: TaskId) -> Result<(), Error> {
        self.inner.lock(|k| {
            k.check_owner(owner)?;
            k.timeouts.unschedule(id, owner)
        })
    }

    pub fn push_event(&self, event: Event) -> Result<(), Error> {
        self.inner.lock(|k| {
            k.check_owner(event.owner)?;
            k.queues.push(event)
        })
    }

    pub fn push_critical_event(&self, event: Event) -> Result<(), Error> {
        self.inner.lock(|k| {
            k.check_owner(event.owner)?;
            k.queues.push_critical(event)
        })
    }

    /// Timer interrupt entry point. Returns the number of timeouts moved
    /// into the standard queue.
    pub fn on_hardware_timeout(&self) -> Result<usize, Error> {
        self.inner
            .lock(|k| k.timeouts.on_hardware_timeout(&mut k.queues))
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.inner.lock(|k| k.queues.stats())
    }

    pub fn pending_timeouts(&self) -> usize {
        self.inner.lock(|k| k.timeouts.pending())
    }

    /// Run `f` on the timer port under the lock.
    pub fn port<R>(&self, f: impl FnOnce(&mut P) -> R) -> R {
        self.inner.lock(|k| f(k.timeouts.port_mut()))
    }

    /// Run `f` on the whole kernel under the lock. `f` must not call back
    /// into the runtime.
    pub fn with_kernel<R>(&self, f: impl FnOnce(&mut Kernel<P>) -> R) -> R {
        self.inner.lock(f)
    }

    // --- Dispatcher side ---------------------------------------------------

    pub(crate) fn register_task(&self) -> Result<TaskId, Error> {
        self.inner.lock(|k| k.register_task())
    }

    pub(crate) fn next_event(&self, leveler: &mut PriorityLeveler, wait: bool) -> Option<Event> {
        self.inner.lock(|k| k.next_event(leveler, wait))
    }

    pub(crate) fn release(&self, slot: SlotId) -> Result<(), Error> {
        self.inner.lock(|k| k.timeouts.release(slot))
    }
}

impl<P: TimerPort> Services for Runtime<P> {
    fn schedule(&self, id: u8, interval_ms: u32, owner: TaskId) -> Result<(), Error> {
        Runtime::schedule(self, id, interval_ms, owner)
    }

    fn unschedule(&self, id: u8, owner: TaskId) -> Result<(), Error> {
        Runtime::unschedule(self, id, owner)
    }

    fn push_event(&self, event: Event) -> Result<(), Error> {
        Runtime::push_event(self, event)
    }

    fn push_critical_event(&self, event: Event) -> Result<(), Error> {
        Runtime::push_critical_event(self, event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use crate::testing::MockPort;

    fn runtime(tasks: usize) -> Runtime<MockPort> {
        let rt = Runtime::with_compensation(MockPort::new(), Compensation::NONE);
        for _ in 0..tasks {
            rt.register_task().unwrap();
        }
        // Drop the Initial events
        let mut leveler = PriorityLeveler::default();
        while rt.next_event(&mut leveler, false).is_some() {}
        rt
    }

    #[test]
    fn test_unknown_owner_is_rejected() {
        let rt = runtime(1);
        assert_eq!(rt.schedule(1, 10, TaskId(3)), Err(Error::InvalidArgument));
        assert_eq!(rt.unschedule(1, TaskId(3)), Err(Error::InvalidArgument));
        assert_eq!(
            rt.push_event(Event::signal(0, TaskId(1))),
            Err(Error::InvalidArgument)
        );
        assert_eq!(rt.pending_timeouts(), 0);
        assert!(rt.port(|p| p.arms.is_empty()));
    }

    #[test]
    fn test_register_queues_initial_event() {
        let rt = Runtime::new(MockPort::new());
        let a = rt.register_task().unwrap();
        let b = rt.register_task().unwrap();
        assert_ne!(a, b);

        let mut leveler = PriorityLeveler::default();
        let first = rt.next_event(&mut leveler, false).unwrap();
        assert_eq!((first.kind, first.owner), (EventKind::Initial, a));
        let second = rt.next_event(&mut leveler, false).unwrap();
        assert_eq!((second.kind, second.owner), (EventKind::Initial, b));
    }

    #[test]
    fn test_task_table_full() {
        let rt = runtime(MAX_TASKS);
        assert_eq!(rt.register_task(), Err(Error::TaskTableFull));
    }

    #[test]
    fn test_init_is_idempotent() {
        let rt = runtime(0);
        rt.init().unwrap();
        rt.init().unwrap();
        assert_eq!(rt.port(|p| p.inits), 1);
    }

    #[test]
    fn test_timer_interrupt_feeds_standard_queue() {
        let rt = runtime(2);
        rt.schedule(1, 20, TaskId(0)).unwrap();
        rt.schedule(2, 20, TaskId(1)).unwrap();
        rt.port(|p| p.expire());

        assert_eq!(rt.on_hardware_timeout(), Ok(2));
        let mut leveler = PriorityLeveler::default();
        let first = rt.next_event(&mut leveler, false).unwrap();
        assert!(first.is_timeout(1));
        assert_eq!(first.owner, TaskId(0));
        let second = rt.next_event(&mut leveler, false).unwrap();
        assert!(second.is_timeout(2));
        assert_eq!(rt.queue_stats().standard_high_water, 2);
    }

    #[test]
    fn test_cancelled_in_flight_timeout_is_not_returned() {
        let rt = runtime(1);
        rt.schedule(1, 10, TaskId(0)).unwrap();
        rt.port(|p| p.expire());
        rt.on_hardware_timeout().unwrap();

        rt.unschedule(1, TaskId(0)).unwrap();
        let mut leveler = PriorityLeveler::default();
        assert_eq!(rt.next_event(&mut leveler, false), None);
        assert_eq!(rt.with_kernel(|k| k.timeouts.pool().in_use()), 0);
    }

    #[test]
    fn test_blocking_wait_sleeps_on_empty_queues() {
        let rt = runtime(1);
        let mut leveler = PriorityLeveler::default();
        assert_eq!(rt.next_event(&mut leveler, true), None);
        assert_eq!(rt.port(|p| p.idle_waits), 1);

        rt.push_event(Event::signal(3, TaskId(0))).unwrap();
        assert!(rt.next_event(&mut leveler, true).is_some());
        assert_eq!(rt.port(|p| p.idle_waits), 1);
    }

    #[test]
    fn test_zero_delay_is_queued_before_return() {
        let rt = runtime(1);
        rt.schedule(4, 0, TaskId(0)).unwrap();

        let mut leveler = PriorityLeveler::default();
        let event = rt.next_event(&mut leveler, false).unwrap();
        assert!(event.is_timeout(4));
        assert!(event.must_release());
        assert_eq!(rt.pending_timeouts(), 0);
    }
}
