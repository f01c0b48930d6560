//! # Event Dispatcher
//!
//! The main loop. Owns the attached reactive tasks and feeds them events
//! from the runtime's queues, one at a time, with the lock released while a
//! task runs.
//!
//! ## One Iteration
//!
//! ```text
//!   ┌─► pre_execute()
//!   │   next_event ── none ──► single pass? ── yes ──► Exit::Idle
//!   │       │                      │ no
//!   │       │                      ▼
//!   │       │             idle_wait (same critical section)
//!   │       │                      │
//!   │       │   pre_execute() ◄────┘
//!   │       ▼
//!   │   tasks[owner].process_event(event, cx)
//!   │       │
//!   │   release slot (timeouts) · post_execute()
//!   │       │
//!   └── Terminate? ── yes ──► Exit::Terminated
//! ```
//!
//! Sleeping inside the critical section that observed the empty queues
//! closes the window where an interrupt could queue an event between the
//! check and the `WFI`.

use heapless::Vec;

use crate::config::{DEFAULT_PRIORITY_THRESHOLD, MAX_TASKS};
use crate::error::Error;
use crate::event::{Context, Disposal, Event, EventKind, EventStatus, Reactive, TaskId};
use crate::kernel::Runtime;
use crate::queue::PriorityLeveler;
use crate::timer::TimerPort;

/// Why [`Dispatcher::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Exit {
    /// Single-pass mode and both queues are empty.
    Idle,
    /// A task asked to stop, or a `Terminate` event was dispatched.
    Terminated,
}

/// Callbacks around each dispatch, e.g. to service a radio stack before
/// every event.
pub trait DispatchHooks {
    fn pre_execute(&mut self) {}

    fn post_execute(&mut self, _event: &Event) {}
}

impl DispatchHooks for () {}

pub struct Dispatcher<'a, P: TimerPort, H: DispatchHooks = ()> {
    runtime: &'a Runtime<P>,
    tasks: Vec<&'a mut dyn Reactive, MAX_TASKS>,
    leveler: PriorityLeveler,
    hooks: H,
    dispatched: u32,
}

impl<'a, P: TimerPort> Dispatcher<'a, P> {
    pub fn new(runtime: &'a Runtime<P>) -> Self {
        Self::with_hooks(runtime, ())
    }
}

impl<'a, P: TimerPort, H: DispatchHooks> Dispatcher<'a, P, H> {
    pub fn with_hooks(runtime: &'a Runtime<P>, hooks: H) -> Self {
        Self {
            runtime,
            tasks: Vec::new(),
            leveler: PriorityLeveler::new(DEFAULT_PRIORITY_THRESHOLD),
            hooks,
            dispatched: 0,
        }
    }

    /// Register `task` and queue its `Initial` event.
    ///
    /// # Errors
    /// - `TaskTableFull`: `MAX_TASKS` tasks already attached.
    /// - `QueueFull`: the `Initial` event could not be queued.
    pub fn attach(&mut self, task: &'a mut dyn Reactive) -> Result<TaskId, Error> {
        if self.tasks.is_full() {
            return Err(Error::TaskTableFull);
        }
        let id = self.runtime.register_task()?;
        if id.index() != self.tasks.len() {
            // Another dispatcher registered tasks on this runtime.
            warn!("task id {} does not match table slot", id.index());
        }
        self.tasks
            .push(task)
            .map_err(|_| Error::TaskTableFull)?;
        debug!("attached task {}", id.index());
        Ok(id)
    }

    /// Consecutive critical events dispatched before a standard one is
    /// forced through. Zero is treated as one.
    pub fn set_priority_threshold(&mut self, threshold: u8) {
        self.leveler.set_threshold(threshold);
    }

    pub fn priority_threshold(&self) -> u8 {
        self.leveler.threshold()
    }

    /// Events dispatched so far.
    pub fn dispatched(&self) -> u32 {
        self.dispatched
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut H {
        &mut self.hooks
    }

    /// Dispatch events until the loop is terminated or, in single-pass mode,
    /// until both queues are empty.
    pub fn run(&mut self, single_pass: bool) -> Exit {
        loop {
            self.hooks.pre_execute();
            let event = loop {
                match self.runtime.next_event(&mut self.leveler, !single_pass) {
                    Some(event) => break event,
                    None if single_pass => return Exit::Idle,
                    // Woke up: let the interrupt run, then look again.
                    None => self.hooks.pre_execute(),
                }
            };

            let status = self.dispatch(&event);
            self.hooks.post_execute(&event);

            if status == EventStatus::Terminate || event.kind == EventKind::Terminate {
                info!("dispatcher terminated by task {}", event.owner.index());
                return Exit::Terminated;
            }
        }
    }

    fn dispatch(&mut self, event: &Event) -> EventStatus {
        let status = match self.tasks.get_mut(event.owner.index()) {
            Some(task) => {
                let mut cx = Context::new(self.runtime, event.owner);
                task.process_event(event, &mut cx)
            }
            None => {
                warn!("event {} for unknown task {}", event.id, event.owner.index());
                EventStatus::Consumed
            }
        };
        self.dispatched = self.dispatched.wrapping_add(1);

        if let Disposal::Release(slot) = event.disposal {
            if let Err(err) = self.runtime.release(slot) {
                error!("release of slot {} failed: {}", slot.index(), err);
            }
        }
        status
    }
}
