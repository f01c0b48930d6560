//! # Reactick
//!
//! A timeout scheduler and event dispatcher for single-core microcontrollers.
//!
//! ## Overview
//!
//! Reactick multiplexes any number of software timeouts onto one hardware
//! one-shot timer and delivers them, together with producer-injected
//! events, to reactive state machines running on the main loop:
//!
//! - **Tasks never block**: each event is one `process_event` call
//! - **One timer interrupt** serves every pending timeout
//! - **No heap**: every queue, table and pool is fixed-capacity
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │             Reactive Tasks (impl Reactive)             │
//! ├────────────────────────────────────────────────────────┤
//! │          Dispatcher (dispatcher.rs)  · run()           │
//! ├────────────────────────────────────────────────────────┤
//! │     Runtime (kernel.rs) · schedule() · push_event()    │
//! ├─────────────────────────────┬──────────────────────────┤
//! │  Timeout Scheduler          │  Event Queues            │
//! │  scheduler.rs               │  queue.rs                │
//! │  ─ delta-ordered set        │  ─ critical FIFO         │
//! │  ─ pool.rs slots            │  ─ standard FIFO         │
//! │  ─ on_hardware_timeout()    │  ─ priority leveler      │
//! ├─────────────────────────────┴──────────────────────────┤
//! │        Timer Port (timer.rs) · Sync (sync.rs)          │
//! ├────────────────────────────────────────────────────────┤
//! │        Arch Port (arch/cortex_m4.rs) · SysTick         │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Timing Model
//!
//! Intervals are given in milliseconds and converted to timer ticks with
//! round-to-nearest. A timeout fires no earlier than its interval minus one
//! tick period, plus interrupt and dispatch latency. Timeouts due on the
//! same tick are delivered in the order they were scheduled.
//!
//! ## Memory Model
//!
//! - **No heap**: `heapless` collections sized by [`config`]
//! - **No `alloc`**: `core` only
//! - **Critical sections**: `critical-section` for all shared state
//!
//! ## Features
//!
//! - `critical-queue` (default): second FIFO for urgent events
//! - `defmt`: log through `defmt`
//! - `firmware`: build the Cortex-M4 demo binary

#![no_std]

#[cfg(test)]
extern crate std;

#[macro_use]
mod fmt;

pub mod arch;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod kernel;
pub mod pool;
pub mod queue;
pub mod scheduler;
pub mod sync;
pub mod timeout;
pub mod timer;

#[cfg(test)]
mod testing;

pub use dispatcher::{DispatchHooks, Dispatcher, Exit};
pub use error::{Error, Fault, InitError};
pub use event::{Context, Event, EventKind, EventStatus, Reactive, Services, TaskId};
pub use kernel::Runtime;
pub use scheduler::Compensation;
pub use timer::{TickClock, TimerFault, TimerPort};
