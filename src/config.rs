//! # Reactick Configuration
//!
//! Compile-time constants governing the runtime. All capacities are fixed
//! at compile time. Nothing in the crate allocates.

/// Maximum number of reactive tasks that can be attached to a dispatcher.
pub const MAX_TASKS: usize = 8;

/// Capacity of each event queue (critical and standard).
///
/// Every fired timeout, `Initial` event and injected signal passes through
/// one of these queues. Watch `QueueStats::standard_high_water` on a debug
/// build to size it.
pub const QUEUE_SIZE: usize = 10;

/// Number of timeout slots in the pool. A slot stays occupied from
/// `schedule()` until the fired event has been dispatched, so this bounds
/// pending *and* in-flight timeouts together.
pub const MAX_TIMEOUTS: usize = 16;

/// Default number of consecutive critical events dispatched before one
/// standard event is forced through.
pub const DEFAULT_PRIORITY_THRESHOLD: u8 = 10;

/// Timeout ticks shaved off a hardware arm when the ordered set was empty.
/// Offsets the latency between the schedule call and the counter starting.
pub const COMPENSATION_EMPTY_LIST: u32 = 1;

/// Timeout ticks shaved off a hardware re-arm for a new head of a non-empty
/// set (the walk and the restart take longer than a plain start).
pub const COMPENSATION_NOT_EMPTY_LIST: u32 = 3;

/// Smallest arm the hardware accepts. Shorter requests are rounded up.
pub const MIN_TIMEOUT_TICKS: u32 = 5;

/// Core clock frequency in Hz (STM32F4 at 16 MHz HSI).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

/// SysTick reference clock when fed from the external (core / 8) source.
/// A slower clock widens the span of one 24-bit arm to roughly 8.4 s.
pub const SYSTICK_EXTERNAL_HZ: u32 = SYSTEM_CLOCK_HZ / 8;

/// SysTick counter width: 24 bits.
pub const SYSTICK_COUNTER_MASK: u32 = 0x00FF_FFFF;
