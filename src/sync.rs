//! # Synchronization Primitives
//!
//! Interrupt-safe critical section abstractions. All kernel state shared
//! between the main loop and the timer interrupt is accessed through
//! [`Shared`], which only hands out a mutable borrow inside a critical
//! section.
//!
//! On Cortex-M the critical section implementation is provided by
//! `cortex-m` (`critical-section-single-core`: PRIMASK save/disable/restore).
//! Host tests link the `std` implementation of the `critical-section` crate.

use core::cell::RefCell;

use critical_section::{CriticalSection, Mutex};

/// Execute a closure within a critical section (interrupts disabled).
///
/// Interrupts are disabled on entry and restored on exit, so nesting is
/// allowed and an interrupt that became pending meanwhile runs right after
/// the closure returns.
///
/// # Usage
/// ```ignore
/// sync::critical_section(|_cs| {
///     // Access shared state safely
/// });
/// ```
///
/// # Performance
/// Keep critical sections as short as possible to minimize interrupt latency.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(CriticalSection<'_>) -> R,
{
    critical_section::with(f)
}

/// State shared between interrupt handlers and the main loop.
///
/// `const`-constructible so it can live in a `static`.
pub struct Shared<T> {
    inner: Mutex<RefCell<T>>,
}

impl<T> Shared<T> {
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(value)),
        }
    }

    /// Run `f` with exclusive access to the value.
    ///
    /// # Panics
    /// If called re-entrantly from inside `f` (the `RefCell` is already
    /// borrowed). Kernel code never calls back into user code while locked.
    #[inline]
    pub fn lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        critical_section(|cs| f(&mut self.inner.borrow(cs).borrow_mut()))
    }
}
