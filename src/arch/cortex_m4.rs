//! # Cortex-M4 Port Layer
//!
//! [`TimerPort`] on the SysTick timer of an ARM Cortex-M4.
//!
//! SysTick is a 24-bit down-counter that reloads and keeps running. It is
//! used here as a one-shot: every `start` reloads it with the requested
//! tick count, and the exception handler calls
//! `Runtime::on_hardware_timeout`, which either re-arms it or stops it, so
//! the reload never runs a second period unattended.
//!
//! ## Registers
//!
//! | Register | Address       | Use                                      |
//! |----------|---------------|------------------------------------------|
//! | CSR      | `0xE000_E010` | ENABLE, TICKINT, CLKSOURCE (0 = core/8)  |
//! | RVR      | `0xE000_E014` | reload value, `ticks - 1`                |
//! | CVR      | `0xE000_E018` | current value; any write clears it       |
//! | ICSR     | `0xE000_ED04` | PENDSTSET (bit 26) reads a pending expiry, PENDSTCLR (bit 25) drops a stale one |
//! | SHPR3    | `0xE000_ED20` | SysTick priority, bits \[31:24\]         |
//!
//! ## Interrupt Priorities
//!
//! SysTick runs at the lowest priority (0xFF) so it never delays
//! application interrupts. Kernel state it touches is protected by the
//! runtime's critical section.

use cortex_m::peripheral::{SCB, SYST};

use crate::config::{MIN_TIMEOUT_TICKS, SYSTICK_COUNTER_MASK, SYSTICK_EXTERNAL_HZ};
use crate::error::{Fault, InitError};
use crate::timer::{TickClock, TimerFault, TimerPort};

const CSR_ENABLE: u32 = 1 << 0;
const CSR_TICKINT: u32 = 1 << 1;
const CSR_CLKSOURCE_CORE: u32 = 1 << 2;

/// Interrupt Control and State Register: PENDSTSET = bit 26, PENDSTCLR = bit 25.
const ICSR: *mut u32 = 0xE000_ED04 as *mut u32;
const ICSR_PENDSTSET: u32 = 1 << 26;
const ICSR_PENDSTCLR: u32 = 1 << 25;

/// System Handler Priority Register 3.
const SHPR3: *mut u32 = 0xE000_ED20 as *mut u32;

/// SysTick one-shot timer.
pub struct SysTickPort {
    clock: TickClock,
    /// Reload value of the running arm, `None` while stopped.
    reload: Option<u32>,
    /// Feed SysTick from the processor clock instead of the external one.
    core_clock: bool,
}

impl SysTickPort {
    /// SysTick on the external reference clock (core / 8).
    pub const fn new() -> Self {
        Self {
            clock: TickClock::new(SYSTICK_EXTERNAL_HZ, SYSTICK_COUNTER_MASK, MIN_TIMEOUT_TICKS),
            reload: None,
            core_clock: false,
        }
    }

    /// SysTick on the processor clock running at `core_hz`. Shorter maximum
    /// arm, finer resolution.
    pub const fn with_core_clock(core_hz: u32) -> Self {
        Self {
            clock: TickClock::new(core_hz, SYSTICK_COUNTER_MASK, MIN_TIMEOUT_TICKS),
            reload: None,
            core_clock: true,
        }
    }

    #[inline]
    fn regs() -> &'static cortex_m::peripheral::syst::RegisterBlock {
        // SAFETY: memory-mapped SysTick block, always present on Cortex-M.
        unsafe { &*SYST::PTR }
    }

    /// True if the arm ran out and the SysTick exception is still pending.
    fn expiry_pending() -> bool {
        // SAFETY: plain read; PENDSTSET is not cleared by reading it.
        unsafe { core::ptr::read_volatile(ICSR) & ICSR_PENDSTSET != 0 }
    }

    fn clear_pending() {
        // SAFETY: write-one-to-clear bit; other ICSR bits ignore zero writes.
        unsafe { core::ptr::write_volatile(ICSR, ICSR_PENDSTCLR) }
    }
}

impl Default for SysTickPort {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerPort for SysTickPort {
    fn clock(&self) -> TickClock {
        self.clock
    }

    fn init(&mut self) -> Result<(), InitError> {
        let syst = Self::regs();
        // SAFETY: the port owns SysTick; nothing else writes these registers.
        unsafe {
            syst.csr.write(0);
            syst.cvr.write(0);
            let val = core::ptr::read_volatile(SHPR3);
            core::ptr::write_volatile(SHPR3, val | (0xFF << 24));
        }
        Self::clear_pending();
        self.reload = None;
        Ok(())
    }

    fn start(&mut self, ticks: u32) -> Result<(), TimerFault> {
        if ticks == 0 || ticks > self.clock.max_ticks() {
            return Err(TimerFault::Rejected);
        }
        let reload = ticks - 1;
        let mut csr = CSR_ENABLE | CSR_TICKINT;
        if self.core_clock {
            csr |= CSR_CLKSOURCE_CORE;
        }
        let syst = Self::regs();
        // SAFETY: see `init`.
        unsafe {
            syst.csr.write(0);
            syst.rvr.write(reload);
            syst.cvr.write(0);
        }
        // A due head is never displaced by a re-arm, so any pending expiry
        // here belongs to an arm that was serviced or cancelled.
        Self::clear_pending();
        // SAFETY: see `init`.
        unsafe { syst.csr.write(csr) };
        self.reload = Some(reload);
        Ok(())
    }

    fn stop(&mut self) {
        // SAFETY: see `init`.
        unsafe { Self::regs().csr.write(0) };
        Self::clear_pending();
        self.reload = None;
    }

    fn elapsed_ticks(&self) -> u32 {
        let Some(reload) = self.reload else {
            return 0;
        };
        // Expired but not yet serviced: the counter has already reloaded, so
        // report the whole arm.
        if Self::expiry_pending() {
            return reload + 1;
        }
        // Down-counter: ticks consumed are the distance from the reload value.
        let current = Self::regs().cvr.read() & SYSTICK_COUNTER_MASK;
        self.clock.wrapping_elapsed(current, reload)
    }

    fn idle_wait(&mut self) {
        // Wakes on any pending interrupt even with PRIMASK set.
        cortex_m::asm::wfi();
    }

    fn fatal(&mut self, fault: Fault) -> ! {
        error!("fatal: {}", fault);
        SCB::sys_reset()
    }
}
