//! # Monotonic Timer Port
//!
//! The boundary between the scheduler and the one hardware one-shot timer
//! it multiplexes. A port arms a single-shot countdown, reports how many
//! ticks the current arm has consumed, and puts the core to sleep when the
//! dispatcher has nothing to do. Re-arming after expiry is the scheduler's
//! job, never the port's.
//!
//! ## Tick Arithmetic
//!
//! ```text
//! ticks = round(ms × tick_hz / 1000)      (64-bit intermediate)
//! ms    = round(ticks × 1000 / tick_hz)
//! elapsed = (now − start) & counter_mask   (counter wraps at its bit width)
//! ```
//!
//! One arm can span at most `counter_mask` ticks. Longer requests are split
//! into an arm-sized segment plus an overflow remainder by [`TickClock::split`].

use crate::error::{Fault, InitError};

/// Hardware refused to arm the timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerFault {
    /// The peripheral is owned by something else or still running.
    Busy,
    /// The driver rejected the requested tick count.
    Rejected,
}

// ---------------------------------------------------------------------------
// Tick clock
// ---------------------------------------------------------------------------

/// Frequency and width of a port's counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TickClock {
    /// Counter frequency in Hz.
    pub hz: u32,
    /// All-ones mask of the counter width; also the longest single arm.
    pub counter_mask: u32,
    /// Shortest arm the hardware accepts.
    pub min_ticks: u32,
}

impl TickClock {
    pub const fn new(hz: u32, counter_mask: u32, min_ticks: u32) -> Self {
        Self {
            hz,
            counter_mask,
            min_ticks,
        }
    }

    /// Longest single arm in ticks.
    #[inline]
    pub const fn max_ticks(&self) -> u32 {
        self.counter_mask
    }

    /// Convert milliseconds to ticks, rounding to nearest.
    pub const fn ms_to_ticks(&self, ms: u32) -> u64 {
        (ms as u64 * self.hz as u64 + 500) / 1000
    }

    /// Convert ticks to milliseconds, rounding to nearest.
    pub const fn ticks_to_ms(&self, ticks: u64) -> u64 {
        if self.hz == 0 {
            return 0;
        }
        (ticks * 1000 + self.hz as u64 / 2) / self.hz as u64
    }

    /// Ticks from `start` to `now` on a counter that wraps at its width.
    #[inline]
    pub const fn wrapping_elapsed(&self, start: u32, now: u32) -> u32 {
        now.wrapping_sub(start) & self.counter_mask
    }

    /// Split a total tick count into one arm-sized segment and the overflow
    /// that must be armed after the segment elapses.
    pub fn split(&self, total: u64) -> (u32, u64) {
        let max = self.max_ticks() as u64;
        if total > max {
            (self.max_ticks(), total - max)
        } else {
            (total as u32, 0)
        }
    }

    /// Clamp a tick count into the range one arm accepts.
    #[inline]
    pub fn clamp_arm(&self, ticks: u32) -> u32 {
        ticks.max(self.min_ticks).min(self.max_ticks())
    }

    pub fn validate(&self) -> Result<(), InitError> {
        if self.hz == 0 || self.counter_mask == 0 || self.min_ticks > self.counter_mask {
            return Err(InitError::ClockMisconfigured);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Port trait
// ---------------------------------------------------------------------------

/// A single hardware one-shot timer.
///
/// Implemented once per target. The scheduler owns the port and calls it
/// with interrupts masked, so implementations never need their own locking.
pub trait TimerPort {
    /// Frequency, width and minimum arm of the counter.
    fn clock(&self) -> TickClock;

    /// Bring the peripheral up. Called once before the first arm.
    fn init(&mut self) -> Result<(), InitError>;

    /// Arm a single-shot countdown of `ticks`, replacing any running arm.
    /// The elapsed count restarts from zero.
    fn start(&mut self, ticks: u32) -> Result<(), TimerFault>;

    /// Stop the countdown. No interrupt fires afterwards.
    fn stop(&mut self);

    /// Ticks consumed by the current arm since the last `start`, modulo the
    /// counter width. Zero while stopped.
    ///
    /// Once the arm has run out but its interrupt has not been serviced
    /// yet, this must report the full armed count, not the ticks counted
    /// after an automatic reload. The scheduler relies on it to treat the
    /// head as due when `schedule` runs inside that window.
    fn elapsed_ticks(&self) -> u32;

    /// Low-power wait until the next interrupt. Called from inside a
    /// critical section; the core must still wake on a pending interrupt
    /// (WFI behaves that way with PRIMASK set).
    fn idle_wait(&mut self);

    fn ms_to_ticks(&self, ms: u32) -> u64 {
        self.clock().ms_to_ticks(ms)
    }

    fn ticks_to_ms(&self, ticks: u64) -> u64 {
        self.clock().ticks_to_ms(ticks)
    }

    /// The single unrecoverable path. Ports on real hardware reset the core.
    fn fatal(&mut self, fault: Fault) -> ! {
        panic!("{}", fault)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RTC: TickClock = TickClock::new(32_768, 0x00FF_FFFF, 5);

    #[test]
    fn test_ms_to_ticks_rounds_to_nearest() {
        assert_eq!(RTC.ms_to_ticks(0), 0);
        assert_eq!(RTC.ms_to_ticks(1), 33); // 32.768
        assert_eq!(RTC.ms_to_ticks(50), 1638); // 1638.4
        assert_eq!(RTC.ms_to_ticks(100), 3277); // 3276.8
        assert_eq!(RTC.ms_to_ticks(1000), 32_768);
    }

    #[test]
    fn test_round_trip_within_one_tick_period() {
        let slow = TickClock::new(300, 0x00FF_FFFF, 1);
        for clock in [RTC, slow, TickClock::new(1000, 0xFFFF, 1)] {
            let period_ms = (1000 + clock.hz as u64 - 1) / clock.hz as u64;
            for ms in (0..5_000u32).step_by(7).chain([u32::MAX / 2, u32::MAX]) {
                let back = clock.ticks_to_ms(clock.ms_to_ticks(ms));
                let diff = back.abs_diff(ms as u64);
                assert!(diff <= period_ms, "{} ms -> {} ms at {} Hz", ms, back, clock.hz);
            }
        }
    }

    #[test]
    fn test_wrapping_elapsed() {
        assert_eq!(RTC.wrapping_elapsed(100, 250), 150);
        // Counter wrapped past 0x00FF_FFFF
        assert_eq!(RTC.wrapping_elapsed(0x00FF_FFF0, 0x0000_0010), 0x20);
    }

    #[test]
    fn test_split_saturates_at_counter_width() {
        assert_eq!(RTC.split(1000), (1000, 0));
        assert_eq!(RTC.split(0x00FF_FFFF), (0x00FF_FFFF, 0));
        assert_eq!(RTC.split(0x0100_0009), (0x00FF_FFFF, 10));
    }

    #[test]
    fn test_clamp_arm() {
        assert_eq!(RTC.clamp_arm(0), 5);
        assert_eq!(RTC.clamp_arm(40), 40);
        assert_eq!(RTC.clamp_arm(u32::MAX), 0x00FF_FFFF);
    }

    #[test]
    fn test_validate_rejects_zero_frequency() {
        assert_eq!(
            TickClock::new(0, 0xFF, 1).validate(),
            Err(InitError::ClockMisconfigured)
        );
        assert!(RTC.validate().is_ok());
    }
}
