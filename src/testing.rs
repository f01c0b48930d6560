//! Host-side timer port for unit tests.

use std::vec::Vec;

use crate::error::InitError;
use crate::timer::{TickClock, TimerFault, TimerPort};

/// Records every call and lets the test drive elapsed time by hand.
pub struct MockPort {
    clock: TickClock,
    pub running: bool,
    /// The arm ran out and the interrupt has not been serviced yet.
    pub expired: bool,
    pub elapsed: u32,
    pub arms: Vec<u32>,
    pub stops: usize,
    pub idle_waits: usize,
    pub inits: usize,
    pub fail_init: Option<InitError>,
    pub fail_start: Option<TimerFault>,
}

impl MockPort {
    /// 1 kHz, 24-bit counter, 1-tick minimum: one tick per millisecond.
    pub fn new() -> Self {
        Self::with_clock(TickClock::new(1000, 0x00FF_FFFF, 1))
    }

    pub fn with_clock(clock: TickClock) -> Self {
        Self {
            clock,
            running: false,
            expired: false,
            elapsed: 0,
            arms: Vec::new(),
            stops: 0,
            idle_waits: 0,
            inits: 0,
            fail_init: None,
            fail_start: None,
        }
    }

    pub fn last_arm(&self) -> Option<u32> {
        self.arms.last().copied()
    }

    pub fn advance(&mut self, ticks: u32) {
        self.elapsed = self.elapsed.wrapping_add(ticks);
    }

    /// The one-shot ran out: counter stops at the armed count, interrupt
    /// pending. No effect while stopped.
    pub fn expire(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        self.expired = true;
        self.elapsed = self.last_arm().unwrap_or(0);
    }
}

impl TimerPort for MockPort {
    fn clock(&self) -> TickClock {
        self.clock
    }

    fn init(&mut self) -> Result<(), InitError> {
        self.inits += 1;
        match self.fail_init {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn start(&mut self, ticks: u32) -> Result<(), TimerFault> {
        if let Some(fault) = self.fail_start {
            return Err(fault);
        }
        self.running = true;
        self.expired = false;
        self.elapsed = 0;
        self.arms.push(ticks);
        Ok(())
    }

    fn stop(&mut self) {
        self.running = false;
        self.expired = false;
        self.elapsed = 0;
        self.stops += 1;
    }

    fn elapsed_ticks(&self) -> u32 {
        if self.running || self.expired {
            self.elapsed & self.clock.counter_mask
        } else {
            0
        }
    }

    fn idle_wait(&mut self) {
        self.idle_waits += 1;
    }
}
