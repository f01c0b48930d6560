//! # Reactick Example Firmware
//!
//! Two reactive tasks on an STM32F401 (Nucleo-F401RE) sharing one SysTick
//! one-shot timer:
//!
//! | Task | Timeouts | Behavior |
//! |------|----------|----------|
//! | `Blinker` | `TOGGLE` | Toggles the user LED (PA5) every 500 ms, every 100 ms once the battery is low |
//! | `BatteryPoller` | `POLL` | Samples the battery every 2 s, raises `LOW_BATTERY` below 3.3 V |
//!
//! ## Flow
//!
//! ```text
//!   SysTick ──► RUNTIME.on_hardware_timeout() ──► standard queue
//!                                                      │
//!   main ──► Dispatcher::run(false) ◄──────────────────┘
//!               ├─► Blinker        (TOGGLE → LED, re-schedule)
//!               └─► BatteryPoller  (POLL → sample, maybe LOW_BATTERY)
//!                        └─► push_critical_event(LOW_BATTERY → Blinker)
//! ```
//!
//! The battery is simulated: each sample reads 40 mV lower than the last.

#![no_std]
#![no_main]

use cortex_m_rt::{entry, exception};
use panic_halt as _;

use reactick::arch::cortex_m4::SysTickPort;
use cortex_m::peripheral::SCB;
use reactick::{
    Context, Dispatcher, Error, Event, EventKind, EventStatus, Reactive, Runtime, TaskId,
};

static RUNTIME: Runtime<SysTickPort> = Runtime::new(SysTickPort::new());

// Timeout ids (per task)
const TOGGLE: u8 = 0;
const POLL: u8 = 0;

// Signals
const LOW_BATTERY: u8 = 1;

// ---------------------------------------------------------------------------
// LED (PA5)
// ---------------------------------------------------------------------------

const RCC_AHB1ENR: *mut u32 = 0x4002_3830 as *mut u32;
const GPIOA_MODER: *mut u32 = 0x4002_0000 as *mut u32;
const GPIOA_ODR: *mut u32 = 0x4002_0014 as *mut u32;
const LED_PIN: u32 = 5;

fn led_init() {
    unsafe {
        let en = core::ptr::read_volatile(RCC_AHB1ENR);
        core::ptr::write_volatile(RCC_AHB1ENR, en | 1);
        let moder = core::ptr::read_volatile(GPIOA_MODER);
        let moder = (moder & !(0b11 << (LED_PIN * 2))) | (0b01 << (LED_PIN * 2));
        core::ptr::write_volatile(GPIOA_MODER, moder);
    }
}

fn led_toggle() {
    unsafe {
        let odr = core::ptr::read_volatile(GPIOA_ODR);
        core::ptr::write_volatile(GPIOA_ODR, odr ^ (1 << LED_PIN));
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// Both tasks live off their own timeout. One that fails to re-arm would go
/// silent, so stop the loop and let `main` reset the board.
fn keep_running(armed: Result<(), Error>) -> EventStatus {
    match armed {
        Ok(()) => EventStatus::Consumed,
        Err(_) => EventStatus::Terminate,
    }
}

/// Periodic LED toggler. Speeds up when told the battery is low.
struct Blinker {
    period_ms: u32,
}

impl Reactive for Blinker {
    fn process_event(&mut self, event: &Event, cx: &mut Context<'_>) -> EventStatus {
        match event.kind {
            EventKind::Initial => {
                led_init();
                keep_running(cx.schedule(TOGGLE, self.period_ms))
            }
            EventKind::Timeout if event.id == TOGGLE => {
                led_toggle();
                keep_running(cx.schedule(TOGGLE, self.period_ms))
            }
            EventKind::Signal if event.id == LOW_BATTERY && self.period_ms != 100 => {
                self.period_ms = 100;
                // Restart with the new period right away
                let period_ms = self.period_ms;
                keep_running(cx.unschedule(TOGGLE).and_then(|()| cx.schedule(TOGGLE, period_ms)))
            }
            _ => EventStatus::Consumed,
        }
    }
}

/// Samples the (simulated) battery and warns the blinker once it drops
/// below the threshold.
struct BatteryPoller {
    blinker: TaskId,
    millivolts: u32,
    warned: bool,
}

impl BatteryPoller {
    const INTERVAL_MS: u32 = 2_000;
    const LOW_MV: u32 = 3_300;

    fn sample(&mut self) -> u32 {
        self.millivolts = self.millivolts.saturating_sub(40);
        self.millivolts
    }
}

impl Reactive for BatteryPoller {
    fn process_event(&mut self, event: &Event, cx: &mut Context<'_>) -> EventStatus {
        match event.kind {
            EventKind::Initial => keep_running(cx.schedule(POLL, Self::INTERVAL_MS)),
            EventKind::Timeout if event.id == POLL => {
                if self.sample() < Self::LOW_MV && !self.warned {
                    // A full queue leaves `warned` clear; the next poll retries.
                    self.warned = cx
                        .push_critical_event(Event::signal(LOW_BATTERY, self.blinker))
                        .is_ok();
                }
                keep_running(cx.schedule(POLL, Self::INTERVAL_MS))
            }
            _ => EventStatus::Consumed,
        }
    }
}

// ---------------------------------------------------------------------------
// Interrupts
// ---------------------------------------------------------------------------

#[exception]
fn SysTick() {
    // A full queue is retried by the scheduler on the next expiry.
    let _ = RUNTIME.on_hardware_timeout();
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

/// Firmware entry point. Brings the timer up, attaches the tasks and runs
/// the dispatcher. Resets the core if a task stops the loop.
#[entry]
fn main() -> ! {
    RUNTIME.init().expect("SysTick unavailable");

    let mut blinker = Blinker { period_ms: 500 };
    // Declared ahead of the dispatcher, which borrows it.
    let mut poller: BatteryPoller;
    let mut dispatcher = Dispatcher::new(&RUNTIME);
    let blinker_id = dispatcher
        .attach(&mut blinker)
        .expect("Failed to attach blinker");

    poller = BatteryPoller {
        blinker: blinker_id,
        millivolts: 3_700,
        warned: false,
    };
    dispatcher
        .attach(&mut poller)
        .expect("Failed to attach battery poller");

    // Blocking mode returns only when a task could not re-arm its timeout.
    dispatcher.run(false);
    SCB::sys_reset()
}
