//! # Errors
//!
//! Every outcome in the runtime is local and synchronous: a call either
//! succeeds or returns one of the kinds below. The only unrecoverable path
//! is [`Fault`], which is handed to `TimerPort::fatal` and never returns.

use core::fmt;

use crate::timer::TimerFault;

/// The hardware timer could not be brought up. No safe continuation exists
/// without a timer, so callers must treat this as fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InitError {
    /// The timer peripheral could not be created or registered.
    TimerUnavailable,
    /// The tick clock is unusable (zero frequency or empty counter mask).
    ClockMisconfigured,
}

/// Recoverable errors reported by the scheduler, queues and dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Lazy initialisation of the timer port failed.
    Init(InitError),
    /// Owner not attached, or a slot released twice. Rejected without side effects.
    InvalidArgument,
    /// The target event queue is full.
    QueueFull,
    /// Every timeout slot is pending or in flight.
    PoolExhausted,
    /// `MAX_TASKS` tasks are already attached.
    TaskTableFull,
}

impl From<InitError> for Error {
    fn from(err: InitError) -> Self {
        Error::Init(err)
    }
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitError::TimerUnavailable => f.write_str("timer peripheral unavailable"),
            InitError::ClockMisconfigured => f.write_str("tick clock misconfigured"),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Init(err) => write!(f, "timer initialisation failed: {}", err),
            Error::InvalidArgument => f.write_str("invalid argument"),
            Error::QueueFull => f.write_str("event queue full"),
            Error::PoolExhausted => f.write_str("timeout pool exhausted"),
            Error::TaskTableFull => f.write_str("task table full"),
        }
    }
}

/// Unrecoverable hardware driver faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Fault {
    /// The timer refused to (re-)arm after a timeout was accepted.
    Rearm(TimerFault),
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::Rearm(cause) => write!(f, "hardware timer re-arm failed: {:?}", cause),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::string::ToString;

    #[test]
    fn test_init_error_converts() {
        let err: Error = InitError::TimerUnavailable.into();
        assert_eq!(err, Error::Init(InitError::TimerUnavailable));
        assert_eq!(
            err.to_string(),
            "timer initialisation failed: timer peripheral unavailable"
        );
    }

    #[test]
    fn test_fault_display_names_cause() {
        let fault = Fault::Rearm(TimerFault::Rejected);
        assert_eq!(fault.to_string(), "hardware timer re-arm failed: Rejected");
    }
}
