use std::fmt;
use std::sync::Weak;

use crate::context::AudioContext;
use crate::error::EngineError;

/// Handle a clock uses to pull audio from the context it drives.
pub type RenderTarget = Weak<AudioContext>;

/// State of the platform audio clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockState {
    Suspended,
    Running,
    Closed,
}

impl fmt::Display for ClockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClockState::Suspended => "suspended",
            ClockState::Running => "running",
            ClockState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// The clock that drives rendering. Implementations own the platform state
/// machine (autoplay policy, device start) so the engines never see it.
pub trait AudioClock: Send {
    fn state(&self) -> ClockState;

    /// Try to bring the clock to `Running`. Returns the state reached.
    /// Device-backed clocks render `target` from their callback thread.
    fn resume(&mut self, target: &RenderTarget) -> Result<ClockState, EngineError>;

    fn sample_rate(&self) -> u32;

    /// Keep the device awake while audio plays. Returns false if unsupported.
    fn request_wake_lock(&mut self) -> bool {
        false
    }

    fn close(&mut self) {}
}

/// A clock with no device behind it. Time advances only when the owning
/// context renders, which makes it suitable for tests and file rendering.
#[derive(Debug, Clone)]
pub struct OfflineClock {
    state: ClockState,
    sample_rate: u32,
    allow_resume: bool,
    wake_locks: usize,
}

impl OfflineClock {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            state: ClockState::Suspended,
            sample_rate,
            allow_resume: true,
            wake_locks: 0,
        }
    }

    /// Starts in the running state, as if a user gesture already happened.
    pub fn running(sample_rate: u32) -> Self {
        Self {
            state: ClockState::Running,
            ..Self::new(sample_rate)
        }
    }

    /// A clock that refuses to resume, like a browser blocking autoplay.
    pub fn locked(sample_rate: u32) -> Self {
        Self {
            allow_resume: false,
            ..Self::new(sample_rate)
        }
    }

    pub fn wake_locks(&self) -> usize {
        self.wake_locks
    }
}

impl AudioClock for OfflineClock {
    fn state(&self) -> ClockState {
        self.state
    }

    fn resume(&mut self, _target: &RenderTarget) -> Result<ClockState, EngineError> {
        if self.allow_resume {
            self.state = ClockState::Running;
        }
        Ok(self.state)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn request_wake_lock(&mut self) -> bool {
        self.wake_locks += 1;
        true
    }

    fn close(&mut self) {
        self.state = ClockState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_clock_resumes_from_suspended_and_closed() {
        let mut clock = OfflineClock::new(48_000);
        assert_eq!(clock.state(), ClockState::Suspended);
        assert_eq!(clock.resume(&Weak::new()).unwrap(), ClockState::Running);
        clock.close();
        assert_eq!(clock.state(), ClockState::Closed);
        assert_eq!(clock.resume(&Weak::new()).unwrap(), ClockState::Running);
    }

    #[test]
    fn locked_clock_stays_suspended() {
        let mut clock = OfflineClock::locked(44_100);
        assert_eq!(clock.resume(&Weak::new()).unwrap(), ClockState::Suspended);
    }
}
