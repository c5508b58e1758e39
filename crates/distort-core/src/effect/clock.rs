use std::cell::Cell;
use std::time::Instant;

use tracing::trace;

use super::mode::Mode;

/// Timestamps in microseconds. Only differences matter.
pub type Ticks = i64;

/// Ticks per phase radian for wave mode.
pub const WAVE_TIME_CONSTANT: f64 = 200_000.0;
/// Ticks per phase radian for ripple mode.
pub const RIPPLE_TIME_CONSTANT: f64 = 100_000.0;

/// Monotonic source of [`Ticks`].
pub trait TimeSource {
    fn now(&self) -> Ticks;
}

/// Wall-clock time since the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicClock {
    fn now(&self) -> Ticks {
        self.origin.elapsed().as_micros() as Ticks
    }
}

/// A clock that only moves when told to, e.g. by stream timestamps.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<Ticks>,
}

impl ManualClock {
    pub fn new(start: Ticks) -> Self {
        Self {
            now: Cell::new(start),
        }
    }

    pub fn set(&self, now: Ticks) {
        self.now.set(now);
    }

    pub fn advance(&self, delta: Ticks) {
        self.now.set(self.now.get() + delta);
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> Ticks {
        self.now.get()
    }
}

impl<T: TimeSource + ?Sized> TimeSource for &T {
    fn now(&self) -> Ticks {
        (**self).now()
    }
}

/// Animation phase of one effect instance.
///
/// The phase is never wrapped; `sin` takes care of periodicity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnimationState {
    pub phase: f64,
    /// Time of the last advance, `None` until the first frame.
    pub last: Option<Ticks>,
}

impl AnimationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the phase to `now` and return how much it changed.
    ///
    /// The first call only records the baseline.
    pub fn advance(&mut self, mode: Mode, now: Ticks) -> f64 {
        let Some(last) = self.last.replace(now) else {
            trace!(now, "animation baseline set");
            return 0.0;
        };

        let before = self.phase;
        match mode {
            Mode::Wave => self.phase += (now - last) as f64 / WAVE_TIME_CONSTANT,
            // Subtracting (last - now) moves the phase forward, same as wave.
            Mode::Ripple => self.phase -= (last - now) as f64 / RIPPLE_TIME_CONSTANT,
        }
        let delta = self.phase - before;
        trace!(%mode, now, phase = self.phase, delta, "animation advanced");
        delta
    }
}
