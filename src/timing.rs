// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::sync::atomic::{AtomicU64, Ordering};

/// The minimum time between two samples of the same sensor, in microseconds. Sampling faster
/// than this only adds noise to the speed estimates.
pub const MIN_LOOP_LEN: u64 = 100;

/// A monotonic microsecond clock.
pub trait Clock: Send + Sync {
    /// Microseconds since an arbitrary, fixed origin.
    fn now_micros(&self) -> u64;
}

/// The system's monotonic clock.
#[cfg(not(feature = "quanta"))]
pub struct MonotonicClock {
    origin: std::time::Instant,
}

#[cfg(not(feature = "quanta"))]
impl MonotonicClock {
    pub fn new() -> MonotonicClock {
        MonotonicClock {
            origin: std::time::Instant::now(),
        }
    }
}

#[cfg(not(feature = "quanta"))]
impl Clock for MonotonicClock {
    fn now_micros(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }
}

/// The system's monotonic clock, read through the TSC.
#[cfg(feature = "quanta")]
pub struct MonotonicClock {
    clock: quanta::Clock,
    origin: quanta::Instant,
}

#[cfg(feature = "quanta")]
impl MonotonicClock {
    pub fn new() -> MonotonicClock {
        let clock = quanta::Clock::new();
        let origin = clock.now();
        MonotonicClock { clock, origin }
    }
}

#[cfg(feature = "quanta")]
impl Clock for MonotonicClock {
    fn now_micros(&self) -> u64 {
        self.clock.now().duration_since(self.origin).as_micros() as u64
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        MonotonicClock::new()
    }
}

/// A simulated clock that moves forward by a fixed step every time it's read.
///
/// Every reader pushes it forward, so it only gives a fixed interval per step to a single
/// reader. Tests driving one instrument use it.
pub struct SteppingClock {
    now: AtomicU64,
    step: u64,
}

impl SteppingClock {
    pub fn new(step_micros: u64) -> SteppingClock {
        SteppingClock {
            now: AtomicU64::new(0),
            step: step_micros.max(1),
        }
    }
}

impl Clock for SteppingClock {
    fn now_micros(&self) -> u64 {
        self.now.fetch_add(self.step, Ordering::Relaxed)
    }
}

/// A simulated clock that only moves when told to.
///
/// Drives offline runs over recorded data: the engine advances it once per loop iteration,
/// so every instrument and source sees the same interval regardless of how fast the host is
/// or how often the clock is read.
#[derive(Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new() -> ManualClock {
        ManualClock::default()
    }

    pub fn advance(&self, micros: u64) {
        self.now.fetch_add(micros, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now_micros(&self) -> u64 {
        self.now.load(Ordering::Relaxed)
    }
}

/// Tracks the time between simulation steps.
#[derive(Clone, Debug)]
pub struct LoopTimer {
    timestamp: u64,
    elapsed: u64,
    min_loop_micros: u64,
}

impl LoopTimer {
    /// Starts timing from now. `min_loop_micros` is raised to 1 so that elapsed time is never
    /// zero.
    pub fn new(clock: &dyn Clock, min_loop_micros: u64) -> LoopTimer {
        LoopTimer {
            timestamp: clock.now_micros(),
            elapsed: 0,
            min_loop_micros: min_loop_micros.max(1),
        }
    }

    /// Spins until at least the minimum loop length has passed since the previous tick and
    /// returns the elapsed time. Never sleeps: the elapsed time feeds the physics directly and
    /// a sleep may overshoot.
    pub fn tick(&mut self, clock: &dyn Clock) -> u64 {
        let last = self.timestamp;
        let mut now = clock.now_micros();
        while now.saturating_sub(last) < self.min_loop_micros {
            std::hint::spin_loop();
            now = clock.now_micros();
        }
        self.elapsed = now - last;
        self.timestamp = now;
        self.elapsed
    }

    /// The time of the latest tick.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// The time between the latest two ticks.
    pub fn elapsed(&self) -> u64 {
        self.elapsed
    }

    pub fn min_loop_micros(&self) -> u64 {
        self.min_loop_micros
    }
}
