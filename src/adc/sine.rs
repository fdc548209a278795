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
use std::{f64::consts::TAU, sync::Arc, time::Duration};

use crate::timing::Clock;

use super::AdcSource;

/// A synthetic key that keeps pressing and releasing itself.
///
/// The reading follows a raised cosine between `rest` and `pressed`, starting at rest. Useful
/// for exercising a rig without sensors attached.
pub struct Sine {
    clock: Arc<dyn Clock>,
    origin: Option<u64>,
    rest: i32,
    pressed: i32,
    period_micros: f64,
}

impl Sine {
    pub fn new(clock: Arc<dyn Clock>, rest: i32, pressed: i32, period: Duration) -> Sine {
        Sine {
            clock,
            origin: None,
            rest,
            pressed,
            period_micros: (period.as_micros() as f64).max(1.0),
        }
    }
}

impl AdcSource for Sine {
    fn read(&mut self) -> i32 {
        let now = self.clock.now_micros();
        let origin = *self.origin.get_or_insert(now);
        let phase = (now - origin) as f64 / self.period_micros;
        let depth = (1.0 - (TAU * phase).cos()) / 2.0;
        let rest = f64::from(self.rest);
        (rest + (f64::from(self.pressed) - rest) * depth).round() as i32
    }
}

#[cfg(test)]
mod test {
    use std::{sync::Arc, time::Duration};

    use crate::adc::AdcSource;
    use crate::timing::SteppingClock;

    use super::Sine;

    #[test]
    fn presses_and_releases() {
        // Each read advances a quarter period.
        let clock = Arc::new(SteppingClock::new(250));
        let mut sine = Sine::new(clock, 100, 900, Duration::from_millis(1));

        let readings: Vec<i32> = (0..5).map(|_| sine.read()).collect();
        assert_eq!(vec![100, 500, 900, 500, 100], readings);
    }

    #[test]
    fn inverted_sensor() {
        let clock = Arc::new(SteppingClock::new(500));
        let mut sine = Sine::new(clock, 1000, 0, Duration::from_millis(1));
        assert_eq!(1000, sine.read());
        assert_eq!(0, sine.read());
    }

    #[test]
    fn full_scale_swing() {
        let clock = Arc::new(SteppingClock::new(250));
        let mut sine = Sine::new(clock, -2_000_000_000, 2_000_000_000, Duration::from_millis(1));
        let readings: Vec<i32> = (0..3).map(|_| sine.read()).collect();
        assert_eq!(-2_000_000_000, readings[0]);
        assert!(readings[1].abs() <= 1, "{}", readings[1]);
        assert_eq!(2_000_000_000, readings[2]);
    }
}
