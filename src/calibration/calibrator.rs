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
use std::time::Duration;

use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::{debug, info, span, Level};

use crate::adc::AdcSource;
use crate::timing::{Clock, LoopTimer};

use super::Bounds;

/// The number of readings kept for each phase.
const RESERVOIR_CAPACITY: usize = 1000;

/// Readings further than this many standard deviations from the rest mean count as presses.
const PRESS_DEVIATIONS: f64 = 3.0;

/// The press mean must be this many rest standard deviations away from the rest mean for the
/// fully pressed bound to be replaced.
const MIN_SEPARATION_DEVIATIONS: f64 = 50.0;

/// The phase of a calibration run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CalibrationPhase {
    /// The key is left alone so the rest reading and its noise can be measured.
    Rest,
    /// The key is pressed repeatedly; only readings clear of the rest noise are kept.
    Press,
}

/// The bounds produced by a calibration run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Outcome {
    pub min_adc: i32,
    pub max_adc: i32,
    /// Whether the press phase saw readings far enough from rest to replace `max_adc`.
    pub press_detected: bool,
}

/// Measures the rest and fully pressed readings of a key.
pub struct Calibrator {
    phase: CalibrationPhase,
    rest_duration: Duration,
    started_at: Option<u64>,
    reservoir: Vec<i32>,
    seen: usize,
    rest_mean: f64,
    rest_std: f64,
    rng: StdRng,
}

impl Calibrator {
    /// Creates a calibrator that spends `rest_duration` measuring the key at rest.
    pub fn new(rest_duration: Duration) -> Calibrator {
        Calibrator::with_rng(rest_duration, StdRng::from_entropy())
    }

    fn with_rng(rest_duration: Duration, rng: StdRng) -> Calibrator {
        Calibrator {
            phase: CalibrationPhase::Rest,
            rest_duration,
            started_at: None,
            reservoir: Vec::with_capacity(RESERVOIR_CAPACITY),
            seen: 0,
            rest_mean: 0.0,
            rest_std: 0.0,
            rng,
        }
    }

    pub fn phase(&self) -> CalibrationPhase {
        self.phase
    }

    /// Feeds a raw reading taken at `now_micros`.
    pub fn sample(&mut self, reading: i32, now_micros: u64) {
        match self.phase {
            CalibrationPhase::Rest => {
                let started_at = *self.started_at.get_or_insert(now_micros);
                self.keep(reading);

                let elapsed = Duration::from_micros(now_micros.saturating_sub(started_at));
                if elapsed > self.rest_duration {
                    let (mean, std) = mean_and_std(&self.reservoir);
                    self.rest_mean = mean;
                    self.rest_std = std;
                    debug!(mean, std, samples = self.seen, "Rest phase finished.");

                    self.phase = CalibrationPhase::Press;
                    self.reservoir.clear();
                    self.seen = 0;
                }
            }
            CalibrationPhase::Press => {
                let deviation = (f64::from(reading) - self.rest_mean).abs();
                if deviation > PRESS_DEVIATIONS * self.rest_std {
                    self.keep(reading);
                }
            }
        }
    }

    /// Reservoir sampling, so long runs keep a uniform subset of their readings.
    fn keep(&mut self, reading: i32) {
        if self.reservoir.len() < RESERVOIR_CAPACITY {
            self.reservoir.push(reading);
        } else {
            let slot = self.rng.gen_range(0..=self.seen);
            if slot < RESERVOIR_CAPACITY {
                self.reservoir[slot] = reading;
            }
        }
        self.seen += 1;
    }

    /// Finishes the run. Returns None if the rest phase never completed.
    pub fn finish(&self, current: &Bounds) -> Option<Outcome> {
        if self.phase == CalibrationPhase::Rest {
            return None;
        }

        let min_adc = self.rest_mean.round() as i32;
        if self.reservoir.is_empty() {
            return Some(Outcome {
                min_adc,
                max_adc: current.max_adc(),
                press_detected: false,
            });
        }

        let (press_mean, _) = mean_and_std(&self.reservoir);
        if (self.rest_mean - press_mean).abs() > MIN_SEPARATION_DEVIATIONS * self.rest_std {
            Some(Outcome {
                min_adc,
                max_adc: press_mean.round() as i32,
                press_detected: true,
            })
        } else {
            Some(Outcome {
                min_adc,
                max_adc: current.max_adc(),
                press_detected: false,
            })
        }
    }
}

/// Mean and population standard deviation.
fn mean_and_std(values: &[i32]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().map(|v| f64::from(*v)).sum::<f64>() / n;
    let variance = values
        .iter()
        .map(|v| (f64::from(*v) - mean).powi(2))
        .sum::<f64>()
        / n;
    (mean, variance.sqrt())
}

/// Runs a full calibration against a source: `rest` with the key untouched, then `press`
/// while the player presses the key a few times.
pub fn calibrate(
    source: &mut dyn AdcSource,
    clock: &dyn Clock,
    timer: &mut LoopTimer,
    rest: Duration,
    press: Duration,
    current: &Bounds,
) -> Option<Outcome> {
    let span = span!(Level::INFO, "calibrate");
    let _enter = span.enter();

    let mut calibrator = Calibrator::new(rest);
    info!(rest = ?rest, "Leave the key at rest.");

    let started_at = timer.timestamp();
    let mut announced = false;
    loop {
        timer.tick(clock);
        calibrator.sample(source.read(), timer.timestamp());

        if calibrator.phase() == CalibrationPhase::Press {
            if !announced {
                info!(press = ?press, "Press the key fully a few times.");
                announced = true;
            }
            let total = Duration::from_micros(timer.timestamp().saturating_sub(started_at));
            if total > rest + press {
                break;
            }
        }
    }

    let outcome = calibrator.finish(current);
    if let Some(outcome) = outcome {
        info!(
            min_adc = outcome.min_adc,
            max_adc = outcome.max_adc,
            press_detected = outcome.press_detected,
            "Calibration finished."
        );
    }
    outcome
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use rand::{rngs::StdRng, SeedableRng};

    use crate::adc::Script;
    use crate::calibration::{Bounds, CalibrationError};
    use crate::timing::{LoopTimer, SteppingClock};

    use super::{calibrate, mean_and_std, CalibrationPhase, Calibrator, Outcome};

    fn calibrator() -> Calibrator {
        Calibrator::with_rng(Duration::from_millis(10), StdRng::seed_from_u64(7))
    }

    #[test]
    fn stats() {
        assert_eq!((0.0, 0.0), mean_and_std(&[]));
        let (mean, std) = mean_and_std(&[2, 4, 4, 4, 5, 5, 7, 9]);
        assert_eq!(5.0, mean);
        assert_eq!(2.0, std);
    }

    #[test]
    fn finishing_before_rest_completes() -> Result<(), CalibrationError> {
        let mut calibrator = calibrator();
        calibrator.sample(100, 0);
        calibrator.sample(100, 5_000);
        assert_eq!(CalibrationPhase::Rest, calibrator.phase());
        assert_eq!(None, calibrator.finish(&Bounds::new(0, 1000)?));
        Ok(())
    }

    #[test]
    fn measures_both_bounds() -> Result<(), CalibrationError> {
        let mut calibrator = calibrator();
        let mut now = 0;
        for i in 0..200 {
            calibrator.sample(100 + (i % 3) - 1, now);
            now += 100;
        }
        assert_eq!(CalibrationPhase::Press, calibrator.phase());

        // Noise near rest is ignored, presses are kept.
        for i in 0..2000 {
            let reading = if i % 2 == 0 { 101 } else { 3000 };
            calibrator.sample(reading, now);
            now += 100;
        }

        let outcome = calibrator.finish(&Bounds::new(0, 1000)?);
        assert_eq!(
            Some(Outcome {
                min_adc: 100,
                max_adc: 3000,
                press_detected: true
            }),
            outcome
        );
        Ok(())
    }

    #[test]
    fn keeps_max_without_a_clear_press() -> Result<(), CalibrationError> {
        let mut calibrator = calibrator();
        let mut now = 0;
        for i in 0..200 {
            calibrator.sample(if i % 2 == 0 { 90 } else { 110 }, now);
            now += 100;
        }
        // Beyond three deviations but not fifty.
        for _ in 0..10 {
            calibrator.sample(150, now);
            now += 100;
        }

        let outcome = calibrator.finish(&Bounds::new(0, 1000)?);
        assert_eq!(
            Some(Outcome {
                min_adc: 100,
                max_adc: 1000,
                press_detected: false
            }),
            outcome
        );
        Ok(())
    }

    #[test]
    fn calibrate_against_a_source() -> Result<(), CalibrationError> {
        let mut readings = vec![500; 30];
        readings.extend([500, 900, 1500, 2000, 2000, 1500, 900, 500].repeat(5));
        let mut source = Script::new(readings);
        let clock = SteppingClock::new(1000);
        let mut timer = LoopTimer::new(&clock, 100);

        let outcome = calibrate(
            &mut source,
            &clock,
            &mut timer,
            Duration::from_millis(20),
            Duration::from_millis(40),
            &Bounds::new(0, 1000)?,
        );

        let outcome = outcome.expect("expected an outcome");
        assert_eq!(500, outcome.min_adc);
        assert!(outcome.press_detected);
        assert!(outcome.max_adc > 1000);
        Ok(())
    }
}
