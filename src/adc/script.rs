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
use super::AdcSource;

/// A sensor that always reads the same value.
#[derive(Clone, Debug)]
pub struct Constant {
    value: i32,
}

impl Constant {
    pub fn new(value: i32) -> Constant {
        Constant { value }
    }
}

impl AdcSource for Constant {
    fn read(&mut self) -> i32 {
        self.value
    }
}

/// Plays back a fixed list of readings, one per read, then holds the last one.
#[derive(Clone, Debug)]
pub struct Script {
    readings: Vec<i32>,
    position: usize,
}

impl Script {
    pub fn new(readings: Vec<i32>) -> Script {
        Script {
            readings,
            position: 0,
        }
    }

    /// A key resting at `from`, then moving linearly to `to` over `steps` reads and staying
    /// there for `hold` reads.
    pub fn ramp(from: i32, to: i32, steps: usize, hold: usize) -> Script {
        let mut readings = Vec::with_capacity(steps + hold + 1);
        readings.push(from);
        for step in 1..=steps {
            let fraction = step as f64 / steps as f64;
            let (from, to) = (f64::from(from), f64::from(to));
            readings.push((from + (to - from) * fraction).round() as i32);
        }
        readings.extend(std::iter::repeat(to).take(hold));
        Script::new(readings)
    }

    /// Appends more readings.
    pub fn then(mut self, readings: impl IntoIterator<Item = i32>) -> Script {
        self.readings.extend(readings);
        self
    }

    /// Whether every scripted reading has been consumed.
    pub fn finished(&self) -> bool {
        self.position >= self.readings.len()
    }
}

impl AdcSource for Script {
    fn read(&mut self) -> i32 {
        match self.readings.get(self.position) {
            Some(reading) => {
                self.position += 1;
                *reading
            }
            None => self.readings.last().copied().unwrap_or_default(),
        }
    }
}
