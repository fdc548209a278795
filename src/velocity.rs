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
use midly::num::u7;

/// The number of entries in the default velocity table.
pub const VELOCITY_MAP_LENGTH: usize = 1024;

/// The logarithm base used to stretch the velocity ramp.
const LOG_BASE: f64 = 10.0;

/// The highest MIDI velocity.
const MAX_VELOCITY: u8 = 127;

/// Applies log scaling to a speed index `s` relative to a map of `map_length` entries.
pub fn log_speed(s: f64, map_length: usize, base: f64) -> f64 {
    let log_multiplier = (s / map_length as f64 * (base - 1.0) + 1.0).log(base);
    (s * log_multiplier).round()
}

/// A precomputed lookup table from a scaled hammer impact speed to a MIDI velocity.
///
/// The table is non-decreasing and every entry is in [1, 127], so any positive impact
/// produces an audible note.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VelocityMap {
    velocities: Vec<u7>,
}

impl VelocityMap {
    /// Builds a velocity map with `map_length` entries.
    pub fn build(map_length: usize) -> VelocityMap {
        let map_length = map_length.max(1);
        let top = log_speed(map_length as f64, map_length, LOG_BASE);

        let velocities = (0..map_length)
            .map(|i| {
                let velocity = (i as f64 / top * f64::from(MAX_VELOCITY)).round();
                let velocity = velocity.clamp(1.0, f64::from(MAX_VELOCITY)) as u8;
                u7::from_int_lossy(velocity)
            })
            .collect();

        VelocityMap { velocities }
    }

    /// The number of entries in the table.
    pub fn len(&self) -> usize {
        self.velocities.len()
    }

    /// Always false, a map holds at least one entry.
    pub fn is_empty(&self) -> bool {
        self.velocities.is_empty()
    }

    /// Looks up the velocity for the given scaled speed. Out of range indices are clamped.
    pub fn velocity(&self, scaled_speed: i64) -> u7 {
        let index = scaled_speed.clamp(0, self.velocities.len() as i64 - 1) as usize;
        self.velocities[index]
    }

    /// Converts a hammer speed to a table index using the given multiplier.
    pub fn index(hammer_speed: f64, multiplier: f64) -> i64 {
        (hammer_speed * multiplier).round() as i64
    }

    /// Iterates over the table entries in index order.
    pub fn iter(&self) -> impl Iterator<Item = u7> + '_ {
        self.velocities.iter().copied()
    }
}

impl Default for VelocityMap {
    fn default() -> Self {
        VelocityMap::build(VELOCITY_MAP_LENGTH)
    }
}

#[cfg(test)]
mod test {
    use midly::num::u7;

    use super::{log_speed, VelocityMap, VELOCITY_MAP_LENGTH};

    #[test]
    fn table_is_monotonic_and_bounded() {
        let map = VelocityMap::default();
        assert_eq!(VELOCITY_MAP_LENGTH, map.len());

        let velocities: Vec<u8> = map.iter().map(u8::from).collect();
        for pair in velocities.windows(2) {
            assert!(pair[0] <= pair[1], "{} > {}", pair[0], pair[1]);
        }
        assert!(velocities.iter().all(|v| (1..=127).contains(v)));
        assert_eq!(1, velocities[0]);
        assert_eq!(127, velocities[VELOCITY_MAP_LENGTH - 1]);
    }

    #[test]
    fn lookup_clamps_out_of_range_indices() {
        let map = VelocityMap::default();
        assert_eq!(u7::from(1), map.velocity(-500));
        assert_eq!(u7::from(127), map.velocity(1_000_000));
        assert_eq!(u7::from(64), map.velocity(512));
        assert_eq!(u7::from(64), map.velocity(516));
    }

    #[test]
    fn log_speed_is_identity_at_full_scale() {
        assert_eq!(1024.0, log_speed(1024.0, 1024, 10.0));
        assert_eq!(0.0, log_speed(0.0, 1024, 10.0));
        assert!(log_speed(512.0, 1024, 10.0) < 512.0);
    }

    #[test]
    fn index_rounds() {
        assert_eq!(3, VelocityMap::index(0.25, 10.0));
        assert_eq!(-3, VelocityMap::index(-0.25, 10.0));
    }

    #[test]
    fn tiny_maps() {
        let map = VelocityMap::build(1);
        assert_eq!(1, map.len());
        assert_eq!(u7::from(1), map.velocity(10));
    }
}
