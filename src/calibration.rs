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
use crate::adc::Polarity;

mod calibrator;
mod error;

pub use calibrator::{calibrate, CalibrationPhase, Calibrator, Outcome};
pub use error::CalibrationError;

/// Gravity in metres per microsecond squared.
const GRAVITY_M_PER_US2: f64 = 9.81e-12;

/// Note on fires once the hammer flies this far past the rest position, as a fraction of
/// the key's travel. Past 1.0 because the hammer is airborne beyond the key's end stop.
const NOTE_ON_FRACTION: f64 = 1.2;

/// The key releases the note when it falls below this fraction of its travel.
const NOTE_OFF_FRACTION: f64 = 0.3;

/// The key re-arms once it falls below this fraction of its travel.
const KEY_RESET_FRACTION: f64 = 0.75;

/// Default ADC reading with the key fully pressed.
pub const DEFAULT_MAX_ADC: i32 = 64000;

/// Default ADC reading with the key at rest.
pub const DEFAULT_MIN_ADC: i32 = 0;

/// On a piano, hammer travel is just under 2", say 5cm.
pub const DEFAULT_HAMMER_TRAVEL_MM: f64 = 50.0;

/// Fastest possible key press, in microseconds. Presses this fast or faster map to the
/// highest velocity.
pub const DEFAULT_MIN_PRESS_MICROS: u32 = 15000;

/// The ADC bounds of a sensor, normalized so that pressing the key increases the position.
///
/// When the sensor reads lower values as the key goes down (`max < min`), the bounds are
/// negated and the sensor must be read through an inverting source. Positions are measured
/// from the rest reading, so a key at rest sits at 0 and a fully pressed key at `range`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    min_adc: i32,
    max_adc: i32,
    polarity: Polarity,
    floor: f64,
    range: f64,
}

impl Bounds {
    /// Creates bounds from the rest (`min_adc`) and fully pressed (`max_adc`) readings.
    pub fn new(min_adc: i32, max_adc: i32) -> Result<Bounds, CalibrationError> {
        if min_adc == max_adc {
            return Err(CalibrationError::EmptyRange(min_adc));
        }

        let polarity = if max_adc < min_adc {
            Polarity::Inverted
        } else {
            Polarity::Direct
        };
        let floor = f64::from(polarity.apply(min_adc));
        let range = f64::from(polarity.apply(max_adc)) - floor;

        Ok(Bounds {
            min_adc,
            max_adc,
            polarity,
            floor,
            range,
        })
    }

    /// The configured rest reading.
    pub fn min_adc(&self) -> i32 {
        self.min_adc
    }

    /// The configured fully pressed reading.
    pub fn max_adc(&self) -> i32 {
        self.max_adc
    }

    /// The polarity the sensor has to be read with.
    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    /// The distance between the rest and the fully pressed positions, in ADC units.
    pub fn range(&self) -> f64 {
        self.range
    }

    /// The oriented rest reading.
    pub fn floor(&self) -> f64 {
        self.floor
    }

    /// Converts an oriented reading into a position relative to the rest reading.
    pub fn position(&self, oriented_reading: i32) -> f64 {
        oriented_reading as f64 - self.floor
    }
}

/// The per-key constants derived from the calibration bounds and the physical configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Calibration {
    bounds: Bounds,
    hammer_travel_mm: f64,
    min_press_micros: u32,
    gravity: f64,
    note_on_threshold: f64,
    note_off_threshold: f64,
    key_reset_threshold: f64,
    hammer_speed_multiplier: f64,
}

impl Calibration {
    /// Derives the simulation constants. `map_length` is the size of the velocity table the
    /// hammer speed gets scaled into.
    pub fn new(
        min_adc: i32,
        max_adc: i32,
        hammer_travel_mm: f64,
        min_press_micros: u32,
        map_length: usize,
    ) -> Result<Calibration, CalibrationError> {
        if hammer_travel_mm.is_nan() || hammer_travel_mm <= 0.0 {
            return Err(CalibrationError::NonPositiveTravel(hammer_travel_mm));
        }
        if min_press_micros == 0 {
            return Err(CalibrationError::ZeroPressTime);
        }
        let bounds = Bounds::new(min_adc, max_adc)?;
        let range = bounds.range();

        // Gravity in ADC units per microsecond squared. The configured hammer travel spans
        // the whole ADC range, so the strike dynamics don't depend on the sensor's scale.
        let gravity_mm = GRAVITY_M_PER_US2 * 1000.0;
        let gravity = gravity_mm / hammer_travel_mm * range;

        // A press covering the full range in min_press_micros lands on the top of the table.
        let max_hammer_speed = range / f64::from(min_press_micros);
        let hammer_speed_multiplier = map_length as f64 / max_hammer_speed;

        Ok(Calibration {
            bounds,
            hammer_travel_mm,
            min_press_micros,
            gravity,
            note_on_threshold: range * NOTE_ON_FRACTION,
            note_off_threshold: range * NOTE_OFF_FRACTION,
            key_reset_threshold: range * KEY_RESET_FRACTION,
            hammer_speed_multiplier,
        })
    }

    /// Rederives the constants for new bounds, keeping the physical configuration.
    pub fn with_bounds(
        &self,
        min_adc: i32,
        max_adc: i32,
        map_length: usize,
    ) -> Result<Calibration, CalibrationError> {
        Calibration::new(
            min_adc,
            max_adc,
            self.hammer_travel_mm,
            self.min_press_micros,
            map_length,
        )
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    pub fn hammer_travel_mm(&self) -> f64 {
        self.hammer_travel_mm
    }

    pub fn min_press_micros(&self) -> u32 {
        self.min_press_micros
    }

    /// Gravity acting on the hammer, in position units per microsecond squared.
    pub fn gravity(&self) -> f64 {
        self.gravity
    }

    pub fn note_on_threshold(&self) -> f64 {
        self.note_on_threshold
    }

    pub fn note_off_threshold(&self) -> f64 {
        self.note_off_threshold
    }

    pub fn key_reset_threshold(&self) -> f64 {
        self.key_reset_threshold
    }

    /// Scales a hammer speed into a velocity table index.
    pub fn hammer_speed_multiplier(&self) -> f64 {
        self.hammer_speed_multiplier
    }
}

#[cfg(test)]
mod test {
    use crate::adc::Polarity;
    use crate::velocity::VELOCITY_MAP_LENGTH;

    use super::{Bounds, Calibration, CalibrationError};

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-12 * a.abs().max(b.abs()).max(1.0)
    }

    #[test]
    fn thresholds_are_fractions_of_range() -> Result<(), CalibrationError> {
        let calibration = Calibration::new(1000, 2000, 50.0, 15000, VELOCITY_MAP_LENGTH)?;
        assert!(approx(1200.0, calibration.note_on_threshold()));
        assert!(approx(300.0, calibration.note_off_threshold()));
        assert!(approx(750.0, calibration.key_reset_threshold()));
        assert_eq!(Polarity::Direct, calibration.bounds().polarity());
        assert_eq!(0.0, calibration.bounds().position(1000));
        assert_eq!(1000.0, calibration.bounds().position(2000));
        Ok(())
    }

    #[test]
    fn gravity_scales_with_range_and_travel() -> Result<(), CalibrationError> {
        let narrow = Calibration::new(0, 1000, 50.0, 15000, VELOCITY_MAP_LENGTH)?;
        let wide = Calibration::new(0, 64000, 50.0, 15000, VELOCITY_MAP_LENGTH)?;
        let short = Calibration::new(0, 1000, 25.0, 15000, VELOCITY_MAP_LENGTH)?;

        assert!(approx(9.81e-9 / 50.0 * 1000.0, narrow.gravity()));
        assert!(approx(narrow.gravity() * 64.0, wide.gravity()));
        assert!(approx(narrow.gravity() * 2.0, short.gravity()));
        Ok(())
    }

    #[test]
    fn speed_multiplier_maps_fastest_press_to_table_end() -> Result<(), CalibrationError> {
        let calibration = Calibration::new(0, 64000, 50.0, 16000, VELOCITY_MAP_LENGTH)?;
        let fastest = 64000.0 / 16000.0;
        assert!(approx(
            VELOCITY_MAP_LENGTH as f64,
            fastest * calibration.hammer_speed_multiplier()
        ));
        Ok(())
    }

    #[test]
    fn inverted_bounds() -> Result<(), CalibrationError> {
        let inverted = Calibration::new(1000, 0, 50.0, 15000, VELOCITY_MAP_LENGTH)?;
        let direct = Calibration::new(0, 1000, 50.0, 15000, VELOCITY_MAP_LENGTH)?;

        assert_eq!(Polarity::Inverted, inverted.bounds().polarity());
        assert_eq!(1000.0, inverted.bounds().range());
        // A raw reading of 1000 is at rest, a raw reading of 0 fully pressed.
        assert_eq!(0.0, inverted.bounds().position(Polarity::Inverted.apply(1000)));
        assert_eq!(1000.0, inverted.bounds().position(Polarity::Inverted.apply(0)));

        assert_eq!(direct.gravity(), inverted.gravity());
        assert_eq!(direct.note_on_threshold(), inverted.note_on_threshold());
        assert_eq!(
            direct.hammer_speed_multiplier(),
            inverted.hammer_speed_multiplier()
        );
        Ok(())
    }

    #[test]
    fn recalibration_is_idempotent() -> Result<(), CalibrationError> {
        let original = Calibration::new(100, 900, 40.0, 12000, VELOCITY_MAP_LENGTH)?;
        let restored = original
            .with_bounds(5000, 0, VELOCITY_MAP_LENGTH)?
            .with_bounds(100, 900, VELOCITY_MAP_LENGTH)?;

        assert!(approx(original.gravity(), restored.gravity()));
        assert!(approx(original.note_on_threshold(), restored.note_on_threshold()));
        assert!(approx(original.note_off_threshold(), restored.note_off_threshold()));
        assert!(approx(original.key_reset_threshold(), restored.key_reset_threshold()));
        assert_eq!(original, restored);
        Ok(())
    }

    #[test]
    fn invalid_configuration() {
        assert_eq!(Err(CalibrationError::EmptyRange(5)), Bounds::new(5, 5));
        assert_eq!(
            Err(CalibrationError::NonPositiveTravel(0.0)),
            Calibration::new(0, 10, 0.0, 100, 16)
        );
        assert_eq!(
            Err(CalibrationError::ZeroPressTime),
            Calibration::new(0, 10, 1.0, 0, 16)
        );
    }

    #[test]
    fn bounds_spanning_the_whole_reading_range() -> Result<(), CalibrationError> {
        let direct = Bounds::new(-2_000_000_000, 2_000_000_000)?;
        assert_eq!(4_000_000_000.0, direct.range());
        assert_eq!(4_000_000_000.0, direct.position(2_000_000_000));

        let inverted = Bounds::new(i32::MAX, i32::MIN + 1)?;
        assert_eq!(Polarity::Inverted, inverted.polarity());
        assert_eq!(f64::from(u32::MAX) - 1.0, inverted.range());

        let calibration = Calibration::new(i32::MIN, i32::MAX, 50.0, 15000, VELOCITY_MAP_LENGTH)?;
        assert!(calibration.gravity() > 0.0);
        assert!(calibration.note_on_threshold() > calibration.key_reset_threshold());
        Ok(())
    }
}
