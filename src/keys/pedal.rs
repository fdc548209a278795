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
use std::{fmt, sync::Arc};

use midly::num::u7;
use tracing::debug;

use crate::{
    adc::{AdcSource, Oriented},
    calibration::Bounds,
    midi::{MidiError, Output},
    timing::{Clock, LoopTimer},
};

use super::{Context, Instrument, KeyError};

/// The highest control change value.
const MAX_CONTROL_VALUE: u8 = 127;

/// The control value in the middle of the pedal's travel.
const MID_CONTROL_VALUE: i32 = 64;

/// A binary pedal only switches once its control value is at least this far from the middle.
const SWITCH_DEAD_BAND: i32 = 62;

/// Sustain.
pub const DEFAULT_CONTROL_NUMBER: u8 = 64;

/// A pedal (or any other sensor) sending its position as control changes.
///
/// Continuous pedals send the position, 0 to 127, whenever it changes. Binary pedals act as a
/// switch sending 127 or 0, and only switch near the ends of their travel so noise around the
/// middle can't make them chatter.
pub struct PedalController {
    control_number: u7,
    binary: bool,
    bounds: Bounds,
    source: Oriented,

    key_pos: f64,
    key_speed: f64,
    control_value: u8,
    switch_on: bool,

    clock: Arc<dyn Clock>,
    timer: LoopTimer,
    output: Output,
}

impl PedalController {
    pub fn new(
        source: Box<dyn AdcSource>,
        control_number: u8,
        binary: bool,
        bounds: Bounds,
        context: &Context,
    ) -> Result<PedalController, KeyError> {
        let control_number =
            u7::try_from(control_number).ok_or(KeyError::InvalidControlNumber(control_number))?;
        let mut source = Oriented::new(source, bounds.polarity());
        let key_pos = bounds.position(source.read());

        Ok(PedalController {
            control_number,
            binary,
            bounds,
            source,
            key_pos,
            key_speed: 0.0,
            control_value: 0,
            switch_on: false,
            clock: context.clock().clone(),
            timer: LoopTimer::new(context.clock().as_ref(), context.min_loop_micros()),
            output: context.output().clone(),
        })
    }

    pub fn control_number(&self) -> u7 {
        self.control_number
    }

    pub fn control_value(&self) -> u8 {
        self.control_value
    }

    /// Whether a binary pedal is currently switched on.
    pub fn switch_on(&self) -> bool {
        self.switch_on
    }

    pub fn key_pos(&self) -> f64 {
        self.key_pos
    }

    pub fn key_speed(&self) -> f64 {
        self.key_speed
    }

    fn send(&self, value: u8) -> Result<(), MidiError> {
        debug!(
            control_number = u8::from(self.control_number),
            value, "Control change."
        );
        self.output
            .control_change(self.control_number, u7::from_int_lossy(value))
    }
}

impl Instrument for PedalController {
    fn step(&mut self) -> Result<(), MidiError> {
        let elapsed = self.timer.tick(self.clock.as_ref()) as f64;
        let position = self.bounds.position(self.source.read());
        self.key_speed = (position - self.key_pos) / elapsed;
        self.key_pos = position;

        let last_control_value = self.control_value;
        let scaled = (self.key_pos / self.bounds.range() * f64::from(MAX_CONTROL_VALUE)).round();
        self.control_value = scaled.clamp(0.0, f64::from(MAX_CONTROL_VALUE)) as u8;

        if !self.binary {
            if self.control_value != last_control_value {
                self.send(self.control_value)?;
            }
            return Ok(());
        }

        let offset = i32::from(self.control_value) - MID_CONTROL_VALUE;
        if offset.abs() >= SWITCH_DEAD_BAND && (offset > 0) != self.switch_on {
            self.switch_on = !self.switch_on;
            self.send(if self.switch_on { MAX_CONTROL_VALUE } else { 0 })?;
        }
        Ok(())
    }

    fn log_state(&self) {
        debug!(
            control_number = u8::from(self.control_number),
            key_pos = self.key_pos,
            elapsed = self.timer.elapsed(),
            control_value = self.control_value,
            switch_on = self.switch_on,
            "Pedal state."
        );
    }
}

impl fmt::Display for PedalController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pedal CC {} ({}, adc {} to {})",
            u8::from(self.control_number),
            if self.binary { "binary" } else { "continuous" },
            self.bounds.min_adc(),
            self.bounds.max_adc()
        )
    }
}

#[cfg(test)]
mod test {
    use std::error::Error;

    use midly::{num::u7, MidiMessage};

    use crate::{
        adc::{Constant, Script},
        calibration::Bounds,
        keys::{
            testutil::{context, messages},
            Instrument, KeyError,
        },
    };

    use super::PedalController;

    fn values(messages: Vec<MidiMessage>) -> Vec<u8> {
        messages
            .into_iter()
            .map(|message| match message {
                MidiMessage::Controller { controller, value } => {
                    assert_eq!(u7::from(64), controller);
                    u8::from(value)
                }
                other => panic!("unexpected message {:?}", other),
            })
            .collect()
    }

    #[test]
    fn continuous_pedal_follows_the_position() -> Result<(), Box<dyn Error>> {
        let (context, device) = context();
        let script = Script::ramp(0, 1000, 4, 5).then([1000, 1200, -50]);
        let mut pedal = PedalController::new(
            Box::new(script),
            64,
            false,
            Bounds::new(0, 1000)?,
            &context,
        )?;

        for _ in 0..12 {
            pedal.step()?;
        }
        // Overshooting the bounds clamps, so 1200 sends nothing new.
        assert_eq!(vec![32, 64, 95, 127, 0], values(messages(&device)));
        assert_eq!("Pedal CC 64 (continuous, adc 0 to 1000)", pedal.to_string());
        Ok(())
    }

    #[test]
    fn binary_pedal_ignores_the_dead_band() -> Result<(), Box<dyn Error>> {
        let (context, device) = context();
        let wobble = [480, 520, 470, 530, 500, 490, 515];
        let script = Script::new(wobble.repeat(20)).then([1000, 990, 500, 980, 0, 30, 500, 10]);
        let mut pedal = PedalController::new(
            Box::new(script),
            64,
            true,
            Bounds::new(0, 1000)?,
            &context,
        )?;

        for _ in 0..wobble.len() * 20 - 1 {
            pedal.step()?;
            assert!(!pedal.switch_on());
        }
        assert!(device.events().is_empty());

        for _ in 0..8 {
            pedal.step()?;
        }
        assert_eq!(vec![127, 0], values(messages(&device)));
        assert!(!pedal.switch_on());
        Ok(())
    }

    #[test]
    fn inverted_pedal() -> Result<(), Box<dyn Error>> {
        let (context, device) = context();
        let mut pedal = PedalController::new(
            Box::new(Script::new(vec![1000, 0])),
            64,
            true,
            Bounds::new(1000, 0)?,
            &context,
        )?;
        pedal.step()?;
        assert_eq!(127, pedal.control_value());
        assert_eq!(vec![127], values(messages(&device)));
        Ok(())
    }

    #[test]
    fn invalid_control_number() -> Result<(), Box<dyn Error>> {
        let (context, _) = context();
        let result = PedalController::new(
            Box::new(Constant::new(0)),
            128,
            false,
            Bounds::new(0, 1000)?,
            &context,
        );
        assert!(matches!(result, Err(KeyError::InvalidControlNumber(128))));
        Ok(())
    }
}
