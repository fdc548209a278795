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

use crate::{
    midi::{MidiError, Output},
    timing::{Clock, MIN_LOOP_LEN},
    velocity::VelocityMap,
};

mod bank;
mod error;
mod key;
mod pedal;

pub use bank::KeyBank;
pub use error::KeyError;
pub use key::HammerKey;
pub use pedal::{PedalController, DEFAULT_CONTROL_NUMBER};

/// Something stepped once per loop iteration.
pub trait Instrument: fmt::Display + Send {
    /// Samples the sensors, advances the simulation by the time since the last step and
    /// emits whatever MIDI events the step produced.
    fn step(&mut self) -> Result<(), MidiError>;

    /// Logs the current simulation state at debug level.
    fn log_state(&self);
}

/// Everything the instruments of one rig share: the time base, the MIDI output and the
/// velocity table.
#[derive(Clone)]
pub struct Context {
    clock: Arc<dyn Clock>,
    output: Output,
    velocity_map: Arc<VelocityMap>,
    min_loop_micros: u64,
}

impl Context {
    pub fn new(clock: Arc<dyn Clock>, output: Output) -> Context {
        Context {
            clock,
            output,
            velocity_map: Arc::new(VelocityMap::default()),
            min_loop_micros: MIN_LOOP_LEN,
        }
    }

    /// Overrides the minimum time between two steps of an instrument.
    pub fn with_min_loop_micros(mut self, min_loop_micros: u64) -> Context {
        self.min_loop_micros = min_loop_micros;
        self
    }

    pub fn with_velocity_map(mut self, velocity_map: Arc<VelocityMap>) -> Context {
        self.velocity_map = velocity_map;
        self
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn output(&self) -> &Output {
        &self.output
    }

    pub fn velocity_map(&self) -> &Arc<VelocityMap> {
        &self.velocity_map
    }

    pub fn min_loop_micros(&self) -> u64 {
        self.min_loop_micros
    }
}

/// The simulation state of one key, positions relative to its rest reading.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KeyState {
    pub pitch: u7,
    pub key_pos: f64,
    pub key_speed: f64,
    pub hammer_pos: f64,
    pub hammer_speed: f64,
    pub note_on: bool,
    pub key_armed: bool,
}

/// Validates a MIDI note number.
pub(crate) fn parse_pitch(pitch: u8) -> Result<u7, KeyError> {
    u7::try_from(pitch).ok_or(KeyError::InvalidPitch(pitch))
}


#[cfg(test)]
mod test {
    use midly::num::u7;

    use super::{parse_pitch, KeyError};

    #[test]
    fn pitches() {
        assert!(matches!(parse_pitch(60), Ok(p) if p == u7::from(60)));
        assert!(matches!(parse_pitch(128), Err(KeyError::InvalidPitch(128))));
    }
}
