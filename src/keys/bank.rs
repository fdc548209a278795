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
use tracing::{debug, info};

use crate::{
    adc::{AdcSource, Oriented},
    calibration::Calibration,
    midi::{MidiError, Output},
    timing::{Clock, LoopTimer},
    velocity::VelocityMap,
};

use super::{parse_pitch, Context, Instrument, KeyError, KeyState};

/// Simulates the hammers of any number of keys sharing one time base.
///
/// Every per-key value is kept in its own vector indexed by slot. Each step reads every
/// sensor once, then runs each phase of the simulation over all slots before moving to the
/// next phase, so events from the same step come out in slot order.
///
/// Per slot, the key moves through three states:
/// - armed and idle: the hammer flies freely on top of the key.
/// - sounding: the hammer struck the string and rebounded. The hammer isn't simulated until
///   the key falls back below the reset threshold.
/// - sounding and re-armed: the key fell below the reset threshold but not yet below the
///   note off threshold, so the hammer can strike again before the note is released.
pub struct KeyBank {
    pitches: Vec<u7>,
    sources: Vec<Oriented>,
    calibrations: Vec<Calibration>,

    key_pos: Vec<f64>,
    key_speed: Vec<f64>,
    hammer_pos: Vec<f64>,
    hammer_speed: Vec<f64>,
    note_on: Vec<bool>,
    key_armed: Vec<bool>,

    clock: Arc<dyn Clock>,
    timer: LoopTimer,
    output: Output,
    velocity_map: Arc<VelocityMap>,
}

impl KeyBank {
    /// Creates a bank with one key per source. Every key starts at rest at its first reading
    /// with the hammer resting on it.
    pub fn new(
        sources: Vec<Box<dyn AdcSource>>,
        pitches: Vec<u8>,
        calibration: Calibration,
        context: &Context,
    ) -> Result<KeyBank, KeyError> {
        if sources.len() != pitches.len() {
            return Err(KeyError::MismatchedLengths {
                sources: sources.len(),
                pitches: pitches.len(),
            });
        }
        if sources.is_empty() {
            return Err(KeyError::Empty);
        }
        let pitches = pitches
            .into_iter()
            .map(parse_pitch)
            .collect::<Result<Vec<u7>, KeyError>>()?;

        let polarity = calibration.bounds().polarity();
        let mut sources: Vec<Oriented> = sources
            .into_iter()
            .map(|source| Oriented::new(source, polarity))
            .collect();
        let key_pos: Vec<f64> = sources
            .iter_mut()
            .map(|source| calibration.bounds().position(source.read()))
            .collect();

        let len = sources.len();
        Ok(KeyBank {
            pitches,
            sources,
            calibrations: vec![calibration; len],
            hammer_pos: key_pos.clone(),
            key_pos,
            key_speed: vec![0.0; len],
            hammer_speed: vec![0.0; len],
            note_on: vec![false; len],
            key_armed: vec![true; len],
            clock: context.clock().clone(),
            timer: LoopTimer::new(context.clock().as_ref(), context.min_loop_micros()),
            output: context.output().clone(),
            velocity_map: context.velocity_map().clone(),
        })
    }

    /// The number of keys.
    pub fn len(&self) -> usize {
        self.pitches.len()
    }

    /// Always false, a bank holds at least one key.
    pub fn is_empty(&self) -> bool {
        self.pitches.is_empty()
    }

    pub fn pitches(&self) -> &[u7] {
        &self.pitches
    }

    /// The slot holding the given pitch, if any.
    pub fn slot_of(&self, pitch: u7) -> Option<usize> {
        self.pitches.iter().position(|p| *p == pitch)
    }

    pub fn calibration(&self, slot: usize) -> Option<&Calibration> {
        self.calibrations.get(slot)
    }

    pub(super) fn calibration_at(&self, slot: usize) -> &Calibration {
        &self.calibrations[slot]
    }

    /// The state of the key in the given slot.
    pub fn state(&self, slot: usize) -> Option<KeyState> {
        (slot < self.len()).then(|| self.state_at(slot))
    }

    pub(super) fn state_at(&self, slot: usize) -> KeyState {
        KeyState {
            pitch: self.pitches[slot],
            key_pos: self.key_pos[slot],
            key_speed: self.key_speed[slot],
            hammer_pos: self.hammer_pos[slot],
            hammer_speed: self.hammer_speed[slot],
            note_on: self.note_on[slot],
            key_armed: self.key_armed[slot],
        }
    }

    /// The time between the latest two steps, in microseconds.
    pub fn elapsed(&self) -> u64 {
        self.timer.elapsed()
    }

    /// Replaces the ADC bounds of one key and rederives its constants.
    ///
    /// Positions are shifted onto the new rest reading so a hammer in flight stays in
    /// flight. If the sensor polarity flips, the key is reseeded at rest from a fresh reading.
    pub fn recalibrate(&mut self, slot: usize, min_adc: i32, max_adc: i32) -> Result<(), KeyError> {
        let len = self.len();
        let current = self
            .calibrations
            .get(slot)
            .ok_or(KeyError::NoSuchSlot { slot, len })?;
        let calibration = current.with_bounds(min_adc, max_adc, self.velocity_map.len())?;
        let (old, new) = (current.bounds(), calibration.bounds());

        if old.polarity() == new.polarity() {
            let shift = old.floor() - new.floor();
            self.key_pos[slot] += shift;
            self.hammer_pos[slot] += shift;
        } else {
            let source = self.sources.remove(slot).reorient(new.polarity());
            self.sources.insert(slot, source);

            let position = new.position(self.sources[slot].read());
            self.key_pos[slot] = position;
            self.key_speed[slot] = 0.0;
            self.hammer_pos[slot] = position;
            self.hammer_speed[slot] = 0.0;
        }

        info!(
            pitch = u8::from(self.pitches[slot]),
            min_adc,
            max_adc,
            polarity = %new.polarity(),
            "Recalibrated key."
        );
        self.calibrations[slot] = calibration;
        Ok(())
    }

    /// Reads every sensor and updates the key positions and speeds.
    fn update_keys(&mut self, elapsed: f64) {
        for slot in 0..self.len() {
            let reading = self.sources[slot].read();
            let position = self.calibrations[slot].bounds().position(reading);
            self.key_speed[slot] = (position - self.key_pos[slot]) / elapsed;
            self.key_pos[slot] = position;
        }
    }

    /// Moves the armed hammers under gravity, with the key as their floor.
    fn update_hammers(&mut self, elapsed: f64) {
        for slot in 0..self.len() {
            if !self.key_armed[slot] {
                continue;
            }

            let gravity = self.calibrations[slot].gravity();
            let speed = self.hammer_speed[slot];
            let new_speed = speed - gravity * elapsed;
            self.hammer_pos[slot] += (new_speed + speed) / 2.0 * elapsed;
            self.hammer_speed[slot] = new_speed;

            if self.hammer_pos[slot] < self.key_pos[slot] {
                self.hammer_pos[slot] = self.key_pos[slot];
                // The key catches the hammer and throws it.
                if self.hammer_speed[slot] < self.key_speed[slot] {
                    self.hammer_speed[slot] = self.key_speed[slot];
                }
            }
        }
    }

    /// Fires a note for every armed hammer that reached the string. Every slot is updated even
    /// if a send fails; the first failure is returned.
    fn check_note_on(&mut self) -> Result<(), MidiError> {
        let mut result = Ok(());
        for slot in 0..self.len() {
            let calibration = &self.calibrations[slot];
            if !self.key_armed[slot] || self.hammer_pos[slot] <= calibration.note_on_threshold() {
                continue;
            }

            let pitch = self.pitches[slot];
            let speed = self.hammer_speed[slot];
            let index = VelocityMap::index(speed, calibration.hammer_speed_multiplier());
            let velocity = self.velocity_map.velocity(index);
            let repeated = self.note_on[slot];

            self.note_on[slot] = true;
            self.hammer_pos[slot] = calibration.key_reset_threshold();
            self.hammer_speed[slot] = -speed;
            self.key_armed[slot] = false;

            // A repeated strike releases the note still sounding first.
            if repeated {
                debug!(pitch = u8::from(pitch), "Note off (repeated strike).");
                result = result.and(self.output.note_off(pitch));
            }
            debug!(
                pitch = u8::from(pitch),
                hammer_speed = speed,
                index,
                velocity = u8::from(velocity),
                "Note on."
            );
            result = result.and(self.output.note_on(pitch, velocity));
        }
        result
    }

    /// Re-arms keys that fell below the reset threshold and releases keys below the note off
    /// threshold. Like [KeyBank::check_note_on], a failed send doesn't stop the other slots.
    fn check_note_off(&mut self) -> Result<(), MidiError> {
        let mut result = Ok(());
        for slot in 0..self.len() {
            if !self.note_on[slot] {
                continue;
            }

            let calibration = &self.calibrations[slot];
            if !self.key_armed[slot] && self.key_pos[slot] < calibration.key_reset_threshold() {
                self.key_armed[slot] = true;
            }
            if self.key_pos[slot] < calibration.note_off_threshold() {
                let pitch = self.pitches[slot];
                self.note_on[slot] = false;
                debug!(pitch = u8::from(pitch), "Note off.");
                result = result.and(self.output.note_off(pitch));
            }
        }
        result
    }

    /// Disarmed hammers aren't simulated, but still can't sink into their key.
    fn rest_disarmed_hammers(&mut self) {
        for slot in 0..self.len() {
            if !self.key_armed[slot] && self.hammer_pos[slot] < self.key_pos[slot] {
                self.hammer_pos[slot] = self.key_pos[slot];
            }
        }
    }
}

impl Instrument for KeyBank {
    fn step(&mut self) -> Result<(), MidiError> {
        let elapsed = self.timer.tick(self.clock.as_ref()) as f64;
        self.update_keys(elapsed);
        self.update_hammers(elapsed);
        let note_on = self.check_note_on();
        let note_off = self.check_note_off();
        self.rest_disarmed_hammers();
        note_on.and(note_off)
    }

    fn log_state(&self) {
        for slot in 0..self.len() {
            debug!(
                pitch = u8::from(self.pitches[slot]),
                key_pos = self.key_pos[slot],
                elapsed = self.timer.elapsed(),
                hammer_pos = self.hammer_pos[slot],
                hammer_speed = self.hammer_speed[slot],
                note_on = self.note_on[slot],
                key_armed = self.key_armed[slot],
                "Key state."
            );
        }
    }
}

impl fmt::Display for KeyBank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pitches = self
            .pitches
            .iter()
            .map(|p| u8::from(*p).to_string())
            .collect::<Vec<String>>()
            .join(", ");
        write!(f, "Key bank ({} keys: {})", self.len(), pitches)
    }
}
