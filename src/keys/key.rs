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
use std::fmt;

use crate::{adc::AdcSource, calibration::Calibration, midi::MidiError};

use super::{Context, Instrument, KeyBank, KeyError, KeyState};

/// A single key and its hammer.
pub struct HammerKey {
    bank: KeyBank,
}

impl HammerKey {
    pub fn new(
        source: Box<dyn AdcSource>,
        pitch: u8,
        calibration: Calibration,
        context: &Context,
    ) -> Result<HammerKey, KeyError> {
        Ok(HammerKey {
            bank: KeyBank::new(vec![source], vec![pitch], calibration, context)?,
        })
    }

    pub fn state(&self) -> KeyState {
        self.bank.state_at(0)
    }

    pub fn calibration(&self) -> &Calibration {
        self.bank.calibration_at(0)
    }

    pub fn elapsed(&self) -> u64 {
        self.bank.elapsed()
    }

    /// Replaces the ADC bounds of the key.
    pub fn recalibrate(&mut self, min_adc: i32, max_adc: i32) -> Result<(), KeyError> {
        self.bank.recalibrate(0, min_adc, max_adc)
    }
}

impl Instrument for HammerKey {
    fn step(&mut self) -> Result<(), MidiError> {
        self.bank.step()
    }

    fn log_state(&self) {
        self.bank.log_state()
    }
}

impl fmt::Display for HammerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bounds = self.calibration().bounds();
        write!(
            f,
            "Key {} (adc {} to {}, {})",
            u8::from(self.state().pitch),
            bounds.min_adc(),
            bounds.max_adc(),
            bounds.polarity()
        )
    }
}

#[cfg(test)]
mod test {
    use std::error::Error;

    use midly::{num::u7, MidiMessage};

    use crate::{
        adc::{AdcSource, Constant, Script},
        calibration::Calibration,
        keys::{
            testutil::{context, messages},
            Instrument,
        },
        midi::MockDevice,
        velocity::VELOCITY_MAP_LENGTH,
    };

    use super::HammerKey;

    fn key(readings: Script, min_adc: i32, max_adc: i32) -> (HammerKey, MockDevice) {
        let (context, device) = context();
        let calibration =
            Calibration::new(min_adc, max_adc, 50.0, 15000, VELOCITY_MAP_LENGTH).unwrap();
        let key = HammerKey::new(Box::new(readings), 60, calibration, &context).unwrap();
        (key, device)
    }

    /// Presses fully, backs off to half way, strikes again, then releases.
    fn repeated_strike() -> Script {
        Script::ramp(0, 1000, 20, 10)
            .then([900, 800, 700, 600, 500])
            .then([500; 20])
            .then([600, 700, 800, 900, 1000])
            .then([1000; 10])
            .then([800, 600, 400, 200, 0])
            .then([0; 10])
    }

    #[test]
    fn key_at_rest_never_plays() -> Result<(), Box<dyn Error>> {
        let (context, device) = context();
        let calibration = Calibration::new(0, 1000, 50.0, 15000, VELOCITY_MAP_LENGTH)?;
        let mut key = HammerKey::new(Box::new(Constant::new(0)), 60, calibration, &context)?;

        for _ in 0..1000 {
            key.step()?;
            let state = key.state();
            assert_eq!(0.0, state.key_pos);
            assert_eq!(0.0, state.hammer_pos);
            assert!(state.key_armed);
        }
        assert!(device.events().is_empty());
        Ok(())
    }

    #[test]
    fn fastest_press_plays_loudest() -> Result<(), Box<dyn Error>> {
        // The full range covered in exactly the minimum press time, 150 steps of 100us.
        let (mut key, device) = key(Script::ramp(0, 64000, 150, 100), 0, 64000);
        for _ in 0..250 {
            key.step()?;
        }

        let messages = messages(&device);
        assert_eq!(1, messages.len());
        match &messages[0] {
            MidiMessage::NoteOn { key, vel } => {
                assert_eq!(u7::from(60), *key);
                assert!(u8::from(*vel) >= 120, "velocity {}", u8::from(*vel));
            }
            other => panic!("expected a note on, got {:?}", other),
        }

        // Held down, the note keeps sounding and the key stays disarmed.
        let state = key.state();
        assert!(state.note_on);
        assert!(!state.key_armed);
        Ok(())
    }

    #[test]
    fn slower_presses_play_softer() -> Result<(), Box<dyn Error>> {
        let mut velocities = Vec::new();
        for steps in [150, 600] {
            let (mut key, device) = key(Script::ramp(0, 64000, steps, 200), 0, 64000);
            for _ in 0..steps + 200 {
                key.step()?;
            }
            for message in messages(&device) {
                if let MidiMessage::NoteOn { vel, .. } = message {
                    velocities.push(u8::from(vel));
                }
            }
        }
        assert_eq!(2, velocities.len());
        assert!(velocities[0] > velocities[1], "{:?}", velocities);
        Ok(())
    }

    #[test]
    fn repeated_strikes_stay_paired() -> Result<(), Box<dyn Error>> {
        let (mut key, device) = key(repeated_strike(), 0, 1000);

        let mut rearmed_while_sounding = false;
        for _ in 0..120 {
            key.step()?;
            let state = key.state();
            assert!(state.hammer_pos >= state.key_pos);
            rearmed_while_sounding |= state.note_on && state.key_armed;
        }
        assert!(rearmed_while_sounding);

        let kinds: Vec<&str> = messages(&device)
            .into_iter()
            .map(|message| match message {
                MidiMessage::NoteOn { .. } => "on",
                MidiMessage::NoteOff { vel, .. } => {
                    assert_eq!(u7::from(54), vel);
                    "off"
                }
                _ => "other",
            })
            .collect();
        assert_eq!(vec!["on", "off", "on", "off"], kinds);

        let state = key.state();
        assert!(!state.note_on);
        assert!(state.key_armed);
        Ok(())
    }

    #[test]
    fn inverted_sensors_behave_the_same() -> Result<(), Box<dyn Error>> {
        let readings: Vec<i32> = {
            let mut script = repeated_strike();
            (0..120).map(|_| script.read()).collect()
        };
        let flipped: Vec<i32> = readings.iter().map(|r| 1000 - r).collect();

        let (mut direct, direct_device) = key(Script::new(readings), 0, 1000);
        let (mut inverted, inverted_device) = key(Script::new(flipped), 1000, 0);
        for _ in 0..119 {
            direct.step()?;
            inverted.step()?;
            assert_eq!(direct.state(), inverted.state());
        }

        assert!(!direct_device.events().is_empty());
        assert_eq!(direct_device.events(), inverted_device.events());
        Ok(())
    }

    #[test]
    fn recalibration_round_trip() -> Result<(), Box<dyn Error>> {
        let (mut key, _) = key(Script::new(vec![200]), 100, 900);
        let original = *key.calibration();

        key.recalibrate(0, 4000)?;
        key.recalibrate(100, 900)?;
        assert_eq!(original, *key.calibration());
        assert_eq!(100.0, key.state().key_pos);
        assert_eq!("Key 60 (adc 100 to 900, direct)", key.to_string());
        Ok(())
    }
}
