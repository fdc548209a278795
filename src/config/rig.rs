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
use std::{
    collections::{HashMap, HashSet},
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use config::{Config, File, FileFormat};
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::info;

use crate::{
    adc::{self, AdcError, AdcSource, SimulatedBus},
    calibration::{
        Bounds, Calibration, DEFAULT_HAMMER_TRAVEL_MM, DEFAULT_MAX_ADC, DEFAULT_MIN_ADC,
        DEFAULT_MIN_PRESS_MICROS,
    },
    engine::Engine,
    keys::{
        Context, HammerKey, Instrument, KeyBank, KeyError, PedalController,
        DEFAULT_CONTROL_NUMBER,
    },
    midi,
    timing::{Clock, ManualClock, MIN_LOOP_LEN},
    velocity::VelocityMap,
};

use super::{
    calibrations::CalibrationStore,
    source::{resolve, Source, SourceContext},
    ConfigError,
};

const DEFAULT_MIDI_CHANNEL: u8 = 1;

/// A YAML representation of the MIDI output.
#[derive(Deserialize, Clone, Debug)]
pub struct Midi {
    /// The MIDI device. Names starting with "mock" get a device that only logs.
    device: String,

    /// The channel to play on, 1 to 16.
    channel: Option<u8>,
}

impl Midi {
    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn channel(&self) -> u8 {
        self.channel.unwrap_or(DEFAULT_MIDI_CHANNEL)
    }
}

/// A YAML representation of the loop timing.
#[derive(Deserialize, Clone, Debug)]
pub struct Timing {
    /// The minimum time between two steps of an instrument.
    #[serde(default = "default_min_loop_micros")]
    min_loop_micros: u64,

    /// Log the state of every instrument every this many iterations. 0 never does.
    #[serde(default)]
    diagnostics_interval: u64,
}

fn default_min_loop_micros() -> u64 {
    MIN_LOOP_LEN
}

impl Default for Timing {
    fn default() -> Self {
        Timing {
            min_loop_micros: MIN_LOOP_LEN,
            diagnostics_interval: 0,
        }
    }
}

impl Timing {
    pub fn min_loop_micros(&self) -> u64 {
        self.min_loop_micros
    }

    pub fn diagnostics_interval(&self) -> u64 {
        self.diagnostics_interval
    }
}

/// A YAML representation of an analog multiplexer. The inputs are simulated sensors wired to
/// the addresses in order.
#[derive(Deserialize, Clone, Debug)]
pub struct Multiplexer {
    name: String,
    address_bits: u8,
    #[serde(default)]
    settle_micros: u64,
    #[serde(default)]
    inputs: Vec<Source>,
}

/// A YAML representation of a single key.
#[derive(Deserialize, Clone, Debug)]
pub struct Key {
    pitch: u8,
    source: Source,
    min_adc: Option<i32>,
    max_adc: Option<i32>,
    hammer_travel_mm: Option<f64>,
    min_press_micros: Option<u32>,
}

/// A YAML representation of a bank of keys sharing one configuration.
#[derive(Deserialize, Clone, Debug)]
pub struct Bank {
    pitches: Vec<u8>,
    sources: Vec<Source>,
    min_adc: Option<i32>,
    max_adc: Option<i32>,
    hammer_travel_mm: Option<f64>,
    min_press_micros: Option<u32>,
}

/// A YAML representation of a pedal.
#[derive(Deserialize, Clone, Debug)]
pub struct Pedal {
    control_number: Option<u8>,
    #[serde(default)]
    binary: bool,
    source: Source,
    min_adc: Option<i32>,
    max_adc: Option<i32>,
}

fn calibration(
    min_adc: Option<i32>,
    max_adc: Option<i32>,
    hammer_travel_mm: Option<f64>,
    min_press_micros: Option<u32>,
    map_length: usize,
) -> Result<Calibration, ConfigError> {
    Ok(Calibration::new(
        min_adc.unwrap_or(DEFAULT_MIN_ADC),
        max_adc.unwrap_or(DEFAULT_MAX_ADC),
        hammer_travel_mm.unwrap_or(DEFAULT_HAMMER_TRAVEL_MM),
        min_press_micros.unwrap_or(DEFAULT_MIN_PRESS_MICROS),
        map_length,
    )?)
}

/// A YAML representation of a rig: the MIDI output and every instrument wired to it.
#[derive(Deserialize, Clone, Debug)]
pub struct Rig {
    midi: Midi,
    #[serde(default)]
    timing: Timing,
    /// Where calibrated bounds are kept, relative to the rig file.
    calibrations: Option<String>,
    #[serde(default)]
    multiplexers: Vec<Multiplexer>,
    #[serde(default)]
    keys: Vec<Key>,
    #[serde(default)]
    banks: Vec<Bank>,
    #[serde(default)]
    pedals: Vec<Pedal>,

    /// The directory relative paths are resolved against.
    #[serde(skip)]
    base_dir: PathBuf,
}

/// The key a calibration run measures.
pub struct CalibrationTarget {
    pub source: Box<dyn AdcSource>,
    pub bounds: Bounds,
}

impl Rig {
    /// Deserializes a rig from the given file.
    pub fn deserialize(path: &Path) -> Result<Rig, ConfigError> {
        let mut rig = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Rig>()?;
        rig.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(rig)
    }

    /// Deserializes a rig from YAML text, resolving relative paths against `base_dir`.
    pub fn from_yaml(yaml: &str, base_dir: &Path) -> Result<Rig, ConfigError> {
        let mut rig = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize::<Rig>()?;
        rig.base_dir = base_dir.to_path_buf();
        Ok(rig)
    }

    pub fn midi(&self) -> &Midi {
        &self.midi
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    /// The calibration store file, if the rig has one.
    pub fn calibrations_path(&self) -> Option<PathBuf> {
        self.calibrations
            .as_ref()
            .map(|path| resolve(&self.base_dir, path))
    }

    /// Loads the calibration store, or an empty one if the rig has none.
    pub fn calibration_store(&self) -> Result<Option<CalibrationStore>, ConfigError> {
        self.calibrations_path()
            .map(|path| CalibrationStore::load(&path))
            .transpose()
    }

    /// Checks everything that doesn't need hardware.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timing.min_loop_micros == 0 {
            return Err(ConfigError::ZeroLoopLength);
        }
        midi::parse_channel(self.midi.channel())?;

        let mut names = HashSet::new();
        for multiplexer in &self.multiplexers {
            if !names.insert(multiplexer.name.as_str()) {
                return Err(ConfigError::DuplicateMultiplexer(multiplexer.name.clone()));
            }
        }

        let mut pitches = HashSet::new();
        let all_pitches = self
            .keys
            .iter()
            .map(|key| key.pitch)
            .chain(self.banks.iter().flat_map(|bank| bank.pitches.iter().copied()));
        for pitch in all_pitches {
            if !pitches.insert(pitch) {
                return Err(ConfigError::DuplicatePitch(pitch));
            }
        }
        Ok(())
    }

    fn build_multiplexers(
        &self,
        clock: &Arc<dyn Clock>,
    ) -> Result<HashMap<String, Arc<Mutex<adc::Multiplexer>>>, ConfigError> {
        let mut multiplexers = HashMap::new();
        for config in &self.multiplexers {
            let context = SourceContext {
                clock,
                base_dir: &self.base_dir,
                multiplexers: &multiplexers,
            };
            let inputs = config
                .inputs
                .iter()
                .map(|input| input.build(&context))
                .collect::<Result<Vec<Box<dyn AdcSource>>, ConfigError>>()?;
            let input_count = inputs.len();

            let multiplexer = adc::Multiplexer::new(
                &config.name,
                config.address_bits,
                Duration::from_micros(config.settle_micros),
                Box::new(SimulatedBus::new(inputs)),
            )?;
            if input_count > multiplexer.channels() {
                return Err(AdcError::TooManyInputs {
                    name: config.name.clone(),
                    inputs: input_count,
                    channels: multiplexer.channels(),
                }
                .into());
            }

            info!(multiplexer = %multiplexer, inputs = input_count, "Built multiplexer.");
            multiplexers.insert(config.name.clone(), Arc::new(Mutex::new(multiplexer)));
        }
        Ok(multiplexers)
    }

    /// Builds every instrument and the engine driving them. Calibrated bounds from the store
    /// replace the configured ones of the same pitch.
    pub fn build(&self, clock: Arc<dyn Clock>) -> Result<Engine, ConfigError> {
        self.validate()?;

        let device = midi::get_device(self.midi.device())?;
        let output = midi::Output::new(device, midi::parse_channel(self.midi.channel())?);
        info!(output = %output, "Using MIDI output.");

        let velocity_map = Arc::new(VelocityMap::default());
        let context = Context::new(clock.clone(), output)
            .with_min_loop_micros(self.timing.min_loop_micros)
            .with_velocity_map(velocity_map.clone());
        let store = self.calibration_store()?;
        let stored = |pitch: u8| store.as_ref().and_then(|store| store.get(pitch));

        let multiplexers = self.build_multiplexers(&clock)?;
        let sources = SourceContext {
            clock: &clock,
            base_dir: &self.base_dir,
            multiplexers: &multiplexers,
        };

        let mut instruments: Vec<Box<dyn Instrument>> = Vec::new();
        for key in &self.keys {
            let mut calibration = calibration(
                key.min_adc,
                key.max_adc,
                key.hammer_travel_mm,
                key.min_press_micros,
                velocity_map.len(),
            )?;
            if let Some(bounds) = stored(key.pitch) {
                calibration =
                    calibration.with_bounds(bounds.min_adc, bounds.max_adc, velocity_map.len())?;
            }
            let key = HammerKey::new(key.source.build(&sources)?, key.pitch, calibration, &context)?;
            info!(key = %key, "Built key.");
            instruments.push(Box::new(key));
        }

        for bank in &self.banks {
            let calibration = calibration(
                bank.min_adc,
                bank.max_adc,
                bank.hammer_travel_mm,
                bank.min_press_micros,
                velocity_map.len(),
            )?;
            let bank_sources = bank
                .sources
                .iter()
                .map(|source| source.build(&sources))
                .collect::<Result<Vec<Box<dyn AdcSource>>, ConfigError>>()?;
            let mut key_bank =
                KeyBank::new(bank_sources, bank.pitches.clone(), calibration, &context)?;
            for (slot, pitch) in bank.pitches.iter().enumerate() {
                if let Some(bounds) = stored(*pitch) {
                    key_bank.recalibrate(slot, bounds.min_adc, bounds.max_adc)?;
                }
            }
            info!(bank = %key_bank, "Built key bank.");
            instruments.push(Box::new(key_bank));
        }

        for pedal in &self.pedals {
            let bounds = Bounds::new(
                pedal.min_adc.unwrap_or(DEFAULT_MIN_ADC),
                pedal.max_adc.unwrap_or(DEFAULT_MAX_ADC),
            )?;
            let pedal = PedalController::new(
                pedal.source.build(&sources)?,
                pedal.control_number.unwrap_or(DEFAULT_CONTROL_NUMBER),
                pedal.binary,
                bounds,
                &context,
            )?;
            info!(pedal = %pedal, "Built pedal.");
            instruments.push(Box::new(pedal));
        }

        Ok(Engine::new(instruments, self.timing.diagnostics_interval))
    }

    /// Builds the engine on a simulated clock that moves `step_micros` per loop iteration,
    /// for running over recordings faster or slower than real time.
    pub fn build_offline(&self, step_micros: u64) -> Result<Engine, ConfigError> {
        if step_micros < self.timing.min_loop_micros {
            return Err(ConfigError::OfflineStepTooShort {
                step: step_micros,
                min_loop_micros: self.timing.min_loop_micros,
            });
        }

        let clock = Arc::new(ManualClock::new());
        Ok(self
            .build(clock.clone())?
            .with_manual_clock(clock, step_micros))
    }

    /// Builds the sensor of the key playing `pitch` along with its current bounds, for a
    /// calibration run.
    pub fn calibration_target(
        &self,
        pitch: u8,
        clock: Arc<dyn Clock>,
    ) -> Result<CalibrationTarget, ConfigError> {
        self.validate()?;
        let multiplexers = self.build_multiplexers(&clock)?;
        let sources = SourceContext {
            clock: &clock,
            base_dir: &self.base_dir,
            multiplexers: &multiplexers,
        };

        let (source, min_adc, max_adc) = if let Some(key) =
            self.keys.iter().find(|key| key.pitch == pitch)
        {
            (&key.source, key.min_adc, key.max_adc)
        } else {
            let (bank, slot) = self
                .banks
                .iter()
                .find_map(|bank| {
                    let slot = bank.pitches.iter().position(|p| *p == pitch)?;
                    Some((bank, slot))
                })
                .ok_or(ConfigError::UnknownPitch(pitch))?;
            let source = bank.sources.get(slot).ok_or(KeyError::MismatchedLengths {
                sources: bank.sources.len(),
                pitches: bank.pitches.len(),
            })?;
            (source, bank.min_adc, bank.max_adc)
        };

        let stored = self
            .calibration_store()?
            .and_then(|store| store.get(pitch));
        let bounds = match stored {
            Some(stored) => Bounds::new(stored.min_adc, stored.max_adc)?,
            None => Bounds::new(
                min_adc.unwrap_or(DEFAULT_MIN_ADC),
                max_adc.unwrap_or(DEFAULT_MAX_ADC),
            )?,
        };

        Ok(CalibrationTarget {
            source: source.build(&sources)?,
            bounds,
        })
    }
}

impl fmt::Display for Rig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Rig ({} keys, {} banks, {} pedals, {} multiplexers)",
            self.keys.len(),
            self.banks.len(),
            self.pedals.len(),
            self.multiplexers.len()
        )
    }
}
