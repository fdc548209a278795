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
use std::path::PathBuf;

use crate::{adc::AdcError, calibration::CalibrationError, keys::KeyError, midi::MidiError};

/// Typed error for rig and calibration store failures so callers can distinguish
/// e.g. file-not-found from invalid instruments without string matching.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config load/parse error: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid instrument: {0}")]
    Key(#[from] KeyError),

    #[error("Invalid sensor source: {0}")]
    Adc(#[from] AdcError),

    #[error("MIDI error: {0}")]
    Midi(#[from] MidiError),

    #[error("Invalid calibration: {0}")]
    Calibration(#[from] CalibrationError),

    #[error("Unable to serialize calibrations: {0}")]
    Serialize(#[from] serde_yml::Error),

    #[error("Unable to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid duration {value}: {reason}")]
    InvalidDuration { value: String, reason: String },

    #[error("min_loop_micros must be positive")]
    ZeroLoopLength,

    #[error("Offline step of {step}us is shorter than min_loop_micros ({min_loop_micros}us)")]
    OfflineStepTooShort { step: u64, min_loop_micros: u64 },

    #[error("Multiplexer {0} is defined more than once")]
    DuplicateMultiplexer(String),

    #[error("Pitch {0} is played by more than one key")]
    DuplicatePitch(u8),

    #[error("No key plays pitch {0}")]
    UnknownPitch(u8),
}
