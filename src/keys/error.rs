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
use crate::calibration::CalibrationError;

/// Errors raised while building instruments. All of them are configuration mistakes, so
/// nothing is ever built half way.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("Number of ADC sources ({sources}) must equal the number of pitches ({pitches})")]
    MismatchedLengths { sources: usize, pitches: usize },

    #[error("A key bank needs at least one key")]
    Empty,

    #[error("Pitch must be a MIDI note number in [0, 127], got {0}")]
    InvalidPitch(u8),

    #[error("Control number must be in [0, 127], got {0}")]
    InvalidControlNumber(u8),

    #[error("No key slot {slot}, the bank has {len}")]
    NoSuchSlot { slot: usize, len: usize },

    #[error(transparent)]
    Calibration(#[from] CalibrationError),
}
