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
/// Errors raised when deriving simulation constants from calibration bounds.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CalibrationError {
    #[error("ADC bounds must differ, got min {0} and max {0}")]
    EmptyRange(i32),

    #[error("Hammer travel must be positive, got {0}mm")]
    NonPositiveTravel(f64),

    #[error("Minimum press time must be positive")]
    ZeroPressTime,
}
