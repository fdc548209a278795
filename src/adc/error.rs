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

/// Errors raised while configuring sensor sources.
#[derive(Debug, thiserror::Error)]
pub enum AdcError {
    #[error("Multiplexer {name} has {channels} channels, channel {channel} is out of range")]
    AddressOutOfRange {
        name: String,
        channel: usize,
        channels: usize,
    },

    #[error("Multiplexers support 1 to 8 address lines, got {0}")]
    InvalidAddressLines(u8),

    #[error("Multiplexer {name} has {inputs} inputs but only {channels} channels")]
    TooManyInputs {
        name: String,
        inputs: usize,
        channels: usize,
    },

    #[error("No multiplexer named {0}")]
    UnknownMultiplexer(String),

    #[error("Error reading recording {}: {source}", path.display())]
    ReplayIo {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed recording {} at line {line}: {reason}", path.display())]
    ReplayParse {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Recording {} has no samples", .0.display())]
    EmptyReplay(PathBuf),
}
