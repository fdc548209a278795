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
/// Errors raised while talking to a MIDI output.
#[derive(Debug, thiserror::Error)]
pub enum MidiError {
    #[error("MIDI initialization failed: {0}")]
    Init(#[from] midir::InitError),

    #[error("Unable to read MIDI port: {0}")]
    PortInfo(#[from] midir::PortInfoError),

    #[error("Unable to connect to MIDI output {name}: {reason}")]
    Connect { name: String, reason: String },

    #[error("Error sending MIDI event: {0}")]
    Send(#[from] midir::SendError),

    #[error("Unable to encode MIDI event: {0}")]
    Encode(#[from] std::io::Error),

    #[error("No MIDI output found with name {0}")]
    NotFound(String),

    #[error("Found too many MIDI outputs that match ({0}), use a less ambiguous name")]
    Ambiguous(String),

    #[error("MIDI channel must be in [1, 16], got {0}")]
    InvalidChannel(u8),
}
