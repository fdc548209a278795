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

mod error;
mod multiplexer;
mod replay;
mod script;
mod sine;

pub use error::AdcError;
pub use multiplexer::{Multiplexer, MuxBus, MuxChannel, SimulatedBus};
pub use replay::Replay;
pub use script::{Constant, Script};
pub use sine::Sine;

/// A sensor channel that yields the current raw position reading on demand.
///
/// Reads can't fail: a stuck or noisy sensor is absorbed by the simulation.
pub trait AdcSource: Send {
    /// Reads the current raw value.
    fn read(&mut self) -> i32;
}

/// The direction a sensor moves in as the key is pressed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Polarity {
    /// Readings increase as the key goes down.
    Direct,
    /// Readings decrease as the key goes down.
    Inverted,
}

impl Polarity {
    /// Orients a raw reading so that pressing the key increases it.
    pub fn apply(&self, reading: i32) -> i32 {
        match self {
            Polarity::Direct => reading,
            Polarity::Inverted => reading.saturating_neg(),
        }
    }
}

impl fmt::Display for Polarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Polarity::Direct => write!(f, "direct"),
            Polarity::Inverted => write!(f, "inverted"),
        }
    }
}

/// A source read in the orientation chosen at calibration time.
pub enum Oriented {
    Direct(Box<dyn AdcSource>),
    Inverted(Box<dyn AdcSource>),
}

impl Oriented {
    /// Wraps the source for the given polarity.
    pub fn new(source: Box<dyn AdcSource>, polarity: Polarity) -> Oriented {
        match polarity {
            Polarity::Direct => Oriented::Direct(source),
            Polarity::Inverted => Oriented::Inverted(source),
        }
    }

    pub fn polarity(&self) -> Polarity {
        match self {
            Oriented::Direct(_) => Polarity::Direct,
            Oriented::Inverted(_) => Polarity::Inverted,
        }
    }

    /// Rewraps the underlying source for a new polarity.
    pub fn reorient(self, polarity: Polarity) -> Oriented {
        Oriented::new(self.into_inner(), polarity)
    }

    pub fn into_inner(self) -> Box<dyn AdcSource> {
        match self {
            Oriented::Direct(source) | Oriented::Inverted(source) => source,
        }
    }

    /// Reads the raw, unoriented value.
    pub fn read_raw(&mut self) -> i32 {
        match self {
            Oriented::Direct(source) | Oriented::Inverted(source) => source.read(),
        }
    }
}

impl AdcSource for Oriented {
    fn read(&mut self) -> i32 {
        match self {
            Oriented::Direct(source) => source.read(),
            Oriented::Inverted(source) => source.read().saturating_neg(),
        }
    }
}
