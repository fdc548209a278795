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
use std::{fmt, sync::Arc, time::Duration};

use parking_lot::Mutex;
use tracing::debug;

use super::{AdcError, AdcSource};

/// The pins behind an analog multiplexer: address lines that pick an input, and the shared
/// signal line wired to an ADC.
pub trait MuxBus: Send {
    /// Drives one address line. Line 0 is the most significant address bit.
    fn set_address_line(&mut self, line: usize, high: bool);

    /// Converts the signal line.
    fn read_signal(&mut self) -> i32;
}

/// An analog multiplexer such as the 74HC4051 (3 address lines) or the CD4067 (4).
///
/// The current address is cached so the address lines only toggle, and the signal only has
/// to settle, when a different input is selected.
pub struct Multiplexer {
    name: String,
    address_lines: u8,
    settle: Duration,
    current: Option<usize>,
    bus: Box<dyn MuxBus>,
}

impl Multiplexer {
    pub fn new(
        name: &str,
        address_lines: u8,
        settle: Duration,
        bus: Box<dyn MuxBus>,
    ) -> Result<Multiplexer, AdcError> {
        if !(1..=8).contains(&address_lines) {
            return Err(AdcError::InvalidAddressLines(address_lines));
        }

        Ok(Multiplexer {
            name: name.to_string(),
            address_lines,
            settle,
            current: None,
            bus,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The number of selectable inputs.
    pub fn channels(&self) -> usize {
        1 << self.address_lines
    }

    /// The currently selected input, if any.
    pub fn current(&self) -> Option<usize> {
        self.current
    }

    fn select(&mut self, channel: usize) {
        if self.current == Some(channel) {
            return;
        }

        let lines = usize::from(self.address_lines);
        for line in 0..lines {
            let bit = (channel >> (lines - 1 - line)) & 1;
            self.bus.set_address_line(line, bit == 1);
        }
        self.current = Some(channel);

        if !self.settle.is_zero() {
            spin_sleep::sleep(self.settle);
        }
    }

    /// Selects the given input and reads it. Channels are validated when a [MuxChannel] is
    /// created, so this never sees an out of range address.
    fn read(&mut self, channel: usize) -> i32 {
        self.select(channel);
        self.bus.read_signal()
    }

    /// Creates a source reading one input of a shared multiplexer. Fails if the multiplexer
    /// doesn't have that input.
    pub fn channel(mux: &Arc<Mutex<Multiplexer>>, channel: usize) -> Result<MuxChannel, AdcError> {
        let guard = mux.lock();
        if channel >= guard.channels() {
            return Err(AdcError::AddressOutOfRange {
                name: guard.name.clone(),
                channel,
                channels: guard.channels(),
            });
        }
        debug!(mux = %guard.name, channel, "Created multiplexer channel.");

        Ok(MuxChannel {
            mux: mux.clone(),
            channel,
        })
    }
}

impl fmt::Display for Multiplexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} channels)", self.name, self.channels())
    }
}

/// One input of a multiplexer.
pub struct MuxChannel {
    mux: Arc<Mutex<Multiplexer>>,
    channel: usize,
}

impl MuxChannel {
    pub fn channel(&self) -> usize {
        self.channel
    }
}

impl AdcSource for MuxChannel {
    fn read(&mut self) -> i32 {
        self.mux.lock().read(self.channel)
    }
}

/// A multiplexer bus with simulated sensors behind each address.
pub struct SimulatedBus {
    address: usize,
    inputs: Vec<Box<dyn AdcSource>>,
}

impl SimulatedBus {
    /// Creates a bus with `inputs[n]` wired to address `n`. Unwired addresses read 0.
    pub fn new(inputs: Vec<Box<dyn AdcSource>>) -> SimulatedBus {
        SimulatedBus {
            address: 0,
            inputs,
        }
    }

    /// The number of wired inputs.
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }
}

impl MuxBus for SimulatedBus {
    fn set_address_line(&mut self, line: usize, high: bool) {
        // Line 0 is the most significant bit, so shift everything already set up by one.
        if line == 0 {
            self.address = 0;
        }
        self.address = (self.address << 1) | usize::from(high);
    }

    fn read_signal(&mut self) -> i32 {
        match self.inputs.get_mut(self.address) {
            Some(input) => input.read(),
            None => 0,
        }
    }
}

#[cfg(test)]
mod test {
    use std::{error::Error, sync::Arc, time::Duration};

    use parking_lot::Mutex;

    use crate::adc::{AdcError, AdcSource, Constant};

    use super::{Multiplexer, MuxBus, SimulatedBus};

    /// Records every address line write.
    #[derive(Default)]
    struct RecordingBus {
        lines: Arc<Mutex<Vec<(usize, bool)>>>,
    }

    impl MuxBus for RecordingBus {
        fn set_address_line(&mut self, line: usize, high: bool) {
            self.lines.lock().push((line, high));
        }

        fn read_signal(&mut self) -> i32 {
            42
        }
    }

    #[test]
    fn address_lines_are_msb_first_and_cached() -> Result<(), Box<dyn Error>> {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let bus = RecordingBus {
            lines: lines.clone(),
        };
        let mux = Arc::new(Mutex::new(Multiplexer::new(
            "mux0",
            3,
            Duration::ZERO,
            Box::new(bus),
        )?));

        let mut one = Multiplexer::channel(&mux, 1)?;
        let mut six = Multiplexer::channel(&mux, 6)?;

        assert_eq!(42, one.read());
        assert_eq!(vec![(0, false), (1, false), (2, true)], *lines.lock());

        // Same address, no writes.
        one.read();
        assert_eq!(3, lines.lock().len());

        six.read();
        assert_eq!(
            vec![(0, true), (1, true), (2, false)],
            lines.lock()[3..].to_vec()
        );
        assert_eq!(Some(6), mux.lock().current());
        Ok(())
    }

    #[test]
    fn out_of_range_channels_fail() -> Result<(), Box<dyn Error>> {
        let mux = Arc::new(Mutex::new(Multiplexer::new(
            "mux1",
            4,
            Duration::ZERO,
            Box::new(SimulatedBus::new(vec![])),
        )?));
        assert_eq!(16, mux.lock().channels());
        assert!(Multiplexer::channel(&mux, 15).is_ok());
        assert!(matches!(
            Multiplexer::channel(&mux, 16),
            Err(AdcError::AddressOutOfRange {
                channel: 16,
                channels: 16,
                ..
            })
        ));
        Ok(())
    }

    #[test]
    fn invalid_address_lines() {
        let bus = Box::new(SimulatedBus::new(vec![]));
        let result = Multiplexer::new("mux", 0, Duration::ZERO, bus);
        assert!(matches!(result, Err(AdcError::InvalidAddressLines(0))));
    }

    #[test]
    fn simulated_bus_routes_addresses() -> Result<(), Box<dyn Error>> {
        let inputs: Vec<Box<dyn AdcSource>> = vec![
            Box::new(Constant::new(10)),
            Box::new(Constant::new(11)),
            Box::new(Constant::new(12)),
        ];
        let mux = Arc::new(Mutex::new(Multiplexer::new(
            "mux2",
            2,
            Duration::from_micros(1),
            Box::new(SimulatedBus::new(inputs)),
        )?));

        let mut channels = (0..4)
            .map(|channel| Multiplexer::channel(&mux, channel))
            .collect::<Result<Vec<_>, AdcError>>()?;
        let readings: Vec<i32> = channels.iter_mut().map(|c| c.read()).collect();
        assert_eq!(vec![10, 11, 12, 0], readings);
        assert_eq!("mux2 (4 channels)", mux.lock().to_string());
        Ok(())
    }
}
