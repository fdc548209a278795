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

use midly::{
    live::LiveEvent,
    num::{u4, u7},
    MidiMessage,
};

mod error;
mod midir;
mod mock;

pub use error::MidiError;
pub use mock::Device as MockDevice;

/// The fixed velocity sent with every note off.
pub const RELEASE_VELOCITY: u8 = 54;

/// A MIDI output the simulation emits its events to.
pub trait Device: fmt::Display + std::marker::Send + std::marker::Sync {
    /// Returns the name of the device.
    fn name(&self) -> String;

    /// Emits an event.
    fn emit(&self, event: LiveEvent<'static>) -> Result<(), MidiError>;
}

/// Lists the MIDI outputs known to midir.
pub fn list_devices() -> Result<Vec<Box<dyn Device>>, MidiError> {
    midir::list()
}

/// Gets a device with the given name. Names starting with "mock" get a mock device that only
/// logs and records its events.
pub fn get_device(name: &str) -> Result<Arc<dyn Device>, MidiError> {
    if name.starts_with("mock") {
        return Ok(Arc::new(mock::Device::get(name)));
    };

    Ok(Arc::new(midir::get(name)?))
}

/// Parses a channel from the config. Input is expected to be [1, 16].
pub fn parse_channel(channel: u8) -> Result<u4, MidiError> {
    match channel.checked_sub(1).and_then(u4::try_from) {
        Some(val) => Ok(val),
        None => Err(MidiError::InvalidChannel(channel)),
    }
}

/// A device bound to the channel the instruments play on.
#[derive(Clone)]
pub struct Output {
    device: Arc<dyn Device>,
    channel: u4,
}

impl Output {
    pub fn new(device: Arc<dyn Device>, channel: u4) -> Output {
        Output { device, channel }
    }

    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    pub fn channel(&self) -> u4 {
        self.channel
    }

    pub fn note_on(&self, key: u7, vel: u7) -> Result<(), MidiError> {
        self.send(MidiMessage::NoteOn { key, vel })
    }

    /// Sends a note off with the fixed release velocity.
    pub fn note_off(&self, key: u7) -> Result<(), MidiError> {
        self.send(MidiMessage::NoteOff {
            key,
            vel: u7::from(RELEASE_VELOCITY),
        })
    }

    pub fn control_change(&self, controller: u7, value: u7) -> Result<(), MidiError> {
        self.send(MidiMessage::Controller { controller, value })
    }

    fn send(&self, message: MidiMessage) -> Result<(), MidiError> {
        self.device.emit(LiveEvent::Midi {
            channel: self.channel,
            message,
        })
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, channel {}", self.device, u8::from(self.channel) + 1)
    }
}

#[cfg(test)]
mod test {
    use std::{error::Error, sync::Arc};

    use midly::{
        live::LiveEvent,
        num::{u4, u7},
        MidiMessage,
    };

    use super::{get_device, parse_channel, MidiError, MockDevice, Output};

    #[test]
    fn channels() -> Result<(), MidiError> {
        assert_eq!(u4::from(0), parse_channel(1)?);
        assert_eq!(u4::from(15), parse_channel(16)?);
        assert!(matches!(parse_channel(0), Err(MidiError::InvalidChannel(0))));
        assert!(matches!(
            parse_channel(17),
            Err(MidiError::InvalidChannel(17))
        ));
        Ok(())
    }

    #[test]
    fn output_messages() -> Result<(), Box<dyn Error>> {
        let device = Arc::new(MockDevice::get("mock-output"));
        let output = Output::new(device.clone(), parse_channel(2)?);

        output.note_on(u7::from(60), u7::from(100))?;
        output.note_off(u7::from(60))?;
        output.control_change(u7::from(64), u7::from(127))?;

        let channel = u4::from(1);
        assert_eq!(
            vec![
                LiveEvent::Midi {
                    channel,
                    message: MidiMessage::NoteOn {
                        key: u7::from(60),
                        vel: u7::from(100)
                    }
                },
                LiveEvent::Midi {
                    channel,
                    message: MidiMessage::NoteOff {
                        key: u7::from(60),
                        vel: u7::from(54)
                    }
                },
                LiveEvent::Midi {
                    channel,
                    message: MidiMessage::Controller {
                        controller: u7::from(64),
                        value: u7::from(127)
                    }
                },
            ],
            device.events()
        );
        assert_eq!("mock-output (Mock), channel 2", output.to_string());
        Ok(())
    }

    #[test]
    fn mock_devices_by_name() -> Result<(), MidiError> {
        let device = get_device("mock-keys")?;
        assert_eq!("mock-keys", device.name());
        Ok(())
    }
}
