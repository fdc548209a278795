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
use std::{collections::HashMap, fmt};

use midir::{MidiOutput, MidiOutputConnection, MidiOutputPort};
use midly::live::LiveEvent;
use parking_lot::Mutex;
use tracing::{debug, info, span, Level};

use super::MidiError;

/// A MIDI output port. The connection is opened on the first event and kept for the lifetime
/// of the device, as the simulation emits from a tight loop.
pub struct Device {
    name: String,
    output_port: MidiOutputPort,
    connection: Mutex<Option<MidiOutputConnection>>,
}

impl Device {
    fn connect(&self) -> Result<MidiOutputConnection, MidiError> {
        let output = MidiOutput::new("keyhammer output")?;
        let connection = output
            .connect(&self.output_port, "keyhammer")
            .map_err(|e| MidiError::Connect {
                name: self.name.clone(),
                reason: e.to_string(),
            })?;
        info!(device = self.name, "Connected to MIDI output.");
        Ok(connection)
    }
}

impl super::Device for Device {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn emit(&self, event: LiveEvent<'static>) -> Result<(), MidiError> {
        let span = span!(Level::DEBUG, "emit (midir)");
        let _enter = span.enter();

        debug!(
            device = self.name,
            event = format!("{:?}", event),
            "Emitting event."
        );

        // Choosing 8 here because a channel message is never longer than 3 bytes.
        let mut buf: Vec<u8> = Vec::with_capacity(8);
        event.write_std(&mut buf)?;

        let mut guard = self.connection.lock();
        let connection = match guard.take() {
            Some(connection) => connection,
            None => self.connect()?,
        };
        guard.insert(connection).send(&buf)?;

        Ok(())
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Output)", self.name)
    }
}

/// Lists midir devices and produces the Device trait.
pub fn list() -> Result<Vec<Box<dyn super::Device>>, MidiError> {
    Ok(list_midir_devices()?
        .into_iter()
        .map(|device| {
            let device: Box<dyn super::Device> = Box::new(device);
            device
        })
        .collect())
}

/// Lists midir output devices, sorted by name.
fn list_midir_devices() -> Result<Vec<Device>, MidiError> {
    let output = MidiOutput::new("keyhammer output listing")?;

    let mut devices: HashMap<String, Device> = HashMap::new();
    for port in output.ports() {
        let name = output.port_name(&port)?;
        devices.entry(name.clone()).or_insert_with(|| Device {
            name,
            output_port: port,
            connection: Mutex::new(None),
        });
    }

    let mut sorted_devices = devices.into_values().collect::<Vec<Device>>();
    sorted_devices.sort_by_key(|device| device.name.clone());
    Ok(sorted_devices)
}

/// Gets the midir device whose name contains the given name.
pub fn get(name: &str) -> Result<Device, MidiError> {
    let mut matches = list_midir_devices()?
        .into_iter()
        .filter(|device| device.name.contains(name))
        .collect::<Vec<Device>>();

    if matches.len() > 1 {
        return Err(MidiError::Ambiguous(
            matches
                .iter()
                .map(|device| device.name.clone())
                .collect::<Vec<String>>()
                .join(", "),
        ));
    }

    matches.pop().ok_or_else(|| MidiError::NotFound(name.to_string()))
}
