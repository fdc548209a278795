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
use std::{collections::VecDeque, fmt, sync::Arc};

use midly::live::LiveEvent;
use parking_lot::Mutex;
use tracing::{debug, span, Level};

use super::MidiError;

/// The number of most recent events a mock device remembers.
pub const MAX_RECORDED_EVENTS: usize = 4096;

#[derive(Default)]
struct Recording {
    recent: VecDeque<LiveEvent<'static>>,
    total: u64,
}

/// A mock device. Doesn't send anything anywhere, but logs every event and remembers the most
/// recent ones.
#[derive(Clone)]
pub struct Device {
    name: String,
    recording: Arc<Mutex<Recording>>,
}

impl Device {
    /// Gets the given mock device.
    pub fn get(name: &str) -> Device {
        Device {
            name: name.to_string(),
            recording: Arc::new(Mutex::new(Recording::default())),
        }
    }

    /// Gets the remembered events, oldest first. At most [MAX_RECORDED_EVENTS] are kept.
    pub fn events(&self) -> Vec<LiveEvent<'static>> {
        self.recording.lock().recent.iter().cloned().collect()
    }

    /// The number of events emitted since creation or the last reset, remembered or not.
    pub fn emitted_count(&self) -> u64 {
        self.recording.lock().total
    }

    /// Gets the raw bytes of the last event emitted.
    pub fn last_emitted_bytes(&self) -> Result<Option<Vec<u8>>, MidiError> {
        match self.recording.lock().recent.back() {
            Some(event) => {
                let mut buf: Vec<u8> = Vec::with_capacity(8);
                event.write_std(&mut buf)?;
                Ok(Some(buf))
            }
            None => Ok(None),
        }
    }

    /// Forgets every emitted event.
    pub fn reset(&self) {
        let mut recording = self.recording.lock();
        recording.recent.clear();
        recording.total = 0;
    }
}

impl super::Device for Device {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn emit(&self, event: LiveEvent<'static>) -> Result<(), MidiError> {
        let span = span!(Level::DEBUG, "emit (mock)");
        let _enter = span.enter();

        debug!(
            device = self.name,
            event = format!("{:?}", event),
            "Emitting event."
        );
        let mut recording = self.recording.lock();
        if recording.recent.len() == MAX_RECORDED_EVENTS {
            recording.recent.pop_front();
        }
        recording.recent.push_back(event);
        recording.total += 1;
        Ok(())
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name,)
    }
}
