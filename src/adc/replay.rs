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
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::debug;

use crate::timing::Clock;

use super::{AdcError, AdcSource};

/// Plays back a recorded sensor.
///
/// Recordings are text files with one `value, time` row per sample, time in microseconds,
/// optionally preceded by a `value, time` header. Playback is aligned to the clock: each read
/// returns the latest sample recorded at or before the time since the first read.
pub struct Replay {
    clock: Arc<dyn Clock>,
    samples: Vec<(i32, u64)>,
    looped: bool,
    origin: Option<u64>,
    cursor: usize,
}

impl Replay {
    /// Loads a recording from disk.
    pub fn load(path: &Path, clock: Arc<dyn Clock>, looped: bool) -> Result<Replay, AdcError> {
        let contents = fs::read_to_string(path).map_err(|source| AdcError::ReplayIo {
            path: path.to_path_buf(),
            source,
        })?;
        let samples = parse(&contents, path)?;
        debug!(path = %path.display(), samples = samples.len(), "Loaded recording.");
        Ok(Replay::new(samples, clock, looped))
    }

    fn new(samples: Vec<(i32, u64)>, clock: Arc<dyn Clock>, looped: bool) -> Replay {
        Replay {
            clock,
            samples,
            looped,
            origin: None,
            cursor: 0,
        }
    }

    /// The length of the recording in microseconds.
    pub fn duration_micros(&self) -> u64 {
        match (self.samples.first(), self.samples.last()) {
            (Some(first), Some(last)) => last.1 - first.1,
            _ => 0,
        }
    }

    /// The recording plus one average sample interval, so the last sample gets its share of
    /// playback time before wrapping around.
    fn loop_period(&self) -> u64 {
        if self.samples.len() < 2 {
            return 0;
        }
        let duration = self.duration_micros();
        duration + duration / (self.samples.len() as u64 - 1)
    }
}

/// Parses a recording, rebasing the times onto the first sample.
fn parse(contents: &str, path: &Path) -> Result<Vec<(i32, u64)>, AdcError> {
    let malformed = |line: usize, reason: String| AdcError::ReplayParse {
        path: PathBuf::from(path),
        line,
        reason,
    };

    let mut samples: Vec<(i32, u64)> = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || (index == 0 && line.starts_with("value")) {
            continue;
        }

        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != 2 {
            let reason = format!("expected 2 fields, got {}", fields.len());
            return Err(malformed(index + 1, reason));
        }
        let value = fields[0]
            .parse::<i32>()
            .map_err(|e| malformed(index + 1, e.to_string()))?;
        let time = fields[1]
            .parse::<u64>()
            .map_err(|e| malformed(index + 1, e.to_string()))?;

        if samples.last().is_some_and(|(_, last)| time < *last) {
            return Err(malformed(index + 1, "time went backwards".to_string()));
        }
        samples.push((value, time));
    }

    let Some(&(_, start)) = samples.first() else {
        return Err(AdcError::EmptyReplay(PathBuf::from(path)));
    };
    Ok(samples
        .into_iter()
        .map(|(value, time)| (value, time - start))
        .collect())
}

impl AdcSource for Replay {
    fn read(&mut self) -> i32 {
        let now = self.clock.now_micros();
        let origin = *self.origin.get_or_insert(now);
        let mut offset = now - origin;

        let period = self.loop_period();
        if self.looped && period > 0 {
            offset %= period;
            if offset < self.samples[self.cursor].1 {
                self.cursor = 0;
            }
        }

        while self
            .samples
            .get(self.cursor + 1)
            .is_some_and(|(_, time)| *time <= offset)
        {
            self.cursor += 1;
        }
        self.samples[self.cursor].0
    }
}
