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
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tracing::{debug, info, span, Level};

use crate::{keys::Instrument, midi::MidiError, timing::ManualClock};

/// Steps every instrument of a rig, in order, until told to stop.
pub struct Engine {
    instruments: Vec<Box<dyn Instrument>>,
    diagnostics_interval: u64,
    stop: Arc<AtomicBool>,
    iterations: u64,
    manual_clock: Option<(Arc<ManualClock>, u64)>,
}

impl Engine {
    /// Creates an engine. Every `diagnostics_interval` iterations the state of each instrument
    /// is logged at debug level; 0 disables this.
    pub fn new(instruments: Vec<Box<dyn Instrument>>, diagnostics_interval: u64) -> Engine {
        Engine {
            instruments,
            diagnostics_interval,
            stop: Arc::new(AtomicBool::new(false)),
            iterations: 0,
            manual_clock: None,
        }
    }

    /// Advances `clock` by `step_micros` at the start of every iteration. The instruments must
    /// have been built on the same clock, and the step must cover their minimum loop length.
    pub fn with_manual_clock(mut self, clock: Arc<ManualClock>, step_micros: u64) -> Engine {
        self.manual_clock = Some((clock, step_micros));
        self
    }

    pub fn instruments(&self) -> &[Box<dyn Instrument>] {
        &self.instruments
    }

    /// The number of loop iterations run so far.
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// A flag that stops the loop at the end of the current iteration once set.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// Runs a single loop iteration.
    pub fn step(&mut self) -> Result<(), MidiError> {
        if let Some((clock, step_micros)) = &self.manual_clock {
            clock.advance(*step_micros);
        }
        let mut result = Ok(());
        for instrument in self.instruments.iter_mut() {
            result = result.and(instrument.step());
        }
        self.iterations += 1;

        if self.diagnostics_interval > 0 && self.iterations % self.diagnostics_interval == 0 {
            debug!(iterations = self.iterations, "Diagnostics.");
            for instrument in self.instruments.iter() {
                instrument.log_state();
            }
        }
        result
    }

    /// Runs the loop until stopped or, if given, until `limit` more iterations have run.
    /// Returns the number of iterations run.
    pub fn run(&mut self, limit: Option<u64>) -> Result<u64, MidiError> {
        let span = span!(Level::INFO, "simulation loop");
        let _enter = span.enter();

        info!(
            instruments = self.instruments.len(),
            limit, "Starting simulation loop."
        );

        let start = self.iterations;
        while !self.stop.load(Ordering::Relaxed) {
            if limit.is_some_and(|limit| self.iterations - start >= limit) {
                break;
            }
            self.step()?;
        }

        let run = self.iterations - start;
        info!(iterations = run, "Simulation loop stopped.");
        Ok(run)
    }
}
