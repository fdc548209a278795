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
use std::error::Error;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use clap::{crate_version, Parser, Subcommand};
use duration_string::DurationString;
use tracing::{info, warn};

use keyhammer::calibration;
use keyhammer::config::{self, KeyBounds};
use keyhammer::midi;
use keyhammer::thread_priority;
use keyhammer::timing::{Clock, LoopTimer, MonotonicClock};
use keyhammer::velocity::{VelocityMap, VELOCITY_MAP_LENGTH};

const DEFAULT_REST_DURATION: &str = "1s";
const DEFAULT_PRESS_DURATION: &str = "5s";

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "Simulates piano hammers from key sensors and plays them over MIDI."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs the simulation loop for the given rig until interrupted.
    Run {
        /// The path to the rig config.
        rig_path: String,
        /// Stop after this many loop iterations.
        #[arg[short, long]]
        iterations: Option<u64>,
        /// Drive the loop from a simulated clock advancing this many microseconds per loop
        /// iteration instead of the system clock. Useful for replaying recordings.
        #[arg[long]]
        offline_step_micros: Option<u64>,
    },
    /// Verifies a rig config and lists its instruments.
    Verify {
        /// The path to the rig config.
        rig_path: String,
    },
    /// Lists the available MIDI output devices.
    MidiDevices {},
    /// Prints the velocity table.
    VelocityTable {
        /// The number of entries in the table.
        #[arg[short, long]]
        length: Option<usize>,
    },
    /// Measures the rest and fully pressed readings of one key and stores them.
    Calibrate {
        /// The path to the rig config.
        rig_path: String,
        /// The pitch of the key to calibrate.
        #[arg[short, long]]
        pitch: u8,
        /// How long to measure the key at rest.
        #[arg[long]]
        rest: Option<String>,
        /// How long to measure while the key is pressed.
        #[arg[long]]
        press: Option<String>,
    },
}

fn parse_duration(value: Option<String>, default: &str) -> Result<Duration, Box<dyn Error>> {
    let value = value.unwrap_or_else(|| default.to_string());
    Ok(DurationString::from_string(value)?.into())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            rig_path,
            iterations,
            offline_step_micros,
        } => {
            let rig = config::parse_rig(Path::new(&rig_path))?;
            let mut engine = match offline_step_micros {
                Some(step) => rig.build_offline(step)?,
                None => rig.build(Arc::new(MonotonicClock::new()))?,
            };

            let stop = engine.stop_handle();
            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        info!("Interrupted, stopping.");
                        stop.store(true, Ordering::Relaxed);
                    }
                    Err(e) => warn!(err = %e, "Unable to listen for interrupts."),
                }
            });

            let iterations = tokio::task::spawn_blocking(move || {
                thread_priority::configure_loop_thread_priority(
                    thread_priority::loop_thread_priority(),
                    thread_priority::rt_enabled(),
                );
                engine.run(iterations)
            })
            .await??;
            println!("Ran {} iterations.", iterations);
        }
        Commands::Verify { rig_path } => {
            let rig = config::parse_rig(Path::new(&rig_path))?;
            let engine = rig.build(Arc::new(MonotonicClock::new()))?;

            println!("{}", rig);
            println!(
                "MIDI: {}, channel {}",
                rig.midi().device(),
                rig.midi().channel()
            );
            println!("Instruments (count: {}):", engine.instruments().len());
            for instrument in engine.instruments() {
                println!("- {}", instrument);
            }
        }
        Commands::MidiDevices {} => {
            let devices = midi::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::VelocityTable { length } => {
            let map = VelocityMap::build(length.unwrap_or(VELOCITY_MAP_LENGTH));
            for (index, velocity) in map.iter().enumerate() {
                println!("{} {}", index, velocity);
            }
        }
        Commands::Calibrate {
            rig_path,
            pitch,
            rest,
            press,
        } => {
            let rest = parse_duration(rest, DEFAULT_REST_DURATION)?;
            let press = parse_duration(press, DEFAULT_PRESS_DURATION)?;
            let rig = config::parse_rig(Path::new(&rig_path))?;
            let mut store = rig
                .calibration_store()?
                .ok_or("the rig has no calibrations file to store the result in")?;

            let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
            let mut target = rig.calibration_target(pitch, clock.clone())?;
            let mut timer = LoopTimer::new(clock.as_ref(), rig.timing().min_loop_micros());
            let outcome = calibration::calibrate(
                target.source.as_mut(),
                clock.as_ref(),
                &mut timer,
                rest,
                press,
                &target.bounds,
            )
            .ok_or("calibration did not finish")?;

            if !outcome.press_detected {
                println!("No key press detected, only the rest reading was updated.");
            }
            store.set(KeyBounds {
                pitch,
                min_adc: outcome.min_adc,
                max_adc: outcome.max_adc,
            });
            store.save()?;
            println!(
                "Key {}: min {}, max {} (saved to {})",
                pitch,
                outcome.min_adc,
                outcome.max_adc,
                store.path().display()
            );
        }
    }

    Ok(())
}
