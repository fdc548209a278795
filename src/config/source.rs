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
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use duration_string::DurationString;
use parking_lot::Mutex;
use serde::Deserialize;

use crate::{
    adc::{self, AdcError, AdcSource},
    timing::Clock,
};

use super::ConfigError;

/// A YAML representation of a sensor.
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Source {
    /// A sensor stuck at one reading.
    Constant { value: i32 },

    /// A synthetic key moving between min and max once per period.
    Sine { min: i32, max: i32, period: String },

    /// A recording of a real sensor.
    Replay {
        path: String,
        #[serde(default)]
        looped: bool,
    },

    /// An input of a multiplexer defined in the same rig.
    Multiplexer { name: String, channel: usize },
}

/// What sources need to be built: the rig's clock, the directory relative paths are resolved
/// against, and the multiplexers built so far.
pub(super) struct SourceContext<'a> {
    pub clock: &'a Arc<dyn Clock>,
    pub base_dir: &'a Path,
    pub multiplexers: &'a HashMap<String, Arc<Mutex<adc::Multiplexer>>>,
}

impl Source {
    pub(super) fn build(&self, context: &SourceContext) -> Result<Box<dyn AdcSource>, ConfigError> {
        Ok(match self {
            Source::Constant { value } => Box::new(adc::Constant::new(*value)),
            Source::Sine { min, max, period } => Box::new(adc::Sine::new(
                context.clock.clone(),
                *min,
                *max,
                parse_duration(period)?,
            )),
            Source::Replay { path, looped } => Box::new(adc::Replay::load(
                &resolve(context.base_dir, path),
                context.clock.clone(),
                *looped,
            )?),
            Source::Multiplexer { name, channel } => {
                let mux = context
                    .multiplexers
                    .get(name)
                    .ok_or_else(|| AdcError::UnknownMultiplexer(name.clone()))?;
                Box::new(adc::Multiplexer::channel(mux, *channel)?)
            }
        })
    }
}

/// Parses a duration string such as `500ms`.
pub(super) fn parse_duration(value: &str) -> Result<Duration, ConfigError> {
    match DurationString::from_string(value.to_string()) {
        Ok(duration) => Ok(duration.into()),
        Err(e) => Err(ConfigError::InvalidDuration {
            value: value.to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Resolves a path from the config against the directory of the config file.
pub(super) fn resolve(base_dir: &Path, path: &str) -> PathBuf {
    let path = PathBuf::from(path);
    if path.is_absolute() {
        path
    } else {
        base_dir.join(path)
    }
}

#[cfg(test)]
mod test {
    use std::{collections::HashMap, error::Error, path::Path, sync::Arc, time::Duration};

    use config::{Config, File, FileFormat};

    use crate::{
        config::ConfigError,
        timing::{Clock, SteppingClock},
    };

    use super::{parse_duration, resolve, Source, SourceContext};

    #[test]
    fn deserialize_sources() -> Result<(), Box<dyn Error>> {
        let yaml = r#"
            sources:
            - type: constant
              value: 12
            - type: sine
              min: 0
              max: 1000
              period: 500ms
            - type: replay
              path: recordings/key.csv
            - type: multiplexer
              name: mux0
              channel: 3
        "#;

        #[derive(serde::Deserialize)]
        struct Sources {
            sources: Vec<Source>,
        }
        let sources = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize::<Sources>()?
            .sources;

        assert_eq!(
            vec![
                Source::Constant { value: 12 },
                Source::Sine {
                    min: 0,
                    max: 1000,
                    period: "500ms".to_string()
                },
                Source::Replay {
                    path: "recordings/key.csv".to_string(),
                    looped: false
                },
                Source::Multiplexer {
                    name: "mux0".to_string(),
                    channel: 3
                },
            ],
            sources
        );
        Ok(())
    }

    #[test]
    fn build_errors() {
        let clock: Arc<dyn Clock> = Arc::new(SteppingClock::new(100));
        let multiplexers = HashMap::new();
        let context = SourceContext {
            clock: &clock,
            base_dir: Path::new("/nonexistent"),
            multiplexers: &multiplexers,
        };

        let unknown = Source::Multiplexer {
            name: "mux9".to_string(),
            channel: 0,
        };
        assert!(matches!(unknown.build(&context), Err(ConfigError::Adc(_))));

        let missing = Source::Replay {
            path: "key.csv".to_string(),
            looped: true,
        };
        assert!(matches!(missing.build(&context), Err(ConfigError::Adc(_))));

        let sine = Source::Sine {
            min: 0,
            max: 10,
            period: "soon".to_string(),
        };
        assert!(matches!(
            sine.build(&context),
            Err(ConfigError::InvalidDuration { .. })
        ));
    }

    #[test]
    fn durations_and_paths() -> Result<(), ConfigError> {
        assert_eq!(Duration::from_millis(250), parse_duration("250ms")?);
        assert_eq!(
            Path::new("/rigs/key.csv"),
            resolve(Path::new("/rigs"), "key.csv")
        );
        assert_eq!(Path::new("/key.csv"), resolve(Path::new("/rigs"), "/key.csv"));
        Ok(())
    }
}
