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
};

use config::{Config, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::ConfigError;

/// The measured bounds of one key.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyBounds {
    pub pitch: u8,
    pub min_adc: i32,
    pub max_adc: i32,
}

#[derive(Deserialize, Serialize, Default)]
struct StoreFile {
    #[serde(default)]
    keys: Vec<KeyBounds>,
}

/// Calibrated bounds per pitch, kept in a YAML file next to the rig so they survive restarts.
pub struct CalibrationStore {
    path: PathBuf,
    keys: Vec<KeyBounds>,
}

impl CalibrationStore {
    /// Loads the store at the given path. A missing file is an empty store.
    pub fn load(path: &Path) -> Result<CalibrationStore, ConfigError> {
        if !path.exists() {
            info!(path = %path.display(), "No calibrations stored yet.");
            return Ok(CalibrationStore {
                path: path.to_path_buf(),
                keys: Vec::new(),
            });
        }

        let file = Config::builder()
            .add_source(File::from(path).format(FileFormat::Yaml))
            .build()?
            .try_deserialize::<StoreFile>()?;
        info!(path = %path.display(), keys = file.keys.len(), "Loaded calibrations.");
        Ok(CalibrationStore {
            path: path.to_path_buf(),
            keys: file.keys,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The stored bounds for the given pitch.
    pub fn get(&self, pitch: u8) -> Option<KeyBounds> {
        self.keys.iter().find(|key| key.pitch == pitch).copied()
    }

    pub fn keys(&self) -> &[KeyBounds] {
        &self.keys
    }

    /// Stores new bounds, replacing any for the same pitch.
    pub fn set(&mut self, bounds: KeyBounds) {
        match self.keys.iter_mut().find(|key| key.pitch == bounds.pitch) {
            Some(key) => *key = bounds,
            None => {
                self.keys.push(bounds);
                self.keys.sort_by_key(|key| key.pitch);
            }
        }
    }

    /// Writes the store back to its file.
    pub fn save(&self) -> Result<(), ConfigError> {
        let serialized = serde_yml::to_string(&StoreFile {
            keys: self.keys.clone(),
        })?;
        fs::write(&self.path, serialized).map_err(|source| ConfigError::Write {
            path: self.path.clone(),
            source,
        })?;
        info!(path = %self.path.display(), keys = self.keys.len(), "Saved calibrations.");
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::{error::Error, io::Write};

    use super::{CalibrationStore, KeyBounds};

    #[test]
    fn missing_file_is_empty() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let store = CalibrationStore::load(&dir.path().join("calibrations.yaml"))?;
        assert!(store.keys().is_empty());
        assert_eq!(None, store.get(60));
        Ok(())
    }

    #[test]
    fn save_and_reload() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("calibrations.yaml");

        let mut store = CalibrationStore::load(&path)?;
        store.set(KeyBounds {
            pitch: 62,
            min_adc: 30000,
            max_adc: 1200,
        });
        store.set(KeyBounds {
            pitch: 60,
            min_adc: 100,
            max_adc: 900,
        });
        store.set(KeyBounds {
            pitch: 62,
            min_adc: 31000,
            max_adc: 1100,
        });
        store.save()?;

        let store = CalibrationStore::load(&path)?;
        assert_eq!(
            vec![
                KeyBounds {
                    pitch: 60,
                    min_adc: 100,
                    max_adc: 900
                },
                KeyBounds {
                    pitch: 62,
                    min_adc: 31000,
                    max_adc: 1100
                },
            ],
            store.keys()
        );
        Ok(())
    }

    #[test]
    fn reads_handwritten_files() -> Result<(), Box<dyn Error>> {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile()?;
        writeln!(file, "keys:")?;
        writeln!(file, "  - pitch: 64")?;
        writeln!(file, "    min_adc: 5")?;
        writeln!(file, "    max_adc: -4000")?;

        let store = CalibrationStore::load(file.path())?;
        assert_eq!(
            Some(KeyBounds {
                pitch: 64,
                min_adc: 5,
                max_adc: -4000
            }),
            store.get(64)
        );
        Ok(())
    }
}
