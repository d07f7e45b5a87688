//! Disk memoization for expensive intermediate results.
//!
//! Every record is one JSON file named after its cache key. A missing or
//! unreadable record is treated as absent (logged, recomputed), never as a
//! fatal error.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::EvalError;

/// String-keyed JSON record store.
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, EvalError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.path(key).is_file()
    }

    /// Load a record, or `None` when it is absent or corrupt.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let path = self.path(key);
        let file = File::open(&path).ok()?;
        match serde_json::from_reader(BufReader::new(file)) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(key, path = %path.display(), %err, "corrupt state record, recomputing");
                None
            }
        }
    }

    pub fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<(), EvalError> {
        let path = self.path(key);
        let file = File::create(&path)?;
        serde_json::to_writer(BufWriter::new(file), value)?;
        Ok(())
    }

    /// Return the stored record for `key`, computing and persisting it on
    /// a miss.
    pub fn get_or_compute<T, F>(&self, key: &str, compute: F) -> Result<T, EvalError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T, EvalError>,
    {
        if let Some(value) = self.load(key) {
            debug!(key, "memoized record hit");
            return Ok(value);
        }
        debug!(key, "memoized record miss, computing");
        let value = compute()?;
        self.save(key, &value)?;
        Ok(value)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
