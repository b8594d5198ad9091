//! Strips persisted as a JSON file.

use std::io::ErrorKind;
use std::path::PathBuf;

use swath_core::{Strip, StoreError, StripStore};

/// A [`StripStore`] backed by one pretty-printed JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl StripStore for JsonFileStore {
    fn load_strips(&self) -> Result<Vec<Strip>, StoreError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(StoreError::NotFound),
            Err(e) => return Err(StoreError::Io(format!("{}: {e}", self.path.display()))),
        };
        serde_json::from_str(&text).map_err(|e| StoreError::Format(e.to_string()))
    }

    fn save_strips(&mut self, strips: &[Strip]) -> Result<(), StoreError> {
        let json =
            serde_json::to_string_pretty(strips).map_err(|e| StoreError::Format(e.to_string()))?;
        std::fs::write(&self.path, json)
            .map_err(|e| StoreError::Io(format!("{}: {e}", self.path.display())))
    }
}
