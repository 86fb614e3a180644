use std::collections::HashMap;
use std::path::PathBuf;
use std::{fs, io};

use crate::mix::MixSnapshot;
use crate::store::StoreError::{LoadSnapshotError, SaveSnapshotError};

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    IoError(#[from] io::Error),

    #[error("failed to deserialize mix settings: {message}")]
    LoadSnapshotError { message: String },

    #[error("failed to serialize mix settings: {message}")]
    SaveSnapshotError { message: String },
}

/// Key/value persistence of per-song mix settings. A missing record is a
/// normal, non-error case (defaults apply).
pub trait MixStore {
    fn load(&self, song_id: &str) -> Result<Option<MixSnapshot>, StoreError>;
    fn save(&mut self, song_id: &str, snapshot: &MixSnapshot) -> Result<(), StoreError>;
}

fn mix_key(song_id: &str) -> String {
    format!("mix:{song_id}")
}

/// File-per-song JSON store under a single directory.
pub struct JsonMixStore {
    dir: PathBuf,
}

impl JsonMixStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        JsonMixStore { dir: dir.into() }
    }

    fn record_path(&self, song_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}.json", crate::sanitize_component(&mix_key(song_id))))
    }
}

impl MixStore for JsonMixStore {
    fn load(&self, song_id: &str) -> Result<Option<MixSnapshot>, StoreError> {
        let serialized = match fs::read_to_string(self.record_path(song_id)) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let snapshot = serde_json::from_str(serialized.as_str()).map_err(|e| {
            LoadSnapshotError {
                message: e.to_string(),
            }
        })?;

        Ok(Some(snapshot))
    }

    fn save(&mut self, song_id: &str, snapshot: &MixSnapshot) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;

        let serialized = serde_json::to_string(snapshot).map_err(|e| SaveSnapshotError {
            message: e.to_string(),
        })?;

        fs::write(self.record_path(song_id), serialized)?;
        Ok(())
    }
}

/// In-memory store, for tests and for sessions that do not persist.
#[derive(Debug, Default)]
pub struct MemoryMixStore {
    records: HashMap<String, MixSnapshot>,
}

impl MemoryMixStore {
    pub fn new() -> Self {
        MemoryMixStore::default()
    }
}

impl MixStore for MemoryMixStore {
    fn load(&self, song_id: &str) -> Result<Option<MixSnapshot>, StoreError> {
        Ok(self.records.get(&mix_key(song_id)).cloned())
    }

    fn save(&mut self, song_id: &str, snapshot: &MixSnapshot) -> Result<(), StoreError> {
        self.records.insert(mix_key(song_id), snapshot.clone());
        Ok(())
    }
}
