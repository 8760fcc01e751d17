use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

use crate::record::SampleRecord;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("record store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("record serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("record {0} not found")]
    NotFound(Uuid),

    #[error("record {0} already exists")]
    AlreadyExists(Uuid),
}

/// Durable storage for finished records, keyed by `sample_id`.
pub trait RecordStore {
    /// Writes a new record. Existing records are never replaced.
    fn persist(&self, record: &SampleRecord) -> Result<PathBuf, StoreError>;
    fn load(&self, sample_id: Uuid) -> Result<SampleRecord, StoreError>;
    /// Every stored record, sorted by sample id.
    fn list(&self) -> Result<Vec<SampleRecord>, StoreError>;
}

/// One pretty-printed JSON document per record: `<dir>/<sample_id>.json`.
pub struct FileRecordStore {
    dir: PathBuf,
}

impl FileRecordStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record_path(&self, sample_id: Uuid) -> PathBuf {
        self.dir.join(format!("{sample_id}.json"))
    }
}

impl RecordStore for FileRecordStore {
    fn persist(&self, record: &SampleRecord) -> Result<PathBuf, StoreError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.record_path(record.sample_id);
        let json = serde_json::to_string_pretty(record)?;

        let mut file = match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StoreError::AlreadyExists(record.sample_id));
            }
            Err(e) => return Err(e.into()),
        };
        std::io::Write::write_all(&mut file, json.as_bytes())?;
        file.sync_all()?;
        Ok(path)
    }

    fn load(&self, sample_id: Uuid) -> Result<SampleRecord, StoreError> {
        let path = self.record_path(sample_id);
        if !path.exists() {
            return Err(StoreError::NotFound(sample_id));
        }
        load_record(&path)
    }

    fn list(&self) -> Result<Vec<SampleRecord>, StoreError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                records.push(load_record(&path)?);
            }
        }
        records.sort_by_key(|r| r.sample_id);
        Ok(records)
    }
}

/// Reads a record file from anywhere on disk.
pub fn load_record(path: &Path) -> Result<SampleRecord, StoreError> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
