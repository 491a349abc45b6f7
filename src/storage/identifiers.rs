//! Identifier checkpoints
//!
//! A ranking scan is expensive, so its result is saved as a one-column CSV
//! named after the entity type and the exact page range that produced it.
//! Asking for a different range (even an overlapping one) finds no checkpoint
//! and scans again.

use crate::storage::{csv_buffer, finish_csv, replace_file};
use crate::subject::{EntityType, SubjectId};
use crate::CollectError;
use std::path::{Path, PathBuf};

/// Header of the single checkpoint column
const HEADER: &str = "subject_code";

/// Identifies one checkpoint: an entity type and an inclusive page range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CheckpointKey {
    pub entity_type: EntityType,
    pub start_page: u32,
    pub end_page: u32,
}

impl CheckpointKey {
    pub fn new(entity_type: EntityType, start_page: u32, end_page: u32) -> Self {
        Self {
            entity_type,
            start_page,
            end_page,
        }
    }

    /// File name of this checkpoint inside the store directory
    pub fn file_name(&self) -> String {
        format!(
            "{}_subject_codes_{}_{}.csv",
            self.entity_type, self.start_page, self.end_page
        )
    }
}

/// Directory of identifier checkpoints
#[derive(Debug, Clone)]
pub struct IdentifierStore {
    dir: PathBuf,
}

impl IdentifierStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the checkpoint file for `key`
    pub fn path(&self, key: &CheckpointKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    /// Returns true if a checkpoint exists for exactly this key
    pub fn exists(&self, key: &CheckpointKey) -> bool {
        self.path(key).is_file()
    }

    /// Loads the identifiers saved under `key`, in file order
    ///
    /// The header row is skipped and every value is returned as the literal
    /// token from the file.
    pub fn load(&self, key: &CheckpointKey) -> Result<Vec<SubjectId>, CollectError> {
        let path = self.path(key);
        load_checkpoint(&path)
    }

    /// Saves `identifiers` under `key`, replacing any previous checkpoint
    pub fn save(&self, key: &CheckpointKey, identifiers: &[SubjectId]) -> Result<(), CollectError> {
        let mut writer = csv_buffer();
        writer.write_record([HEADER])?;
        for id in identifiers {
            writer.write_record([id.as_str()])?;
        }
        let contents = finish_csv(writer)?;

        let path = self.path(key);
        replace_file(&path, &contents)?;
        tracing::debug!(
            "Saved {} identifiers to {}",
            identifiers.len(),
            path.display()
        );
        Ok(())
    }
}

fn load_checkpoint(path: &Path) -> Result<Vec<SubjectId>, CollectError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)?;

    let mut identifiers = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let token = record.get(0).ok_or_else(|| CollectError::Checkpoint {
            path: path.display().to_string(),
            message: format!("row {} has no identifier", row + 1),
        })?;
        identifiers.push(SubjectId::new(token));
    }

    Ok(identifiers)
}
