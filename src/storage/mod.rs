//! Storage module for persisting collection output
//!
//! This module handles everything the collector writes to disk:
//! - Identifier checkpoints keyed by entity type and page range
//! - The flattened record table, rewritten after every batch
//! - The append-only log of permanently failed URLs
//!
//! Files that are rewritten (checkpoints and the record table) are written to
//! a temporary file in the same directory and renamed over the target, so a
//! reader never observes a partial file.

mod failures;
mod identifiers;
mod table;

pub use failures::{FailureSink, FileFailureSink, MemoryFailureSink};
pub use identifiers::{CheckpointKey, IdentifierStore};
pub use table::RecordTable;

use crate::CollectError;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Replaces the file at `path` with `contents` in one rename
///
/// # Returns
///
/// * `Ok(())` - The new contents are in place
/// * `Err(CollectError)` - Writing the temporary file or renaming it failed;
///   the previous file, if any, is unchanged
pub(crate) fn replace_file(path: &Path, contents: &[u8]) -> Result<(), CollectError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| CollectError::Persist {
        path: path.display().to_string(),
        source: e.error,
    })?;

    Ok(())
}

/// Creates a CSV writer over an in-memory buffer with `\n` line endings
pub(crate) fn csv_buffer() -> csv::Writer<Vec<u8>> {
    csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new())
}

/// Finishes a CSV buffer created by `csv_buffer`
pub(crate) fn finish_csv(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>, CollectError> {
    writer
        .into_inner()
        .map_err(|e| CollectError::Io(e.into_error()))
}
