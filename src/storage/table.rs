//! In-memory record table and its CSV snapshot
//!
//! Rows do not share a fixed schema: each detail record brings its own
//! infobox keys. The table tracks the union of all columns in first-seen
//! order and fills cells a row does not have with the empty string.

use crate::storage::{csv_buffer, finish_csv, replace_file};
use crate::subject::FlatRecord;
use crate::CollectError;
use std::collections::HashSet;
use std::path::Path;

/// Ordered, append-only collection of flattened records
#[derive(Debug, Clone, Default)]
pub struct RecordTable {
    rows: Vec<FlatRecord>,
    columns: Vec<String>,
    seen: HashSet<String>,
}

impl RecordTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a row, extending the column set with any new columns
    pub fn push(&mut self, record: FlatRecord) {
        for column in record.columns() {
            if self.seen.insert(column.to_string()) {
                self.columns.push(column.to_string());
            }
        }
        self.rows.push(record);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Union of all row columns, in the order they were first seen
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Serializes the whole table as CSV with a header row
    ///
    /// An empty table serializes to an empty document.
    pub fn to_csv(&self) -> Result<Vec<u8>, CollectError> {
        if self.columns.is_empty() {
            return Ok(Vec::new());
        }

        let mut writer = csv_buffer();
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(self.columns.iter().map(|column| row.cell(column)))?;
        }
        finish_csv(writer)
    }

    /// Replaces the file at `path` with a snapshot of the whole table
    pub fn persist(&self, path: &Path) -> Result<(), CollectError> {
        let contents = self.to_csv()?;
        replace_file(path, &contents)
    }
}
