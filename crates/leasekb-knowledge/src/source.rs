//! Corpus record sources.

use std::path::PathBuf;

use leasekb_core::error::{KbError, Result};
use serde_json::Value;

/// One source row: column name → value.
pub type Record = serde_json::Map<String, Value>;

/// Anything that can produce a corpus's raw records.
///
/// Read once per lazy build; implementations do blocking I/O and are
/// called from a blocking task.
pub trait RecordSource: Send + Sync {
    /// Human-readable origin, used in logs.
    fn describe(&self) -> String;

    fn read(&self) -> Result<Vec<Record>>;
}

/// CSV file with a header row. Every cell becomes a string value.
#[derive(Debug, Clone)]
pub struct CsvSource {
    path: PathBuf,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RecordSource for CsvSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn read(&self) -> Result<Vec<Record>> {
        if !self.path.exists() {
            return Err(KbError::Upstream(format!(
                "source not found: {}",
                self.path.display()
            )));
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_path(&self.path)
            .map_err(|e| KbError::Upstream(format!("{}: {e}", self.path.display())))?;

        let headers = reader
            .headers()
            .map_err(|e| KbError::Upstream(format!("{}: bad header: {e}", self.path.display())))?
            .clone();

        let mut records = Vec::new();
        for (line, row) in reader.records().enumerate() {
            let row = row.map_err(|e| {
                KbError::Upstream(format!("{} row {}: {e}", self.path.display(), line + 1))
            })?;
            let record: Record = headers
                .iter()
                .zip(row.iter())
                .map(|(h, v)| (h.to_string(), Value::String(v.to_string())))
                .collect();
            records.push(record);
        }
        tracing::debug!("📄 Read {} records from {}", records.len(), self.path.display());
        Ok(records)
    }
}

/// In-memory records.
impl RecordSource for Vec<Record> {
    fn describe(&self) -> String {
        format!("{} in-memory records", self.len())
    }

    fn read(&self) -> Result<Vec<Record>> {
        Ok(self.clone())
    }
}

/// Non-empty string form of a field, trimmed. Numbers render as-is.
pub fn field<'a>(record: &'a Record, key: &str) -> Option<std::borrow::Cow<'a, str>> {
    match record.get(key)? {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then_some(std::borrow::Cow::Borrowed(s))
        }
        Value::Null => None,
        Value::Bool(false) => None,
        other => Some(std::borrow::Cow::Owned(other.to_string())),
    }
}
