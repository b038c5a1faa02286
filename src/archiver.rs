use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::Result;
use serde::Serialize;

use crate::batch::{BatchSummary, FailureRegistry};
use crate::models::{EnrichedRow, LogEvent};

/// Everything one run produced, as written to disk.
#[derive(Serialize)]
pub struct RunArchive<'a, R: Serialize> {
    pub timestamp: String,
    pub summary: &'a BatchSummary,
    pub rows: &'a [EnrichedRow<R>],
    pub failures: &'a FailureRegistry,
    pub log: &'a [LogEvent],
}

impl<'a, R: Serialize> RunArchive<'a, R> {
    pub fn new(
        summary: &'a BatchSummary,
        rows: &'a [EnrichedRow<R>],
        failures: &'a FailureRegistry,
        log: &'a [LogEvent],
    ) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            summary,
            rows,
            failures,
            log,
        }
    }
}

pub fn save_to_file<T: Serialize>(value: &T, filename: impl AsRef<Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    let mut file = File::create(filename)?;
    file.write_all(json.as_bytes())?;
    Ok(())
}
