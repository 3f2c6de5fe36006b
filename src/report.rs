use std::fmt;
use std::path::PathBuf;

use strum_macros::Display;

use crate::error::StageError;
use crate::track::Track;

/// Pipeline stage a failure occurred in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Stage {
    Cover,
    Transcode,
    Inject,
    Verify,
    Finalize,
}

/// One failure, tied to the track it happened on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub track: PathBuf,
    pub stage: Stage,
    pub message: String,
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.stage,
            self.track.file_name().unwrap_or_default().to_string_lossy(),
            self.message
        )
    }
}

/// Append-only log of every failure seen during a batch.
#[derive(Debug, Default, Clone)]
pub struct ErrorTracker {
    records: Vec<ErrorRecord>,
}

impl ErrorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, track: &Track, error: &StageError) {
        self.records.push(ErrorRecord {
            track: track.source().to_path_buf(),
            stage: error.stage(),
            message: error.to_string(),
        });
    }

    /// Moves every record of `other` to the end of this tracker.
    pub fn append(&mut self, other: ErrorTracker) {
        self.records.extend(other.records);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ErrorRecord] {
        &self.records
    }

    /// Multi-line report: a header with the count, then one line per record.
    pub fn render(&self) -> String {
        let mut out = format!("{} error(s) recorded", self.records.len());
        for record in &self.records {
            out.push('\n');
            out.push_str(&record.to_string());
        }
        out
    }
}
