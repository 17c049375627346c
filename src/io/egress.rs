//! Detections log - appends every notified outcome to file
//!
//! Outcomes are written in JSONL format (one JSON object per line) to the
//! file specified in config.

use crate::domain::outcome::DetectionOutcome;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, error, info};

/// Append-only JSONL writer for detection outcomes
pub struct DetectionLog {
    file_path: String,
}

impl DetectionLog {
    pub fn new(file_path: &str) -> Self {
        info!(file_path = %file_path, "detection_log_initialized");
        Self { file_path: file_path.to_string() }
    }

    /// Write one outcome to the log.
    /// Returns true if successful, false otherwise.
    pub fn append(&self, outcome: &DetectionOutcome) -> bool {
        let json = match serde_json::to_string(outcome) {
            Ok(json) => json,
            Err(e) => {
                error!(error = %e, "detection_log_serialize_failed");
                return false;
            }
        };

        match self.append_line(&json) {
            Ok(()) => {
                debug!(
                    action = %outcome.action.as_str(),
                    spot_id = ?outcome.spot_id,
                    "detection_logged"
                );
                true
            }
            Err(e) => {
                error!(error = %e, file = %self.file_path, "detection_log_write_failed");
                false
            }
        }
    }

    /// Append a line to the log file
    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }
}
