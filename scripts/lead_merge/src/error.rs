//! Error types for lead merging

use thiserror::Error;

/// Failures a merge run reports to its caller.
///
/// Row-level gaps (missing name/phone) are not errors; they are skipped and counted.
#[derive(Debug, Error)]
pub enum MergeError {
    /// Neither export was supplied
    #[error("No input provided: supply a Yiche export, an Autohome export, or both")]
    NoInput,

    /// Inputs were read but every row was skipped or excluded
    #[error("No valid leads found ({skipped} rows missing name/phone, {excluded} rows excluded by source rules)")]
    NoValidRows { skipped: usize, excluded: usize },

    /// Roster has nobody enabled
    #[error("No consultant is enabled; enable at least one before merging")]
    NoConsultants,

    /// An input file could not be read or parsed
    #[error("Failed to read {file}: {message}")]
    Read { file: String, message: String },

    /// CSV repair produced text that still does not parse
    #[error("Repair failed for {file}: {message}")]
    RepairFailed { file: String, message: String },
}

impl MergeError {
    pub fn read(file: impl Into<String>, message: impl std::fmt::Display) -> Self {
        MergeError::Read {
            file: file.into(),
            message: message.to_string(),
        }
    }

    pub fn repair_failed(file: impl Into<String>, message: impl std::fmt::Display) -> Self {
        MergeError::RepairFailed {
            file: file.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MergeError>;
