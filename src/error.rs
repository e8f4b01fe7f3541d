//! Error types for raidtier
//!
//! A single unified error enum covers precondition checks, external tool
//! failures, and topology invariant violations. The CLI maps every variant
//! to an exit code via [`Error::exit_code`].

use thiserror::Error;

/// Unified error type for the pool manager
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    // =========================================================================
    // External Tool Errors
    // =========================================================================
    #[error("Missing dependency: {program} (is it installed and on PATH?)")]
    MissingDependency { program: String },

    #[error("Command `{program}` exited with status {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: i32,
        stderr: String,
    },

    #[error("Failed to run `{program}`: {source}")]
    CommandSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unparseable output from `{program}`: {reason}")]
    CommandOutput { program: String, reason: String },

    // =========================================================================
    // Precondition Violations
    // =========================================================================
    #[error("Need at least {required} drives, got {supplied}")]
    TooFewDrives { supplied: usize, required: usize },

    #[error("Drive {device} is not empty - remove existing partitions first")]
    DriveNotEmpty { device: String },

    #[error("Drive {device} listed more than once")]
    DuplicateDrive { device: String },

    #[error(
        "New drive capacity {capacity} bytes matches no tier boundary \
         (boundaries: {boundaries:?}) and does not exceed the total"
    )]
    SizeBoundaryMismatch {
        capacity: u64,
        boundaries: Vec<u64>,
    },

    #[error("No degraded array on {lv}: nothing to replace (use `add` to widen a clean volume)")]
    NothingToReplace { lv: String },

    #[error("Replacement drive too small: degraded arrays need {required} bytes, drive offers {available}")]
    ReplacementTooSmall { required: u64, available: u64 },

    #[error("Operation aborted by operator")]
    Aborted,

    // =========================================================================
    // Topology Errors
    // =========================================================================
    #[error("{kind} {name} does not exist")]
    EntityAbsent { kind: &'static str, name: String },

    #[error("Drive not found: {device}")]
    DeviceNotFound { device: String },

    #[error("Array {array} member sizes disagree: {expected} vs {found}")]
    MemberSizeMismatch {
        array: String,
        expected: u64,
        found: u64,
    },

    #[error("Could not create partition of {requested} bytes on {device}")]
    PartitionCreateFailed { device: String, requested: u64 },

    // =========================================================================
    // Resync Errors
    // =========================================================================
    #[error("Array {array} is in unexpected state \"{state}\" - refusing to continue")]
    UnexpectedArrayState { array: String, state: String },

    #[error("Array {array} did not reach clean state after {polls} polls")]
    ResyncTimeout { array: String, polls: u32 },

    // =========================================================================
    // Parse / IO Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True when the error was caught before any mutation was attempted.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Error::TooFewDrives { .. }
                | Error::DriveNotEmpty { .. }
                | Error::DuplicateDrive { .. }
                | Error::SizeBoundaryMismatch { .. }
                | Error::NothingToReplace { .. }
                | Error::ReplacementTooSmall { .. }
                | Error::Aborted
        )
    }

    /// Process exit code for the CLI: 2 for refused preconditions,
    /// 1 for operational failures.
    pub fn exit_code(&self) -> i32 {
        if self.is_precondition() {
            2
        } else {
            1
        }
    }
}

/// Result type alias for the pool manager
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_exit_codes() {
        let err = Error::TooFewDrives {
            supplied: 1,
            required: 2,
        };
        assert!(err.is_precondition());
        assert_eq!(err.exit_code(), 2);

        let err = Error::Aborted;
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_operational_exit_codes() {
        let err = Error::ResyncTimeout {
            array: "/dev/md0".into(),
            polls: 960,
        };
        assert!(!err.is_precondition());
        assert_eq!(err.exit_code(), 1);

        let err = Error::UnexpectedArrayState {
            array: "/dev/md0".into(),
            state: "clean, FAILED".into(),
        };
        assert_eq!(err.exit_code(), 1);
    }
}
