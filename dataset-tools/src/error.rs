//! Dataset tool errors.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while validating, combining or converting datasets.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// Input path does not exist.
    #[error("File not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// A JSONL line failed to parse or violates the conversation schema.
    #[error("Malformed record at {}:{line}: {issue}", path.display())]
    MalformedRecord {
        path: PathBuf,
        line: usize,
        issue: String,
    },

    /// Validation found structural errors across one or more files.
    #[error("{count} invalid record(s) found")]
    InvalidRecords { count: usize },

    /// Combine was given inputs that do not validate cleanly.
    #[error(
        "Refusing to combine: {count} invalid record(s), first at {}:{line}: {issue}",
        path.display()
    )]
    DataIntegrity {
        count: usize,
        path: PathBuf,
        line: usize,
        issue: String,
    },

    /// Split ratios or other configuration values are unusable.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Requested output format is not one of the known formats.
    #[error("Unsupported format '{0}'. Valid: alpaca, chatml, simple")]
    UnsupportedFormat(String),

    /// Filesystem failure.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DatasetError {
    /// Wrap an I/O error, promoting "not found" to its own kind.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            DatasetError::NotFound { path }
        } else {
            DatasetError::Io { path, source }
        }
    }

    /// Process exit code reported by the command line for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            DatasetError::Io { .. } | DatasetError::Serialization(_) => 1,
            DatasetError::NotFound { .. } => 2,
            DatasetError::MalformedRecord { .. } | DatasetError::InvalidRecords { .. } => 3,
            DatasetError::DataIntegrity { .. } => 4,
            DatasetError::InvalidConfig(_) => 5,
            DatasetError::UnsupportedFormat(_) => 6,
        }
    }
}

pub type Result<T> = std::result::Result<T, DatasetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_not_found_is_promoted() {
        let err = DatasetError::io(
            "missing.jsonl",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(err, DatasetError::NotFound { .. }));
        assert_eq!(err.exit_code(), 2);

        let err = DatasetError::io(
            "locked.jsonl",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope"),
        );
        assert!(matches!(err, DatasetError::Io { .. }));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_exit_codes_are_distinct() {
        let codes = [
            DatasetError::NotFound { path: "a".into() }.exit_code(),
            DatasetError::MalformedRecord {
                path: "a".into(),
                line: 1,
                issue: "x".into(),
            }
            .exit_code(),
            DatasetError::DataIntegrity {
                count: 1,
                path: "a".into(),
                line: 1,
                issue: "x".into(),
            }
            .exit_code(),
            DatasetError::InvalidConfig("x".into()).exit_code(),
            DatasetError::UnsupportedFormat("x".into()).exit_code(),
        ];
        let mut unique = codes.to_vec();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), codes.len());
        assert!(codes.iter().all(|c| *c != 0));
    }

    #[test]
    fn test_malformed_record_names_line() {
        let err = DatasetError::MalformedRecord {
            path: "data/raw.jsonl".into(),
            line: 7,
            issue: "Empty messages list".into(),
        };
        assert_eq!(
            err.to_string(),
            "Malformed record at data/raw.jsonl:7: Empty messages list"
        );
    }
}
