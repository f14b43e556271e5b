use std::fmt;
use std::path::PathBuf;

use tessera_config::{ConfigError, ErrorKind};
use tessera_fragment::FragmentError;
use tessera_store::StoreError;
use thiserror::Error;

/// Errors raised by the output protocol and recovery
#[derive(Error, Debug)]
pub enum OutputError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Fragment(#[from] FragmentError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No data source is mounted at {path:?}")]
    UnknownContainer { path: String },

    #[error(
        "Failed to {operation} transaction {transaction_id} on {} data source(s), commit marker kept at {}: {}",
        .failures.len(),
        .marker.display(),
        join_failures(.failures)
    )]
    PartialFailure {
        transaction_id: String,
        operation: &'static str,
        marker: PathBuf,
        failures: Vec<InstanceFailure>,
    },
}

impl OutputError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OutputError::Store(e) => e.kind(),
            OutputError::Fragment(e) => e.kind(),
            OutputError::Config(e) => e.kind(),
            OutputError::InvalidArgument(_) | OutputError::UnknownContainer { .. } => {
                ErrorKind::Validation
            }
            OutputError::PartialFailure { .. } => ErrorKind::PartialFailure,
        }
    }
}

/// One data source instance that failed during recovery
#[derive(Debug)]
pub struct InstanceFailure {
    pub container_path: String,
    pub data_source_id: String,
    pub error: Box<OutputError>,
}

impl fmt::Display for InstanceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (path={:?}): {}",
            self.data_source_id, self.container_path, self.error
        )
    }
}

fn join_failures(failures: &[InstanceFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, OutputError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_delegates() {
        assert_eq!(OutputError::from(StoreError::Cancelled).kind(), ErrorKind::Cancelled);
        assert_eq!(
            OutputError::UnknownContainer { path: "x".into() }.kind(),
            ErrorKind::Validation
        );
    }

    #[test]
    fn test_partial_failure_message() {
        let err = OutputError::PartialFailure {
            transaction_id: "ex1".into(),
            operation: "apply",
            marker: PathBuf::from("/sys/transactions/ex1"),
            failures: vec![
                InstanceFailure {
                    container_path: "a".into(),
                    data_source_id: "alpha".into(),
                    error: Box::new(OutputError::InvalidArgument("boom".into())),
                },
                InstanceFailure {
                    container_path: "b".into(),
                    data_source_id: "beta".into(),
                    error: Box::new(OutputError::from(StoreError::Cancelled)),
                },
            ],
        };
        assert_eq!(err.kind(), ErrorKind::PartialFailure);
        let message = err.to_string();
        assert!(message.contains("apply transaction ex1 on 2"), "{}", message);
        assert!(message.contains("/sys/transactions/ex1"), "{}", message);
        assert!(message.contains("alpha (path=\"a\"): Invalid argument: boom"), "{}", message);
        assert!(message.contains("; beta (path=\"b\")"), "{}", message);
    }
}
