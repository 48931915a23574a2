//! Error taxonomy for reconciliation operations

use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::store::StoreError;

/// Coarse classification used by callers to pick a transport representation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    Conflict,
    Timeout,
    InvalidArgument,
    Unavailable,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Timeout => "timeout",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReconcileError {
    #[error("instance {0:?} not found")]
    InstanceNotFound(String),

    #[error("no trigger {trigger:?} found in instance {instance:?}")]
    TriggerNotFound { instance: String, trigger: String },

    #[error("instance {0:?} already exists")]
    AlreadyExists(String),

    #[error("instance {instance:?} was modified concurrently, gave up after {attempts} attempt(s)")]
    Conflict { instance: String, attempts: u32 },

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("cluster unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ReconcileError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReconcileError::InstanceNotFound(_) | ReconcileError::TriggerNotFound { .. } => {
                ErrorKind::NotFound
            }
            ReconcileError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            ReconcileError::Conflict { .. } => ErrorKind::Conflict,
            ReconcileError::Timeout { .. } => ErrorKind::Timeout,
            ReconcileError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            ReconcileError::Unavailable(_) => ErrorKind::Unavailable,
            ReconcileError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether a read-modify-write cycle may be retried after this error
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Conflict | ErrorKind::Timeout | ErrorKind::Unavailable
        )
    }

    /// Classify a store failure in the context of one instance
    pub(crate) fn from_store(instance: &str, err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => ReconcileError::InstanceNotFound(instance.to_string()),
            StoreError::AlreadyExists(_) => ReconcileError::AlreadyExists(instance.to_string()),
            StoreError::Conflict(_) => ReconcileError::Conflict {
                instance: instance.to_string(),
                attempts: 1,
            },
            StoreError::Unavailable(msg) => ReconcileError::Unavailable(msg),
            StoreError::Internal(msg) => ReconcileError::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classes() {
        assert!(ReconcileError::Unavailable("down".into()).is_transient());
        assert!(ReconcileError::Timeout { operation: "get", after: Duration::from_secs(1) }.is_transient());
        assert!(ReconcileError::Conflict { instance: "a".into(), attempts: 1 }.is_transient());
        assert!(!ReconcileError::InstanceNotFound("a".into()).is_transient());
        assert!(!ReconcileError::InvalidArgument("bad".into()).is_transient());
        assert!(!ReconcileError::Internal("boom".into()).is_transient());
    }

    #[test]
    fn test_store_errors_are_scoped_to_the_instance() {
        let err = ReconcileError::from_store("web1", StoreError::NotFound("web1-scaledobject-config".into()));
        assert_eq!(err, ReconcileError::InstanceNotFound("web1".into()));
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = ReconcileError::from_store("web1", StoreError::AlreadyExists("x".into()));
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_trigger_not_found_message() {
        let err = ReconcileError::TriggerNotFound {
            instance: "web1".into(),
            trigger: "cron1".into(),
        };
        assert_eq!(err.to_string(), "no trigger \"cron1\" found in instance \"web1\"");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
