use std::path::PathBuf;

use thiserror::Error;

/// Every failure the notebook model can report.
///
/// Structural mutations never swallow one of these: either the mutation
/// completed and was persisted, or the in-memory state was restored and the
/// error is returned to the caller.
#[derive(Error, Debug)]
pub enum NotebookError {
    #[error("Directory config not found in {0}")]
    ConfigMissing(PathBuf),

    #[error("Invalid directory config in {path}: {reason}")]
    ConfigCorrupt { path: PathBuf, reason: String },

    #[error("Failed to {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Name conflicts with existing entry: {0}")]
    NameConflict(String),

    #[error("Illegal name: {0:?}")]
    IllegalName(String),

    #[error("Directory {0} is not opened")]
    NotOpened(String),

    #[error("{0} is not a member of directory {1}")]
    NotMember(String, String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid reorder of [{first}, {last}] to {dest}")]
    InvalidReorder {
        first: usize,
        last: usize,
        dest: usize,
    },

    #[error("Invalid permutation of length {got} for {expected} entries")]
    InvalidPermutation { expected: usize, got: usize },

    #[error("Node handle refers to a closed or deleted node")]
    StaleNode,

    #[error("{0} already belongs to a directory")]
    AlreadyAttached(String),

    #[error("Operation not supported on the notebook root")]
    RootDirectory,

    #[error("{failed} of {total} items failed: {}", .messages.join("; "))]
    Batch {
        failed: usize,
        total: usize,
        messages: Vec<String>,
    },

    #[error("Settings error: {0}")]
    Settings(String),
}

impl NotebookError {
    pub fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, NotebookError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_message_names_action_and_path() {
        let err = NotebookError::io(
            "create directory",
            "/tmp/nb/Projects",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("create directory"));
        assert!(msg.contains("/tmp/nb/Projects"));
    }

    #[test]
    fn test_batch_error_joins_messages() {
        let err = NotebookError::Batch {
            failed: 2,
            total: 3,
            messages: vec!["a.png missing".to_string(), "b.png denied".to_string()],
        };
        assert_eq!(err.to_string(), "2 of 3 items failed: a.png missing; b.png denied");
    }
}
