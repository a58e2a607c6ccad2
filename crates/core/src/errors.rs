//! Error types for the svnwc core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`WcError`] enum unifies them for callers that want a single
//! error type. The variants of [`WcError`] follow the working-copy error
//! taxonomy: user errors are rejected before anything is touched, local
//! obstructions become tree conflicts where possible, I/O failures are
//! fatal for one path and aggregated into [`WcError::Incomplete`].

use std::path::PathBuf;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum WcError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error(transparent)]
    MergeInfo(#[from] MergeInfoError),

    #[error(transparent)]
    Target(#[from] TargetError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Bad arguments, invalid revision ranges, missing explicit targets.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The path has no versioning metadata.
    #[error("'{0}' is not under version control")]
    NotVersioned(String),

    /// The path is already under version control.
    #[error("'{0}' is already under version control")]
    AlreadyVersioned(String),

    /// Something on disk prevents the requested structural change.
    #[error("'{path}' is obstructed: {detail}")]
    Obstructed { path: String, detail: String },

    /// A local filesystem operation failed.
    #[error("I/O error at '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Another traversal holds the working-copy lock for this root.
    #[error("working copy '{root}' is locked by {owner} (since {acquired_at}); run cleanup if stale")]
    Locked {
        root: String,
        owner: String,
        acquired_at: String,
    },

    /// The path is not a working copy root (no admin area).
    #[error("'{}' is not a working copy", .0.display())]
    NotAWorkingCopy(PathBuf),

    /// Error reported by the repository delta source, passed through as-is.
    #[error("delta source error: {0}")]
    Delta(String),

    /// The operation was cancelled cooperatively between two paths.
    #[error("operation cancelled")]
    Cancelled,

    /// One or more paths failed while the rest of the traversal continued.
    #[error("could not complete operation on all targets ({} failed)", failures.len())]
    Incomplete { failures: Vec<PathFailure> },
}

impl WcError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// `true` for errors that must abort a whole traversal rather than a
    /// single path.
    pub fn is_fatal_for_traversal(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::Cancelled | Self::Delta(_) | Self::Locked { .. }
        )
    }
}

/// A single per-path failure recorded during a traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathFailure {
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for PathFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

// ---------------------------------------------------------------------------
// Database errors
// ---------------------------------------------------------------------------

/// Errors from the SQLite metadata store.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Underlying rusqlite error.
    #[error("database error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    /// A migration failed.
    #[error("database migration failed (version {version}): {detail}")]
    MigrationFailed { version: u32, detail: String },

    /// A record was not found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A stored value could not be decoded.
    #[error("corrupt {entity} record for '{id}': {detail}")]
    Corrupt {
        entity: String,
        id: String,
        detail: String,
    },

    /// JSON encoding of a stored column failed.
    #[error("database JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Generic I/O error (e.g. creating the admin directory).
    #[error("database I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Conflict errors
// ---------------------------------------------------------------------------

/// Errors from the conflict store and the resolution policy.
#[derive(Debug, Error)]
pub enum ConflictError {
    /// No conflict of the requested kind is recorded for the path.
    #[error("no conflict recorded for '{0}'")]
    NotFound(String),

    /// A text conflict (or the same property conflict) is already recorded.
    #[error("'{path}' already has an unresolved {kind} conflict")]
    AlreadyConflicted { path: String, kind: String },

    /// The chosen resolution does not apply to this conflict.
    #[error("invalid choice '{choice}' for '{path}': {detail}")]
    InvalidChoice {
        path: String,
        choice: String,
        detail: String,
    },

    /// A conflict variant file is missing on disk.
    #[error("conflict file '{}' for '{path}' is missing", file.display())]
    MissingVariant { path: String, file: PathBuf },

    /// Three-way merge failed.
    #[error("three-way merge failed: {0}")]
    MergeFailed(String),

    /// The external merge tool or editor failed.
    #[error("external tool failed: {0}")]
    ToolFailed(String),

    /// Database error when persisting conflict data.
    #[error("conflict database error: {0}")]
    DatabaseError(#[from] DatabaseError),

    /// I/O error while writing or removing variant files.
    #[error("conflict I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Mergeinfo errors
// ---------------------------------------------------------------------------

/// Errors from parsing or combining merge-tracking metadata.
#[derive(Debug, Error)]
pub enum MergeInfoError {
    /// A line of the property value had no `:` separator.
    #[error("mergeinfo line '{0}' is not terminated by ':'")]
    MissingSeparator(String),

    /// A revision or range could not be parsed.
    #[error("invalid revision range '{range}' for '{source_path}'")]
    InvalidRange { source_path: String, range: String },

    /// Ranges for one source overlap in the stored value.
    #[error("overlapping revision ranges for '{0}'")]
    Overlapping(String),
}

// ---------------------------------------------------------------------------
// Target errors
// ---------------------------------------------------------------------------

/// Errors from normalising user-supplied targets.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetError {
    /// An empty target string was given.
    #[error("empty target")]
    Empty,

    /// The peg revision suffix could not be parsed.
    #[error("invalid peg revision '{peg}' in target '{target}'")]
    InvalidPeg { target: String, peg: String },

    /// The URL scheme is not recognised.
    #[error("unsupported URL '{0}'")]
    InvalidUrl(String),

    /// A relative path escapes the working-copy root.
    #[error("path '{0}' is outside the working copy")]
    OutsideRoot(String),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = WcError::NotVersioned("a/b.txt".into());
        assert_eq!(err.to_string(), "'a/b.txt' is not under version control");

        let err = ConflictError::AlreadyConflicted {
            path: "foo.txt".into(),
            kind: "text".into(),
        };
        assert!(err.to_string().contains("already has an unresolved text conflict"));

        let err = WcError::Incomplete {
            failures: vec![PathFailure {
                path: "x".into(),
                message: "disk full".into(),
            }],
        };
        assert_eq!(
            err.to_string(),
            "could not complete operation on all targets (1 failed)"
        );

        let err = MergeInfoError::InvalidRange {
            source_path: "/trunk".into(),
            range: "7-x".into(),
        };
        assert!(err.to_string().contains("/trunk"));
    }

    #[test]
    fn test_wc_error_from_subsystem() {
        let db_err = DatabaseError::NotFound {
            entity: "node".into(),
            id: "a".into(),
        };
        let err: WcError = db_err.into();
        assert!(matches!(err, WcError::Database(_)));
        assert!(err.is_fatal_for_traversal());

        let err: WcError = TargetError::Empty.into();
        assert!(matches!(err, WcError::Target(TargetError::Empty)));
        assert!(!err.is_fatal_for_traversal());
        assert!(WcError::Cancelled.is_fatal_for_traversal());
    }
}
