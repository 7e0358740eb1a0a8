use std::fmt;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Hard errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SelectError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Root directory not found: {0}")]
    RootNotFound(PathBuf),

    #[error("Measurement has no readable state file: {0}")]
    MissingStateFile(PathBuf),

    #[error("Malformed '{tag}' tag in {path}")]
    MalformedTag { path: PathBuf, tag: String },

    #[error("Expected exactly one row for column '{column}', found {matches}")]
    AmbiguousLookup { column: String, matches: usize },

    #[error("Duplicate scan: subject '{subject}', session '{session}', scan '{scan}'")]
    DuplicateScan {
        subject: String,
        session: String,
        scan: String,
    },

    #[error("Invalid source template '{0}': no placeholders")]
    InvalidTemplate(String),

    #[error("Thread pool error: {0}")]
    ThreadPool(String),
}

pub type Result<T> = std::result::Result<T, SelectError>;

// ---------------------------------------------------------------------------
// Recoverable, per-measurement outcomes
// ---------------------------------------------------------------------------

/// Why a measurement directory contributed no records.
///
/// None of these abort a selection pass; they are reported alongside the
/// table so operators can see which directories were left out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingStateFile,
    MalformedTag(String),
    NoTags,
    SubjectRejected(String),
    SessionRejected(String),
    NoScans,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingStateFile => write!(f, "missing or unreadable state file"),
            SkipReason::MalformedTag(tag) => write!(f, "malformed '{tag}' tag"),
            SkipReason::NoTags => write!(f, "no subject/session tags"),
            SkipReason::SubjectRejected(s) => write!(f, "subject '{s}' rejected by criteria"),
            SkipReason::SessionRejected(s) => write!(f, "session '{s}' rejected by criteria"),
            SkipReason::NoScans => write!(f, "no scan matched the criteria"),
        }
    }
}

/// Anomalies worth surfacing that do not drop a measurement outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// The scan index stopped being readable part way through.
    ///
    /// With `after_match == false` the directory walk was used instead. With
    /// `after_match == true` only the scans read before the failure are kept,
    /// and later scans of that measurement may be missing.
    IndexTruncated { measurement: PathBuf, after_match: bool },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::IndexTruncated {
                measurement,
                after_match: false,
            } => write!(
                f,
                "{}: scan index unreadable before any match, fell back to directory walk",
                measurement.display()
            ),
            Diagnostic::IndexTruncated {
                measurement,
                after_match: true,
            } => write!(
                f,
                "{}: scan index truncated after a match, later scans may be missing",
                measurement.display()
            ),
        }
    }
}
