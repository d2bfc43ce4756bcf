//! Harness errors
//!
//! Two families live here. [`LoadError`] and [`HarnessError`] are real
//! errors: they stop the session before any phase runs. [`Failure`] is a
//! value describing why one invocation did not match its expectations; it
//! is recorded and the session moves on.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The catalogue could not be turned into test cases.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("could not read catalogue {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse catalogue: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("testcase #{index} ({name}): {count_names} output file names but {count_contents} expected contents")]
    UnpairedOutputs {
        index: usize,
        name: String,
        count_names: usize,
        count_contents: usize,
    },

    #[error("testcase #{index} ({name}): invalid timeout {value}")]
    InvalidTimeout {
        index: usize,
        name: String,
        value: f64,
    },
}

/// Errors that abort the session as a whole.
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("invalid filter pattern: {0}")]
    Filter(#[from] regex::Error),

    #[error("work directory {path} is not usable: {source}")]
    Workdir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Why an invocation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The child outlived its deadline and was killed
    Timeout,
    /// The tool could not be started at all
    SpawnFailed,
    /// A regular input could not be read to build the stdin payload
    InputUnreadable,
    /// Exit code differs from the expected one
    ExitCode,
    /// Non-zero exit as expected, but nothing on stderr
    SilentError,
    /// Stdout bytes differ
    StdoutMismatch,
    /// The case requires an error message and stderr was empty
    MissingErrorMessage,
    /// A declared output file was not created
    OutputFileMissing,
    /// A declared output file has the wrong content
    OutputFileMismatch,
    /// An I/O error while inspecting results
    Io,
}

/// A failed expectation, with enough context to print one status line.
#[derive(Debug, Clone)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
    /// Output file the failure refers to, if any
    pub file: Option<String>,
    /// Longer explanation, e.g. a unified diff
    pub detail: Option<String>,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            file: None,
            detail: None,
        }
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn timeout(secs: f64) -> Self {
        Self::new(FailureKind::Timeout, format!("timed out after {}s", secs))
    }

    pub fn spawn(program: &str, err: &std::io::Error) -> Self {
        Self::new(
            FailureKind::SpawnFailed,
            format!("failed to execute '{}': {}", program, err),
        )
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == FailureKind::Timeout
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref file) = self.file {
            write!(f, "{}: ", file)?;
        }
        write!(f, "{}", self.message)
    }
}

impl From<std::io::Error> for Failure {
    fn from(e: std::io::Error) -> Self {
        Self::new(FailureKind::Io, e.to_string())
    }
}
