//! Error taxonomy for a pipeline run.
//!
//! Only [`DataSourceError`] (and an unwritable output root, surfaced as
//! [`OutputError::Unwritable`]) aborts a run. Everything else is scoped to a
//! single document, or a single stage of a single document, and ends up in
//! the end-of-run [`RunReport`](crate::report::RunReport).

use std::path::PathBuf;

use thiserror::Error;

/// A dataset could not be loaded. Fatal: the run never starts.
#[derive(Debug, Error)]
pub enum DataSourceError {
    #[error("{dataset} dataset not found at {path}")]
    Missing { dataset: &'static str, path: PathBuf },

    #[error("failed to read {dataset} dataset at {path}: {source}")]
    Read {
        dataset: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{dataset} dataset at {path} is not valid base64: {source}")]
    Decode {
        dataset: &'static str,
        path: PathBuf,
        #[source]
        source: base64::DecodeError,
    },

    #[error("{dataset} dataset at {path} is malformed: {source}")]
    Parse {
        dataset: &'static str,
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// The document could not be turned into a tree at all.
///
/// The HTML parser itself never rejects markup, so this only covers input
/// that is not text in the first place. The document is copied through
/// verbatim.
#[derive(Debug, Error)]
pub enum MalformedMarkupError {
    #[error("document is not valid UTF-8 (first invalid byte at offset {offset})")]
    NotUtf8 { offset: usize },

    #[error("document is empty")]
    Empty,

    #[error("failed to serialize document: {0}")]
    Serialize(String),
}

/// A stage failed on one document.
#[derive(Debug, Error)]
pub enum StageError {
    /// The stage is skipped for this document; later stages still run.
    #[error("{0}")]
    Recoverable(String),

    /// The document tree is unusable; the raw document is copied through.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl StageError {
    pub fn recoverable(msg: impl Into<String>) -> Self {
        StageError::Recoverable(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        StageError::Fatal(msg.into())
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, StageError::Fatal(_))
    }
}

/// Filesystem failure while writing the output tree.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("output root {path} is not writable: {source}")]
    Unwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to copy {from} to {to}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
