//! Error types.
//!
//! Every fallible operation of the crate returns a [`ClientError`]. Malformed inputs and missing
//! artifacts are fatal; a non-zero exit code of an external process is not an error and is
//! surfaced to the caller as a plain return code instead.

use std::{io, path::PathBuf};

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(
        "Invalid number of problem type indices: {got} - Indices: {expected}, problemSize: {sizes}"
    )]
    InvalidProblemSize {
        got: usize,
        expected: usize,
        sizes: String,
    },

    #[error("problem-specified {ld}({value}) conflicts with setConstStride{tensor}({pinned})")]
    StrideConflict {
        ld: &'static str,
        tensor: char,
        value: i64,
        pinned: i64,
    },

    #[error("problem-specified bias stride({stride}) must >= {bound} ({length})")]
    BiasStride {
        stride: i64,
        bound: &'static str,
        length: i64,
    },

    #[error("tensor {tensor} expects {expected} strides, got {got}")]
    StrideCount {
        tensor: char,
        expected: usize,
        got: usize,
    },

    #[error("strides of tensor {tensor} overflow for problem size {sizes}")]
    StrideOverflow { tensor: &'static str, sizes: String },

    #[error("invalid problem type: {0}")]
    InvalidProblemType(String),

    #[error("No valid solutions found ({0})")]
    NoSolutions(String),

    #[error("missing artifact: {0}")]
    MissingArtifact(String),

    #[error("failed to parse logic file {path}: {source}")]
    Logic {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to parse settings: {0}")]
    Settings(#[from] toml::de::Error),

    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Format(#[from] std::fmt::Error),
}

impl ClientError {
    /// Wraps an I/O error with the path it happened on.
    pub fn file(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::File {
            path: path.into(),
            source,
        }
    }
}
