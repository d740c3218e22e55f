//! Typed errors for conditions callers need to tell apart.
//! Everything else flows through `anyhow` with context.

use std::path::PathBuf;
use thiserror::Error;

/// Two feature vectors with different schema lengths met in a merge.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("feature vector length mismatch: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },

    #[error("feature vector length mismatch for key {key:?}: {left} vs {right}")]
    KeyLengthMismatch { key: String, left: usize, right: usize },
}

impl SchemaError {
    /// Attach the entity key the mismatch was observed on.
    pub fn for_key(self, key: &str) -> Self {
        match self {
            SchemaError::LengthMismatch { left, right } => {
                SchemaError::KeyLengthMismatch { key: key.to_string(), left, right }
            }
            other => other,
        }
    }
}

/// Failures loading or saving a persisted gazetteer trie. All of them are fatal
/// for a worker: it cannot run without its gazetteers.
#[derive(Error, Debug)]
pub enum GazetteerError {
    #[error("gazetteer i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt persisted gazetteer {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("unsupported persisted gazetteer {path}: format {format:?} version {version}")]
    UnsupportedVersion { path: PathBuf, format: String, version: u32 },
}
