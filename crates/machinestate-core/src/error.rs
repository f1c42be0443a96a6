//! Errors for whole-run failures.
//!
//! Individual data sources never fail; see [`crate::source::Unavailable`].

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure to reconstruct a snapshot from a document.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("document node {path:?} is not an object")]
    NotAnObject { path: String },

    #[error("document node {path:?} has no {key} record", key = crate::model::META_KEY)]
    MissingMeta { path: String },

    #[error("invalid meta record at {path:?}: {reason}")]
    InvalidMeta { path: String, reason: String },

    #[error("unknown class {class:?} at {path:?}")]
    UnknownClass { path: String, class: String },
}

/// Failure to load a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}
