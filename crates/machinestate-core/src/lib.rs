//! machinestate-core - machine state inventory for reproducible benchmarking.
//!
//! Provides:
//! - `collector` - host abstraction (real, mock) and the snapshot collector
//! - `source` - raw reads from files, commands and environment variables
//! - `extract` - regex narrowing and unit conversion into typed values
//! - `model` - values, fields and information classes
//! - `compose` - class registry and expanders for repeated classes
//! - `classes` - the built-in information classes
//! - `snapshot` - self-describing documents, loading them back
//! - `render` - JSON, HTML and text output
//! - `diff` - tolerance-aware comparison of two snapshots
//! - `config` - run configuration
//! - `util` - helper utilities

pub mod classes;
pub mod collector;
pub mod compose;
pub mod config;
pub mod diff;
pub mod error;
pub mod extract;
pub mod model;
pub mod render;
pub mod snapshot;
pub mod source;
pub mod util;

pub use compose::{Context, Registry};
pub use config::Config;
pub use diff::{ComparisonReport, DEFAULT_TOLERANCE, MatchResult, compare, diff};
pub use error::{ConfigError, LoadError};
pub use model::{ClassArgs, FieldKind, InfoGroup, Value};
pub use render::DocumentOptions;
pub use snapshot::{DocumentSource, Snapshot};
