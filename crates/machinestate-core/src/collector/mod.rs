//! Machine state collector.
//!
//! This module provides the host abstraction every information class reads
//! through, plus the `Collector` that builds and populates the class tree.
//!
//! # Architecture
//!
//! ```text
//! Config ──► Collector ──► Registry::construct(MachineState)
//!                │                    │
//!                │            InfoGroup tree (unpopulated)
//!                ▼                    │
//!            Context ◄────────────────┘ populate
//!                │
//!          SourceReader ──► Host: RealHost | MockHost
//! ```
//!
//! # Usage
//!
//! ## Production (Linux)
//!
//! ```ignore
//! use machinestate_core::collector::{Collector, RealHost};
//! use machinestate_core::Config;
//!
//! let mut collector = Collector::new(RealHost::new(), Config::default());
//! let snapshot = collector.collect_snapshot();
//! ```
//!
//! ## Testing (with MockHost)
//!
//! ```
//! use machinestate_core::collector::{Collector, MockHost};
//! use machinestate_core::Config;
//!
//! let mut collector = Collector::new(MockHost::typical_machine(), Config::default());
//! let snapshot = collector.collect_snapshot();
//! assert!(!snapshot.root().children().is_empty());
//! ```

#[allow(clippy::module_inception)]
mod collector;
mod command;
pub mod mock;
pub mod traits;

pub use collector::{Collector, CollectorTiming};
pub use mock::MockHost;
pub use traits::{CommandOutput, CommandRunner, Environment, FileSystem, Host, RealHost};
