//! Mock machine for testing without Linux.

mod host;
mod scenarios;

pub use host::MockHost;
