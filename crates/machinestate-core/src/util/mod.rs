//! Helper utilities.

pub mod container;

pub use container::is_container;
