//! The information model: typed values, fields and information classes.

mod field;
mod group;
mod value;

pub use field::{ANONYMOUS, CompareMode, DeriveFn, Field, FieldOrigin};
pub use group::{ClassArgs, ClassMeta, DynamicFn, InfoGroup, RenameFn, DEFAULT_VERSION, META_KEY};
pub use value::{FieldKind, Value};
