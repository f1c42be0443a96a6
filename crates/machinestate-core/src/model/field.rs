//! Named fields of an information class.

use serde::{Deserialize, Serialize};

use super::group::ClassArgs;
use super::value::{FieldKind, Value};
use crate::compose::Context;
use crate::extract::Extractor;
use crate::source::{Source, SourceCache};

/// Replacement text for identifying fields in anonymous mode.
pub const ANONYMOUS: &str = "anonymous";

/// Computes a value from the class arguments and the reader.
pub type DeriveFn = fn(&ClassArgs, &Context<'_>) -> Value;

/// How a field gets its value.
#[derive(Debug, Clone)]
pub enum FieldOrigin {
    /// Raw text from a source, narrowed and converted by an extractor.
    Read { source: Source, extractor: Extractor },
    /// Fixed value known at construction.
    Constant(Value),
    /// Computed by a class-local function.
    Derived(DeriveFn),
    /// Created by a dynamic-field hook while populating; holds its own value.
    Dynamic,
}

/// How a field takes part in comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CompareMode {
    /// Numbers within tolerance match, everything else exactly.
    #[default]
    Tolerant,
    /// Numbers must match exactly too.
    Exact,
    /// Informational only, never compared (uptime, PWD, ...).
    Ignore,
}

#[derive(Debug, Clone)]
pub struct Field {
    name: String,
    kind: FieldKind,
    origin: FieldOrigin,
    compare: CompareMode,
    identifying: bool,
    /// `None` until populated.
    value: Option<Value>,
}

impl Field {
    pub fn read(name: impl Into<String>, source: Source, extractor: Extractor) -> Self {
        Self::with_origin(
            name,
            extractor.kind(),
            FieldOrigin::Read { source, extractor },
        )
    }

    pub fn constant(name: impl Into<String>, value: Value) -> Self {
        let kind = value.kind().unwrap_or(FieldKind::Str);
        Self::with_origin(name, kind, FieldOrigin::Constant(value))
    }

    pub fn derived(name: impl Into<String>, kind: FieldKind, derive: DeriveFn) -> Self {
        Self::with_origin(name, kind, FieldOrigin::Derived(derive))
    }

    /// A field discovered at populate time, already carrying its value.
    pub fn dynamic(name: impl Into<String>, value: Value) -> Self {
        let kind = value.kind().unwrap_or(FieldKind::Str);
        let mut field = Self::with_origin(name, kind, FieldOrigin::Dynamic);
        field.value = Some(value);
        field
    }

    fn with_origin(name: impl Into<String>, kind: FieldKind, origin: FieldOrigin) -> Self {
        Self {
            name: name.into(),
            kind,
            origin,
            compare: CompareMode::default(),
            identifying: false,
            value: None,
        }
    }

    /// Marks the field as identifying; anonymous mode hides it.
    pub fn identifying(mut self) -> Self {
        self.identifying = true;
        self
    }

    pub fn compare(mut self, mode: CompareMode) -> Self {
        self.compare = mode;
        self
    }

    pub fn informational(self) -> Self {
        self.compare(CompareMode::Ignore)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn origin(&self) -> &FieldOrigin {
        &self.origin
    }

    pub fn compare_mode(&self) -> CompareMode {
        self.compare
    }

    pub fn is_identifying(&self) -> bool {
        self.identifying
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self.origin, FieldOrigin::Dynamic)
    }

    /// Populated value, `None` while unset.
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub(crate) fn set_value(&mut self, value: Value) {
        self.value = Some(value);
    }

    pub(crate) fn set_modifiers(&mut self, compare: CompareMode, identifying: bool) {
        self.compare = compare;
        self.identifying = identifying;
    }

    /// Computes the value this field would take now.
    pub(crate) fn evaluate(
        &self,
        args: &ClassArgs,
        ctx: &Context<'_>,
        cache: &mut SourceCache,
    ) -> Value {
        if self.identifying && args.anonymous {
            return match self.kind {
                FieldKind::Str => Value::str(ANONYMOUS),
                _ => Value::Unavailable,
            };
        }
        let value = match &self.origin {
            FieldOrigin::Read { source, extractor } => match cache.read(&ctx.reader, source) {
                Ok(text) => extractor.extract(&text),
                Err(_) => Value::Unavailable,
            },
            FieldOrigin::Constant(value) => value.clone(),
            FieldOrigin::Derived(derive) => derive(args, ctx),
            FieldOrigin::Dynamic => self.value.clone().unwrap_or(Value::Unavailable),
        };
        match value.kind() {
            Some(kind) if kind != self.kind => Value::Unavailable,
            _ => value,
        }
    }
}
