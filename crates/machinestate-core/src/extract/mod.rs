//! Turning raw source text into typed values.
//!
//! An [`Extractor`] optionally narrows the text with a regular expression
//! (first capture group, or the whole match) and then applies a
//! [`Conversion`]. Anything that does not match or does not convert becomes
//! [`Value::Unavailable`].

pub mod units;

use std::collections::BTreeSet;

use regex::Regex;
use tracing::warn;

use crate::model::{FieldKind, Value};

/// Conversion applied to the (matched) text.
#[derive(Debug, Clone, Copy)]
pub enum Conversion {
    Text,
    /// Title-cased identifier, `package_0` → `Package0`.
    Title,
    Int,
    Float,
    Bool,
    /// Words split on whitespace and commas.
    StrSet,
    /// Integer list with ranges.
    IntList,
    Bytes,
    Hertz,
    HertzList,
    /// Hexadecimal cpumask to the list of set bits.
    Mask,
    /// Class-local conversion producing `kind`.
    Custom(FieldKind, fn(&str) -> Option<Value>),
}

impl Conversion {
    pub fn kind(&self) -> FieldKind {
        match self {
            Conversion::Text | Conversion::Title => FieldKind::Str,
            Conversion::Int | Conversion::Bytes | Conversion::Hertz => FieldKind::Int,
            Conversion::Float => FieldKind::Float,
            Conversion::Bool => FieldKind::Bool,
            Conversion::StrSet => FieldKind::Set,
            Conversion::IntList | Conversion::HertzList | Conversion::Mask => FieldKind::IntList,
            Conversion::Custom(kind, _) => *kind,
        }
    }

    /// Applies the conversion; `Unavailable` when the text does not fit.
    pub fn apply(&self, text: &str) -> Value {
        let text = text.trim();
        let value = match self {
            Conversion::Text => Some(Value::Str(text.to_string())),
            Conversion::Title => Some(Value::Str(units::to_title(text))),
            Conversion::Int => text.parse().ok().map(Value::Int),
            Conversion::Float => text.parse().ok().map(Value::Float),
            Conversion::Bool => units::to_bool(text).map(Value::Bool),
            Conversion::StrSet => Some(Value::Set(
                units::to_str_list(text).into_iter().collect::<BTreeSet<_>>(),
            )),
            Conversion::IntList => units::to_int_list(text).map(Value::IntList),
            Conversion::Bytes => units::to_bytes(text).map(Value::Int),
            Conversion::Hertz => units::to_hertz(text).map(Value::Int),
            Conversion::HertzList => units::to_hertz_list(text).map(Value::IntList),
            Conversion::Mask => units::mask_to_list(text).map(Value::IntList),
            Conversion::Custom(kind, convert) => {
                convert(text).filter(|v| v.kind().is_none_or(|k| k == *kind))
            }
        };
        value.unwrap_or(Value::Unavailable)
    }
}

/// Pattern plus conversion for one field.
#[derive(Debug, Clone)]
pub struct Extractor {
    pattern: Option<Regex>,
    /// Set when the pattern failed to compile; the field is then unavailable.
    broken: bool,
    conversion: Conversion,
}

impl Extractor {
    pub fn new(conversion: Conversion) -> Self {
        Self {
            pattern: None,
            broken: false,
            conversion,
        }
    }

    pub fn text() -> Self {
        Self::new(Conversion::Text)
    }

    pub fn int() -> Self {
        Self::new(Conversion::Int)
    }

    pub fn float() -> Self {
        Self::new(Conversion::Float)
    }

    pub fn bool() -> Self {
        Self::new(Conversion::Bool)
    }

    pub fn bytes() -> Self {
        Self::new(Conversion::Bytes)
    }

    pub fn hertz() -> Self {
        Self::new(Conversion::Hertz)
    }

    pub fn int_list() -> Self {
        Self::new(Conversion::IntList)
    }

    pub fn str_set() -> Self {
        Self::new(Conversion::StrSet)
    }

    /// Narrows the raw text with `pattern` before converting.
    ///
    /// An invalid pattern is logged and makes every extraction unavailable.
    pub fn matching(mut self, pattern: &str) -> Self {
        match Regex::new(pattern) {
            Ok(re) => {
                self.pattern = Some(re);
                self.broken = false;
            }
            Err(e) => {
                warn!(pattern, error = %e, "invalid extraction pattern");
                self.pattern = None;
                self.broken = true;
            }
        }
        self
    }

    pub fn kind(&self) -> FieldKind {
        self.conversion.kind()
    }

    pub fn conversion(&self) -> Conversion {
        self.conversion
    }

    /// Extracts a typed value from raw text. Never panics.
    pub fn extract(&self, raw: &str) -> Value {
        if self.broken {
            return Value::Unavailable;
        }
        let Some(re) = &self.pattern else {
            return self.conversion.apply(raw);
        };
        let Some(caps) = re.captures(raw) else {
            return Value::Unavailable;
        };
        match caps.get(1).or_else(|| caps.get(0)) {
            Some(m) => self.conversion.apply(m.as_str()),
            None => Value::Unavailable,
        }
    }
}

impl From<Conversion> for Extractor {
    fn from(conversion: Conversion) -> Self {
        Self::new(conversion)
    }
}
