//! Field-by-field comparison of two snapshots.
//!
//! Numbers compare within a relative tolerance measured against the
//! reference (old) value; everything else compares exactly. A field that is
//! unavailable on exactly one side counts as missing on that side.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::model::{CompareMode, Field, InfoGroup, Value};

/// Relative tolerance used when none is given: 20%.
pub const DEFAULT_TOLERANCE: f64 = 0.2;

/// Slack absorbing floating point noise at the band edge.
const EPSILON: f64 = 1e-9;

/// Classification of one compared field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MatchResult {
    Match,
    Mismatch,
    /// Present only in the new snapshot.
    MissingInOld,
    /// Present only in the old snapshot.
    MissingInNew,
}

impl fmt::Display for MatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MatchResult::Match => "match",
            MatchResult::Mismatch => "mismatch",
            MatchResult::MissingInOld => "missing in old",
            MatchResult::MissingInNew => "missing in new",
        };
        f.write_str(s)
    }
}

/// `|other - reference| <= tolerance * |reference|`.
pub fn within_tolerance(reference: f64, other: f64, tolerance: f64) -> bool {
    let bound = tolerance * reference.abs();
    (other - reference).abs() <= bound + EPSILON * bound.max(1.0)
}

/// Compares two values with `a` as the reference.
pub fn compare(a: &Value, b: &Value, tolerance: f64) -> MatchResult {
    match (a, b) {
        (Value::Unavailable, Value::Unavailable) => MatchResult::Match,
        (Value::Unavailable, _) => MatchResult::MissingInOld,
        (_, Value::Unavailable) => MatchResult::MissingInNew,
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => {
                if within_tolerance(x, y, tolerance) {
                    MatchResult::Match
                } else {
                    MatchResult::Mismatch
                }
            }
            _ if a == b => MatchResult::Match,
            _ => MatchResult::Mismatch,
        },
    }
}

/// Location of a field: child names followed by the field name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&self, segment: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.to_string());
        Self(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

impl Serialize for FieldPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One compared field or one subtree present on a single side.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDiff {
    pub path: FieldPath,
    pub old: Option<Value>,
    pub new: Option<Value>,
    pub result: MatchResult,
}

impl fmt::Display for FieldDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: &Option<Value>| v.as_ref().map_or_else(|| "-".to_string(), Value::to_string);
        write!(
            f,
            "{}: {} (old: {}, new: {})",
            self.path,
            self.result,
            show(&self.old),
            show(&self.new)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonReport {
    tolerance: f64,
    entries: Vec<FieldDiff>,
}

impl ComparisonReport {
    /// `true` when no field mismatches and nothing is missing.
    pub fn is_equal(&self) -> bool {
        self.entries.iter().all(|e| e.result == MatchResult::Match)
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn entries(&self) -> &[FieldDiff] {
        &self.entries
    }

    /// Every entry that is not a match.
    pub fn differences(&self) -> impl Iterator<Item = &FieldDiff> {
        self.entries.iter().filter(|e| e.result != MatchResult::Match)
    }

    pub fn mismatches(&self) -> impl Iterator<Item = &FieldDiff> {
        self.entries
            .iter()
            .filter(|e| e.result == MatchResult::Mismatch)
    }

    /// Entry for a `/`-separated path.
    pub fn get(&self, path: &str) -> Option<&FieldDiff> {
        self.entries.iter().find(|e| e.path.to_string() == path)
    }
}

impl fmt::Display for ComparisonReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_equal() {
            return writeln!(
                f,
                "States are equal ({} fields, tolerance {})",
                self.entries.len(),
                self.tolerance
            );
        }
        let differences: Vec<_> = self.differences().collect();
        writeln!(
            f,
            "States differ in {} of {} fields (tolerance {}):",
            differences.len(),
            self.entries.len(),
            self.tolerance
        )?;
        for d in differences {
            writeln!(f, "  {d}")?;
        }
        Ok(())
    }
}

/// Walks both trees in lock-step, `old` being the reference.
pub fn diff(old: &InfoGroup, new: &InfoGroup, tolerance: f64) -> ComparisonReport {
    let mut entries = Vec::new();
    walk(old, new, &FieldPath::new(), tolerance, &mut entries);
    ComparisonReport { tolerance, entries }
}

fn walk(old: &InfoGroup, new: &InfoGroup, path: &FieldPath, tolerance: f64, out: &mut Vec<FieldDiff>) {
    let names = old
        .fields()
        .map(|f| f.name())
        .chain(new.fields().map(|f| f.name()).filter(|n| old.get_field(n).is_none()));

    for name in names {
        let of = old.get_field(name);
        let nf = new.get_field(name);
        // Ignore on either side skips the field, otherwise Exact on either
        // side wins; loaded dynamic fields only carry the default mode
        let modes = [of, nf].map(|f| f.map(Field::compare_mode));
        let mode = if modes.contains(&Some(CompareMode::Ignore)) {
            continue;
        } else if modes.contains(&Some(CompareMode::Exact)) {
            CompareMode::Exact
        } else {
            CompareMode::Tolerant
        };
        let ov = of.and_then(|f| f.value()).cloned();
        let nv = nf.and_then(|f| f.value()).cloned();
        let lhs = ov.clone().unwrap_or(Value::Unavailable);
        let rhs = nv.clone().unwrap_or(Value::Unavailable);
        let tol = if mode == CompareMode::Exact { 0.0 } else { tolerance };
        out.push(FieldDiff {
            path: path.join(name),
            old: ov,
            new: nv,
            result: compare(&lhs, &rhs, tol),
        });
    }

    for child in old.children() {
        let child_path = path.join(child.name());
        match new.get_child(child.name()) {
            Some(other) => walk(child, other, &child_path, tolerance, out),
            None => out.push(FieldDiff {
                path: child_path,
                old: None,
                new: None,
                result: MatchResult::MissingInNew,
            }),
        }
    }
    for child in new.children() {
        if old.get_child(child.name()).is_none() {
            out.push(FieldDiff {
                path: path.join(child.name()),
                old: None,
                new: None,
                result: MatchResult::MissingInOld,
            });
        }
    }
}
