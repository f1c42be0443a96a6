//! Information classes: named, typed fields plus owned children.
//!
//! An `InfoGroup` is built by a class constructor (see `classes`) with a
//! chain of builder calls, then populated through a [`Context`]. Construction
//! performs no I/O and depends only on [`ClassArgs`], so the same arguments
//! always give the same shape.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::field::{CompareMode, DeriveFn, Field};
use super::value::{FieldKind, Value};
use crate::compose::{Context, Expander};
use crate::extract::Extractor;
use crate::source::{Source, SourceCache};

/// Key of the per-node meta-record in documents.
pub const META_KEY: &str = "_meta";

pub const DEFAULT_VERSION: u32 = 1;

/// Produces the fields of a class whose field set is only known at runtime.
pub type DynamicFn = fn(&ClassArgs, &Context<'_>) -> Vec<Field>;

/// Picks a new name for a populated class.
pub type RenameFn = fn(&InfoGroup) -> Option<String>;

/// Constructor arguments of an information class.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClassArgs {
    #[serde(default)]
    pub extended: bool,
    #[serde(default)]
    pub anonymous: bool,
    /// Instance identifier for repeated classes (CPU number, cache index...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ident: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

impl ClassArgs {
    pub fn new(extended: bool, anonymous: bool) -> Self {
        Self {
            extended,
            anonymous,
            ..Self::default()
        }
    }

    pub fn with_ident(mut self, ident: impl Into<String>) -> Self {
        self.ident = Some(ident.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn ident(&self) -> &str {
        self.ident.as_deref().unwrap_or("")
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Arguments for a child instance: same flags and params, new ident.
    pub fn child(&self, ident: impl Into<String>) -> Self {
        Self {
            ident: Some(ident.into()),
            ..self.clone()
        }
    }
}

/// Meta-record stored next to each node of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassMeta {
    pub class: String,
    pub version: u32,
    #[serde(default)]
    pub args: ClassArgs,
}

#[derive(Debug, Clone)]
pub struct InfoGroup {
    name: String,
    meta: ClassMeta,
    fields: IndexMap<String, Field>,
    children: Vec<InfoGroup>,
    expander: Option<Expander>,
    dynamic: Option<DynamicFn>,
    rename: Option<RenameFn>,
    /// Children came from an expand not yet consumed by a populate.
    expanded: bool,
}

impl InfoGroup {
    pub fn new(class: &str, name: impl Into<String>, args: &ClassArgs) -> Self {
        Self {
            name: name.into(),
            meta: ClassMeta {
                class: class.to_string(),
                version: DEFAULT_VERSION,
                args: args.clone(),
            },
            fields: IndexMap::new(),
            children: Vec::new(),
            expander: None,
            dynamic: None,
            rename: None,
            expanded: false,
        }
    }

    pub fn version(mut self, version: u32) -> Self {
        self.meta.version = version;
        self
    }

    // ---- builder -------------------------------------------------------

    pub fn field(mut self, field: Field) -> Self {
        self.fields.insert(field.name().to_string(), field);
        self
    }

    pub fn file(self, name: &str, path: impl Into<PathBuf>, extractor: Extractor) -> Self {
        self.field(Field::read(name, Source::File(path.into()), extractor))
    }

    pub fn command(self, name: &str, program: &str, args: &[&str], extractor: Extractor) -> Self {
        self.field(Field::read(name, Source::command(program, args), extractor))
    }

    pub fn env(self, name: &str, var: &str, extractor: Extractor) -> Self {
        self.field(Field::read(name, Source::env(var), extractor))
    }

    pub fn constant(self, name: &str, value: impl Into<Value>) -> Self {
        self.field(Field::constant(name, value.into()))
    }

    pub fn derived(self, name: &str, kind: FieldKind, derive: DeriveFn) -> Self {
        self.field(Field::derived(name, kind, derive))
    }

    /// Marks the most recently added field as identifying.
    pub fn identifying(mut self) -> Self {
        if let Some((_, field)) = self.fields.last_mut() {
            let compare = field.compare_mode();
            field.set_modifiers(compare, true);
        }
        self
    }

    /// Excludes the most recently added field from comparisons.
    pub fn informational(self) -> Self {
        self.last_compare(CompareMode::Ignore)
    }

    /// Requires exact numeric equality for the most recently added field.
    pub fn exact(self) -> Self {
        self.last_compare(CompareMode::Exact)
    }

    fn last_compare(mut self, mode: CompareMode) -> Self {
        if let Some((_, field)) = self.fields.last_mut() {
            let identifying = field.is_identifying();
            field.set_modifiers(mode, identifying);
        }
        self
    }

    /// Applies `build` only when `cond` holds, e.g. for extended-only fields.
    pub fn when(self, cond: bool, build: impl FnOnce(Self) -> Self) -> Self {
        if cond { build(self) } else { self }
    }

    /// Applies `build` with the value when there is one.
    pub fn when_some<T>(self, value: Option<T>, build: impl FnOnce(Self, T) -> Self) -> Self {
        match value {
            Some(value) => build(self, value),
            None => self,
        }
    }

    pub fn child(mut self, child: InfoGroup) -> Self {
        self.children.push(child);
        self
    }

    pub fn expander(mut self, expander: Expander) -> Self {
        self.expander = Some(expander);
        self
    }

    pub fn dynamic(mut self, hook: DynamicFn) -> Self {
        self.dynamic = Some(hook);
        self
    }

    pub fn rename(mut self, hook: RenameFn) -> Self {
        self.rename = Some(hook);
        self
    }

    // ---- accessors -----------------------------------------------------

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn meta(&self) -> &ClassMeta {
        &self.meta
    }

    pub fn class(&self) -> &str {
        &self.meta.class
    }

    pub fn args(&self) -> &ClassArgs {
        &self.meta.args
    }

    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.values()
    }

    pub fn get_field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    /// Populated value of a field, `None` if missing or unset.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).and_then(Field::value)
    }

    pub fn children(&self) -> &[InfoGroup] {
        &self.children
    }

    pub fn get_child(&self, name: &str) -> Option<&InfoGroup> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Follows a `/`-separated path of child names.
    pub fn find(&self, path: &str) -> Option<&InfoGroup> {
        path.split('/')
            .filter(|p| !p.is_empty())
            .try_fold(self, |group, name| group.get_child(name))
    }

    pub fn has_dynamic_fields(&self) -> bool {
        self.dynamic.is_some()
    }

    // ---- loading -------------------------------------------------------

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Stores a value read back from a document. Returns `false` for
    /// unknown fields.
    pub(crate) fn load_value(&mut self, name: &str, json: &serde_json::Value) -> bool {
        match self.fields.get_mut(name) {
            Some(field) => {
                let value = Value::from_json(field.kind(), json);
                field.set_value(value);
                true
            }
            None => false,
        }
    }

    pub(crate) fn insert_field(&mut self, field: Field) {
        self.fields.insert(field.name().to_string(), field);
    }

    pub(crate) fn replace_children(&mut self, children: Vec<InfoGroup>) {
        self.children = children;
    }

    // ---- operations ----------------------------------------------------

    /// Runs expanders over the whole tree without reading any field.
    ///
    /// Each expander runs once; children it creates come back expanded.
    pub fn expand(&mut self, ctx: &Context<'_>) {
        match &self.expander {
            Some(expander) => self.children = expander.expand(&self.meta.args, ctx),
            None => {
                for child in &mut self.children {
                    child.expand(ctx);
                }
            }
        }
        self.expanded = true;
    }

    /// Reads every field of this class and its children. Always completes;
    /// unreadable sources leave `Unavailable` values.
    pub fn populate(&mut self, ctx: &Context<'_>) {
        self.populate_observed(ctx, &mut |_, _| {});
    }

    /// Like [`populate`](Self::populate), reporting the time spent on each
    /// direct child.
    pub fn populate_observed(
        &mut self,
        ctx: &Context<'_>,
        observe: &mut dyn FnMut(&str, Duration),
    ) {
        // Children of an earlier populate are stale; a preceding expand is not
        if !self.expanded && self.expander.is_some() {
            self.expand(ctx);
        }

        let mut cache = SourceCache::new();
        for field in self.fields.values_mut() {
            if !field.is_dynamic() {
                let value = field.evaluate(&self.meta.args, ctx, &mut cache);
                field.set_value(value);
            }
        }

        if let Some(hook) = self.dynamic {
            self.fields.retain(|_, f| !f.is_dynamic());
            for field in hook(&self.meta.args, ctx) {
                if !self.fields.contains_key(field.name()) {
                    self.fields.insert(field.name().to_string(), field);
                }
            }
        }

        for child in &mut self.children {
            let start = Instant::now();
            child.populate(ctx);
            observe(&child.name, start.elapsed());
        }

        if let Some(rename) = self.rename
            && let Some(name) = rename(self)
        {
            self.name = name;
        }
        self.expanded = false;
    }

    /// Nested mapping of values without meta-records.
    pub fn get(&self) -> serde_json::Value {
        self.to_value(false)
    }

    /// Nested mapping of values; unset fields appear as `null`.
    pub fn to_value(&self, with_meta: bool) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        if with_meta {
            // ClassMeta only holds strings, integers and maps
            if let Ok(meta) = serde_json::to_value(&self.meta) {
                map.insert(META_KEY.to_string(), meta);
            }
        }
        for field in self.fields.values() {
            let value = field
                .value()
                .map_or(serde_json::Value::Null, Value::to_json);
            map.insert(field.name().to_string(), value);
        }
        for child in &self.children {
            map.insert(child.name.clone(), child.to_value(with_meta));
        }
        serde_json::Value::Object(map)
    }

    /// `(path, kind)` of every field in the tree, paths relative to `self`.
    pub fn shape(&self) -> Vec<(String, FieldKind)> {
        let mut out = Vec::new();
        self.collect_shape("", &mut out);
        out
    }

    fn collect_shape(&self, prefix: &str, out: &mut Vec<(String, FieldKind)>) {
        for field in self.fields.values() {
            out.push((format!("{prefix}{}", field.name()), field.kind()));
        }
        for child in &self.children {
            child.collect_shape(&format!("{prefix}{}/", child.name), out);
        }
    }

    /// Equality under `tolerance`, with `self` as the reference.
    pub fn equals(&self, other: &InfoGroup, tolerance: f64) -> bool {
        crate::diff::diff(self, other, tolerance).is_equal()
    }
}
