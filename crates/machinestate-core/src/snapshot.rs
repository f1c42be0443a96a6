//! Snapshots: a populated root tree plus its collection time.
//!
//! A snapshot serializes to a self-describing document: every node carries a
//! `_meta` record `{class, version, args}`, which is what
//! [`Snapshot::from_document`] uses to rebuild the tree through the registry.

use std::path::PathBuf;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value as Json};
use tracing::{debug, warn};

use crate::compose::Registry;
use crate::config::Config;
use crate::diff::{self, ComparisonReport};
use crate::error::LoadError;
use crate::model::{ClassMeta, Field, InfoGroup, META_KEY, Value};
use crate::render::{self, DocumentOptions};

/// Key of the collection timestamp in the root meta-record.
pub const COLLECTED_KEY: &str = "collected";
/// Key of the producer string in the root meta-record.
pub const GENERATOR_KEY: &str = "generator";

/// Where a stored document comes from.
#[derive(Debug, Clone)]
pub enum DocumentSource {
    Path(PathBuf),
    Text(String),
    Value(Json),
}

#[derive(Debug, Clone)]
pub struct Snapshot {
    root: InfoGroup,
    collected: Option<DateTime<Utc>>,
}

impl Snapshot {
    pub fn new(root: InfoGroup, collected: Option<DateTime<Utc>>) -> Self {
        Self { root, collected }
    }

    pub fn root(&self) -> &InfoGroup {
        &self.root
    }

    pub fn collected(&self) -> Option<DateTime<Utc>> {
        self.collected
    }

    /// The document as a JSON value.
    pub fn to_document(&self, options: &DocumentOptions) -> Json {
        let mut doc = self.root.to_value(options.meta);
        if options.meta
            && let Some(Json::Object(meta)) = doc.get_mut(META_KEY)
        {
            if let Some(collected) = self.collected {
                meta.insert(
                    COLLECTED_KEY.to_string(),
                    Json::String(collected.to_rfc3339_opts(SecondsFormat::Secs, true)),
                );
            }
            meta.insert(GENERATOR_KEY.to_string(), Json::String(generator()));
        }
        if options.sort {
            doc = render::sort_keys(doc);
        }
        doc
    }

    /// The document rendered as JSON text.
    pub fn to_json(&self, options: &DocumentOptions) -> String {
        render::to_json_string(&self.to_document(options), options.indent)
    }

    /// Reads and reconstructs a stored document.
    pub fn load(source: DocumentSource, registry: &Registry, config: &Config) -> Result<Self, LoadError> {
        let doc = match source {
            DocumentSource::Path(path) => {
                let text = std::fs::read_to_string(&path).map_err(|source| LoadError::Io {
                    path: path.clone(),
                    source,
                })?;
                serde_json::from_str(&text)?
            }
            DocumentSource::Text(text) => serde_json::from_str(&text)?,
            DocumentSource::Value(value) => value,
        };
        Self::from_document(&doc, registry, config)
    }

    /// Rebuilds a snapshot from a document carrying meta-records.
    pub fn from_document(doc: &Json, registry: &Registry, config: &Config) -> Result<Self, LoadError> {
        let Json::Object(map) = doc else {
            return Err(LoadError::NotAnObject {
                path: String::new(),
            });
        };
        let collected = map
            .get(META_KEY)
            .and_then(|meta| meta.get(COLLECTED_KEY))
            .and_then(Json::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc));
        let root = load_group(map, "", registry, config)?;
        Ok(Self { root, collected })
    }

    /// Compares `self` (the reference) with `current`.
    pub fn diff(&self, current: &Snapshot, tolerance: f64) -> ComparisonReport {
        diff::diff(&self.root, &current.root, tolerance)
    }
}

/// Producer string stored in the root meta-record.
fn generator() -> String {
    match option_env!("MACHINESTATE_GIT_SHA") {
        Some(sha) if !sha.is_empty() => {
            format!("machinestate {} ({sha})", env!("CARGO_PKG_VERSION"))
        }
        _ => format!("machinestate {}", env!("CARGO_PKG_VERSION")),
    }
}

fn load_group(
    map: &Map<String, Json>,
    path: &str,
    registry: &Registry,
    config: &Config,
) -> Result<InfoGroup, LoadError> {
    let meta = map
        .get(META_KEY)
        .ok_or_else(|| LoadError::MissingMeta {
            path: path.to_string(),
        })?;
    let meta: ClassMeta =
        serde_json::from_value(meta.clone()).map_err(|e| LoadError::InvalidMeta {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
    let mut group = registry
        .construct(&meta.class, &meta.args, config)
        .ok_or_else(|| LoadError::UnknownClass {
            path: path.to_string(),
            class: meta.class.clone(),
        })?;
    if group.meta().version != meta.version {
        warn!(
            path,
            class = %meta.class,
            stored = meta.version,
            current = group.meta().version,
            "class version differs from stored document"
        );
    }

    let mut children = Vec::new();
    for (key, value) in map {
        if key == META_KEY {
            continue;
        }
        let child_path = if path.is_empty() {
            key.clone()
        } else {
            format!("{path}/{key}")
        };
        match value {
            Json::Object(child) => {
                let mut child = load_group(child, &child_path, registry, config)?;
                child.set_name(key.clone());
                children.push(child);
            }
            leaf => {
                if !group.load_value(key, leaf) {
                    if group.has_dynamic_fields() {
                        group.insert_field(Field::dynamic(key.clone(), Value::infer(leaf)));
                    } else {
                        debug!(path = %child_path, "ignoring unknown field");
                    }
                }
            }
        }
    }
    group.replace_children(children);
    Ok(group)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::Collector;
    use crate::collector::mock::MockHost;
    use crate::diff::DEFAULT_TOLERANCE;
    use serde_json::json;

    fn snapshot(host: MockHost, config: Config) -> (Snapshot, Collector<MockHost>) {
        let mut collector = Collector::new(host, config);
        let snap = collector.collect_snapshot();
        (snap, collector)
    }

    #[test]
    fn test_round_trip_preserves_shape_and_values() {
        let (snap, collector) = snapshot(MockHost::typical_machine(), Config::default());
        let text = snap.to_json(&DocumentOptions::default());

        let loaded = Snapshot::load(
            DocumentSource::Text(text),
            collector.registry(),
            collector.config(),
        )
        .unwrap();
        assert_eq!(loaded.root().shape(), snap.root().shape());
        assert!(loaded.diff(&snap, 0.0).is_equal());
        assert_eq!(
            loaded.collected().map(|t| t.timestamp()),
            snap.collected().map(|t| t.timestamp())
        );
    }

    #[test]
    fn test_document_has_root_meta() {
        let (snap, _) = snapshot(MockHost::typical_machine(), Config::default());
        let doc = snap.to_document(&DocumentOptions::default());
        assert_eq!(doc["_meta"]["class"], json!("MachineState"));
        assert!(doc["_meta"]["collected"].is_string());
        assert!(doc["_meta"]["generator"].as_str().unwrap().starts_with("machinestate"));
        assert_eq!(doc["HostInfo"]["_meta"]["class"], json!("HostInfo"));

        let bare = snap.to_document(&DocumentOptions {
            meta: false,
            ..DocumentOptions::default()
        });
        assert!(bare.get("_meta").is_none());
        assert!(bare["HostInfo"].get("_meta").is_none());
    }

    #[test]
    fn test_load_from_path() {
        let (snap, collector) = snapshot(MockHost::typical_machine(), Config::default());
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, snap.to_json(&DocumentOptions::default()).as_bytes())
            .unwrap();
        let loaded = Snapshot::load(
            DocumentSource::Path(file.path().to_path_buf()),
            collector.registry(),
            collector.config(),
        )
        .unwrap();
        assert!(loaded.diff(&snap, 0.2).is_equal());

        let missing = Snapshot::load(
            DocumentSource::Path(PathBuf::from("/nonexistent/state.json")),
            collector.registry(),
            collector.config(),
        );
        assert!(matches!(missing, Err(LoadError::Io { .. })));
    }

    #[test]
    fn test_malformed_documents_are_rejected() {
        let registry = Registry::builtin();
        let config = Config::default();
        let load = |doc: Json| Snapshot::load(DocumentSource::Value(doc), &registry, &config);

        assert!(matches!(load(json!({})), Err(LoadError::MissingMeta { .. })));
        assert!(matches!(load(json!([1, 2])), Err(LoadError::NotAnObject { .. })));
        assert!(matches!(
            load(json!({"_meta": "MachineState()"})),
            Err(LoadError::InvalidMeta { .. })
        ));
        assert!(matches!(
            load(json!({"_meta": {"class": "NoSuchClass", "version": 1}})),
            Err(LoadError::UnknownClass { .. })
        ));
        assert!(matches!(
            load(json!({"_meta": {"class": "MachineState", "version": 1}, "HostInfo": {"Hostname": "x"}})),
            Err(LoadError::MissingMeta { path }) if path == "HostInfo"
        ));
        assert!(matches!(
            Snapshot::load(DocumentSource::Text("{not json".into()), &registry, &config),
            Err(LoadError::Json(_))
        ));
    }

    #[test]
    fn test_meta_with_junk_keys_gives_empty_tree() {
        let registry = Registry::builtin();
        let config = Config::default();
        let doc = json!({
            "_meta": {"class": "MachineState", "version": 1, "args": {}},
            "Junk": 1,
        });
        let snap = Snapshot::from_document(&doc, &registry, &config).unwrap();
        assert!(snap.root().children().is_empty());
        assert_eq!(snap.root().get(), json!({}));
    }

    #[test]
    fn test_sorted_and_indented_output() {
        let (snap, _) = snapshot(MockHost::typical_machine(), Config::default());
        let sorted = snap.to_json(&DocumentOptions {
            sort: true,
            indent: 2,
            meta: false,
        });
        let hw = sorted.find("\"HostInfo\"").unwrap();
        let cpu = sorted.find("\"CpuInfo\"").unwrap();
        assert!(cpu < hw);
        assert!(sorted.contains("\n  \"CacheTopology\""));

        let compact = snap.to_json(&DocumentOptions {
            indent: 0,
            ..DocumentOptions::default()
        });
        assert!(!compact.contains('\n'));
        let a: Json = serde_json::from_str(&sorted).unwrap();
        let b: Json = serde_json::from_str(&snap.to_json(&DocumentOptions {
            meta: false,
            ..DocumentOptions::default()
        }))
        .unwrap();
        assert_eq!(a, b);
    }

    fn reload(doc: Json, collector: &Collector<MockHost>) -> Snapshot {
        Snapshot::load(DocumentSource::Value(doc), collector.registry(), collector.config()).unwrap()
    }

    #[test]
    fn test_compiler_given_by_path_round_trips() {
        let mut host = MockHost::typical_machine();
        host.add_program("/usr/bin/gcc");
        host.set_env("CC", "/usr/bin/gcc");
        let (snap, collector) = snapshot(host, Config::default());

        let compilers = snap.root().get_child("CompilerInfo_C").unwrap();
        let names: Vec<_> = compilers.children().iter().map(InfoGroup::name).collect();
        assert_eq!(names, ["Gcc"]);

        let text = snap.to_json(&DocumentOptions::default());
        let loaded = Snapshot::load(DocumentSource::Text(text), collector.registry(), collector.config())
            .unwrap();
        assert_eq!(loaded.root().shape(), snap.root().shape());
        assert!(loaded.diff(&snap, 0.0).is_equal());
    }

    #[test]
    fn test_stored_hostname_differs() {
        let mut host = MockHost::typical_machine();
        host.add_command("hostname", &["-s"], "host-A\n");
        let (current, collector) = snapshot(host, Config::default());

        let mut doc = current.to_document(&DocumentOptions::default());
        doc["HostInfo"]["Hostname"] = json!("host-B");
        let stored = reload(doc, &collector);

        let report = stored.diff(&current, DEFAULT_TOLERANCE);
        assert!(!report.is_equal());
        let paths: Vec<_> = report.mismatches().map(|d| d.path.to_string()).collect();
        assert_eq!(paths, ["HostInfo/Hostname"]);
        let entry = report.get("HostInfo/Hostname").unwrap();
        assert_eq!(entry.old, Some(Value::str("host-B")));
        assert_eq!(entry.new, Some(Value::str("host-A")));
    }

    #[test]
    fn test_stored_load_within_tolerance() {
        let mut host = MockHost::typical_machine();
        host.add_file("/proc/loadavg", "1.00 0.41 0.31 2/612 48231\n");
        let (current, collector) = snapshot(host, Config::default());
        assert_eq!(
            current.root().find("LoadAvg").unwrap().value("LoadAvg1m"),
            Some(&Value::Float(1.0))
        );

        let stored_with = |load: f64| {
            let mut doc = current.to_document(&DocumentOptions::default());
            doc["LoadAvg"]["LoadAvg1m"] = json!(load);
            reload(doc, &collector)
        };
        assert!(stored_with(1.15).diff(&current, DEFAULT_TOLERANCE).is_equal());

        let report = stored_with(0.79).diff(&current, DEFAULT_TOLERANCE);
        assert!(!report.is_equal());
        let paths: Vec<_> = report.mismatches().map(|d| d.path.to_string()).collect();
        assert_eq!(paths, ["LoadAvg/LoadAvg1m"]);
    }
}
