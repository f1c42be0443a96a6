//! Main collector that builds and populates the class tree.
//!
//! The `Collector` struct bundles a host, the class registry and the run
//! configuration, and turns them into a `Snapshot`.

use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info};

use crate::classes::{self, ROOT_CLASS};
use crate::collector::traits::Host;
use crate::compose::{Context, Registry};
use crate::config::Config;
use crate::error::LoadError;
use crate::model::{ClassArgs, InfoGroup};
use crate::snapshot::{DocumentSource, Snapshot};

/// Timing information for each collector phase.
///
/// Used for debugging and performance monitoring.
#[derive(Debug, Clone, Default)]
pub struct CollectorTiming {
    /// Total snapshot collection time.
    pub total: Duration,
    /// Time to construct the tree and run expanders.
    pub compose: Duration,
    /// Time to populate every class.
    pub populate: Duration,
    /// Populate time per top-level class, in tree order.
    pub classes: Vec<(String, Duration)>,
}

/// Builds snapshots of the machine behind a [`Host`].
pub struct Collector<H: Host> {
    host: H,
    registry: Registry,
    config: Config,
    /// Timing information from the last collect_snapshot call.
    last_timing: Option<CollectorTiming>,
}

impl<H: Host> Collector<H> {
    /// Creates a collector with every built-in class registered.
    pub fn new(host: H, config: Config) -> Self {
        Self {
            host,
            registry: Registry::builtin(),
            config,
            last_timing: None,
        }
    }

    /// Replaces the class registry.
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns timing information from the last collect_snapshot call.
    pub fn last_timing(&self) -> Option<&CollectorTiming> {
        self.last_timing.as_ref()
    }

    pub fn context(&self) -> Context<'_> {
        Context::new(&self.host, &self.registry, &self.config)
    }

    /// Arguments of the root class derived from the configuration.
    pub fn root_args(&self) -> ClassArgs {
        classes::root_args(&self.config)
    }

    /// Constructs and expands the root tree without reading any field.
    pub fn compose(&self) -> Option<InfoGroup> {
        let ctx = self.context();
        let mut root = ctx.construct(ROOT_CLASS, &self.root_args())?;
        root.expand(&ctx);
        Some(root)
    }

    /// Populates a tree (or subtree) built by this collector.
    pub fn populate(&self, group: &mut InfoGroup) {
        group.populate(&self.context());
    }

    /// Collects a complete snapshot.
    ///
    /// Never fails: unreadable sources show up as unavailable values. With a
    /// registry lacking the root class, the snapshot is an empty root.
    pub fn collect_snapshot(&mut self) -> Snapshot {
        let total_start = Instant::now();
        let collected = Utc::now();
        let mut timing = CollectorTiming::default();

        let start = Instant::now();
        let mut root = self
            .compose()
            .unwrap_or_else(|| InfoGroup::new(ROOT_CLASS, ROOT_CLASS, &self.root_args()));
        timing.compose = start.elapsed();

        let start = Instant::now();
        let ctx = self.context();
        root.populate_observed(&ctx, &mut |name, elapsed| {
            debug!(class = name, elapsed_ms = elapsed.as_millis() as u64, "populated");
            timing.classes.push((name.to_string(), elapsed));
        });
        timing.populate = start.elapsed();
        timing.total = total_start.elapsed();

        info!(
            classes = timing.classes.len(),
            compose_ms = timing.compose.as_millis() as u64,
            populate_ms = timing.populate.as_millis() as u64,
            total_ms = timing.total.as_millis() as u64,
            "snapshot collected"
        );
        self.last_timing = Some(timing);

        Snapshot::new(root, Some(collected))
    }

    /// Loads a stored snapshot with this collector's registry and config.
    pub fn load(&self, source: DocumentSource) -> Result<Snapshot, LoadError> {
        Snapshot::load(source, &self.registry, &self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockHost;
    use crate::model::Value;

    #[test]
    fn test_collect_snapshot_typical_machine() {
        let mut collector = Collector::new(MockHost::typical_machine(), Config::default());
        let snapshot = collector.collect_snapshot();
        let root = snapshot.root();

        assert_eq!(root.class(), ROOT_CLASS);
        assert!(root.get_child("HostInfo").is_some());
        assert!(root.get_child("CpuTopology").is_some());
        assert!(snapshot.collected().is_some());

        let timing = collector.last_timing().unwrap();
        assert_eq!(timing.classes.len(), root.children().len());
        assert!(timing.total >= timing.populate);
    }

    #[test]
    fn test_collect_snapshot_empty_machine_is_total() {
        let mut collector = Collector::new(MockHost::new(), Config::default());
        let snapshot = collector.collect_snapshot();

        fn check(group: &InfoGroup) {
            for field in group.fields() {
                assert!(field.value().is_some(), "{}/{} unset", group.name(), field.name());
            }
            group.children().iter().for_each(check);
        }
        check(snapshot.root());

        let hostinfo = snapshot.root().get_child("HostInfo").unwrap();
        assert_eq!(hostinfo.value("Hostname"), Some(&Value::Unavailable));
    }

    #[test]
    fn test_compose_has_shape_without_values() {
        let collector = Collector::new(MockHost::typical_machine(), Config::default());
        let root = collector.compose().unwrap();
        let cpus = root.get_child("CpuTopology").unwrap();
        assert_eq!(cpus.children().len(), 4);
        assert!(cpus.children()[0].value("CoreId").is_none());
    }

    #[test]
    fn test_each_directory_discovered_once() {
        let rapl = "/sys/devices/virtual/powercap/intel-rapl";
        let dirs = [
            rapl.to_string(),
            format!("{rapl}/intel-rapl:0"),
            format!("{rapl}/intel-rapl:0/intel-rapl:0:0"),
            "/sys/devices/system/node/node0/hugepages".to_string(),
        ];
        let mut collector = Collector::new(MockHost::typical_machine(), Config::default());
        collector.collect_snapshot();
        for dir in &dirs {
            assert_eq!(collector.host().call_count(&format!("read_dir {dir}")), 1, "{dir}");
        }

        // Compose then populate shares one discovery
        let mut root = collector.compose().unwrap();
        collector.populate(&mut root);
        for dir in &dirs {
            assert_eq!(collector.host().call_count(&format!("read_dir {dir}")), 2, "{dir}");
        }
        assert!(root.find("PowercapInfo/Package0/Core/Constraint0").is_some());

        // A repeated populate discovers afresh
        collector.populate(&mut root);
        for dir in &dirs {
            assert_eq!(collector.host().call_count(&format!("read_dir {dir}")), 3, "{dir}");
        }
    }

    #[test]
    fn test_empty_registry_gives_empty_root() {
        let mut collector =
            Collector::new(MockHost::typical_machine(), Config::default()).with_registry(Registry::new());
        assert!(collector.compose().is_none());
        let snapshot = collector.collect_snapshot();
        assert!(snapshot.root().children().is_empty());
    }
}
