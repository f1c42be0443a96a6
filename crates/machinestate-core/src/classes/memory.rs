//! Memory, NUMA, huge pages, writeback workers and cgroup cpusets.

use super::read_first;
use crate::compose::{Context, Expander, Registry};
use crate::config::Config;
use crate::extract::{Conversion, Extractor};
use crate::model::{ClassArgs, FieldKind, InfoGroup, Value};

pub const NUMA_INFO_CLASS: &str = "NumaInfoClass";
pub const NUMA_HUGEPAGES_CLASS: &str = "NumaInfoHugepagesClass";
pub const HUGEPAGES_CLASS: &str = "HugepagesClass";

const HUGEPAGES_PATTERN: &str = r"^hugepages-(\d+[kKMG]B)$";

pub(crate) fn register(registry: &mut Registry) {
    registry.register("MemInfo", mem_info);
    registry.register("NumaBalancing", numa_balancing);
    registry.register("NumaInfo", numa_info);
    registry.register(NUMA_INFO_CLASS, numa_info_class);
    registry.register(NUMA_HUGEPAGES_CLASS, numa_info_hugepages_class);
    registry.register("Hugepages", hugepages);
    registry.register(HUGEPAGES_CLASS, hugepages_class);
    registry.register("TransparentHugepages", transparent_hugepages);
    registry.register("Writeback", writeback);
    registry.register("Cgroups", cgroups);
}

/// `^<key>:   <n> kB` in a meminfo-style file.
fn meminfo_key(prefix: &str, key: &str) -> Extractor {
    Extractor::bytes().matching(&format!(r"(?m)^{prefix}{key}:\s+(\d+\s*[kKMG]?B?)$"))
}

pub fn mem_info(args: &ClassArgs, config: &Config) -> InfoGroup {
    let path = config.proc("meminfo");
    let keys: &[&str] = if args.extended {
        &["MemTotal", "MemFree", "MemAvailable", "SwapTotal", "SwapFree", "Buffers", "Cached"]
    } else {
        &["MemTotal", "MemFree", "MemAvailable", "SwapTotal", "SwapFree"]
    };
    keys.iter()
        .fold(InfoGroup::new("MemInfo", "MemInfo", args), |g, key| {
            g.file(key, &path, meminfo_key("", key))
        })
}

pub fn numa_balancing(args: &ClassArgs, config: &Config) -> InfoGroup {
    let kernel = config.proc("sys/kernel");
    InfoGroup::new("NumaBalancing", "NumaBalancing", args)
        .file("Enabled", kernel.join("numa_balancing"), Extractor::bool())
        .when(args.extended, |g| {
            g.file("ScanDelayMs", kernel.join("numa_balancing_scan_delay_ms"), Extractor::int())
                .file("ScanPeriodMaxMs", kernel.join("numa_balancing_scan_period_max_ms"), Extractor::int())
                .file("ScanPeriodMinMs", kernel.join("numa_balancing_scan_period_min_ms"), Extractor::int())
                .file("ScanSizeMb", kernel.join("numa_balancing_scan_size_mb"), Extractor::int())
        })
}

pub fn numa_info(args: &ClassArgs, config: &Config) -> InfoGroup {
    InfoGroup::new("NumaInfo", "NumaInfo", args).expander(
        Expander::path_match(config.sys("devices/system/node"), r"^node(\d+)$", NUMA_INFO_CLASS)
            .or_single("0"),
    )
}

pub fn numa_info_class(args: &ClassArgs, config: &Config) -> InfoGroup {
    let node = args.ident();
    let dir = config.sys(&format!("devices/system/node/node{node}"));
    let meminfo = dir.join("meminfo");
    let prefix = format!(r"Node {node}\s+");
    InfoGroup::new(NUMA_INFO_CLASS, format!("Node{node}"), args)
        .file("MemTotal", &meminfo, meminfo_key(&prefix, "MemTotal"))
        .file("MemFree", &meminfo, meminfo_key(&prefix, "MemFree"))
        .file("MemUsed", &meminfo, meminfo_key(&prefix, "MemUsed"))
        .file("Distances", dir.join("distance"), Extractor::int_list())
        .exact()
        .file("CpuList", dir.join("cpulist"), Extractor::int_list())
        .when(args.extended, |g| {
            g.file("Writeback", &meminfo, meminfo_key(&prefix, "Writeback"))
        })
        .expander(
            Expander::path_match(dir.join("hugepages"), HUGEPAGES_PATTERN, NUMA_HUGEPAGES_CLASS)
                .with_param("node", node),
        )
}

pub fn numa_info_hugepages_class(args: &ClassArgs, config: &Config) -> InfoGroup {
    let size = args.ident();
    let node = args.param("node").unwrap_or("0");
    let dir = config.sys(&format!(
        "devices/system/node/node{node}/hugepages/hugepages-{size}"
    ));
    InfoGroup::new(NUMA_HUGEPAGES_CLASS, format!("Hugepages-{size}"), args)
        .file("Count", dir.join("nr_hugepages"), Extractor::int())
        .file("Free", dir.join("free_hugepages"), Extractor::int())
}

pub fn hugepages(args: &ClassArgs, config: &Config) -> InfoGroup {
    InfoGroup::new("Hugepages", "Hugepages", args).expander(Expander::path_match(
        config.sys("kernel/mm/hugepages"),
        HUGEPAGES_PATTERN,
        HUGEPAGES_CLASS,
    ))
}

pub fn hugepages_class(args: &ClassArgs, config: &Config) -> InfoGroup {
    let size = args.ident();
    let dir = config.sys(&format!("kernel/mm/hugepages/hugepages-{size}"));
    InfoGroup::new(HUGEPAGES_CLASS, format!("Hugepages-{size}"), args)
        .file("Count", dir.join("nr_hugepages"), Extractor::int())
        .file("Free", dir.join("free_hugepages"), Extractor::int())
        .file("Reserved", dir.join("resv_hugepages"), Extractor::int())
}

pub fn transparent_hugepages(args: &ClassArgs, config: &Config) -> InfoGroup {
    let dir = config.sys("kernel/mm/transparent_hugepage");
    let selected = || Extractor::text().matching(r"\[(\S+)\]");
    InfoGroup::new("TransparentHugepages", "TransparentHugepages", args)
        .file("State", dir.join("enabled"), selected())
        .file("Defrag", dir.join("defrag"), selected())
        .file("UseZeroPage", dir.join("use_zero_page"), Extractor::bool())
}

pub fn writeback(args: &ClassArgs, config: &Config) -> InfoGroup {
    let dir = config.sys("bus/workqueue/devices/writeback");
    InfoGroup::new("Writeback", "Writeback", args)
        .file("CPUmask", dir.join("cpumask"), Extractor::new(Conversion::Mask))
        .file("MaxActive", dir.join("max_active"), Extractor::int())
}

/// A cpuset file from cgroup v1 or, failing that, the v2 root.
fn cpuset(ctx: &Context<'_>, v1: &str, v2: &str) -> Value {
    let cgroup = ctx.config.sys("fs/cgroup");
    read_first(
        ctx,
        &[cgroup.join("cpuset").join(v1), cgroup.join(v2)],
        Conversion::IntList,
    )
}

fn cgroup_cpus(_: &ClassArgs, ctx: &Context<'_>) -> Value {
    cpuset(ctx, "cpuset.cpus", "cpuset.cpus.effective")
}

fn cgroup_mems(_: &ClassArgs, ctx: &Context<'_>) -> Value {
    cpuset(ctx, "cpuset.mems", "cpuset.mems.effective")
}

fn cgroup_effective_cpus(_: &ClassArgs, ctx: &Context<'_>) -> Value {
    cpuset(ctx, "cpuset.effective_cpus", "cpuset.cpus.effective")
}

fn cgroup_effective_mems(_: &ClassArgs, ctx: &Context<'_>) -> Value {
    cpuset(ctx, "cpuset.effective_mems", "cpuset.mems.effective")
}

pub fn cgroups(args: &ClassArgs, _config: &Config) -> InfoGroup {
    InfoGroup::new("Cgroups", "Cgroups", args)
        .derived("CPUs", FieldKind::IntList, cgroup_cpus)
        .derived("Mems", FieldKind::IntList, cgroup_mems)
        .when(args.extended, |g| {
            g.derived("CPUs.effective", FieldKind::IntList, cgroup_effective_cpus)
                .derived("Mems.effective", FieldKind::IntList, cgroup_effective_mems)
        })
}
