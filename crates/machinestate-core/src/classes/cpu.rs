//! Processor identity, topology, frequencies, caches and clock sources.
//!
//! Per-CPU classes are expanded from `cpu<N>` entries under
//! `/sys/devices/system/cpu` and fall back to a single `Cpu0` when that
//! directory cannot be listed.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use super::{numbered_entries, read_converted};
use crate::compose::{Context, Expander, Registry};
use crate::config::Config;
use crate::extract::{Conversion, Extractor, units};
use crate::model::{ClassArgs, Field, FieldKind, InfoGroup, Value};

pub const CPU_TOPOLOGY_CLASS: &str = "CpuTopologyClass";
pub const CPU_FREQUENCY_CLASS: &str = "CpuFrequencyClass";
pub const CACHE_TOPOLOGY_CLASS: &str = "CacheTopologyClass";
pub const CLOCKSOURCE_CLASS: &str = "ClocksourceInfoClass";
pub const PREFETCHER_CLASS: &str = "PrefetcherInfoClass";

const CPU_PATTERN: &str = r"^cpu(\d+)$";

pub(crate) fn register(registry: &mut Registry) {
    registry.register("CpuInfo", cpu_info);
    registry.register("CpuTopology", cpu_topology);
    registry.register(CPU_TOPOLOGY_CLASS, cpu_topology_class);
    registry.register("CpuFrequency", cpu_frequency);
    registry.register(CPU_FREQUENCY_CLASS, cpu_frequency_class);
    registry.register("CacheTopology", cache_topology);
    registry.register(CACHE_TOPOLOGY_CLASS, cache_topology_class);
    registry.register("ClocksourceInfo", clocksource_info);
    registry.register(CLOCKSOURCE_CLASS, clocksource_info_class);
    registry.register("TurboInfo", turbo_info);
    registry.register("PrefetcherInfo", prefetcher_info);
    registry.register(PREFETCHER_CLASS, prefetcher_info_class);
}

/// `^<key>\s*: <value>$` in /proc/cpuinfo.
fn cpuinfo_key(key: &str) -> String {
    format!(r"(?m)^{key}\s*:\s*(.+)$")
}

pub fn cpu_info(args: &ClassArgs, config: &Config) -> InfoGroup {
    let path = config.proc("cpuinfo");
    let arch = args.param("arch").unwrap_or(std::env::consts::ARCH);
    let keys: [(&str, &str); 5] = match arch {
        "aarch64" | "arm" => [
            ("Vendor", "CPU implementer"),
            ("Name", "model name"),
            ("Family", "CPU architecture"),
            ("Model", "CPU variant"),
            ("Stepping", "CPU revision"),
        ],
        "powerpc64" | "powerpc" => [
            ("Vendor", "vendor"),
            ("Name", "cpu"),
            ("Family", "platform"),
            ("Model", "model"),
            ("Stepping", "revision"),
        ],
        _ => [
            ("Vendor", "vendor_id"),
            ("Name", "model name"),
            ("Family", "cpu family"),
            ("Model", "model"),
            ("Stepping", "stepping"),
        ],
    };
    let group = keys.iter().fold(
        InfoGroup::new("CpuInfo", "CpuInfo", args),
        |g, (name, key)| g.file(name, &path, Extractor::text().matching(&cpuinfo_key(key))),
    );
    group.when(args.extended, |g| {
        let flags = if arch.starts_with("aarch64") || arch == "arm" {
            "Features"
        } else {
            "flags"
        };
        g.file("Flags", &path, Extractor::str_set().matching(&cpuinfo_key(flags)))
            .file("Bugs", &path, Extractor::str_set().matching(&cpuinfo_key("bugs")))
            .file("Microcode", &path, Extractor::text().matching(&cpuinfo_key("microcode")))
    })
}

pub fn cpu_topology(args: &ClassArgs, config: &Config) -> InfoGroup {
    InfoGroup::new("CpuTopology", "CpuTopology", args).expander(
        Expander::path_match(config.sys("devices/system/cpu"), CPU_PATTERN, CPU_TOPOLOGY_CLASS)
            .or_single("0"),
    )
}

/// Position of this hardware thread within its core's sibling list.
fn thread_id(args: &ClassArgs, ctx: &Context<'_>) -> Value {
    let Ok(hwthread) = args.ident().parse::<i64>() else {
        return Value::Unavailable;
    };
    let path = ctx.config.sys(&format!(
        "devices/system/cpu/cpu{hwthread}/topology/thread_siblings_list"
    ));
    match read_converted(ctx, &path, Conversion::IntList) {
        Value::IntList(siblings) => siblings
            .iter()
            .position(|&s| s == hwthread)
            .map_or(Value::Unavailable, |i| Value::Int(i as i64)),
        _ => Value::Unavailable,
    }
}

pub fn cpu_topology_class(args: &ClassArgs, config: &Config) -> InfoGroup {
    let n = args.ident();
    let topology = config.sys(&format!("devices/system/cpu/cpu{n}/topology"));
    InfoGroup::new(CPU_TOPOLOGY_CLASS, format!("Cpu{n}"), args)
        .constant("HWThread", n.parse::<i64>().map_or(Value::Unavailable, Value::Int))
        .derived("ThreadId", FieldKind::Int, thread_id)
        .exact()
        .file("CoreId", topology.join("core_id"), Extractor::int())
        .exact()
        .file("PackageId", topology.join("physical_package_id"), Extractor::int())
        .exact()
}

pub fn cpu_frequency(args: &ClassArgs, config: &Config) -> InfoGroup {
    InfoGroup::new("CpuFrequency", "CpuFrequency", args).expander(
        Expander::path_match(config.sys("devices/system/cpu"), CPU_PATTERN, CPU_FREQUENCY_CLASS)
            .or_single("0"),
    )
}

pub fn cpu_frequency_class(args: &ClassArgs, config: &Config) -> InfoGroup {
    let n = args.ident();
    let cpufreq = config.sys(&format!("devices/system/cpu/cpu{n}/cpufreq"));
    InfoGroup::new(CPU_FREQUENCY_CLASS, format!("Cpu{n}"), args)
        .file("MaxFreq", cpufreq.join("scaling_max_freq"), Extractor::hertz())
        .file("MinFreq", cpufreq.join("scaling_min_freq"), Extractor::hertz())
        .file("Governor", cpufreq.join("scaling_governor"), Extractor::text())
        .when(args.extended, |g| {
            g.file("Driver", cpufreq.join("scaling_driver"), Extractor::text())
                .file("BaseFreq", cpufreq.join("base_frequency"), Extractor::hertz())
        })
}

pub fn cache_topology(args: &ClassArgs, config: &Config) -> InfoGroup {
    InfoGroup::new("CacheTopology", "CacheTopology", args).expander(
        Expander::path_match(
            config.sys("devices/system/cpu/cpu0/cache"),
            r"^index(\d+)$",
            CACHE_TOPOLOGY_CLASS,
        )
        .or_single("0"),
    )
}

/// Distinct `shared_cpu_list`s of this cache index over all CPUs.
fn shared_cpu_lists(args: &ClassArgs, ctx: &Context<'_>) -> Value {
    let index = args.ident();
    let cpu_dir = ctx.config.sys("devices/system/cpu");
    let lists: BTreeSet<String> = numbered_entries(ctx, &cpu_dir, "cpu")
        .into_iter()
        .filter_map(|cpu| {
            let path = cpu_dir.join(format!("cpu{cpu}/cache/index{index}/shared_cpu_list"));
            ctx.reader.read_file(&path).ok()
        })
        .filter(|list| !list.is_empty())
        .collect();
    if lists.is_empty() {
        Value::Unavailable
    } else {
        Value::Set(lists)
    }
}

/// `L1D`, `L1I`, `L2`... once level and type are known.
fn cache_name(group: &InfoGroup) -> Option<String> {
    let level = group.value("Level")?.as_i64()?;
    let suffix = match group.value("Type").and_then(Value::as_str) {
        Some("Data") => "D",
        Some("Instruction") => "I",
        _ => "",
    };
    Some(format!("L{level}{suffix}"))
}

pub fn cache_topology_class(args: &ClassArgs, config: &Config) -> InfoGroup {
    let index = args.ident();
    let dir = config.sys(&format!("devices/system/cpu/cpu0/cache/index{index}"));
    InfoGroup::new(CACHE_TOPOLOGY_CLASS, format!("L{index}"), args)
        .file("Size", dir.join("size"), Extractor::bytes())
        .file("Level", dir.join("level"), Extractor::int())
        .exact()
        .file("Type", dir.join("type"), Extractor::text())
        .derived("CpuList", FieldKind::Set, shared_cpu_lists)
        .when(args.extended, |g| {
            g.file("Sets", dir.join("number_of_sets"), Extractor::int())
                .file("Associativity", dir.join("ways_of_associativity"), Extractor::int())
                .file("CoherencyLineSize", dir.join("coherency_line_size"), Extractor::int())
                .file("PhysicalLineSize", dir.join("physical_line_partition"), Extractor::int())
        })
        .rename(cache_name)
}

pub fn clocksource_info(args: &ClassArgs, config: &Config) -> InfoGroup {
    InfoGroup::new("ClocksourceInfo", "ClocksourceInfo", args).expander(Expander::path_match(
        config.sys("devices/system/clocksource"),
        r"^clocksource(\d+)$",
        CLOCKSOURCE_CLASS,
    ))
}

pub fn clocksource_info_class(args: &ClassArgs, config: &Config) -> InfoGroup {
    let n = args.ident();
    let dir = config.sys(&format!("devices/system/clocksource/clocksource{n}"));
    InfoGroup::new(CLOCKSOURCE_CLASS, format!("Clocksource{n}"), args)
        .file("Current", dir.join("current_clocksource"), Extractor::text())
        .file("Available", dir.join("available_clocksource"), Extractor::str_set())
}

static TURBO_LINE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?m)^C(\d+) ([\d.]+ MHz)").ok());

fn turbo_fields(_: &ClassArgs, ctx: &Context<'_>) -> Vec<Field> {
    let Some(re) = TURBO_LINE.as_ref() else {
        return Vec::new();
    };
    let program = ctx.config.likwid_tool("likwid-powermeter");
    let Ok(out) = ctx.reader.run(&program, &["-i".to_string()]) else {
        return Vec::new();
    };
    re.captures_iter(&out)
        .filter_map(|caps| {
            let cores: i64 = caps[1].parse().ok()?;
            let hz = units::to_hertz(&caps[2]).map_or(Value::Unavailable, Value::Int);
            Some(Field::dynamic(format!("{}CoresActive", cores + 1), hz))
        })
        .collect()
}

/// Turbo frequencies by number of active cores, from likwid.
pub fn turbo_info(args: &ClassArgs, _config: &Config) -> InfoGroup {
    InfoGroup::new("TurboInfo", "TurboInfo", args).dynamic(turbo_fields)
}

pub fn prefetcher_info(args: &ClassArgs, config: &Config) -> InfoGroup {
    InfoGroup::new("PrefetcherInfo", "PrefetcherInfo", args).expander(
        Expander::path_match(config.sys("devices/system/cpu"), CPU_PATTERN, PREFETCHER_CLASS)
            .or_single("0"),
    )
}

const PREFETCHERS: [(&str, &str); 4] = [
    ("HW_PREFETCHER", "HwPrefetcher"),
    ("CL_PREFETCHER", "ClPrefetcher"),
    ("DCU_PREFETCHER", "DcuPrefetcher"),
    ("IP_PREFETCHER", "IpPrefetcher"),
];

pub fn prefetcher_info_class(args: &ClassArgs, config: &Config) -> InfoGroup {
    let n = args.ident();
    let program = config.likwid_tool("likwid-features");
    PREFETCHERS.iter().fold(
        InfoGroup::new(PREFETCHER_CLASS, format!("Cpu{n}"), args),
        |g, (feature, name)| {
            g.command(
                name,
                &program,
                &["-c", n, "-l"],
                Extractor::bool().matching(&format!(r"{feature}\s+(\w+)")),
            )
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockHost;

    fn populate_with(host: &MockHost, config: &Config, mut group: InfoGroup) -> InfoGroup {
        let registry = Registry::builtin();
        group.populate(&Context::new(host, &registry, config));
        group
    }

    fn populate(host: &MockHost, group: InfoGroup) -> InfoGroup {
        populate_with(host, &Config::default(), group)
    }

    #[test]
    fn test_cpu_info_x86() {
        let host = MockHost::typical_machine();
        let args = ClassArgs::new(true, false).with_param("arch", "x86_64");
        let group = populate(&host, cpu_info(&args, &Config::default()));
        assert_eq!(group.value("Vendor"), Some(&Value::str("GenuineIntel")));
        assert_eq!(
            group.value("Name"),
            Some(&Value::str("Intel(R) Xeon(R) Gold 6148 CPU @ 2.40GHz"))
        );
        assert_eq!(group.value("Family"), Some(&Value::str("6")));
        assert_eq!(group.value("Model"), Some(&Value::str("85")));
        match group.value("Flags") {
            Some(Value::Set(flags)) => assert!(flags.contains("avx512f")),
            other => panic!("unexpected flags {other:?}"),
        }
        assert_eq!(group.value("Microcode"), Some(&Value::str("0x2007006")));
    }

    #[test]
    fn test_cpu_info_arm_keys() {
        let mut host = MockHost::new();
        host.add_file(
            "/proc/cpuinfo",
            "processor\t: 0\nBogoMIPS\t: 50.00\nCPU implementer\t: 0x41\n\
             CPU architecture: 8\nCPU variant\t: 0x3\nCPU part\t: 0xd0c\nCPU revision\t: 1\n",
        );
        let args = ClassArgs::default().with_param("arch", "aarch64");
        let group = populate(&host, cpu_info(&args, &Config::default()));
        assert_eq!(group.value("Vendor"), Some(&Value::str("0x41")));
        assert_eq!(group.value("Family"), Some(&Value::str("8")));
        assert_eq!(group.value("Name"), Some(&Value::Unavailable));
    }

    #[test]
    fn test_cpu_topology_expands_per_cpu() {
        let host = MockHost::typical_machine();
        let group = populate(&host, cpu_topology(&ClassArgs::default(), &Config::default()));
        let names: Vec<_> = group.children().iter().map(InfoGroup::name).collect();
        assert_eq!(names, ["Cpu0", "Cpu1", "Cpu2", "Cpu3"]);

        let cpu3 = group.get_child("Cpu3").unwrap();
        assert_eq!(cpu3.value("HWThread"), Some(&Value::Int(3)));
        assert_eq!(cpu3.value("CoreId"), Some(&Value::Int(1)));
        assert_eq!(cpu3.value("PackageId"), Some(&Value::Int(0)));
        // Siblings 1 and 3 share core 1
        assert_eq!(cpu3.value("ThreadId"), Some(&Value::Int(1)));
        let cpu1 = group.get_child("Cpu1").unwrap();
        assert_eq!(cpu1.value("ThreadId"), Some(&Value::Int(0)));
    }

    #[test]
    fn test_cpu_topology_falls_back_to_single_cpu() {
        let host = MockHost::new();
        let group = populate(&host, cpu_topology(&ClassArgs::default(), &Config::default()));
        assert_eq!(group.children().len(), 1);
        let cpu0 = &group.children()[0];
        assert_eq!(cpu0.name(), "Cpu0");
        assert_eq!(cpu0.value("HWThread"), Some(&Value::Int(0)));
        assert_eq!(cpu0.value("CoreId"), Some(&Value::Unavailable));
    }

    #[test]
    fn test_cpu_frequency() {
        let host = MockHost::typical_machine();
        let args = ClassArgs::new(true, false);
        let group = populate(&host, cpu_frequency(&args, &Config::default()));
        let cpu0 = group.get_child("Cpu0").unwrap();
        assert_eq!(cpu0.value("MaxFreq"), Some(&Value::Int(3_700_000_000)));
        assert_eq!(cpu0.value("MinFreq"), Some(&Value::Int(1_000_000_000)));
        assert_eq!(cpu0.value("Governor"), Some(&Value::str("performance")));
        assert_eq!(cpu0.value("Driver"), Some(&Value::str("intel_pstate")));
    }

    #[test]
    fn test_cache_topology_renames_and_shares() {
        let host = MockHost::typical_machine();
        let group = populate(&host, cache_topology(&ClassArgs::default(), &Config::default()));
        let names: Vec<_> = group.children().iter().map(InfoGroup::name).collect();
        assert_eq!(names, ["L1D", "L1I", "L2", "L3"]);

        let l1d = group.get_child("L1D").unwrap();
        assert_eq!(l1d.value("Size"), Some(&Value::Int(32 * 1024)));
        assert_eq!(l1d.value("CpuList"), Some(&Value::set(["0,2", "1,3"])));
        let l3 = group.get_child("L3").unwrap();
        assert_eq!(l3.value("Size"), Some(&Value::Int(8192 * 1024)));
        assert_eq!(l3.value("CpuList"), Some(&Value::set(["0-3"])));
    }

    #[test]
    fn test_clocksource() {
        let host = MockHost::typical_machine();
        let group = populate(&host, clocksource_info(&ClassArgs::default(), &Config::default()));
        let cs = group.get_child("Clocksource0").unwrap();
        assert_eq!(cs.value("Current"), Some(&Value::str("tsc")));
        assert_eq!(cs.value("Available"), Some(&Value::set(["tsc", "hpet", "acpi_pm"])));
    }

    #[test]
    fn test_turbo_info_from_likwid() {
        let mut host = MockHost::new();
        host.add_command(
            "likwid-powermeter",
            &["-i"],
            "Base clock:\t2400.00 MHz\nC0 3700.00 MHz\nC1 3500.00 MHz\n",
        );
        let group = populate(&host, turbo_info(&ClassArgs::default(), &Config::default()));
        assert_eq!(group.value("1CoresActive"), Some(&Value::Int(3_700_000_000)));
        assert_eq!(group.value("2CoresActive"), Some(&Value::Int(3_500_000_000)));
    }

    #[test]
    fn test_prefetchers_with_likwid_path() {
        let mut host = MockHost::typical_machine();
        host.add_command(
            "/opt/likwid/bin/likwid-features",
            &["-c", "0", "-l"],
            "Feature               CPU 0\nHW_PREFETCHER         on\nCL_PREFETCHER         off\n",
        );
        let config = Config {
            likwid_path: Some("/opt/likwid/bin".into()),
            ..Config::default()
        };
        let group = populate_with(&host, &config, prefetcher_info(&ClassArgs::default(), &config));
        let cpu0 = group.get_child("Cpu0").unwrap();
        assert_eq!(cpu0.value("HwPrefetcher"), Some(&Value::Bool(true)));
        assert_eq!(cpu0.value("ClPrefetcher"), Some(&Value::Bool(false)));
        assert_eq!(cpu0.value("IpPrefetcher"), Some(&Value::Unavailable));
        // No script for cpu1
        let cpu1 = group.get_child("Cpu1").unwrap();
        assert_eq!(cpu1.value("HwPrefetcher"), Some(&Value::Unavailable));
        // All four prefetchers come from one listing per CPU
        assert_eq!(host.call_count("run /opt/likwid/bin/likwid-features -c 0 -l"), 1);
        assert_eq!(host.call_count("run /opt/likwid/bin/likwid-features -c 1 -l"), 1);
    }
}
