//! The built-in information classes.
//!
//! Every class is a constructor `fn(&ClassArgs, &Config) -> InfoGroup`
//! registered under its class id in [`register_all`]. Constructors only
//! declare fields and children; all reading happens at populate time.

pub mod cpu;
pub mod executable;
pub mod hardware;
pub mod memory;
pub mod power;
pub mod system;
pub mod toolchain;

use std::path::{Path, PathBuf};

use crate::compose::{Context, Registry};
use crate::config::Config;
use crate::extract::Conversion;
use crate::model::{ClassArgs, InfoGroup, Value};

/// Class id of the document root.
pub const ROOT_CLASS: &str = "MachineState";

/// Parameter carrying the inspected executable.
pub const EXECUTABLE_PARAM: &str = "executable";

/// Parameter carrying the dmidecode dump path.
pub const DMIFILE_PARAM: &str = "dmifile";

/// Registers the root class and every class it can contain.
pub fn register_all(registry: &mut Registry) {
    registry.register(ROOT_CLASS, machine_state);
    system::register(registry);
    cpu::register(registry);
    memory::register(registry);
    power::register(registry);
    toolchain::register(registry);
    hardware::register(registry);
    executable::register(registry);
}

/// Arguments of the root class for a run with `config`.
pub fn root_args(config: &Config) -> ClassArgs {
    let mut args = ClassArgs::new(config.extended, config.anonymous);
    if let Some(exe) = &config.executable {
        args = args.with_param(EXECUTABLE_PARAM, exe.to_string_lossy());
    }
    if let Some(dmifile) = &config.dmifile {
        args = args.with_param(DMIFILE_PARAM, dmifile.to_string_lossy());
    }
    args
}

fn machine_state(args: &ClassArgs, config: &Config) -> InfoGroup {
    // Children only see the flags; each optional class gets its own param.
    let base = ClassArgs::new(args.extended, args.anonymous);
    let b = &base;
    InfoGroup::new(ROOT_CLASS, ROOT_CLASS, args)
        .child(system::host_info(b, config))
        .child(cpu::cpu_info(b, config))
        .child(system::operating_system_info(b, config))
        .child(system::kernel_info(b, config))
        .child(system::uptime(b, config))
        .child(cpu::cpu_topology(b, config))
        .child(memory::numa_balancing(b, config))
        .child(system::load_avg(b, config))
        .child(memory::mem_info(b, config))
        .child(memory::cgroups(b, config))
        .child(memory::writeback(b, config))
        .child(cpu::cpu_frequency(b, config))
        .child(memory::numa_info(b, config))
        .child(cpu::cache_topology(b, config))
        .child(memory::transparent_hugepages(b, config))
        .child(power::powercap_info(b, config))
        .child(memory::hugepages(b, config))
        .child(toolchain::compiler_info_c(b, config))
        .child(toolchain::compiler_info_cxx(b, config))
        .child(toolchain::compiler_info_fortran(b, config))
        .child(toolchain::mpi_info(b, config))
        .child(system::shell_environment(b, config))
        .when(config.likwid_enable, |g| g.child(cpu::turbo_info(b, config)))
        .child(toolchain::python_info(b, config))
        .child(cpu::clocksource_info(b, config))
        .when(config.likwid_enable, |g| {
            g.child(cpu::prefetcher_info(b, config))
        })
        .child(system::modules_info(b, config))
        .child(hardware::bios_info(b, config))
        .when_some(args.param(DMIFILE_PARAM), |g, path| {
            g.child(hardware::dmidecode_file(
                &base.clone().with_param(DMIFILE_PARAM, path),
                config,
            ))
        })
        .child(hardware::nvidia_info(b, config))
        .when_some(args.param(EXECUTABLE_PARAM), |g, exe| {
            g.child(executable::executable_info(
                &base.clone().with_param(EXECUTABLE_PARAM, exe),
                config,
            ))
        })
        .child(system::virtualization(b, config))
}

/// Reads a file and converts its trimmed content.
pub(crate) fn read_converted(ctx: &Context<'_>, path: &Path, conversion: Conversion) -> Value {
    match ctx.reader.read_file(path) {
        Ok(text) => conversion.apply(&text),
        Err(_) => Value::Unavailable,
    }
}

/// The first readable file of `paths`, converted.
pub(crate) fn read_first(ctx: &Context<'_>, paths: &[PathBuf], conversion: Conversion) -> Value {
    paths
        .iter()
        .find_map(|path| ctx.reader.read_file(path).ok())
        .map_or(Value::Unavailable, |text| conversion.apply(&text))
}

/// Numeric idents of the directory entries matching `prefix<N>`, sorted.
pub(crate) fn numbered_entries(ctx: &Context<'_>, dir: &Path, prefix: &str) -> Vec<u32> {
    let mut ids: Vec<u32> = ctx
        .reader
        .list_dir(dir)
        .unwrap_or_default()
        .iter()
        .filter_map(|name| name.strip_prefix(prefix)?.parse().ok())
        .collect();
    ids.sort_unstable();
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockHost;
    use crate::collector::Collector;

    #[test]
    fn test_root_order() {
        let registry = Registry::builtin();
        let root = registry
            .construct(ROOT_CLASS, &root_args(&Config::default()), &Config::default())
            .unwrap();
        let names: Vec<_> = root.children().iter().map(InfoGroup::name).collect();
        assert_eq!(names[..3], ["HostInfo", "CpuInfo", "OperatingSystemInfo"]);
        assert_eq!(names.last(), Some(&"Virtualization"));
        assert!(!names.contains(&"TurboInfo"));
        assert!(!names.contains(&"ExecutableInfo"));
        assert!(!names.contains(&"DmiDecodeFile"));
    }

    #[test]
    fn test_optional_classes_follow_config() {
        let config = Config {
            likwid_enable: true,
            executable: Some(PathBuf::from("/usr/bin/true")),
            dmifile: Some(PathBuf::from("/tmp/dmidecode.txt")),
            ..Config::default()
        };
        let args = root_args(&config);
        assert_eq!(args.param(EXECUTABLE_PARAM), Some("/usr/bin/true"));

        let root = Registry::builtin().construct(ROOT_CLASS, &args, &config).unwrap();
        for name in ["TurboInfo", "PrefetcherInfo", "ExecutableInfo", "DmiDecodeFile"] {
            assert!(root.get_child(name).is_some(), "{name} missing");
        }
        let exe = root.get_child("ExecutableInfo").unwrap();
        assert_eq!(exe.args().param(EXECUTABLE_PARAM), Some("/usr/bin/true"));
        // Only the class that needs it carries the param
        assert!(root.get_child("HostInfo").unwrap().args().params.is_empty());
    }

    #[test]
    fn test_every_child_class_is_registered() {
        let registry = Registry::builtin();
        let config = Config {
            extended: true,
            likwid_enable: true,
            executable: Some(PathBuf::from("/usr/bin/true")),
            ..Config::default()
        };
        let collector = Collector::new(MockHost::typical_machine(), config);
        let root = collector.compose().unwrap();
        fn check(group: &InfoGroup, registry: &Registry) {
            assert!(registry.contains(group.class()), "{} not registered", group.class());
            for child in group.children() {
                check(child, registry);
            }
        }
        check(&root, &registry);
    }

    #[test]
    fn test_shape_is_deterministic() {
        let collector = Collector::new(MockHost::typical_machine(), Config::default());
        let a = collector.compose().unwrap();
        let b = collector.compose().unwrap();
        assert_eq!(a.shape(), b.shape());
    }
}
