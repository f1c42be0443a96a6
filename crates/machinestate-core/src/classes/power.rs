//! RAPL power capping: packages, their domains and power constraints.

use std::path::PathBuf;

use crate::compose::{Expander, Registry};
use crate::config::Config;
use crate::extract::{Conversion, Extractor, units};
use crate::model::{ClassArgs, InfoGroup};

pub const PACKAGE_CLASS: &str = "PowercapPackage";
pub const DOMAIN_CLASS: &str = "PowercapDomain";
pub const CONSTRAINT_CLASS: &str = "PowercapConstraint";

pub(crate) fn register(registry: &mut Registry) {
    registry.register("PowercapInfo", powercap_info);
    registry.register(PACKAGE_CLASS, powercap_package);
    registry.register(DOMAIN_CLASS, powercap_domain);
    registry.register(CONSTRAINT_CLASS, powercap_constraint);
}

fn rapl_dir(config: &Config) -> PathBuf {
    config.sys("devices/virtual/powercap/intel-rapl")
}

pub fn powercap_info(args: &ClassArgs, config: &Config) -> InfoGroup {
    InfoGroup::new("PowercapInfo", "PowercapInfo", args).expander(Expander::path_match(
        rapl_dir(config),
        r"^intel-rapl:(\d+)$",
        PACKAGE_CLASS,
    ))
}

pub fn powercap_package(args: &ClassArgs, config: &Config) -> InfoGroup {
    let package = args.ident();
    let dir = rapl_dir(config).join(format!("intel-rapl:{package}"));
    InfoGroup::new(PACKAGE_CLASS, format!("Package{package}"), args)
        .file("Name", dir.join("name"), Extractor::text())
        .file("Enabled", dir.join("enabled"), Extractor::bool())
        .expander(
            Expander::path_match(&dir, r"^intel-rapl:\d+:(\d+)$", DOMAIN_CLASS)
                .with_param("package", package),
        )
}

/// Domains are named after their kernel name, `dram` → `Dram`.
fn domain_name(group: &InfoGroup) -> Option<String> {
    let name = group.value("Name")?.as_str()?;
    Some(units::to_title(name)).filter(|n| !n.is_empty())
}

pub fn powercap_domain(args: &ClassArgs, config: &Config) -> InfoGroup {
    let domain = args.ident();
    let package = args.param("package").unwrap_or("0");
    let dir = rapl_dir(config)
        .join(format!("intel-rapl:{package}"))
        .join(format!("intel-rapl:{package}:{domain}"));
    InfoGroup::new(DOMAIN_CLASS, format!("Domain{domain}"), args)
        .file("Name", dir.join("name"), Extractor::text())
        .file("Enabled", dir.join("enabled"), Extractor::bool())
        .expander(
            Expander::path_match(&dir, r"^constraint_(\d+)_name$", CONSTRAINT_CLASS)
                .with_param("package", package)
                .with_param("domain", domain),
        )
        .rename(domain_name)
}

pub fn powercap_constraint(args: &ClassArgs, config: &Config) -> InfoGroup {
    let n = args.ident();
    let package = args.param("package").unwrap_or("0");
    let domain = args.param("domain").unwrap_or("0");
    let dir = rapl_dir(config)
        .join(format!("intel-rapl:{package}"))
        .join(format!("intel-rapl:{package}:{domain}"));
    let file = |suffix: &str| dir.join(format!("constraint_{n}_{suffix}"));
    InfoGroup::new(CONSTRAINT_CLASS, format!("Constraint{n}"), args)
        .file("Name", file("name"), Extractor::new(Conversion::Title))
        .file("PowerLimitUw", file("power_limit_uw"), Extractor::int())
        .file("TimeWindowUs", file("time_window_us"), Extractor::int())
        .when(args.extended, |g| {
            g.file("MaxPowerUw", file("max_power_uw"), Extractor::int())
        })
}
