//! Host, operating system, kernel and process environment.

use crate::compose::{Context, Registry};
use crate::config::Config;
use crate::extract::{Conversion, Extractor};
use crate::model::{ANONYMOUS, ClassArgs, Field, FieldKind, InfoGroup, Value};
use crate::util::is_container;

pub(crate) fn register(registry: &mut Registry) {
    registry.register("HostInfo", host_info);
    registry.register("OperatingSystemInfo", operating_system_info);
    registry.register("KernelInfo", kernel_info);
    registry.register("Uptime", uptime);
    registry.register("LoadAvg", load_avg);
    registry.register("ShellEnvironment", shell_environment);
    registry.register("ModulesInfo", modules_info);
    registry.register("Virtualization", virtualization);
}

pub fn host_info(args: &ClassArgs, _config: &Config) -> InfoGroup {
    InfoGroup::new("HostInfo", "HostInfo", args)
        .command("Hostname", "hostname", &["-s"], Extractor::text())
        .identifying()
        .when(args.extended, |g| {
            g.command("Domainname", "hostname", &["-d"], Extractor::text())
                .identifying()
                .command("FQDN", "hostname", &["-f"], Extractor::text())
                .identifying()
        })
}

pub fn operating_system_info(args: &ClassArgs, config: &Config) -> InfoGroup {
    let os_release = &config.os_release;
    let key = |name: &str| Extractor::text().matching(&format!(r#"(?m)^{name}="?([^"\n]+)"?"#));
    InfoGroup::new("OperatingSystemInfo", "OperatingSystemInfo", args)
        .file("Type", os_release, key("ID"))
        .file("Name", os_release, key("NAME"))
        .file("Version", os_release, key("VERSION"))
        .when(args.extended, |g| {
            g.file("URL", os_release, key("HOME_URL"))
                .file("Codename", os_release, key("VERSION_CODENAME"))
        })
}

pub fn kernel_info(args: &ClassArgs, config: &Config) -> InfoGroup {
    InfoGroup::new("KernelInfo", "KernelInfo", args)
        .file("Version", config.proc("sys/kernel/osrelease"), Extractor::text())
        .file("CmdLine", config.proc("cmdline"), Extractor::text())
        .when(args.extended, |g| {
            g.file("Watchdog", config.proc("sys/kernel/watchdog"), Extractor::bool())
                .file(
                    "RandomizeVaSpace",
                    config.proc("sys/kernel/randomize_va_space"),
                    Extractor::int(),
                )
                .exact()
        })
}

pub fn uptime(args: &ClassArgs, config: &Config) -> InfoGroup {
    let path = config.proc("uptime");
    InfoGroup::new("Uptime", "Uptime", args)
        .file("Uptime", &path, Extractor::float().matching(r"^([\d.]+)"))
        .informational()
        .when(args.extended, |g| {
            g.file("CpusIdle", &path, Extractor::float().matching(r"^[\d.]+\s+([\d.]+)"))
                .informational()
        })
}

pub fn load_avg(args: &ClassArgs, config: &Config) -> InfoGroup {
    let path = config.proc("loadavg");
    InfoGroup::new("LoadAvg", "LoadAvg", args)
        .file("LoadAvg1m", &path, Extractor::float().matching(r"^([\d.]+)"))
        .file("LoadAvg5m", &path, Extractor::float().matching(r"^[\d.]+\s+([\d.]+)"))
        .file(
            "LoadAvg15m",
            &path,
            Extractor::float().matching(r"^[\d.]+\s+[\d.]+\s+([\d.]+)"),
        )
        .when(args.extended, |g| {
            g.file("RunningProcesses", &path, Extractor::int().matching(r"\s(\d+)/"))
                .file("AllProcesses", &path, Extractor::int().matching(r"/(\d+)"))
        })
}

/// Variables that identify the user or the login session.
const IDENTIFYING_VARS: [&str; 6] = ["USER", "LOGNAME", "HOME", "HOSTNAME", "MAIL", "SSH_"];

/// Variables that change between shells of the same setup.
const VOLATILE_VARS: [&str; 5] = ["PWD", "OLDPWD", "SHLVL", "_", "TERM_SESSION_ID"];

fn is_identifying_var(name: &str) -> bool {
    IDENTIFYING_VARS
        .iter()
        .any(|v| name == *v || (v.ends_with('_') && name.starts_with(v)))
}

fn environment_fields(args: &ClassArgs, ctx: &Context<'_>) -> Vec<Field> {
    ctx.reader
        .host()
        .vars()
        .into_iter()
        .map(|(name, value)| {
            let identifying = is_identifying_var(&name);
            let value = if identifying && args.anonymous {
                Value::str(ANONYMOUS)
            } else {
                Value::Str(value)
            };
            let field = Field::dynamic(&name, value);
            let field = if identifying { field.identifying() } else { field };
            if VOLATILE_VARS.contains(&name.as_str()) {
                field.informational()
            } else {
                field
            }
        })
        .collect()
}

pub fn shell_environment(args: &ClassArgs, _config: &Config) -> InfoGroup {
    InfoGroup::new("ShellEnvironment", "ShellEnvironment", args).dynamic(environment_fields)
}

fn colon_set(text: &str) -> Option<Value> {
    Some(Value::set(text.split(':').filter(|m| !m.is_empty())))
}

fn modules_enabled(_: &ClassArgs, ctx: &Context<'_>) -> Value {
    Value::Bool(ctx.reader.env("MODULESHOME").is_ok())
}

pub fn modules_info(args: &ClassArgs, config: &Config) -> InfoGroup {
    let modulecmd = config
        .modulecmd
        .as_ref()
        .map_or_else(|| "modulecmd".to_string(), |p| p.to_string_lossy().into_owned());
    InfoGroup::new("ModulesInfo", "ModulesInfo", args)
        .derived("Enabled", FieldKind::Bool, modules_enabled)
        .env(
            "Loaded",
            "LOADEDMODULES",
            Extractor::new(Conversion::Custom(FieldKind::Set, colon_set)),
        )
        .when(args.extended, |g| {
            g.command(
                "ModuleCmd",
                &modulecmd,
                &["--version"],
                Extractor::text().matching(r"(\d+\.\d+(?:\.\d+)?)"),
            )
        })
}

fn in_container(_: &ClassArgs, ctx: &Context<'_>) -> Value {
    Value::Bool(is_container(ctx.reader.host(), &ctx.config.proc_path))
}

pub fn virtualization(args: &ClassArgs, config: &Config) -> InfoGroup {
    InfoGroup::new("Virtualization", "Virtualization", args)
        .derived("InContainer", FieldKind::Bool, in_container)
        .file(
            "Hypervisor",
            config.proc("cpuinfo"),
            Extractor::new(Conversion::Custom(FieldKind::Bool, |text| {
                Some(Value::Bool(text.split_whitespace().any(|w| w == "hypervisor")))
            })),
        )
        .when(args.extended, |g| {
            g.file("HypervisorType", config.sys("hypervisor/type"), Extractor::text())
        })
}
