//! Building class trees: the registry of class constructors and the
//! expander rules that decide how many instances of a repeated class exist.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;

use regex::Regex;
use tracing::{debug, warn};

use crate::collector::Host;
use crate::config::Config;
use crate::model::{ClassArgs, InfoGroup};
use crate::source::{SourceReader, Unavailable};

/// Constructs an unpopulated class from its arguments.
pub type ClassCtor = fn(&ClassArgs, &Config) -> InfoGroup;

/// Everything populate needs: a reader, the registry and the configuration.
#[derive(Debug, Clone, Copy)]
pub struct Context<'a> {
    pub reader: SourceReader<'a>,
    pub registry: &'a Registry,
    pub config: &'a Config,
}

impl<'a> Context<'a> {
    pub fn new(host: &'a dyn Host, registry: &'a Registry, config: &'a Config) -> Self {
        Self {
            reader: SourceReader::new(host, config.command_timeout()),
            registry,
            config,
        }
    }

    /// Constructs a registered class.
    pub fn construct(&self, class: &str, args: &ClassArgs) -> Option<InfoGroup> {
        self.registry.construct(class, args, self.config)
    }
}

/// Explicit mapping from class identifier to constructor.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    ctors: HashMap<&'static str, ClassCtor>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in information class.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        crate::classes::register_all(&mut registry);
        registry
    }

    pub fn register(&mut self, class: &'static str, ctor: ClassCtor) {
        self.ctors.insert(class, ctor);
    }

    pub fn contains(&self, class: &str) -> bool {
        self.ctors.contains_key(class)
    }

    pub fn construct(&self, class: &str, args: &ClassArgs, config: &Config) -> Option<InfoGroup> {
        self.ctors.get(class).map(|ctor| ctor(args, config))
    }

    /// Registered identifiers, sorted.
    pub fn classes(&self) -> Vec<&'static str> {
        let mut ids: Vec<_> = self.ctors.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

/// Rule creating repeated children at populate time.
#[derive(Debug, Clone)]
pub enum Expander {
    /// One child per directory entry matching `pattern`; capture group 1 is
    /// the ident. With a `fallback`, an unreadable or empty directory still
    /// yields a single child. `params` are added to every child's arguments.
    PathMatch {
        dir: PathBuf,
        pattern: String,
        child: &'static str,
        params: BTreeMap<String, String>,
        fallback: Option<String>,
    },
    /// One child per candidate program found on `PATH`. `env_override`
    /// names a variable that adds its value as a candidate. Candidates
    /// resolving to the same file yield one child.
    Executables {
        candidates: Vec<String>,
        env_override: Option<&'static str>,
        child: &'static str,
    },
    /// One child per line of a command's output matching `pattern`.
    CommandMatch {
        program: String,
        args: Vec<String>,
        pattern: String,
        child: &'static str,
    },
}

impl Expander {
    pub fn path_match(dir: impl Into<PathBuf>, pattern: &str, child: &'static str) -> Self {
        Expander::PathMatch {
            dir: dir.into(),
            pattern: pattern.to_string(),
            child,
            params: BTreeMap::new(),
            fallback: None,
        }
    }

    /// Passes an extra parameter to every child of a path match.
    pub fn with_param(mut self, key: &str, value: impl Into<String>) -> Self {
        if let Expander::PathMatch { params, .. } = &mut self {
            params.insert(key.to_string(), value.into());
        }
        self
    }

    /// Sets the ident used when the directory cannot be listed.
    pub fn or_single(mut self, ident: &str) -> Self {
        if let Expander::PathMatch { fallback, .. } = &mut self {
            *fallback = Some(ident.to_string());
        }
        self
    }

    pub fn executables(candidates: &[&str], env_override: Option<&'static str>, child: &'static str) -> Self {
        Expander::Executables {
            candidates: candidates.iter().map(|c| c.to_string()).collect(),
            env_override,
            child,
        }
    }

    pub fn command_match(program: &str, args: &[&str], pattern: &str, child: &'static str) -> Self {
        Expander::CommandMatch {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            pattern: pattern.to_string(),
            child,
        }
    }

    fn child_class(&self) -> &'static str {
        match self {
            Expander::PathMatch { child, .. }
            | Expander::Executables { child, .. }
            | Expander::CommandMatch { child, .. } => child,
        }
    }

    /// Builds the (unpopulated, but recursively expanded) children.
    pub fn expand(&self, args: &ClassArgs, ctx: &Context<'_>) -> Vec<InfoGroup> {
        let idents = self.discover(ctx);
        let class = self.child_class();
        debug!(class, count = idents.len(), "expanded");
        let mut base = args.clone();
        if let Expander::PathMatch { params, .. } = self {
            base.params
                .extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        let mut children: Vec<InfoGroup> = idents
            .into_iter()
            .filter_map(|ident| {
                let child = ctx.construct(class, &base.child(ident));
                if child.is_none() {
                    warn!(class, "expander child class is not registered");
                }
                child
            })
            .map(|mut child| {
                child.expand(ctx);
                child
            })
            .collect();
        make_names_unique(&mut children);
        children
    }

    /// Idents of the children to create.
    pub fn discover(&self, ctx: &Context<'_>) -> Vec<String> {
        match self {
            Expander::PathMatch {
                dir,
                pattern,
                fallback,
                ..
            } => {
                let found = ctx.reader.list_dir(dir).and_then(|names| {
                    let re = compile(pattern)?;
                    Ok(sort_idents(
                        names
                            .iter()
                            .filter_map(|name| capture(&re, name))
                            .collect(),
                    ))
                });
                match (found, fallback) {
                    (Ok(idents), Some(fallback)) if idents.is_empty() => vec![fallback.clone()],
                    (Ok(idents), _) => idents,
                    (Err(e), Some(fallback)) => {
                        debug!(dir = %dir.display(), reason = %e.reason, "falling back to single instance");
                        vec![fallback.clone()]
                    }
                    (Err(_), None) => Vec::new(),
                }
            }
            Expander::Executables {
                candidates,
                env_override,
                ..
            } => {
                let mut names = candidates.clone();
                if let Some(var) = env_override
                    && let Ok(program) = ctx.reader.env(var)
                    && !program.is_empty()
                {
                    names.push(program);
                }
                let mut resolved = HashSet::new();
                names
                    .into_iter()
                    .filter(|name| {
                        ctx.reader
                            .which(name)
                            .is_some_and(|path| resolved.insert(path))
                    })
                    .collect()
            }
            Expander::CommandMatch {
                program,
                args,
                pattern,
                ..
            } => ctx
                .reader
                .run(program, args)
                .and_then(|output| {
                    let re = compile(pattern)?;
                    Ok(output
                        .lines()
                        .filter_map(|line| capture(&re, line.trim()))
                        .collect())
                })
                .unwrap_or_default(),
        }
    }
}

/// Siblings are addressed by name, so a repeated name gets a `_2`, `_3`...
/// suffix in discovery order.
fn make_names_unique(children: &mut [InfoGroup]) {
    let mut taken = HashSet::new();
    for child in children {
        if taken.insert(child.name().to_string()) {
            continue;
        }
        let name = (2..)
            .map(|n| format!("{}_{n}", child.name()))
            .find(|candidate| !taken.contains(candidate))
            .unwrap_or_default();
        debug!(name = %name, "renamed duplicate sibling");
        child.set_name(name.clone());
        taken.insert(name);
    }
}

fn compile(pattern: &str) -> Result<Regex, Unavailable> {
    Regex::new(pattern).map_err(|e| {
        warn!(pattern, error = %e, "invalid expander pattern");
        Unavailable::new(format!("pattern {pattern}"), e.to_string())
    })
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    let caps = re.captures(text)?;
    caps.get(1)
        .or_else(|| caps.get(0))
        .map(|m| m.as_str().to_string())
}

/// Numeric order when every ident is a number, lexicographic otherwise.
fn sort_idents(mut idents: Vec<String>) -> Vec<String> {
    if idents.iter().all(|i| i.parse::<u64>().is_ok()) {
        idents.sort_by_key(|i| i.parse::<u64>().unwrap_or(u64::MAX));
    } else {
        idents.sort();
    }
    idents
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockHost;
    use crate::extract::Extractor;

    fn cpu_class(args: &ClassArgs, _: &Config) -> InfoGroup {
        InfoGroup::new("Cpu", format!("Cpu{}", args.ident()), args).file(
            "Online",
            format!("/sys/devices/system/cpu/cpu{}/online", args.ident()),
            Extractor::bool(),
        )
    }

    fn cpus(args: &ClassArgs, _: &Config) -> InfoGroup {
        InfoGroup::new("Cpus", "Cpus", args).expander(
            Expander::path_match("/sys/devices/system/cpu", r"^cpu(\d+)$", "Cpu").or_single("0"),
        )
    }

    fn gpu(args: &ClassArgs, _: &Config) -> InfoGroup {
        InfoGroup::new("Gpu", format!("Gpu{}", args.ident()), args)
    }

    fn compiler(args: &ClassArgs, _: &Config) -> InfoGroup {
        InfoGroup::new("Compiler", args.ident().to_string(), args)
    }

    fn registry() -> Registry {
        let mut r = Registry::new();
        r.register("Cpu", cpu_class);
        r.register("Cpus", cpus);
        r.register("Gpu", gpu);
        r.register("Compiler", compiler);
        r
    }

    fn names(groups: &[InfoGroup]) -> Vec<&str> {
        groups.iter().map(InfoGroup::name).collect()
    }

    #[test]
    fn test_path_match_sorts_numerically() {
        let mut host = MockHost::new();
        for i in [0, 1, 2, 10] {
            host.add_file(format!("/sys/devices/system/cpu/cpu{i}/online"), "1");
        }
        host.add_file("/sys/devices/system/cpu/cpufreq/boost", "1");
        let config = Config::default();
        let registry = registry();
        let ctx = Context::new(&host, &registry, &config);

        let mut group = cpus(&ClassArgs::default(), &config);
        group.populate(&ctx);
        assert_eq!(names(group.children()), vec!["Cpu0", "Cpu1", "Cpu2", "Cpu10"]);
        assert_eq!(group.children()[3].args().ident(), "10");
    }

    #[test]
    fn test_path_match_falls_back_to_single_instance() {
        let host = MockHost::new();
        let config = Config::default();
        let registry = registry();
        let ctx = Context::new(&host, &registry, &config);

        let mut group = cpus(&ClassArgs::default(), &config);
        group.populate(&ctx);
        assert_eq!(names(group.children()), vec!["Cpu0"]);
    }

    #[test]
    fn test_repopulate_replaces_children() {
        let mut host = MockHost::new();
        host.add_file("/sys/devices/system/cpu/cpu0/online", "1");
        host.add_file("/sys/devices/system/cpu/cpu1/online", "1");
        let config = Config::default();
        let registry = registry();

        let mut group = cpus(&ClassArgs::default(), &config);
        group.populate(&Context::new(&host, &registry, &config));
        assert_eq!(group.children().len(), 2);

        host.remove("/sys/devices/system/cpu/cpu1");
        group.populate(&Context::new(&host, &registry, &config));
        assert_eq!(names(group.children()), vec!["Cpu0"]);
    }

    #[test]
    fn test_executables_with_env_override() {
        let mut host = MockHost::new();
        host.add_program("gcc");
        host.add_program("clang");
        host.set_env("CC", "clang");
        let config = Config::default();
        let registry = registry();
        let ctx = Context::new(&host, &registry, &config);

        let expander = Expander::executables(&["gcc", "icc"], Some("CC"), "Compiler");
        assert_eq!(expander.discover(&ctx), vec!["gcc", "clang"]);
    }

    #[test]
    fn test_executables_same_file_once() {
        let mut host = MockHost::new();
        host.add_program("gcc");
        host.set_env("CC", "/usr/bin/gcc");
        let config = Config::default();
        let registry = registry();
        let ctx = Context::new(&host, &registry, &config);

        let expander = Expander::executables(&["gcc", "icc"], Some("CC"), "Compiler");
        assert_eq!(expander.discover(&ctx), vec!["gcc"]);
    }

    #[test]
    fn test_sibling_names_unique() {
        fn named(args: &ClassArgs, _: &Config) -> InfoGroup {
            let base = args.ident().rsplit('/').next().unwrap_or_default().to_string();
            InfoGroup::new("Compiler", base, args)
        }
        let mut host = MockHost::new();
        host.add_program("gcc");
        host.add_program("/opt/gcc-13/bin/gcc");
        host.add_program("/opt/gcc-14/bin/gcc");
        host.set_env("CC", "/opt/gcc-13/bin/gcc");
        let config = Config::default();
        let mut registry = Registry::new();
        registry.register("Compiler", named);
        let ctx = Context::new(&host, &registry, &config);

        let expander = Expander::executables(&["gcc", "/opt/gcc-14/bin/gcc"], Some("CC"), "Compiler");
        let children = expander.expand(&ClassArgs::default(), &ctx);
        assert_eq!(names(&children), vec!["gcc", "gcc_2", "gcc_3"]);
        assert_eq!(children[2].args().ident(), "/opt/gcc-13/bin/gcc");
    }

    #[test]
    fn test_command_match() {
        let mut host = MockHost::new();
        host.add_command(
            "nvidia-smi",
            &["-L"],
            "GPU 0: Tesla V100 (UUID: GPU-1)\nGPU 1: Tesla V100 (UUID: GPU-2)\n",
        );
        let config = Config::default();
        let registry = registry();
        let ctx = Context::new(&host, &registry, &config);

        let expander = Expander::command_match("nvidia-smi", &["-L"], r"^GPU (\d+):", "Gpu");
        let children = expander.expand(&ClassArgs::default(), &ctx);
        assert_eq!(names(&children), vec!["Gpu0", "Gpu1"]);

        let missing = MockHost::new();
        let ctx = Context::new(&missing, &registry, &config);
        assert!(expander.discover(&ctx).is_empty());
    }

    #[test]
    fn test_unknown_child_class_is_skipped() {
        let mut host = MockHost::new();
        host.add_program("gcc");
        let config = Config::default();
        let registry = Registry::new();
        let ctx = Context::new(&host, &registry, &config);

        let expander = Expander::executables(&["gcc"], None, "Compiler");
        assert!(expander.expand(&ClassArgs::default(), &ctx).is_empty());
    }

    #[test]
    fn test_registry() {
        let r = registry();
        assert!(r.contains("Cpu"));
        assert!(!r.contains("Nope"));
        assert_eq!(r.classes(), vec!["Compiler", "Cpu", "Cpus", "Gpu"]);
        let cpu = r
            .construct("Cpu", &ClassArgs::default().with_ident("4"), &Config::default())
            .unwrap();
        assert_eq!(cpu.name(), "Cpu4");
    }
}
