//! Compilers, interpreters and MPI launchers found on `PATH`.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::compose::{Context, Expander, Registry};
use crate::config::Config;
use crate::extract::{Conversion, Extractor, units};
use crate::model::{ClassArgs, FieldKind, InfoGroup, Value};

pub const COMPILER_CLASS: &str = "CompilerInfoClass";
pub const MPI_CLASS: &str = "MpiInfoClass";

const C_COMPILERS: [&str; 6] = ["gcc", "icc", "clang", "pgcc", "xlc", "armclang"];
const CXX_COMPILERS: [&str; 6] = ["g++", "icpc", "clang++", "pg++", "xlc++", "armclang++"];
const FORTRAN_COMPILERS: [&str; 5] = ["gfortran", "ifort", "flang", "pgf90", "armflang"];
const PYTHONS: [&str; 2] = ["python2", "python3"];
const MPI_LAUNCHERS: [&str; 4] = ["mpiexec", "mpiexec.hydra", "mpirun", "srun"];

const VERSION_PATTERN: &str = r"(\d+\.\d+\.\d+)";

pub(crate) fn register(registry: &mut Registry) {
    registry.register("CompilerInfo_C", compiler_info_c);
    registry.register("CompilerInfo_C++", compiler_info_cxx);
    registry.register("CompilerInfo_Fortran", compiler_info_fortran);
    registry.register(COMPILER_CLASS, compiler_info_class);
    registry.register("PythonInfo", python_info);
    registry.register("MpiInfo", mpi_info);
    registry.register(MPI_CLASS, mpi_info_class);
}

pub fn compiler_info_c(args: &ClassArgs, _config: &Config) -> InfoGroup {
    InfoGroup::new("CompilerInfo_C", "CompilerInfo_C", args)
        .expander(Expander::executables(&C_COMPILERS, Some("CC"), COMPILER_CLASS))
}

pub fn compiler_info_cxx(args: &ClassArgs, _config: &Config) -> InfoGroup {
    InfoGroup::new("CompilerInfo_C++", "CompilerInfo_C++", args)
        .expander(Expander::executables(&CXX_COMPILERS, Some("CXX"), COMPILER_CLASS))
}

pub fn compiler_info_fortran(args: &ClassArgs, _config: &Config) -> InfoGroup {
    InfoGroup::new("CompilerInfo_Fortran", "CompilerInfo_Fortran", args)
        .expander(Expander::executables(&FORTRAN_COMPILERS, Some("FC"), COMPILER_CLASS))
}

pub fn python_info(args: &ClassArgs, _config: &Config) -> InfoGroup {
    InfoGroup::new("PythonInfo", "PythonInfo", args)
        .expander(Expander::executables(&PYTHONS, None, COMPILER_CLASS))
}

/// `gcc` → `Gcc`; programs given by path are named after the file.
fn program_name(exe: &str) -> String {
    let base = Path::new(exe)
        .file_name()
        .map_or_else(|| exe.to_string(), |n| n.to_string_lossy().into_owned());
    units::to_title(&base)
}

/// Where the program behind the class ident lives.
fn program_path(args: &ClassArgs, ctx: &Context<'_>) -> Value {
    ctx.reader
        .which(args.ident())
        .map_or(Value::Unavailable, |p| Value::Str(p.to_string_lossy().into_owned()))
}

pub fn compiler_info_class(args: &ClassArgs, _config: &Config) -> InfoGroup {
    let exe = args.ident();
    InfoGroup::new(COMPILER_CLASS, program_name(exe), args)
        .command("Version", exe, &["--version"], Extractor::text().matching(VERSION_PATTERN))
        .when(args.extended, |g| {
            g.derived("Path", FieldKind::Str, program_path).informational()
        })
}

pub fn mpi_info(args: &ClassArgs, _config: &Config) -> InfoGroup {
    InfoGroup::new("MpiInfo", "MpiInfo", args)
        .expander(Expander::executables(&MPI_LAUNCHERS, None, MPI_CLASS))
}

static DOTTED_VERSION: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(VERSION_PATTERN).ok());
static INTEL_VERSION: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"Version (\d+) Update (\d+)").ok());

/// `x.y.z` anywhere, or Intel's `Version X Update Y` as `X.Y`.
fn mpi_version(text: &str) -> Option<Value> {
    let dotted = DOTTED_VERSION.as_ref()?;
    let intel = INTEL_VERSION.as_ref()?;
    text.lines().find_map(|line| {
        if let Some(caps) = dotted.captures(line) {
            return Some(Value::str(&caps[1]));
        }
        intel
            .captures(line)
            .map(|caps| Value::Str(format!("{}.{}", &caps[1], &caps[2])))
    })
}

/// The MPI implementation behind a launcher's version banner.
fn mpi_implementor(text: &str) -> Option<Value> {
    let vendor = if text.contains("Open MPI") || text.contains("OpenRTE") {
        "OpenMPI"
    } else if text.contains("Intel") && text.contains("MPI") {
        "IntelMPI"
    } else if text.contains("slurm") {
        "Slurm"
    } else if text.contains("HYDRA") || text.contains("MPICH") {
        "MPICH"
    } else {
        "Unknown"
    };
    Some(Value::str(vendor))
}

pub fn mpi_info_class(args: &ClassArgs, _config: &Config) -> InfoGroup {
    let exe = args.ident();
    InfoGroup::new(MPI_CLASS, program_name(exe), args)
        .command(
            "Version",
            exe,
            &["--version"],
            Extractor::new(Conversion::Custom(FieldKind::Str, mpi_version)),
        )
        .command(
            "Implementor",
            exe,
            &["--version"],
            Extractor::new(Conversion::Custom(FieldKind::Str, mpi_implementor)),
        )
        .when(args.extended, |g| {
            g.derived("Path", FieldKind::Str, program_path).informational()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockHost;

    fn populate(host: &MockHost, mut group: InfoGroup) -> InfoGroup {
        let config = Config::default();
        let registry = Registry::builtin();
        group.populate(&Context::new(host, &registry, &config));
        group
    }

    #[test]
    fn test_compilers_found_on_path() {
        let host = MockHost::typical_machine();
        let group = populate(&host, compiler_info_c(&ClassArgs::new(true, false), &Config::default()));
        let names: Vec<_> = group.children().iter().map(InfoGroup::name).collect();
        assert_eq!(names, ["Gcc"]);
        let gcc = group.get_child("Gcc").unwrap();
        assert_eq!(gcc.value("Version"), Some(&Value::str("11.4.0")));
        assert_eq!(gcc.value("Path"), Some(&Value::str("/usr/bin/gcc")));

        let group = populate(&host, compiler_info_cxx(&ClassArgs::default(), &Config::default()));
        assert_eq!(group.get_child("G++").unwrap().value("Version"), Some(&Value::str("11.4.0")));
    }

    #[test]
    fn test_compiler_env_override() {
        let mut host = MockHost::new();
        host.add_command("/opt/cray/bin/cc", &["--version"], "Cray clang version 15.0.1\n");
        host.set_env("CC", "/opt/cray/bin/cc");
        let group = populate(&host, compiler_info_c(&ClassArgs::default(), &Config::default()));
        assert_eq!(group.children().len(), 1);
        let cc = group.get_child("Cc").unwrap();
        assert_eq!(cc.value("Version"), Some(&Value::str("15.0.1")));
    }

    #[test]
    fn test_failing_version_is_unavailable() {
        let mut host = MockHost::new();
        host.add_failing_command("gfortran", &["--version"], 1, "gfortran: fatal error\n");
        let group = populate(&host, compiler_info_fortran(&ClassArgs::default(), &Config::default()));
        let gfortran = group.get_child("Gfortran").unwrap();
        assert_eq!(gfortran.value("Version"), Some(&Value::Unavailable));
    }

    #[test]
    fn test_python() {
        let host = MockHost::typical_machine();
        let group = populate(&host, python_info(&ClassArgs::default(), &Config::default()));
        assert_eq!(
            group.get_child("Python3").unwrap().value("Version"),
            Some(&Value::str("3.10.12"))
        );
        assert!(group.get_child("Python2").is_none());
    }

    #[test]
    fn test_mpi_banners() {
        assert_eq!(
            mpi_version("mpirun (Open MPI) 4.1.2\n\nReport bugs to http://www.open-mpi.org/"),
            Some(Value::str("4.1.2"))
        );
        assert_eq!(
            mpi_version("Intel(R) MPI Library for Linux* OS, Version 2019 Update 9 Build 20200923"),
            Some(Value::str("2019.9"))
        );
        assert_eq!(mpi_version("no version here"), None);
        assert_eq!(mpi_implementor("mpirun (Open MPI) 4.1.2"), Some(Value::str("OpenMPI")));
        assert_eq!(mpi_implementor("Intel(R) MPI Library"), Some(Value::str("IntelMPI")));
        assert_eq!(mpi_implementor("slurm 22.05.8"), Some(Value::str("Slurm")));
        assert_eq!(mpi_implementor("something else"), Some(Value::str("Unknown")));
    }

    #[test]
    fn test_mpi_info() {
        let host = MockHost::typical_machine();
        let group = populate(&host, mpi_info(&ClassArgs::default(), &Config::default()));
        let mpirun = group.get_child("Mpirun").unwrap();
        assert_eq!(mpirun.value("Version"), Some(&Value::str("4.1.2")));
        assert_eq!(mpirun.value("Implementor"), Some(&Value::str("OpenMPI")));
        assert_eq!(host.call_count("run mpirun --version"), 1);
    }
}
