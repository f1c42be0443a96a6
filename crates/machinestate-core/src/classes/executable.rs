//! The benchmark executable itself and the shared libraries it loads.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

use super::EXECUTABLE_PARAM;
use crate::compose::{Context, Registry};
use crate::config::Config;
use crate::model::{ClassArgs, Field, FieldKind, InfoGroup, Value};

pub const EXEC_CLASS: &str = "ExecutableInfoExec";
pub const LIBRARIES_CLASS: &str = "ExecutableInfoLibraries";

pub(crate) fn register(registry: &mut Registry) {
    registry.register("ExecutableInfo", executable_info);
    registry.register(EXEC_CLASS, executable_info_exec);
    registry.register(LIBRARIES_CLASS, executable_info_libraries);
}

pub fn executable_info(args: &ClassArgs, config: &Config) -> InfoGroup {
    InfoGroup::new("ExecutableInfo", "ExecutableInfo", args)
        .child(executable_info_exec(args, config))
        .child(executable_info_libraries(args, config))
}

/// The executable as given, or found on `PATH` when given by bare name.
fn resolve(args: &ClassArgs, ctx: &Context<'_>) -> Option<PathBuf> {
    let exe = args.param(EXECUTABLE_PARAM)?;
    if exe.contains('/') {
        let path = Path::new(exe);
        ctx.reader.exists(path).then(|| path.to_path_buf())
    } else {
        ctx.reader.which(exe)
    }
}

fn abspath(args: &ClassArgs, ctx: &Context<'_>) -> Value {
    resolve(args, ctx).map_or(Value::Unavailable, |p| {
        Value::Str(p.to_string_lossy().into_owned())
    })
}

fn size(args: &ClassArgs, ctx: &Context<'_>) -> Value {
    resolve(args, ctx)
        .and_then(|p| ctx.reader.host().file_size(&p).ok())
        .and_then(|s| i64::try_from(s).ok())
        .map_or(Value::Unavailable, Value::Int)
}

fn sha256(args: &ClassArgs, ctx: &Context<'_>) -> Value {
    resolve(args, ctx)
        .and_then(|p| ctx.reader.host().read(&p).ok())
        .map_or(Value::Unavailable, |bytes| {
            Value::Str(hex::encode(Sha256::digest(&bytes)))
        })
}

pub fn executable_info_exec(args: &ClassArgs, _config: &Config) -> InfoGroup {
    let name = args.param(EXECUTABLE_PARAM).unwrap_or_default().to_string();
    InfoGroup::new(EXEC_CLASS, "Exec", args)
        .constant("Name", name)
        .derived("Abspath", FieldKind::Str, abspath)
        .derived("Size", FieldKind::Int, size)
        .exact()
        .when(args.extended, |g| g.derived("SHA256", FieldKind::Str, sha256))
}

static LDD_LINE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\s*(\S+)(?:\s+=>\s+(\S+))?").ok());

/// One field per `ldd` line: library name → resolved path.
fn library_fields(args: &ClassArgs, ctx: &Context<'_>) -> Vec<Field> {
    let (Some(re), Some(exe)) = (LDD_LINE.as_ref(), resolve(args, ctx)) else {
        return Vec::new();
    };
    let Ok(out) = ctx.reader.run("ldd", &[exe.to_string_lossy().into_owned()]) else {
        return Vec::new();
    };
    out.lines()
        // Skip notes like `statically linked`
        .filter(|line| line.contains("=>") || line.contains("(0x"))
        .filter_map(|line| re.captures(line))
        .map(|caps| {
            let lib = &caps[1];
            // `=> not found`, or a bare name like the vDSO
            let path = match caps.get(2).map(|m| m.as_str()) {
                Some("not") => Value::Unavailable,
                Some(path) => Value::str(path),
                None if ctx.reader.exists(Path::new(lib)) => Value::str(lib),
                None => Value::Unavailable,
            };
            Field::dynamic(lib, path)
        })
        .collect()
}

pub fn executable_info_libraries(args: &ClassArgs, _config: &Config) -> InfoGroup {
    InfoGroup::new(LIBRARIES_CLASS, "Libraries", args).dynamic(library_fields)
}
