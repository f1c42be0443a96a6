//! Firmware identification and accelerators.

use std::path::PathBuf;

use super::DMIFILE_PARAM;
use crate::compose::{Expander, Registry};
use crate::config::Config;
use crate::extract::{Conversion, Extractor};
use crate::model::{ClassArgs, FieldKind, InfoGroup, Value};

pub const NVIDIA_GPU_CLASS: &str = "NvidiaGpu";

pub(crate) fn register(registry: &mut Registry) {
    registry.register("BiosInfo", bios_info);
    registry.register("DmiDecodeFile", dmidecode_file);
    registry.register("NvidiaInfo", nvidia_info);
    registry.register(NVIDIA_GPU_CLASS, nvidia_gpu);
}

pub fn bios_info(args: &ClassArgs, config: &Config) -> InfoGroup {
    let dir = config.sys("class/dmi/id");
    InfoGroup::new("BiosInfo", "BiosInfo", args)
        .file("BiosVendor", dir.join("bios_vendor"), Extractor::text())
        .file("BiosVersion", dir.join("bios_version"), Extractor::text())
        .file("BiosDate", dir.join("bios_date"), Extractor::text())
        .file("SystemVendor", dir.join("sys_vendor"), Extractor::text())
        .file("ProductName", dir.join("product_name"), Extractor::text())
        .file("BoardVendor", dir.join("board_vendor"), Extractor::text())
        .when(args.extended, |g| {
            g.file("ProductSerial", dir.join("product_serial"), Extractor::text())
                .identifying()
                .file("ProductUuid", dir.join("product_uuid"), Extractor::text())
                .identifying()
        })
}

/// Content of a stored `dmidecode` dump.
pub fn dmidecode_file(args: &ClassArgs, config: &Config) -> InfoGroup {
    let group = InfoGroup::new("DmiDecodeFile", "DmiDecodeFile", args);
    let path = args
        .param(DMIFILE_PARAM)
        .map(PathBuf::from)
        .or_else(|| config.dmifile.clone());
    match path {
        Some(path) => group.file("DmiDecode", path, Extractor::text()),
        None => group.constant("DmiDecode", Value::Unavailable),
    }
}

pub fn nvidia_info(args: &ClassArgs, config: &Config) -> InfoGroup {
    InfoGroup::new("NvidiaInfo", "NvidiaInfo", args).expander(Expander::command_match(
        &config.nvidia_smi,
        &["-L"],
        r"^GPU (\d+):",
        NVIDIA_GPU_CLASS,
    ))
}

/// `nvidia-smi` reports memory in MiB.
fn mib_to_bytes(text: &str) -> Option<Value> {
    let mib = text.trim().parse::<i64>().ok()?;
    mib.checked_mul(1024 * 1024).map(Value::Int)
}

pub fn nvidia_gpu(args: &ClassArgs, config: &Config) -> InfoGroup {
    let gpu = args.ident();
    let smi = config.nvidia_smi.as_str();
    let query = |group: InfoGroup, name: &str, property: &str, format: &str, extractor: Extractor| {
        let property = format!("--query-gpu={property}");
        group.command(name, smi, &["-i", gpu, property.as_str(), format], extractor)
    };
    let units = "--format=csv,noheader";
    let no_units = "--format=csv,noheader,nounits";

    let group = InfoGroup::new(NVIDIA_GPU_CLASS, format!("Gpu{gpu}"), args);
    let group = query(group, "Name", "name", units, Extractor::text());
    let group = query(group, "DriverVersion", "driver_version", units, Extractor::text());
    let group = query(
        group,
        "MemoryTotal",
        "memory.total",
        no_units,
        Extractor::new(Conversion::Custom(FieldKind::Int, mib_to_bytes)),
    );
    let group = query(group, "ClocksSM", "clocks.max.sm", units, Extractor::hertz());
    let group = query(group, "ClocksMem", "clocks.max.mem", units, Extractor::hertz());
    if args.extended {
        query(group, "Serial", "serial", units, Extractor::text()).identifying()
    } else {
        group
    }
}
