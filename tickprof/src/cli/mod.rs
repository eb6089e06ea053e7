//! Offline trace inspection commands
//!
//! Each command writes to the given sink so it can be exercised without a
//! terminal.

pub mod args;

pub use args::{Args, Command};

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use crate::analysis::HotspotReport;
use crate::trace::TraceFile;

/// Run one parsed command.
///
/// # Errors
/// Returns an error if the trace cannot be read or parsed, or output fails.
pub fn run_command(command: &Command, out: &mut impl Write) -> Result<()> {
    match command {
        Command::Inspect { trace, top, json } => inspect(trace, *top, *json, out),
        Command::Samples { trace } => samples(trace, out),
        Command::Maps { trace } => maps(trace, out),
    }
}

fn load(path: &Path) -> Result<TraceFile> {
    TraceFile::open(path).with_context(|| format!("Failed to load trace {}", path.display()))
}

fn inspect(path: &Path, top: usize, json: bool, out: &mut impl Write) -> Result<()> {
    let trace = load(path)?;
    let report = HotspotReport::build(&trace, top);

    if json {
        serde_json::to_writer_pretty(&mut *out, &report).context("Failed to write JSON report")?;
        writeln!(out)?;
        return Ok(());
    }

    writeln!(out, "trace: {}", path.display())?;
    writeln!(out, "pointer size: {} ({:?} endian)", trace.pointer_size, trace.byte_order)?;
    writeln!(out, "samples: {}", report.total_samples)?;
    writeln!(out, "unique addresses: {}", report.unique_addresses)?;
    writeln!(out, "unmapped samples: {}", report.unmapped_samples)?;
    writeln!(out, "maps snapshot: {} bytes", trace.maps.len())?;

    if report.hotspots.is_empty() {
        return Ok(());
    }

    writeln!(out)?;
    writeln!(out, "HOTSPOTS")?;
    writeln!(out, "{:>18}  {:>8}  {:>6}  {:>10}  MODULE", "ADDRESS", "SAMPLES", "%", "OFFSET")?;
    for hotspot in &report.hotspots {
        let offset = hotspot.file_offset.map_or_else(|| "-".to_string(), |o| format!("0x{o:x}"));
        writeln!(
            out,
            "{:>18}  {:>8}  {:>5.1}%  {:>10}  {}",
            hotspot.address.to_string(),
            hotspot.count,
            hotspot.percentage,
            offset,
            hotspot.module.as_deref().unwrap_or("?")
        )?;
    }

    writeln!(out)?;
    writeln!(out, "MODULES")?;
    for module in &report.modules {
        writeln!(out, "{:>8}  {:>5.1}%  {}", module.count, module.percentage, module.module)?;
    }
    Ok(())
}

fn samples(path: &Path, out: &mut impl Write) -> Result<()> {
    let trace = load(path)?;
    for addr in &trace.samples {
        writeln!(out, "{addr}")?;
    }
    Ok(())
}

fn maps(path: &Path, out: &mut impl Write) -> Result<()> {
    let trace = load(path)?;
    out.write_all(trace.maps.as_bytes())?;
    Ok(())
}
