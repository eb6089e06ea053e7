//! Hotspot analysis for recorded traces.
//!
//! Aggregates the flat list of sampled program counters into the addresses
//! hit most often and attributes each to the mapping it fell in, using the
//! memory map snapshot stored in the same trace.
//!
//! ## Data Flow
//!
//! ```text
//! TraceFile.samples ──► count per address ──► sort (count desc, address asc) ──► top N
//!        │
//! TraceFile.maps ──► MapEntry list (sorted) ──► module + file offset per address
//!                                          └──► per-module totals, unmapped count
//! ```
//!
//! File offsets are what an offline symbolizer needs for position-independent
//! binaries: `addr - mapping.start + mapping.offset`.

// Percentage calculations intentionally convert usize to f64
#![allow(clippy::cast_precision_loss)]

use std::collections::HashMap;

use serde::Serialize;

use crate::domain::Address;
use crate::maps::MapEntry;
use crate::trace::TraceFile;

/// Module name used for mappings without a pathname.
pub const ANONYMOUS_MODULE: &str = "[anonymous]";

/// One sampled address and how often it was hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddressHotspot {
    pub address: Address,
    pub count: usize,
    /// Percentage of all samples (0.0 - 100.0).
    pub percentage: f64,
    /// Pathname of the containing mapping, `None` when unmapped.
    pub module: Option<String>,
    /// Offset within the mapped file, `None` when unmapped.
    pub file_offset: Option<u64>,
}

/// Samples attributed to one module.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleSummary {
    pub module: String,
    pub count: usize,
    pub percentage: f64,
}

/// Summary of one trace.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HotspotReport {
    pub pointer_size: u32,
    pub total_samples: usize,
    pub unique_addresses: usize,
    /// Samples outside every mapping in the snapshot.
    pub unmapped_samples: usize,
    /// Most frequent addresses, at most `top` of them.
    pub hotspots: Vec<AddressHotspot>,
    /// Every module that received samples, most sampled first.
    pub modules: Vec<ModuleSummary>,
}

impl HotspotReport {
    /// Build the report, keeping the `top` most frequent addresses.
    #[must_use]
    pub fn build(trace: &TraceFile, top: usize) -> Self {
        let mut entries = trace.maps.entries();
        entries.sort_by_key(|entry| entry.range.start);

        let mut counts: HashMap<Address, usize> = HashMap::new();
        for &addr in &trace.samples {
            *counts.entry(addr).or_insert(0) += 1;
        }

        let total = trace.samples.len();
        let mut by_address: Vec<(Address, usize)> = counts.into_iter().collect();
        by_address.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let mut module_counts: HashMap<String, usize> = HashMap::new();
        let mut unmapped_samples = 0;
        for &(addr, count) in &by_address {
            match find_mapping(&entries, addr.0) {
                Some(entry) => *module_counts.entry(module_name(entry)).or_insert(0) += count,
                None => unmapped_samples += count,
            }
        }

        let hotspots = by_address
            .iter()
            .take(top)
            .map(|&(address, count)| {
                let mapping = find_mapping(&entries, address.0);
                AddressHotspot {
                    address,
                    count,
                    percentage: percent(count, total),
                    module: mapping.map(module_name),
                    file_offset: mapping.and_then(|entry| entry.file_offset(address.0)),
                }
            })
            .collect();

        let mut modules: Vec<ModuleSummary> = module_counts
            .into_iter()
            .map(|(module, count)| ModuleSummary { module, count, percentage: percent(count, total) })
            .collect();
        modules.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.module.cmp(&b.module)));

        Self {
            pointer_size: trace.pointer_size,
            total_samples: total,
            unique_addresses: by_address.len(),
            unmapped_samples,
            hotspots,
            modules,
        }
    }
}

/// Binary search over mappings sorted by start address.
fn find_mapping(entries: &[MapEntry], addr: u64) -> Option<&MapEntry> {
    let idx = entries.partition_point(|entry| entry.range.start <= addr);
    let candidate = entries.get(idx.checked_sub(1)?)?;
    candidate.range.contains(addr).then_some(candidate)
}

fn module_name(entry: &MapEntry) -> String {
    entry.pathname.clone().unwrap_or_else(|| ANONYMOUS_MODULE.to_string())
}

fn percent(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maps::MapsSnapshot;
    use tickprof_common::ByteOrder;

    const MAPS: &str = "\
00400000-00401000 r--p 00000000 fd:01 10   /opt/app
00401000-00402000 r-xp 00001000 fd:01 10   /opt/app
7f0000000000-7f0000010000 r-xp 00000000 fd:01 20   /lib/libc.so.6
7f0000100000-7f0000101000 rw-p 00000000 00:00 0
";

    fn trace(samples: &[u64]) -> TraceFile {
        TraceFile {
            pointer_size: 8,
            byte_order: ByteOrder::Little,
            samples: samples.iter().copied().map(Address).collect(),
            trailer_length: 0,
            maps: MapsSnapshot::from_bytes(MAPS.as_bytes().to_vec()),
        }
    }

    #[test]
    fn test_ranking_and_ties() {
        let report = HotspotReport::build(
            &trace(&[0x401010, 0x401020, 0x401010, 0x401020, 0x401010, 0x7f00_0000_0100]),
            10,
        );
        assert_eq!(report.total_samples, 6);
        assert_eq!(report.unique_addresses, 3);

        let ranked: Vec<_> = report.hotspots.iter().map(|h| (h.address.0, h.count)).collect();
        assert_eq!(ranked, vec![(0x401010, 3), (0x401020, 2), (0x7f00_0000_0100, 1)]);
        assert!((report.hotspots[0].percentage - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_attribution_and_file_offset() {
        let report = HotspotReport::build(&trace(&[0x401010, 0x7f00_0010_0008, 0x10]), 10);
        let app = report.hotspots.iter().find(|h| h.address.0 == 0x401010).unwrap();
        assert_eq!(app.module.as_deref(), Some("/opt/app"));
        assert_eq!(app.file_offset, Some(0x1010));

        let anon = report.hotspots.iter().find(|h| h.address.0 == 0x7f00_0010_0008).unwrap();
        assert_eq!(anon.module.as_deref(), Some(ANONYMOUS_MODULE));

        let stray = report.hotspots.iter().find(|h| h.address.0 == 0x10).unwrap();
        assert_eq!(stray.module, None);
        assert_eq!(report.unmapped_samples, 1);
    }

    #[test]
    fn test_module_totals() {
        let report =
            HotspotReport::build(&trace(&[0x400010, 0x401010, 0x401020, 0x7f00_0000_0100]), 1);
        assert_eq!(report.hotspots.len(), 1);
        assert_eq!(report.modules[0].module, "/opt/app");
        assert_eq!(report.modules[0].count, 3);
        assert_eq!(report.modules[1].module, "/lib/libc.so.6");
        assert_eq!(report.modules[1].count, 1);
    }

    #[test]
    fn test_empty_trace() {
        let report = HotspotReport::build(&trace(&[]), 10);
        assert_eq!(report.total_samples, 0);
        assert!(report.hotspots.is_empty());
        assert!(report.modules.is_empty());
    }

    #[test]
    fn test_serializes_to_json() {
        let report = HotspotReport::build(&trace(&[0x401010]), 5);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["total_samples"], 1);
        assert_eq!(json["hotspots"][0]["address"], 0x401010);
        assert_eq!(json["hotspots"][0]["module"], "/opt/app");
    }
}
