//! Analysis of recorded traces
//!
//! Pure aggregation over a decoded [`TraceFile`](crate::trace::TraceFile),
//! separate from how the CLI prints it.

pub mod hotspot_analyzer;

pub use hotspot_analyzer::{AddressHotspot, HotspotReport, ModuleSummary};
