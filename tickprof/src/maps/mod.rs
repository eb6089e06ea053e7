//! Process memory maps captured into traces

pub mod memory_maps;

pub use memory_maps::{MapEntry, MapsSnapshot, MemoryRange};
