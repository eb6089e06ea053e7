//! # Trace File Format (Recorder ↔ Offline Reader)
//!
//! Defines the constants and fixed-layout encoders of the trace file, shared
//! between the in-process recorder and offline readers. The crate is
//! `no_std` and dependency-free so symbolizers and other tooling can link it
//! without pulling in the recorder.
//!
//! ## File Layout
//!
//! ```text
//! offset  size              field
//! 0       8                 TRACE_MAGIC ("PROFDAT1")
//! 8       4                 pointer size (4 or 8), host byte order
//! 12      8                 sample count (u64), host byte order, patched at stop
//! 20      count * ptr size  program counters, delivery order
//! ...     8                 MAPS_MAGIC ("MAPSDATA")
//! ...     8                 trailer length (always 0, snapshot runs to EOF)
//! ...     rest              verbatim /proc/self/maps
//! ```
//!
//! The pointer-size field doubles as the byte-order marker: a reader that
//! decodes it as 4 or 8 in little-endian order knows every other numeric
//! field in the file is little-endian too.

#![no_std]

// ============================================================================
// Magics and Field Offsets
// ============================================================================

/// Format tag for version 1 traces. Written at offset 0.
pub const TRACE_MAGIC: [u8; 8] = *b"PROFDAT1";

/// Tag opening the memory-map trailer.
pub const MAPS_MAGIC: [u8; 8] = *b"MAPSDATA";

/// Offset of the 4-byte pointer-size field.
pub const POINTER_SIZE_OFFSET: usize = 8;

/// Offset of the 8-byte sample-count field patched at finalize.
pub const SAMPLE_COUNT_OFFSET: usize = 12;

/// Length of the fixed header (magic + pointer size + sample count).
pub const HEADER_LEN: usize = 20;

/// Length of the trailer prefix (magic + length field) preceding the snapshot.
pub const TRAILER_PREFIX_LEN: usize = 16;

/// Value written into the trailer length field.
///
/// Readers must treat the snapshot as running to end of file.
pub const TRAILER_LENGTH_UNUSED: u64 = 0;

// ============================================================================
// Recorder Defaults
// ============================================================================

/// Default tick rate of the interval timer.
pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 100;

/// Default number of sample slots in the in-memory ring.
pub const DEFAULT_RING_CAPACITY: usize = 1024;

/// Pointer size of the recording host, in bytes.
#[allow(clippy::cast_possible_truncation)]
pub const HOST_POINTER_SIZE: u32 = core::mem::size_of::<usize>() as u32;

// ============================================================================
// Byte Order
// ============================================================================

/// Byte order of the numeric fields of a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    /// Byte order of the host this code runs on.
    #[must_use]
    pub const fn host() -> Self {
        if cfg!(target_endian = "little") {
            ByteOrder::Little
        } else {
            ByteOrder::Big
        }
    }

    /// Decode a `u32` stored in this byte order.
    #[must_use]
    pub const fn read_u32(self, bytes: [u8; 4]) -> u32 {
        match self {
            ByteOrder::Little => u32::from_le_bytes(bytes),
            ByteOrder::Big => u32::from_be_bytes(bytes),
        }
    }

    /// Decode a `u64` stored in this byte order.
    #[must_use]
    pub const fn read_u64(self, bytes: [u8; 8]) -> u64 {
        match self {
            ByteOrder::Little => u64::from_le_bytes(bytes),
            ByteOrder::Big => u64::from_be_bytes(bytes),
        }
    }
}

/// Interpret the raw pointer-size field.
///
/// Returns the byte order the file was written in and the pointer size, or
/// `None` when the field holds neither 4 nor 8 in either order.
#[must_use]
pub const fn detect_pointer_size(field: [u8; 4]) -> Option<(ByteOrder, u32)> {
    let le = u32::from_le_bytes(field);
    if le == 4 || le == 8 {
        return Some((ByteOrder::Little, le));
    }
    let be = u32::from_be_bytes(field);
    if be == 4 || be == 8 {
        return Some((ByteOrder::Big, be));
    }
    None
}

// ============================================================================
// Encoders
// ============================================================================

/// Encode the fixed header in host byte order.
#[must_use]
pub fn encode_header(sample_count: u64) -> [u8; HEADER_LEN] {
    let mut out = [0u8; HEADER_LEN];
    out[..POINTER_SIZE_OFFSET].copy_from_slice(&TRACE_MAGIC);
    out[POINTER_SIZE_OFFSET..SAMPLE_COUNT_OFFSET].copy_from_slice(&HOST_POINTER_SIZE.to_ne_bytes());
    out[SAMPLE_COUNT_OFFSET..].copy_from_slice(&sample_count.to_ne_bytes());
    out
}

/// Encode the trailer prefix (magic + unused length) in host byte order.
#[must_use]
pub fn encode_trailer_prefix() -> [u8; TRAILER_PREFIX_LEN] {
    let mut out = [0u8; TRAILER_PREFIX_LEN];
    out[..8].copy_from_slice(&MAPS_MAGIC);
    out[8..].copy_from_slice(&TRAILER_LENGTH_UNUSED.to_ne_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let header = encode_header(7);
        assert_eq!(&header[..8], b"PROFDAT1");
        let (order, size) =
            detect_pointer_size([header[8], header[9], header[10], header[11]]).unwrap();
        assert_eq!(order, ByteOrder::host());
        assert_eq!(size, HOST_POINTER_SIZE);
        let mut count = [0u8; 8];
        count.copy_from_slice(&header[SAMPLE_COUNT_OFFSET..]);
        assert_eq!(order.read_u64(count), 7);
    }

    #[test]
    fn test_detect_pointer_size_foreign_order() {
        assert_eq!(detect_pointer_size([4, 0, 0, 0]), Some((ByteOrder::Little, 4)));
        assert_eq!(detect_pointer_size([0, 0, 0, 8]), Some((ByteOrder::Big, 8)));
        assert_eq!(detect_pointer_size([2, 0, 0, 0]), None);
        assert_eq!(detect_pointer_size([0, 0, 0, 0]), None);
    }

    #[test]
    fn test_trailer_prefix() {
        let prefix = encode_trailer_prefix();
        assert_eq!(&prefix[..8], b"MAPSDATA");
        assert!(prefix[8..].iter().all(|&b| b == 0));
    }
}
