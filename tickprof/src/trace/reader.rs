//! Trace file reader
//!
//! Parses traces written on any host: the pointer-size field tells the byte
//! order and the width of every recorded address.

use std::fs;
use std::path::Path;

use tickprof_common::{
    detect_pointer_size, ByteOrder, HEADER_LEN, MAPS_MAGIC, POINTER_SIZE_OFFSET,
    SAMPLE_COUNT_OFFSET, TRACE_MAGIC, TRAILER_PREFIX_LEN,
};

use crate::domain::{Address, TraceError};
use crate::maps::MapsSnapshot;

/// A decoded trace
#[derive(Debug, Clone)]
pub struct TraceFile {
    /// 4 or 8.
    pub pointer_size: u32,
    pub byte_order: ByteOrder,
    /// Program counters in delivery order.
    pub samples: Vec<Address>,
    /// Raw trailer length field. Writers store 0, meaning "to end of file".
    pub trailer_length: u64,
    /// Verbatim `/proc/self/maps` of the recorded process.
    pub maps: MapsSnapshot,
}

impl TraceFile {
    /// Read and parse a trace from disk.
    ///
    /// # Errors
    /// Returns [`TraceError::Io`] if the file cannot be read, or any parse error.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TraceError> {
        let bytes = fs::read(path)?;
        Self::parse(&bytes)
    }

    /// Parse a complete trace.
    ///
    /// # Errors
    /// Returns a [`TraceError`] describing the first structural problem found.
    pub fn parse(bytes: &[u8]) -> Result<Self, TraceError> {
        if bytes.len() < TRACE_MAGIC.len() {
            return Err(truncated("header", HEADER_LEN, bytes.len()));
        }
        let magic: [u8; 8] = take_array(bytes, 0);
        if magic != TRACE_MAGIC {
            return Err(TraceError::BadMagic(magic));
        }
        if bytes.len() < HEADER_LEN {
            return Err(truncated("header", HEADER_LEN, bytes.len()));
        }

        let size_field: [u8; 4] = take_array(bytes, POINTER_SIZE_OFFSET);
        let (byte_order, pointer_size) = detect_pointer_size(size_field)
            .ok_or(TraceError::UnsupportedPointerSize(u32::from_le_bytes(size_field)))?;
        let sample_count = byte_order.read_u64(take_array(bytes, SAMPLE_COUNT_OFFSET));

        let body = &bytes[HEADER_LEN..];
        let region_len = sample_count
            .checked_mul(u64::from(pointer_size))
            .and_then(|len| usize::try_from(len).ok())
            .filter(|&len| len <= body.len())
            .ok_or_else(|| TraceError::Truncated {
                section: "sample region",
                expected: sample_count.saturating_mul(u64::from(pointer_size)),
                actual: body.len() as u64,
            })?;

        let samples = body[..region_len]
            .chunks_exact(pointer_size as usize)
            .map(|chunk| {
                Address(if pointer_size == 8 {
                    byte_order.read_u64(take_array(chunk, 0))
                } else {
                    u64::from(byte_order.read_u32(take_array(chunk, 0)))
                })
            })
            .collect();

        let trailer = &body[region_len..];
        if trailer.len() < TRAILER_PREFIX_LEN || trailer[..8] != MAPS_MAGIC {
            return Err(TraceError::MissingMapsTrailer);
        }
        let trailer_length = byte_order.read_u64(take_array(trailer, 8));
        let snapshot = &trailer[TRAILER_PREFIX_LEN..];
        // A non-zero length bounds the snapshot; zero runs to end of file
        let snapshot = match usize::try_from(trailer_length) {
            Ok(0) => snapshot,
            Ok(len) if len <= snapshot.len() => &snapshot[..len],
            _ => return Err(truncated("maps snapshot", trailer_length, snapshot.len())),
        };

        Ok(Self {
            pointer_size,
            byte_order,
            samples,
            trailer_length,
            maps: MapsSnapshot::from_bytes(snapshot.to_vec()),
        })
    }

    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}

fn truncated(section: &'static str, expected: impl TryInto<u64>, actual: usize) -> TraceError {
    TraceError::Truncated {
        section,
        expected: expected.try_into().unwrap_or(u64::MAX),
        actual: actual as u64,
    }
}

/// Copy `N` bytes at `offset`. Callers have checked the length.
fn take_array<const N: usize>(bytes: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[offset..offset + N]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_trace(order: ByteOrder, psize: u32, pcs: &[u64], maps: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"PROFDAT1");
        let (size, count) = match order {
            ByteOrder::Little => (psize.to_le_bytes(), (pcs.len() as u64).to_le_bytes()),
            ByteOrder::Big => (psize.to_be_bytes(), (pcs.len() as u64).to_be_bytes()),
        };
        out.extend_from_slice(&size);
        out.extend_from_slice(&count);
        for &pc in pcs {
            match (order, psize) {
                (ByteOrder::Little, 8) => out.extend_from_slice(&pc.to_le_bytes()),
                (ByteOrder::Big, 8) => out.extend_from_slice(&pc.to_be_bytes()),
                (ByteOrder::Little, _) => out.extend_from_slice(&(pc as u32).to_le_bytes()),
                (ByteOrder::Big, _) => out.extend_from_slice(&(pc as u32).to_be_bytes()),
            }
        }
        out.extend_from_slice(b"MAPSDATA");
        out.extend_from_slice(&[0u8; 8]);
        out.extend_from_slice(maps);
        out
    }

    #[test]
    fn test_parse_little_endian_64() {
        let bytes = build_trace(ByteOrder::Little, 8, &[0x1000, 0x1004], b"line\n");
        let trace = TraceFile::parse(&bytes).unwrap();
        assert_eq!(trace.pointer_size, 8);
        assert_eq!(trace.byte_order, ByteOrder::Little);
        assert_eq!(trace.samples, vec![Address(0x1000), Address(0x1004)]);
        assert_eq!(trace.trailer_length, 0);
        assert_eq!(trace.maps.as_bytes(), b"line\n");
    }

    #[test]
    fn test_parse_big_endian_32() {
        let bytes = build_trace(ByteOrder::Big, 4, &[0x8000_0000, 0x10], b"");
        let trace = TraceFile::parse(&bytes).unwrap();
        assert_eq!(trace.pointer_size, 4);
        assert_eq!(trace.byte_order, ByteOrder::Big);
        assert_eq!(trace.samples, vec![Address(0x8000_0000), Address(0x10)]);
        assert!(trace.maps.as_bytes().is_empty());
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = build_trace(ByteOrder::Little, 8, &[], b"");
        bytes[0] = b'X';
        assert!(matches!(TraceFile::parse(&bytes), Err(TraceError::BadMagic(_))));
    }

    #[test]
    fn test_unsupported_pointer_size() {
        let mut bytes = build_trace(ByteOrder::Little, 8, &[], b"");
        bytes[8] = 2;
        assert!(matches!(TraceFile::parse(&bytes), Err(TraceError::UnsupportedPointerSize(2))));
    }

    #[test]
    fn test_count_exceeds_region() {
        let mut bytes = build_trace(ByteOrder::Little, 8, &[0x1], b"");
        bytes[12..20].copy_from_slice(&1000u64.to_le_bytes());
        assert!(matches!(
            TraceFile::parse(&bytes),
            Err(TraceError::Truncated { section: "sample region", .. })
        ));
    }

    #[test]
    fn test_unfinalized_trace_has_no_trailer() {
        // Header still says 0 but samples were appended: the crash case
        let mut bytes = build_trace(ByteOrder::Little, 8, &[], b"");
        bytes.truncate(HEADER_LEN);
        bytes.extend_from_slice(&0x1234u64.to_le_bytes());
        assert!(matches!(TraceFile::parse(&bytes), Err(TraceError::MissingMapsTrailer)));
    }

    #[test]
    fn test_short_header() {
        assert!(matches!(
            TraceFile::parse(b"PROFDAT1\x08"),
            Err(TraceError::Truncated { section: "header", .. })
        ));
        assert!(matches!(TraceFile::parse(b"PROF"), Err(TraceError::Truncated { .. })));
    }
}
