//! Memory map snapshots
//!
//! The recorder stores `/proc/self/maps` verbatim at the end of each trace so
//! recorded addresses can later be attributed to the module they fell in and
//! rebased for position-independent binaries. Parsing happens only when a
//! trace is read back.

use std::fs;
use std::io;

use log::info;
use serde::Serialize;

/// Half-open address range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemoryRange {
    pub start: u64,
    pub end: u64,
}

impl MemoryRange {
    /// Check if an address falls within this memory range
    #[must_use]
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end
    }

    #[must_use]
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One line of a maps file: `start-end perms offset dev inode pathname`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MapEntry {
    pub range: MemoryRange,
    pub perms: String,
    /// Offset of `range.start` within the mapped file.
    pub offset: u64,
    pub device: String,
    pub inode: u64,
    /// File path or pseudo-name such as `[stack]`; `None` for anonymous memory.
    pub pathname: Option<String>,
}

impl MapEntry {
    /// Parse one maps line. Returns `None` for malformed lines.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let mut rest = line;
        let range = next_field(&mut rest)?;
        let perms = next_field(&mut rest)?;
        let offset = next_field(&mut rest)?;
        let device = next_field(&mut rest)?;
        let inode = next_field(&mut rest)?;
        let pathname = rest.trim();

        let (start, end) = range.split_once('-')?;
        Some(Self {
            range: MemoryRange {
                start: u64::from_str_radix(start, 16).ok()?,
                end: u64::from_str_radix(end, 16).ok()?,
            },
            perms: perms.to_string(),
            offset: u64::from_str_radix(offset, 16).ok()?,
            device: device.to_string(),
            inode: inode.parse().ok()?,
            pathname: (!pathname.is_empty()).then(|| pathname.to_string()),
        })
    }

    #[must_use]
    pub fn is_executable(&self) -> bool {
        self.perms.as_bytes().get(2) == Some(&b'x')
    }

    /// Offset of `addr` within the mapped file, or `None` below the mapping.
    #[must_use]
    pub fn file_offset(&self, addr: u64) -> Option<u64> {
        addr.checked_sub(self.range.start)?.checked_add(self.offset)
    }
}

fn next_field<'a>(rest: &mut &'a str) -> Option<&'a str> {
    let trimmed = rest.trim_start();
    if trimmed.is_empty() {
        return None;
    }
    let end = trimmed.find(char::is_whitespace).unwrap_or(trimmed.len());
    let (field, tail) = trimmed.split_at(end);
    *rest = tail;
    Some(field)
}

/// Raw maps bytes of one process at one instant
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapsSnapshot {
    bytes: Vec<u8>,
}

impl MapsSnapshot {
    /// Read `/proc/self/maps` of the calling process.
    ///
    /// # Errors
    /// Returns the error from reading procfs.
    pub fn capture() -> io::Result<Self> {
        let bytes = fs::read("/proc/self/maps")?;
        Ok(Self { bytes })
    }

    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Parsed mappings. Malformed lines are skipped.
    #[must_use]
    pub fn entries(&self) -> Vec<MapEntry> {
        String::from_utf8_lossy(&self.bytes).lines().filter_map(MapEntry::parse).collect()
    }

    /// Mapping containing `addr`.
    #[must_use]
    pub fn find(&self, addr: u64) -> Option<MapEntry> {
        self.entries().into_iter().find(|entry| entry.range.contains(addr))
    }

    /// Span from the lowest start to the highest end of all mappings whose
    /// pathname contains `binary_path`.
    #[must_use]
    pub fn module_range(&self, binary_path: &str) -> Option<MemoryRange> {
        let mut found: Option<MemoryRange> = None;
        for entry in self.entries() {
            if !entry.pathname.as_deref().is_some_and(|p| p.contains(binary_path)) {
                continue;
            }
            found = Some(match found {
                Some(range) => MemoryRange {
                    start: range.start.min(entry.range.start),
                    end: range.end.max(entry.range.end),
                },
                None => entry.range,
            });
        }
        if let Some(range) = found {
            info!(
                "Module memory range: 0x{:x} - 0x{:x} (size: {} KB)",
                range.start,
                range.end,
                range.len() / 1024
            );
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_MAPS: &str = "\
55d0c0a00000-55d0c0a2a000 r--p 00000000 fd:01 1311   /usr/bin/demo app
55d0c0a2a000-55d0c0b10000 r-xp 0002a000 fd:01 1311   /usr/bin/demo app
7f1e2c000000-7f1e2c021000 rw-p 00000000 00:00 0
7ffd4a1f0000-7ffd4a211000 rw-p 00000000 00:00 0      [stack]
garbage line
";

    #[test]
    fn test_memory_range_contains() {
        let range = MemoryRange { start: 0x1000, end: 0x2000 };

        assert!(range.contains(0x1000));
        assert!(range.contains(0x1500));
        assert!(range.contains(0x1FFF));
        assert!(!range.contains(0x0FFF));
        assert!(!range.contains(0x2000));
        assert!(!range.contains(0x2001));
    }

    #[test]
    fn test_entries_parse_fields() {
        let snapshot = MapsSnapshot::from_bytes(SAMPLE_MAPS.as_bytes().to_vec());
        let entries = snapshot.entries();
        assert_eq!(entries.len(), 4);

        let text = &entries[1];
        assert_eq!(text.range, MemoryRange { start: 0x55d0_c0a2_a000, end: 0x55d0_c0b1_0000 });
        assert_eq!(text.perms, "r-xp");
        assert_eq!(text.offset, 0x2a000);
        assert_eq!(text.device, "fd:01");
        assert_eq!(text.inode, 1311);
        assert_eq!(text.pathname.as_deref(), Some("/usr/bin/demo app"));
        assert!(text.is_executable());

        assert_eq!(entries[2].pathname, None);
        assert_eq!(entries[3].pathname.as_deref(), Some("[stack]"));
    }

    #[test]
    fn test_find_and_file_offset() {
        let snapshot = MapsSnapshot::from_bytes(SAMPLE_MAPS.as_bytes().to_vec());
        let entry = snapshot.find(0x55d0_c0a2_b000).unwrap();
        assert_eq!(entry.file_offset(0x55d0_c0a2_b000), Some(0x2b000));
        assert!(snapshot.find(0x10).is_none());

        // An address below the mapping has no offset in its file
        assert_eq!(entry.file_offset(entry.range.start - 1), None);
        assert_eq!(entry.file_offset(0), None);
    }

    #[test]
    fn test_module_range_spans_all_segments() {
        let snapshot = MapsSnapshot::from_bytes(SAMPLE_MAPS.as_bytes().to_vec());
        let range = snapshot.module_range("/usr/bin/demo").unwrap();
        assert_eq!(range, MemoryRange { start: 0x55d0_c0a0_0000, end: 0x55d0_c0b1_0000 });
        assert!(snapshot.module_range("libmissing.so").is_none());
    }

    #[test]
    fn test_capture_self() {
        let snapshot = MapsSnapshot::capture().unwrap();
        assert!(!snapshot.is_empty());

        // The running test binary's code is mapped somewhere
        let exe = std::env::current_exe().unwrap();
        let here = test_capture_self as fn() as usize as u64;
        let entry = snapshot.find(here).expect("own code is mapped");
        assert!(entry.is_executable());
        assert!(snapshot.module_range(exe.to_str().unwrap()).is_some());
    }
}
