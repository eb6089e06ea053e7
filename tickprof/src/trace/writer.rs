//! Trace file writer
//!
//! Writes the header with a zero count on creation, appends sample batches,
//! and on finish patches the count and appends the memory-map trailer.
//! The patched count is the number of samples written successfully, so the
//! header always agrees with the sample region the trailer follows.

use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use tickprof_common::{
    encode_header, encode_trailer_prefix, HEADER_LEN, HOST_POINTER_SIZE, SAMPLE_COUNT_OFFSET,
};

/// Streaming writer for one trace.
pub struct TraceWriter<W: Write + Seek> {
    inner: W,
    samples_written: u64,
    scratch: Vec<u8>,
}

/// What [`TraceWriter::finish`] leaves behind.
pub struct FinishedTrace<W> {
    pub inner: W,
    pub samples_written: u64,
    pub maps_bytes: u64,
    /// Offset one past the last byte of the trace.
    pub end_offset: u64,
}

impl TraceWriter<BufWriter<File>> {
    /// Create or truncate `path` and write the header.
    ///
    /// # Errors
    /// Returns the error from creating the file or writing the header.
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Self::new(BufWriter::new(file))
    }
}

impl<W: Write + Seek> TraceWriter<W> {
    /// Write the header (count 0) at the current position of `inner`,
    /// which must be offset 0.
    ///
    /// # Errors
    /// Returns the error from writing the header.
    pub fn new(mut inner: W) -> io::Result<Self> {
        inner.write_all(&encode_header(0))?;
        Ok(Self { inner, samples_written: 0, scratch: Vec::new() })
    }

    /// Append program counters, native width and byte order.
    ///
    /// On error none of `pcs` count as written; bytes that did reach the
    /// file are overwritten by the trailer at finish.
    ///
    /// # Errors
    /// Returns the underlying write error.
    pub fn write_samples(&mut self, pcs: &[usize]) -> io::Result<()> {
        self.scratch.clear();
        for pc in pcs {
            self.scratch.extend_from_slice(&pc.to_ne_bytes());
        }
        self.inner.write_all(&self.scratch)?;
        self.samples_written += pcs.len() as u64;
        Ok(())
    }

    #[must_use]
    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }

    /// # Errors
    /// Returns the underlying flush error.
    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    fn samples_end(&self) -> u64 {
        HEADER_LEN as u64 + self.samples_written * u64::from(HOST_POINTER_SIZE)
    }

    /// Store the sample count in the header and reposition at the end of
    /// the sample region.
    ///
    /// # Errors
    /// Returns the underlying seek or write error.
    pub fn patch_count(&mut self) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(SAMPLE_COUNT_OFFSET as u64))?;
        self.inner.write_all(&self.samples_written.to_ne_bytes())?;
        self.inner.seek(SeekFrom::Start(self.samples_end()))?;
        Ok(())
    }

    /// Append `MAPSDATA`, the unused length field and the snapshot bytes.
    ///
    /// # Errors
    /// Returns the underlying write error.
    pub fn append_maps_trailer(&mut self, maps: &[u8]) -> io::Result<()> {
        self.inner.write_all(&encode_trailer_prefix())?;
        self.inner.write_all(maps)?;
        Ok(())
    }

    /// Patch the count, append the trailer and flush.
    ///
    /// # Errors
    /// Returns the first I/O error; the file may then be incomplete.
    pub fn finish(mut self, maps: &[u8]) -> io::Result<FinishedTrace<W>> {
        self.patch_count()?;
        self.append_maps_trailer(maps)?;
        self.inner.flush()?;
        let end_offset = self.inner.stream_position()?;
        Ok(FinishedTrace {
            inner: self.inner,
            samples_written: self.samples_written,
            maps_bytes: maps.len() as u64,
            end_offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tickprof_common::TRAILER_PREFIX_LEN;

    fn ptr_bytes(pcs: &[usize]) -> Vec<u8> {
        pcs.iter().flat_map(|pc| pc.to_ne_bytes()).collect()
    }

    #[test]
    fn test_layout_with_samples() {
        let mut writer = TraceWriter::new(Cursor::new(Vec::new())).unwrap();
        writer.write_samples(&[0x1000, 0x1004]).unwrap();
        writer.write_samples(&[0x1008]).unwrap();
        let done = writer.finish(b"maps\n").unwrap();
        let bytes = done.inner.into_inner();

        let psize = HOST_POINTER_SIZE as usize;
        assert_eq!(&bytes[..8], b"PROFDAT1");
        assert_eq!(&bytes[8..12], &HOST_POINTER_SIZE.to_ne_bytes());
        assert_eq!(&bytes[12..20], &3u64.to_ne_bytes());
        assert_eq!(&bytes[20..20 + 3 * psize], ptr_bytes(&[0x1000, 0x1004, 0x1008]).as_slice());

        let trailer = &bytes[20 + 3 * psize..];
        assert_eq!(&trailer[..8], b"MAPSDATA");
        assert_eq!(&trailer[8..16], &[0u8; 8]);
        assert_eq!(&trailer[16..], b"maps\n");
        assert_eq!(done.end_offset, bytes.len() as u64);
        assert_eq!(done.samples_written, 3);
        assert_eq!(done.maps_bytes, 5);
    }

    #[test]
    fn test_empty_trace() {
        let writer = TraceWriter::new(Cursor::new(Vec::new())).unwrap();
        let bytes = writer.finish(b"").unwrap().inner.into_inner();
        assert_eq!(bytes.len(), HEADER_LEN + TRAILER_PREFIX_LEN);
        assert_eq!(&bytes[12..20], &[0u8; 8]);
        assert_eq!(&bytes[20..28], b"MAPSDATA");
    }

    #[test]
    fn test_trailer_overwrites_partial_batch() {
        let mut writer = TraceWriter::new(Cursor::new(Vec::new())).unwrap();
        writer.write_samples(&[0xaaaa]).unwrap();
        // Simulate bytes of a failed batch landing in the file
        writer.inner.write_all(&[0xff; 3]).unwrap();
        let bytes = writer.finish(b"").unwrap().inner.into_inner();

        let psize = HOST_POINTER_SIZE as usize;
        assert_eq!(&bytes[12..20], &1u64.to_ne_bytes());
        assert_eq!(&bytes[20 + psize..28 + psize], b"MAPSDATA");
    }
}
