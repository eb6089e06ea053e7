//! Moving samples from the ring into the trace file
//!
//! [`SampleSink`] owns the trace writer. Everything that writes sample bytes
//! (the drain thread, `flush()`, finalize) goes through it under one mutex,
//! in normal thread context.

use std::io::{Seek, Write};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use log::{debug, warn};

use super::capture::CaptureState;
use super::osutil;
use super::ring::SampleRing;
use crate::domain::Signal;
use crate::trace::{FinishedTrace, TraceWriter};

/// Name of the per-session drain thread.
pub const DRAIN_THREAD_NAME: &str = "tickprof-drain";

/// Totals reported when a sink is finished.
pub struct SinkReport<W> {
    /// `None` if finishing the file failed.
    pub trace: Option<FinishedTrace<W>>,
    pub samples_written: u64,
    /// Samples taken from the ring but not written because of an I/O error.
    pub samples_discarded: u64,
    pub write_failed: bool,
}

/// Destination of drained samples
pub struct SampleSink<W: Write + Seek> {
    writer: Option<TraceWriter<W>>,
    samples_discarded: u64,
    failed: bool,
    scratch: Vec<usize>,
}

impl<W: Write + Seek> SampleSink<W> {
    #[must_use]
    pub fn new(writer: TraceWriter<W>, ring_capacity: usize) -> Self {
        Self {
            writer: Some(writer),
            samples_discarded: 0,
            failed: false,
            scratch: Vec::with_capacity(ring_capacity),
        }
    }

    /// Write every published sample in `ring`. Returns how many were taken.
    ///
    /// After the first write error no more sample bytes are written; taken
    /// samples are counted as discarded instead.
    pub fn drain(&mut self, ring: &SampleRing) -> usize {
        self.scratch.clear();
        let taken = ring.drain_into(&mut self.scratch);
        if taken == 0 {
            return 0;
        }

        match self.writer.as_mut() {
            Some(writer) if !self.failed => {
                if let Err(e) = writer.write_samples(&self.scratch) {
                    warn!("Failed to write {taken} samples, recording stops here: {e}");
                    self.failed = true;
                    self.samples_discarded += taken as u64;
                } else {
                    debug!("Drained {taken} samples");
                }
            }
            _ => self.samples_discarded += taken as u64,
        }
        taken
    }

    /// Push buffered bytes to the file.
    pub fn flush(&mut self) {
        if self.failed {
            return;
        }
        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writer.flush() {
                warn!("Failed to flush trace: {e}");
                self.failed = true;
            }
        }
    }

    #[must_use]
    pub fn write_failed(&self) -> bool {
        self.failed
    }

    /// Patch the count and append the trailer. Later calls report zero
    /// written samples and no trace.
    pub fn finish(&mut self, maps: &[u8]) -> SinkReport<W> {
        let Some(writer) = self.writer.take() else {
            return SinkReport {
                trace: None,
                samples_written: 0,
                samples_discarded: self.samples_discarded,
                write_failed: self.failed,
            };
        };

        let samples_written = writer.samples_written();
        let trace = match writer.finish(maps) {
            Ok(trace) => Some(trace),
            Err(e) => {
                warn!("Failed to finalize trace: {e}");
                self.failed = true;
                None
            }
        };
        SinkReport {
            trace,
            samples_written,
            samples_discarded: self.samples_discarded,
            write_failed: self.failed,
        }
    }
}

/// What the drain thread should do after a stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopAttempt {
    /// Session finalized, or no longer ours to finalize.
    Done,
    /// Controller busy, try again on the next wake-up.
    Retry,
}

/// Drain thread body.
///
/// Blocks `tick_signal` for itself, then sleeps on the wake pipe and drains
/// until `state.shutdown` is set. On a stop request it calls `finalize`,
/// which runs the regular stop path from this thread.
pub fn run_drain_loop<W: Write + Seek>(
    state: &Arc<CaptureState>,
    sink: &Mutex<SampleSink<W>>,
    interval: Duration,
    tick_signal: Signal,
    mut finalize: impl FnMut() -> StopAttempt,
) {
    osutil::block_signal(tick_signal);

    loop {
        state.wake.wait(interval);
        state.wake.clear();

        if state.shutdown.load(Ordering::Acquire) {
            break;
        }

        sink.lock().unwrap_or_else(PoisonError::into_inner).drain(&state.ring);

        if state.stop_requested.load(Ordering::Acquire) {
            debug!("Stop signal received, finalizing from drain thread");
            if finalize() == StopAttempt::Done {
                break;
            }
        }
    }
}
