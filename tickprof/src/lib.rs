//! # tickprof - Signal-Driven Sampling Profiler
//!
//! tickprof profiles the process it is linked into. A CPU-time interval
//! timer raises `SIGPROF` at a fixed rate (100 Hz by default); the handler
//! records the program counter the signal interrupted. Samples are streamed
//! to a self-describing trace file that ends with a copy of
//! `/proc/self/maps`, so addresses can be attributed to modules and
//! symbolized offline.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Profiled Application                        │
//! │        start(path) / ProfilerGuard ...... stop() / drop         │
//! └──────────┬───────────────────────────────────────────┬──────────┘
//!            │ ITIMER_PROF                               │ SIGUSR2
//!            ▼                                           ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Signal Context (capture)                     │
//! │  on_tick: ucontext PC ──► SampleRing::push (lock-free)          │
//! │  on_stop_signal: stop_requested = true                          │
//! │  ring full / stop ──► one byte on the wake pipe                 │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ wake pipe (poll, drain_interval timeout)
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  Drain Thread (tickprof-drain)                  │
//! │  SampleSink ──► TraceWriter ──► trace file                      │
//! │  stop: patch count, append MAPSDATA + /proc/self/maps           │
//! └─────────────────────────────────────────────────────────────────┘
//!
//!  Offline:  TraceFile::open ──► HotspotReport::build ──► `tickprof inspect`
//! ```
//!
//! ## Module Structure
//!
//! - [`profiling`]: signal handlers, sample ring, drain thread, session controller
//! - [`trace`]: trace writer and reader
//! - [`maps`]: `/proc/self/maps` snapshots and parsing
//! - [`analysis`]: hotspot ranking and module attribution
//! - [`config`]: session configuration and `TICKPROF_*` environment overrides
//! - [`cli`]: commands of the `tickprof` inspection binary
//! - [`domain`]: newtypes and error enums
//!
//! The trace layout itself is defined in the `tickprof-common` crate.
//!
//! ## Typical Usage
//!
//! ```no_run
//! let _id = tickprof::start("/tmp/app.prof")?;
//! // ... workload ...
//! if let Some(stats) = tickprof::stop() {
//!     println!("{} samples", stats.samples_written);
//! }
//! # Ok::<(), tickprof::ProfilerError>(())
//! ```
//!
//! ```bash
//! tickprof inspect /tmp/app.prof --top 10
//! ```
//!
//! Sending the stop signal (`kill -USR2 <pid>`) finalizes the trace without
//! terminating the process.

pub mod analysis;
pub mod cli;
pub mod config;
pub mod domain;
pub mod maps;
pub mod profiling;
pub mod trace;

pub use config::{ProfilerConfig, TickSource, DEFAULT_TRACE_PATH};
pub use domain::{Address, ProfilerError, SessionId, Signal, TraceError};
pub use profiling::{
    active_session, flush, is_active, record_sample, start, start_with, stop, stop_session,
    ProfilerGuard, SessionStats,
};
