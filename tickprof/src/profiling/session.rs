//! Session controller
//!
//! At most one profiling session exists per process. Its lifecycle is
//! serialized by [`CONTROLLER`], held across the whole of every start, stop
//! and flush, including joining the drain thread.
//!
//! ```text
//! start: validate ─► open + header ─► wake pipe ─► handlers ─► publish ─► drain thread ─► arm timer
//! stop:  disarm ─► retract (quiesce) ─► restore or hand over stop signal ─► join drain ─► drain ─► patch count ─► trailer
//! ```
//!
//! A failure at any start step runs the stop path over whatever was already
//! set up, so the opened file is still finalized into a valid empty trace.
//!
//! On restart the stop-signal handler is handed from the old session to the
//! new one instead of being restored in between. With no session published
//! the handler is inert, and the signal never reaches its default action.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use log::{debug, info, warn};

use super::capture::{self, CaptureState};
use super::drain::{run_drain_loop, SampleSink, StopAttempt, DRAIN_THREAD_NAME};
use super::osutil::{self, SavedDisposition, WakePipe};
use crate::config::{ProfilerConfig, TickSource};
use crate::domain::{ProfilerError, SessionId, Signal};
use crate::maps::MapsSnapshot;
use crate::trace::TraceWriter;

type FileSink = SampleSink<BufWriter<File>>;

static CONTROLLER: Mutex<Option<ActiveSession>> = Mutex::new(None);
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);
static TICK_HANDLER_INSTALLED: AtomicBool = AtomicBool::new(false);

/// Totals of a finished session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStats {
    pub id: SessionId,
    pub path: PathBuf,
    /// Samples in the file; equals the header's count.
    pub samples_written: u64,
    /// Samples the ring accepted.
    pub samples_captured: u64,
    /// Samples lost to a full ring or to a write error.
    pub samples_dropped: u64,
    /// Length of the memory map snapshot in the trailer.
    pub maps_bytes: u64,
    /// Whether any write to the trace failed.
    pub write_failed: bool,
}

struct ActiveSession {
    id: SessionId,
    config: ProfilerConfig,
    state: Arc<CaptureState>,
    sink: Arc<Mutex<FileSink>>,
    stop_disposition: Option<SavedDisposition>,
    drain: Option<JoinHandle<()>>,
    timer_armed: bool,
    started: Instant,
}

fn controller() -> MutexGuard<'static, Option<ActiveSession>> {
    CONTROLLER.lock().unwrap_or_else(PoisonError::into_inner)
}

fn lock_sink(sink: &Mutex<FileSink>) -> MutexGuard<'_, FileSink> {
    sink.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ActiveSession {
    /// `inherited` is the stop-signal disposition handed over by a session
    /// finalized for restart. It is adopted or restored, never leaked.
    fn launch(
        config: ProfilerConfig,
        inherited: Option<SavedDisposition>,
    ) -> Result<Self, ProfilerError> {
        let id = SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed));

        let writer = match TraceWriter::create(&config.output) {
            Ok(writer) => writer,
            Err(source) => {
                restore_disposition(inherited);
                return Err(ProfilerError::OpenFailed { path: config.output.clone(), source });
            }
        };
        let sink = Arc::new(Mutex::new(SampleSink::new(writer, config.ring_capacity)));

        let wake = match WakePipe::new() {
            Ok(wake) => wake,
            Err(e) => {
                finish_sink(&sink);
                restore_disposition(inherited);
                return Err(ProfilerError::PipeFailed(e));
            }
        };

        let mut session = Self {
            id,
            state: Arc::new(CaptureState::new(config.ring_capacity, wake)),
            config,
            sink,
            stop_disposition: None,
            drain: None,
            timer_armed: false,
            started: Instant::now(),
        };

        if let Err(e) = session.install(inherited) {
            warn!("Failed to start {id}: {e}");
            session.finalize(false);
            return Err(e);
        }

        info!(
            "Profiling {id} started: {} ({} Hz, {:?} ticks, {} ring slots)",
            session.config.output.display(),
            session.config.frequency_hz,
            session.config.tick_source,
            session.state.ring.capacity()
        );
        Ok(session)
    }

    fn install(&mut self, inherited: Option<SavedDisposition>) -> Result<(), ProfilerError> {
        self.adopt_stop_handler(inherited)?;
        if self.config.tick_source == TickSource::CpuTime {
            ensure_tick_handler()?;
        }

        if !capture::publish(&self.state) {
            warn!("A previous capture state was still published; samples may be lost");
        }

        let state = Arc::clone(&self.state);
        let sink = Arc::clone(&self.sink);
        let interval = self.config.drain_interval;
        let id = self.id;
        let handle = thread::Builder::new()
            .name(DRAIN_THREAD_NAME.to_string())
            .spawn(move || {
                run_drain_loop(&state, &sink, interval, Signal::PROF, || finalize_on_request(id));
            })
            .map_err(ProfilerError::DrainThreadFailed)?;
        self.drain = Some(handle);

        if self.config.tick_source == TickSource::CpuTime {
            osutil::arm_prof_timer(self.config.tick_period_us())
                .map_err(ProfilerError::TimerFailed)?;
            self.timer_armed = true;
        }
        Ok(())
    }

    /// Keep an inherited handler that already serves the wanted signal. Any
    /// other inherited disposition goes back to its owner first.
    fn adopt_stop_handler(
        &mut self,
        inherited: Option<SavedDisposition>,
    ) -> Result<(), ProfilerError> {
        match (inherited, self.config.stop_signal) {
            (Some(saved), Some(signal)) if saved.signal() == signal => {
                self.stop_disposition = Some(saved);
            }
            (inherited, wanted) => {
                restore_disposition(inherited);
                if let Some(signal) = wanted {
                    self.stop_disposition =
                        Some(osutil::install_handler(signal, capture::on_stop_signal)?);
                }
            }
        }
        Ok(())
    }

    /// Run the stop path. `on_drain_thread` skips joining the drain thread
    /// when it is the caller.
    fn finalize(self, on_drain_thread: bool) -> SessionStats {
        self.shut_down(on_drain_thread, false).0
    }

    /// Run the stop path but leave the stop-signal handler installed and
    /// return its saved disposition for the next session.
    fn finalize_for_restart(self) -> (SessionStats, Option<SavedDisposition>) {
        self.shut_down(false, true)
    }

    fn shut_down(
        mut self,
        on_drain_thread: bool,
        keep_stop_handler: bool,
    ) -> (SessionStats, Option<SavedDisposition>) {
        if self.timer_armed {
            if let Err(e) = osutil::disarm_prof_timer() {
                warn!("Failed to disarm profiling timer: {e}");
            }
        }

        capture::retract(&self.state);

        let kept = if keep_stop_handler {
            self.stop_disposition.take()
        } else {
            restore_disposition(self.stop_disposition.take());
            None
        };

        self.state.shutdown.store(true, Ordering::Release);
        self.state.wake.notify();
        if let Some(handle) = self.drain.take() {
            if !on_drain_thread && handle.join().is_err() {
                warn!("Drain thread of {} panicked", self.id);
            }
        }

        let report = {
            let mut sink = lock_sink(&self.sink);
            sink.drain(&self.state.ring);
            finish_locked(&mut sink)
        };

        let stats = SessionStats {
            id: self.id,
            path: self.config.output.clone(),
            samples_written: report.samples_written,
            samples_captured: self.state.ring.captured(),
            samples_dropped: self.state.ring.dropped() + report.samples_discarded,
            maps_bytes: report.maps_bytes,
            write_failed: report.write_failed,
        };
        info!(
            "Profiling {} stopped after {:.2?}: {} samples written to {} ({} dropped)",
            stats.id,
            self.started.elapsed(),
            stats.samples_written,
            stats.path.display(),
            stats.samples_dropped
        );
        (stats, kept)
    }
}

fn restore_disposition(saved: Option<SavedDisposition>) {
    if let Some(saved) = saved {
        let signal = saved.signal();
        if let Err(e) = saved.restore() {
            warn!("Failed to restore disposition of {signal}: {e}");
        }
    }
}

struct FinishReport {
    samples_written: u64,
    samples_discarded: u64,
    maps_bytes: u64,
    write_failed: bool,
}

/// Patch, append the maps snapshot, and cut off bytes a failed write may
/// have left past the trailer.
fn finish_locked(sink: &mut FileSink) -> FinishReport {
    let maps = MapsSnapshot::capture().unwrap_or_else(|e| {
        warn!("Failed to read /proc/self/maps, writing empty snapshot: {e}");
        MapsSnapshot::default()
    });

    let report = sink.finish(maps.as_bytes());
    let mut maps_bytes = 0;
    if let Some(trace) = report.trace {
        maps_bytes = trace.maps_bytes;
        match trace.inner.into_inner() {
            Ok(file) if report.write_failed => {
                if let Err(e) = file.set_len(trace.end_offset) {
                    warn!("Failed to truncate trace after write error: {e}");
                }
            }
            Ok(_) => {}
            Err(e) => warn!("Failed to flush trace: {}", e.error()),
        }
    }

    FinishReport {
        samples_written: report.samples_written,
        samples_discarded: report.samples_discarded,
        maps_bytes,
        write_failed: report.write_failed,
    }
}

fn finish_sink(sink: &Mutex<FileSink>) {
    finish_locked(&mut lock_sink(sink));
}

/// The tick handler is installed once and never removed: a tick delivered
/// after the timer is disarmed must not reach the default `SIGPROF` action.
fn ensure_tick_handler() -> Result<(), ProfilerError> {
    if TICK_HANDLER_INSTALLED.load(Ordering::Acquire) {
        return Ok(());
    }
    let _previous = osutil::install_handler(Signal::PROF, capture::on_tick)?;
    TICK_HANDLER_INSTALLED.store(true, Ordering::Release);
    debug!("Installed {} handler", Signal::PROF);
    Ok(())
}

/// Called on the drain thread after the stop signal.
fn finalize_on_request(id: SessionId) -> StopAttempt {
    let mut slot = match CONTROLLER.try_lock() {
        Ok(slot) => slot,
        Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        Err(TryLockError::WouldBlock) => return StopAttempt::Retry,
    };
    if slot.as_ref().map(|session| session.id) != Some(id) {
        return StopAttempt::Done;
    }
    if let Some(session) = slot.take() {
        session.finalize(true);
    }
    StopAttempt::Done
}

// ============================================================================
// Public operations
// ============================================================================

/// Start profiling into `path` with default settings.
///
/// # Errors
/// See [`start_with`].
pub fn start(path: impl AsRef<Path>) -> Result<SessionId, ProfilerError> {
    start_with(ProfilerConfig::new(path))
}

/// Start a session. A session that is already running is finalized first.
///
/// # Errors
/// Returns an error if the configuration is invalid, the trace cannot be
/// created, or a signal handler, the wake pipe, the drain thread or the
/// timer cannot be set up. Nothing is left installed on error.
pub fn start_with(config: ProfilerConfig) -> Result<SessionId, ProfilerError> {
    config.validate()?;

    let mut slot = controller();
    let inherited = match slot.take() {
        Some(previous) => {
            info!("Restart requested, finalizing {}", previous.id);
            previous.finalize_for_restart().1
        }
        None => None,
    };

    let session = ActiveSession::launch(config, inherited)?;
    let id = session.id;
    *slot = Some(session);
    Ok(id)
}

/// Stop the active session and finalize its trace.
///
/// Returns `None` if nothing was running.
pub fn stop() -> Option<SessionStats> {
    controller().take().map(|session| session.finalize(false))
}

/// Write samples buffered in the ring to the trace now.
///
/// Returns `false` if no session is active.
pub fn flush() -> bool {
    let slot = controller();
    let Some(session) = slot.as_ref() else {
        return false;
    };
    let mut sink = lock_sink(&session.sink);
    sink.drain(&session.state.ring);
    sink.flush();
    true
}

#[must_use]
pub fn is_active() -> bool {
    controller().is_some()
}

#[must_use]
pub fn active_session() -> Option<SessionId> {
    controller().as_ref().map(|session| session.id)
}

/// Stop session `id` if it is still the active one. A newer session started
/// since then is left running.
pub fn stop_session(id: SessionId) -> Option<SessionStats> {
    let mut slot = controller();
    if slot.as_ref().map(|session| session.id) != Some(id) {
        return None;
    }
    slot.take().map(|session| session.finalize(false))
}

/// Scoped session: stops the session it started when dropped.
///
/// A guard never stops a session it did not start, so a stale guard outliving
/// a restart leaves the newer session alone.
#[must_use = "dropping the guard stops profiling immediately"]
pub struct ProfilerGuard {
    id: SessionId,
    armed: bool,
}

impl ProfilerGuard {
    /// # Errors
    /// See [`start_with`].
    pub fn start(config: ProfilerConfig) -> Result<Self, ProfilerError> {
        Ok(Self { id: start_with(config)?, armed: true })
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Stop now and return the totals, if this guard's session is still the
    /// active one.
    pub fn stop(mut self) -> Option<SessionStats> {
        self.armed = false;
        stop_session(self.id)
    }
}

impl Drop for ProfilerGuard {
    fn drop(&mut self) {
        if self.armed {
            stop_session(self.id);
        }
    }
}
