//! Signal-context capture
//!
//! The single process-wide registration point between signal handlers and
//! the active session. Handlers find the session's [`CaptureState`] through
//! [`ACTIVE`]; while it is null they return immediately.
//!
//! ```text
//!  SIGPROF ──► on_tick ──► record_sample ──► SampleRing::push
//!                                  │
//!                                  └─ Filled / Rejected ──► WakePipe::notify ──► drain thread
//!
//!  stop signal ──► on_stop_signal ──► stop_requested = true ──► WakePipe::notify
//! ```
//!
//! Every handler entry bumps [`IN_FLIGHT`] before loading the pointer and
//! drops it afterwards. [`retract`] nulls the pointer and waits for the
//! counter to reach zero, after which no handler can still hold a reference
//! and the state may be freed.

#![allow(unsafe_code)]

use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};
use std::sync::Arc;

use super::osutil::{self, ErrnoGuard, WakePipe};
use super::ring::{PushOutcome, SampleRing};

/// State shared between the signal handlers, the drain thread and the
/// controller for one session.
pub struct CaptureState {
    pub ring: SampleRing,
    pub wake: WakePipe,
    /// Set by the stop signal handler.
    pub stop_requested: AtomicBool,
    /// Set by the controller when the drain thread must exit.
    pub shutdown: AtomicBool,
}

impl CaptureState {
    #[must_use]
    pub fn new(ring_capacity: usize, wake: WakePipe) -> Self {
        Self {
            ring: SampleRing::new(ring_capacity),
            wake,
            stop_requested: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
        }
    }
}

static ACTIVE: AtomicPtr<CaptureState> = AtomicPtr::new(ptr::null_mut());
static IN_FLIGHT: AtomicUsize = AtomicUsize::new(0);

struct InFlight;

impl InFlight {
    fn enter() -> Self {
        IN_FLIGHT.fetch_add(1, Ordering::SeqCst);
        InFlight
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        IN_FLIGHT.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Run `f` against the published state, if any.
fn with_active<R>(f: impl FnOnce(&CaptureState) -> R) -> Option<R> {
    let _in_flight = InFlight::enter();
    let state = ACTIVE.load(Ordering::SeqCst);
    // Non-null only between publish and retract; retract waits for
    // IN_FLIGHT to drain before the owner may drop the Arc.
    unsafe { state.as_ref() }.map(f)
}

/// Make `state` the target of every handler.
///
/// Returns `false` if another session is still published.
pub fn publish(state: &Arc<CaptureState>) -> bool {
    let raw = Arc::as_ptr(state).cast_mut();
    ACTIVE.compare_exchange(ptr::null_mut(), raw, Ordering::SeqCst, Ordering::SeqCst).is_ok()
}

/// Detach `state` and wait until no handler still references it.
pub fn retract(state: &Arc<CaptureState>) {
    let raw = Arc::as_ptr(state).cast_mut();
    let _ = ACTIVE.compare_exchange(raw, ptr::null_mut(), Ordering::SeqCst, Ordering::SeqCst);
    while IN_FLIGHT.load(Ordering::SeqCst) != 0 {
        std::thread::yield_now();
    }
}

/// Append one program counter to the active session.
///
/// Async-signal-safe; this is what the tick handler calls, and it may also
/// be called directly to inject samples, for instance with
/// [`TickSource::Manual`](crate::TickSource::Manual). Returns `false` when
/// no session is active or the ring was full.
pub fn record_sample(pc: usize) -> bool {
    with_active(|state| match state.ring.push(pc) {
        PushOutcome::Stored => true,
        PushOutcome::Filled => {
            state.wake.notify();
            true
        }
        PushOutcome::Rejected => {
            state.wake.notify();
            false
        }
    })
    .unwrap_or(false)
}

/// `SIGPROF` handler. Stays installed for the life of the process and is
/// inert while no session is published.
pub extern "C" fn on_tick(
    _sig: libc::c_int,
    _info: *mut libc::siginfo_t,
    context: *mut libc::c_void,
) {
    let _errno = ErrnoGuard::save();
    if let Some(pc) = unsafe { osutil::interrupted_pc(context) } {
        record_sample(pc);
    }
}

/// Stop signal handler: flags the request and wakes the drain thread, which
/// finalizes the session outside signal context.
pub extern "C" fn on_stop_signal(
    _sig: libc::c_int,
    _info: *mut libc::siginfo_t,
    _context: *mut libc::c_void,
) {
    let _errno = ErrnoGuard::save();
    with_active(|state| {
        state.stop_requested.store(true, Ordering::Release);
        state.wake.notify();
    });
}
