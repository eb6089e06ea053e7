//! # tickprof-autostart - Default Profiling Session
//!
//! Linking this crate profiles the whole process. A constructor starts a
//! session from [`ProfilerConfig::from_env`] before `main`, and a destructor
//! stops it at exit, so the trace is finalized without any call from the
//! program. With no `TICKPROF_*` variables set, the trace goes to
//! [`tickprof::DEFAULT_TRACE_PATH`].
//!
//! Only programs that should be profiled depend on this crate. Tools that
//! read traces link `tickprof` alone.
//!
//! Rust links a dependency only when it is named, so mention it once:
//!
//! ```ignore
//! use tickprof_autostart as _;
//! ```

use std::sync::OnceLock;

use ctor::{ctor, dtor};
use tickprof::{ProfilerConfig, SessionId};

static DEFAULT_SESSION: OnceLock<SessionId> = OnceLock::new();

/// The session started at process load, if it started.
#[must_use]
pub fn default_session() -> Option<SessionId> {
    DEFAULT_SESSION.get().copied()
}

// Runs before `main`, so no logger is set up yet
#[ctor]
fn start_default_session() {
    match tickprof::start_with(ProfilerConfig::from_env()) {
        Ok(id) => {
            let _ = DEFAULT_SESSION.set(id);
        }
        Err(e) => eprintln!("tickprof: failed to start default session: {e}"),
    }
}

/// A session the program started itself replaced this one and is left to
/// its owner.
#[dtor]
fn stop_default_session() {
    if let Some(id) = default_session() {
        tickprof::stop_session(id);
    }
}
