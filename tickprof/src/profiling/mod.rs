//! Recording core
//!
//! - `ring`: lock-free sample ring written from signal context
//! - `capture`: signal handlers and the process-wide registration point
//! - `drain`: drain thread and the sink that owns the trace writer
//! - `osutil`: signal, pipe and timer syscalls
//! - `session`: start/stop controller

pub mod capture;
pub mod drain;
pub mod osutil;
pub mod ring;
pub mod session;

pub use capture::record_sample;
pub use ring::{PushOutcome, SampleRing};
pub use session::{
    active_session, flush, is_active, start, start_with, stop, stop_session, ProfilerGuard,
    SessionStats,
};
