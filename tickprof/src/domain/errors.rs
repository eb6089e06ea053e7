//! Structured error types for tickprof
//!
//! Using thiserror for automatic Display implementation and error chaining.

use std::path::PathBuf;

use super::types::Signal;
use thiserror::Error;

/// Failures that prevent a profiling session from starting.
///
/// Only session start is fallible from the caller's point of view. Once a
/// session is running, I/O problems are logged and absorbed.
#[derive(Error, Debug)]
pub enum ProfilerError {
    #[error("Invalid profiler configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to open trace file {}: {source}", path.display())]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to install handler for {signal}: {source}")]
    SignalInstallFailed {
        signal: Signal,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create wake pipe: {0}")]
    PipeFailed(#[source] std::io::Error),

    #[error("Failed to arm profiling timer: {0}")]
    TimerFailed(#[source] std::io::Error),

    #[error("Failed to spawn drain thread: {0}")]
    DrainThreadFailed(#[source] std::io::Error),
}

/// Failures while decoding a trace file.
#[derive(Error, Debug)]
pub enum TraceError {
    #[error("Not a trace file: bad magic {}", String::from_utf8_lossy(.0))]
    BadMagic([u8; 8]),

    #[error("Unsupported pointer size field {0:#010x} (expected 4 or 8)")]
    UnsupportedPointerSize(u32),

    #[error("Truncated {section}: expected {expected} bytes, found {actual}")]
    Truncated { section: &'static str, expected: u64, actual: u64 },

    #[error("Missing MAPSDATA trailer after sample region")]
    MissingMapsTrailer,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_failed_display() {
        let err = ProfilerError::OpenFailed {
            path: PathBuf::from("/nonexistent/trace.bin"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(err.to_string().contains("/nonexistent/trace.bin"));
    }

    #[test]
    fn test_signal_install_display() {
        let err = ProfilerError::SignalInstallFailed {
            signal: Signal::PROF,
            source: std::io::Error::from_raw_os_error(libc::EINVAL),
        };
        assert!(err.to_string().contains("SIGPROF"));
    }

    #[test]
    fn test_os_failures_name_the_start_step() {
        let cases = [
            (ProfilerError::PipeFailed(std::io::Error::from_raw_os_error(libc::EMFILE)), "wake pipe"),
            (ProfilerError::TimerFailed(std::io::Error::from_raw_os_error(libc::EINVAL)), "timer"),
            (
                ProfilerError::DrainThreadFailed(std::io::Error::from_raw_os_error(libc::EAGAIN)),
                "drain thread",
            ),
        ];
        for (err, step) in cases {
            assert!(err.to_string().contains(step), "{err}");
            assert!(std::error::Error::source(&err).is_some(), "{err} lost its cause");
        }
    }

    #[test]
    fn test_trace_error_display() {
        let err = TraceError::BadMagic(*b"TOKIOTRC");
        assert_eq!(err.to_string(), "Not a trace file: bad magic TOKIOTRC");

        let err = TraceError::Truncated { section: "sample region", expected: 40, actual: 16 };
        assert!(err.to_string().contains("sample region"));
    }
}
