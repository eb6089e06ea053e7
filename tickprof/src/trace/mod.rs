//! Trace file encoding and decoding
//!
//! The byte layout lives in `tickprof-common`; this module does the I/O.

pub mod reader;
pub mod writer;

pub use reader::TraceFile;
pub use writer::{FinishedTrace, TraceWriter};
