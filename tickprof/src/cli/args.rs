//! CLI argument definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "tickprof",
    version,
    about = "Inspect traces recorded by the tickprof sampling profiler",
    after_help = "\
EXAMPLES:
    tickprof inspect /tmp/tickprof.bin              Top sampled addresses and modules
    tickprof inspect /tmp/tickprof.bin --json       Same report as JSON
    tickprof samples /tmp/tickprof.bin | addr2line -e ./app
    tickprof maps /tmp/tickprof.bin                 Memory map at the time of recording"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Summarize a trace: header, hottest addresses, per-module totals
    Inspect {
        /// Trace file written by a profiling session
        #[arg(value_name = "TRACE")]
        trace: PathBuf,

        /// Number of addresses to list
        #[arg(short = 'n', long, default_value = "20")]
        top: usize,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print every sampled address, one per line, in recording order
    Samples {
        #[arg(value_name = "TRACE")]
        trace: PathBuf,
    },

    /// Print the memory map snapshot stored in the trace
    Maps {
        #[arg(value_name = "TRACE")]
        trace: PathBuf,
    },
}
