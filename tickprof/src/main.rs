//! # tickprof - Trace Inspection Entry Point
//!
//! Offline companion of the recorder library:
//! - **inspect**: header summary, hottest addresses, per-module totals (text or JSON)
//! - **samples**: raw addresses for external symbolizers
//! - **maps**: the memory map captured at the end of the session

use anyhow::Result;
use clap::Parser;
use std::io::{self, BufWriter, Write};

use tickprof::cli::{run_command, Args};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;

fn main() {
    env_logger::init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            std::process::exit(if e.use_stderr() { EXIT_USAGE } else { EXIT_SUCCESS });
        }
    };

    std::process::exit(match run(&args) {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            EXIT_ERROR
        }
    });
}

fn run(args: &Args) -> Result<()> {
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    run_command(&args.command, &mut out)?;
    out.flush()?;
    Ok(())
}
