//! Program profiled by the default session alone
//!
//! There is no profiler call besides linking `tickprof-autostart`. Hex
//! addresses on the command line are injected as samples, which is how a
//! `TICKPROF_TICK_SOURCE=manual` session is fed; without them the program
//! burns CPU for a moment under the interval timer.
//!
//! Run with: TICKPROF_OUTPUT=/tmp/demo.prof cargo run -p tickprof-autostart

use std::hint::black_box;
use std::time::{Duration, Instant};

#[inline(never)]
fn spin(budget: Duration) -> u64 {
    let start = Instant::now();
    let mut acc = 0u64;
    while start.elapsed() < budget {
        for i in 0..10_000u64 {
            acc = black_box(acc.wrapping_mul(31).wrapping_add(i));
        }
    }
    acc
}

fn parse_pc(arg: &str) -> Option<usize> {
    usize::from_str_radix(arg.trim_start_matches("0x"), 16).ok()
}

fn main() {
    let Some(id) = tickprof_autostart::default_session() else {
        eprintln!("error: no default session is running");
        std::process::exit(1);
    };

    let pcs: Vec<usize> = std::env::args().skip(1).filter_map(|arg| parse_pc(&arg)).collect();
    if pcs.is_empty() {
        black_box(spin(Duration::from_millis(300)));
    } else {
        for pc in pcs {
            tickprof::record_sample(pc);
        }
    }
    println!("{id} finishes at exit");
}
