//! Single-threaded CPU workload profiled with a scoped session
//!
//! Two functions share the CPU roughly 3:1, which should be visible in the
//! hotspot report.
//!
//! Run with: cargo run --release --example burn -- /tmp/burn.prof
//! Inspect:  cargo run --release -- inspect /tmp/burn.prof

use std::hint::black_box;
use std::time::{Duration, Instant};

use tickprof::{ProfilerConfig, ProfilerGuard};

#[inline(never)]
fn heavy(budget: Duration) -> u64 {
    let start = Instant::now();
    let mut acc = 0u64;
    while start.elapsed() < budget {
        for i in 0..10_000u64 {
            acc = black_box(acc.wrapping_mul(31).wrapping_add(i));
        }
    }
    acc
}

#[inline(never)]
fn light(budget: Duration) -> u64 {
    let start = Instant::now();
    let mut acc = 1u64;
    while start.elapsed() < budget {
        for i in 1..10_000u64 {
            acc = black_box(acc ^ i.rotate_left(7));
        }
    }
    acc
}

fn main() {
    env_logger::init();

    let output = std::env::args().nth(1).unwrap_or_else(|| "/tmp/burn.prof".to_string());
    let guard = match ProfilerGuard::start(ProfilerConfig::new(&output)) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    let mut total = 0u64;
    for round in 0..10 {
        total ^= heavy(Duration::from_millis(150));
        total ^= light(Duration::from_millis(50));
        println!("round {round} done");
    }
    black_box(total);

    if let Some(stats) = guard.stop() {
        println!(
            "{} samples written to {} ({} dropped)",
            stats.samples_written,
            stats.path.display(),
            stats.samples_dropped
        );
    }
}
