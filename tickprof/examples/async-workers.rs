//! Multi-threaded Tokio application profiled for its whole lifetime
//!
//! Well-behaved tasks mostly sleep; one task does CPU-bound work on a
//! worker thread. `ITIMER_PROF` counts CPU time of the whole process, so
//! ticks land on whichever worker is burning CPU and the blocking task
//! dominates the trace.
//!
//! Run with: cargo run --release --example async-workers
//! Stop early from another terminal: kill -USR2 $(pgrep async-workers)

use std::time::Duration;
use tokio::time::sleep;

#[tokio::main]
async fn main() {
    env_logger::init();

    let output = std::env::var("TICKPROF_OUTPUT").unwrap_or_else(|_| "/tmp/async.prof".into());
    let config = tickprof::ProfilerConfig::from_env().with_output(&output);
    if let Err(e) = tickprof::start_with(config) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
    println!("profiling into {output} (pid {})", std::process::id());

    for i in 0..8 {
        tokio::spawn(well_behaved_task(i));
    }
    let blocking = tokio::spawn(blocking_task());

    for round in 0..5 {
        for i in 0..10 {
            tokio::spawn(quick_task(round, i));
        }
        sleep(Duration::from_secs(1)).await;
    }
    let _ = blocking.await;

    match tickprof::stop() {
        Some(stats) => println!("{} samples written to {}", stats.samples_written, output),
        None => println!("session already stopped by signal"),
    }
}

/// Mostly awaiting, negligible CPU
async fn well_behaved_task(id: u32) {
    for _ in 0..50 {
        sleep(Duration::from_millis(100)).await;
        let _result = std::hint::black_box((0..1000).sum::<u64>());
    }
    println!("task {id} complete");
}

/// CPU-bound work that never yields
#[inline(never)]
async fn blocking_task() {
    for _ in 0..5 {
        sleep(Duration::from_millis(500)).await;

        let start = std::time::Instant::now();
        let mut result = 0u64;
        while start.elapsed() < Duration::from_millis(400) {
            for _ in 0..100_000 {
                result = result.wrapping_add(std::hint::black_box(1));
            }
        }
        println!("blocking round finished (result: {result})");
    }
}

async fn quick_task(round: u32, id: u32) {
    sleep(Duration::from_millis(10)).await;
    let _result = (0..100).sum::<u64>();
    if id == 0 {
        println!("quick batch {round} complete");
    }
}
