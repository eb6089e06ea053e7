//! Session configuration
//!
//! A [`ProfilerConfig`] is built either in code (`Default` plus the `with_*`
//! builders) or from `TICKPROF_*` environment variables, and checked by
//! [`ProfilerConfig::validate`] before any process-wide state is touched.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::warn;
use tickprof_common::{DEFAULT_RING_CAPACITY, DEFAULT_SAMPLE_RATE_HZ};

use crate::domain::{ProfilerError, Signal};

/// Trace path used when no output is configured.
pub const DEFAULT_TRACE_PATH: &str = "/tmp/tickprof.bin";

/// Highest accepted tick rate.
pub const MAX_FREQUENCY_HZ: u32 = 10_000;

/// Default poll timeout of the drain thread.
pub const DEFAULT_DRAIN_INTERVAL: Duration = Duration::from_millis(50);

pub const ENV_OUTPUT: &str = "TICKPROF_OUTPUT";
pub const ENV_FREQUENCY_HZ: &str = "TICKPROF_FREQUENCY_HZ";
pub const ENV_TICK_SOURCE: &str = "TICKPROF_TICK_SOURCE";
pub const ENV_RING_CAPACITY: &str = "TICKPROF_RING_CAPACITY";
pub const ENV_STOP_SIGNAL: &str = "TICKPROF_STOP_SIGNAL";
pub const ENV_DRAIN_INTERVAL_MS: &str = "TICKPROF_DRAIN_INTERVAL_MS";

/// Where sampling ticks come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TickSource {
    /// `ITIMER_PROF`: one `SIGPROF` per period of consumed CPU time.
    #[default]
    CpuTime,
    /// No timer. Samples only arrive through [`crate::record_sample`].
    Manual,
}

impl TickSource {
    fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "cpu" | "cputime" | "cpu-time" | "prof" => Some(TickSource::CpuTime),
            "manual" | "none" => Some(TickSource::Manual),
            _ => None,
        }
    }
}

/// Configuration of one profiling session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfilerConfig {
    /// Trace file, truncated on start.
    pub output: PathBuf,
    /// Tick rate in Hz.
    pub frequency_hz: u32,
    pub tick_source: TickSource,
    /// Ring slots; power of two.
    pub ring_capacity: usize,
    /// Signal that requests an asynchronous stop, `None` to disable.
    pub stop_signal: Option<Signal>,
    /// How long the drain thread sleeps when no wake-up arrives.
    pub drain_interval: Duration,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from(DEFAULT_TRACE_PATH),
            frequency_hz: DEFAULT_SAMPLE_RATE_HZ,
            tick_source: TickSource::CpuTime,
            ring_capacity: DEFAULT_RING_CAPACITY,
            stop_signal: Some(Signal::USR2),
            drain_interval: DEFAULT_DRAIN_INTERVAL,
        }
    }
}

impl ProfilerConfig {
    /// Defaults with a different output path.
    #[must_use]
    pub fn new(output: impl AsRef<Path>) -> Self {
        Self::default().with_output(output)
    }

    #[must_use]
    pub fn with_output(mut self, output: impl AsRef<Path>) -> Self {
        self.output = output.as_ref().to_path_buf();
        self
    }

    #[must_use]
    pub fn with_frequency_hz(mut self, frequency_hz: u32) -> Self {
        self.frequency_hz = frequency_hz;
        self
    }

    #[must_use]
    pub fn with_tick_source(mut self, tick_source: TickSource) -> Self {
        self.tick_source = tick_source;
        self
    }

    #[must_use]
    pub fn with_ring_capacity(mut self, ring_capacity: usize) -> Self {
        self.ring_capacity = ring_capacity;
        self
    }

    #[must_use]
    pub fn with_stop_signal(mut self, stop_signal: Option<Signal>) -> Self {
        self.stop_signal = stop_signal;
        self
    }

    #[must_use]
    pub fn with_drain_interval(mut self, drain_interval: Duration) -> Self {
        self.drain_interval = drain_interval;
        self
    }

    /// Timer period in microseconds (`1_000_000 / frequency_hz`).
    #[must_use]
    pub fn tick_period_us(&self) -> u64 {
        1_000_000 / u64::from(self.frequency_hz.max(1))
    }

    /// Reject configurations a session cannot run with.
    ///
    /// # Errors
    /// Returns [`ProfilerError::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> Result<(), ProfilerError> {
        if self.output.as_os_str().is_empty() {
            return Err(ProfilerError::InvalidConfig("output path is empty".into()));
        }
        if self.frequency_hz == 0 || self.frequency_hz > MAX_FREQUENCY_HZ {
            return Err(ProfilerError::InvalidConfig(format!(
                "frequency_hz must be in 1..={MAX_FREQUENCY_HZ}, got {}",
                self.frequency_hz
            )));
        }
        if self.ring_capacity < 2 || !self.ring_capacity.is_power_of_two() {
            return Err(ProfilerError::InvalidConfig(format!(
                "ring_capacity must be a power of two >= 2, got {}",
                self.ring_capacity
            )));
        }
        if let Some(signal) = self.stop_signal {
            if !signal.is_catchable() {
                return Err(ProfilerError::InvalidConfig(format!(
                    "stop signal {signal} cannot be caught"
                )));
            }
            if signal == Signal::PROF {
                return Err(ProfilerError::InvalidConfig(
                    "stop signal collides with the tick signal SIGPROF".into(),
                ));
            }
        }
        if self.drain_interval.is_zero() {
            return Err(ProfilerError::InvalidConfig("drain_interval must be non-zero".into()));
        }
        Ok(())
    }

    /// Defaults overridden by `TICKPROF_*` environment variables.
    ///
    /// Values that fail to parse are logged and skipped; range checks are
    /// left to [`validate`](Self::validate).
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(output) = lookup(ENV_OUTPUT).filter(|v| !v.is_empty()) {
            config.output = PathBuf::from(output);
        }
        if let Some(value) = lookup(ENV_FREQUENCY_HZ) {
            match value.trim().parse() {
                Ok(hz) => config.frequency_hz = hz,
                Err(_) => warn!("Ignoring {ENV_FREQUENCY_HZ}={value:?}: not a number"),
            }
        }
        if let Some(value) = lookup(ENV_TICK_SOURCE) {
            match TickSource::parse(&value) {
                Some(source) => config.tick_source = source,
                None => warn!("Ignoring {ENV_TICK_SOURCE}={value:?}: expected cpu or manual"),
            }
        }
        if let Some(value) = lookup(ENV_RING_CAPACITY) {
            match value.trim().parse() {
                Ok(capacity) => config.ring_capacity = capacity,
                Err(_) => warn!("Ignoring {ENV_RING_CAPACITY}={value:?}: not a number"),
            }
        }
        if let Some(value) = lookup(ENV_STOP_SIGNAL) {
            if value.trim().eq_ignore_ascii_case("none") {
                config.stop_signal = None;
            } else {
                match Signal::parse(&value) {
                    Some(signal) => config.stop_signal = Some(signal),
                    None => warn!("Ignoring {ENV_STOP_SIGNAL}={value:?}: unknown signal"),
                }
            }
        }
        if let Some(value) = lookup(ENV_DRAIN_INTERVAL_MS) {
            match value.trim().parse() {
                Ok(ms) => config.drain_interval = Duration::from_millis(ms),
                Err(_) => warn!("Ignoring {ENV_DRAIN_INTERVAL_MS}={value:?}: not a number"),
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ProfilerConfig::default();
        assert_eq!(config.output, PathBuf::from("/tmp/tickprof.bin"));
        assert_eq!(config.frequency_hz, 100);
        assert_eq!(config.ring_capacity, 1024);
        assert_eq!(config.tick_period_us(), 10_000);
        assert_eq!(config.stop_signal, Some(Signal::USR2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let base = ProfilerConfig::default();
        assert!(base.clone().with_frequency_hz(0).validate().is_err());
        assert!(base.clone().with_frequency_hz(10_001).validate().is_err());
        assert!(base.clone().with_ring_capacity(1000).validate().is_err());
        assert!(base.clone().with_ring_capacity(1).validate().is_err());
        assert!(base.clone().with_stop_signal(Some(Signal::PROF)).validate().is_err());
        assert!(base.clone().with_stop_signal(Some(Signal(libc::SIGKILL))).validate().is_err());
        assert!(base.clone().with_drain_interval(Duration::ZERO).validate().is_err());
        assert!(base.clone().with_output("").validate().is_err());
        assert!(base.with_stop_signal(None).with_ring_capacity(2).validate().is_ok());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = ProfilerConfig::from_lookup(lookup_from(&[
            (ENV_OUTPUT, "/var/tmp/run.bin"),
            (ENV_FREQUENCY_HZ, "250"),
            (ENV_TICK_SOURCE, "manual"),
            (ENV_RING_CAPACITY, "64"),
            (ENV_STOP_SIGNAL, "USR1"),
            (ENV_DRAIN_INTERVAL_MS, "5"),
        ]));
        assert_eq!(config.output, PathBuf::from("/var/tmp/run.bin"));
        assert_eq!(config.frequency_hz, 250);
        assert_eq!(config.tick_source, TickSource::Manual);
        assert_eq!(config.ring_capacity, 64);
        assert_eq!(config.stop_signal, Some(Signal::USR1));
        assert_eq!(config.drain_interval, Duration::from_millis(5));
    }

    #[test]
    fn test_from_lookup_ignores_garbage() {
        let config = ProfilerConfig::from_lookup(lookup_from(&[
            (ENV_FREQUENCY_HZ, "fast"),
            (ENV_TICK_SOURCE, "wallclock"),
            (ENV_STOP_SIGNAL, "none"),
        ]));
        assert_eq!(config.frequency_hz, 100);
        assert_eq!(config.tick_source, TickSource::CpuTime);
        assert_eq!(config.stop_signal, None);
    }
}
