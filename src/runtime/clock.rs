//! Tick sources for latency timestamps.
//!
//! Ticks are opaque, monotonically increasing integers. Only the clock that
//! produced them knows how to turn them into microseconds.

use std::time::{Duration, Instant};

/// A monotonic tick counter.
pub trait Clock {
    /// Current tick value.
    fn now(&self) -> u64;

    /// Convert a tick delta to microseconds.
    fn to_usecs(&self, ticks: u64) -> f64;

    /// Short name used in reports.
    fn name(&self) -> &'static str;
}

/// Nanoseconds since construction, backed by `Instant`.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }

    fn to_usecs(&self, ticks: u64) -> f64 {
        ticks as f64 / 1000.0
    }

    fn name(&self) -> &'static str {
        "monotonic"
    }
}

/// x86_64 time-stamp counter, calibrated against `Instant` at startup.
#[cfg(target_arch = "x86_64")]
#[derive(Debug, Clone, Copy)]
pub struct TscClock {
    ticks_per_usec: f64,
}

#[cfg(target_arch = "x86_64")]
impl TscClock {
    /// Default calibration window.
    pub const CALIBRATION: Duration = Duration::from_millis(100);

    /// Measure the TSC rate over `window`.
    pub fn calibrate(window: Duration) -> Self {
        let start = Instant::now();
        let tsc_start = rdtsc();
        std::thread::sleep(window);
        let tsc_end = rdtsc();
        let elapsed_usecs = start.elapsed().as_nanos() as f64 / 1000.0;

        let ticks_per_usec = if elapsed_usecs > 0.0 {
            tsc_end.wrapping_sub(tsc_start) as f64 / elapsed_usecs
        } else {
            1.0
        };
        Self { ticks_per_usec }
    }

    pub fn ticks_per_usec(&self) -> f64 {
        self.ticks_per_usec
    }
}

#[cfg(target_arch = "x86_64")]
fn rdtsc() -> u64 {
    // SAFETY: RDTSC is available on every x86_64 CPU and has no memory effects.
    unsafe { core::arch::x86_64::_rdtsc() }
}

#[cfg(target_arch = "x86_64")]
impl Clock for TscClock {
    fn now(&self) -> u64 {
        rdtsc()
    }

    fn to_usecs(&self, ticks: u64) -> f64 {
        ticks as f64 / self.ticks_per_usec
    }

    fn name(&self) -> &'static str {
        "tsc"
    }
}

/// The tick source selected for a run.
#[derive(Debug, Clone, Copy)]
pub enum TickSource {
    Monotonic(MonotonicClock),
    #[cfg(target_arch = "x86_64")]
    Tsc(TscClock),
}

impl Clock for TickSource {
    fn now(&self) -> u64 {
        match self {
            TickSource::Monotonic(c) => c.now(),
            #[cfg(target_arch = "x86_64")]
            TickSource::Tsc(c) => c.now(),
        }
    }

    fn to_usecs(&self, ticks: u64) -> f64 {
        match self {
            TickSource::Monotonic(c) => c.to_usecs(ticks),
            #[cfg(target_arch = "x86_64")]
            TickSource::Tsc(c) => c.to_usecs(ticks),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            TickSource::Monotonic(c) => c.name(),
            #[cfg(target_arch = "x86_64")]
            TickSource::Tsc(c) => c.name(),
        }
    }
}
