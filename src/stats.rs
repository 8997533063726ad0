//! Latency sample store and reporting.
//!
//! One slot per request id. A slot holds the send tick while the request is
//! in flight and the elapsed ticks once its response arrives.

use crate::error::ProtocolError;
use crate::runtime::Clock;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Empty,
    InFlight { sent_at: u64 },
    Done { elapsed: u64 },
}

/// Fixed-capacity per-request latency samples.
#[derive(Debug)]
pub struct LatencySamples {
    slots: Vec<Slot>,
    completed: usize,
}

impl LatencySamples {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![Slot::Empty; capacity],
            completed: 0,
        }
    }

    /// Number of slots holding an elapsed value.
    pub fn completed(&self) -> usize {
        self.completed
    }

    /// Record the send tick of request `rrid`.
    ///
    /// # Panics
    /// Panics if `rrid` is outside the store.
    pub fn record_send(&mut self, rrid: u32, now: u64) {
        self.slots[rrid as usize] = Slot::InFlight { sent_at: now };
    }

    /// Turn the slot of `rrid` into an elapsed duration and return it.
    pub fn record_response(&mut self, rrid: u32, now: u64) -> Result<u64, ProtocolError> {
        let slot = self
            .slots
            .get_mut(rrid as usize)
            .ok_or(ProtocolError::UnknownRequest(rrid))?;

        match *slot {
            Slot::InFlight { sent_at } => {
                let elapsed = now.saturating_sub(sent_at);
                *slot = Slot::Done { elapsed };
                self.completed += 1;
                Ok(elapsed)
            }
            Slot::Empty | Slot::Done { .. } => Err(ProtocolError::UnknownRequest(rrid)),
        }
    }

    /// Elapsed values of all completed requests, in request id order.
    pub fn into_elapsed(self) -> Vec<u64> {
        self.slots
            .into_iter()
            .filter_map(|slot| match slot {
                Slot::Done { elapsed } => Some(elapsed),
                _ => None,
            })
            .collect()
    }
}

/// Summary statistics over a sample set, in ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyStats {
    pub count: usize,
    pub min: u64,
    pub max: u64,
    pub avg: u64,
    pub median: u64,
}

impl LatencyStats {
    /// Sort `samples` in place and summarize them. Returns `None` if empty.
    pub fn compute(samples: &mut [u64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        samples.sort_unstable();

        let count = samples.len();
        let mid = count / 2;
        let median = if count % 2 == 0 {
            ((samples[mid - 1] as u128 + samples[mid] as u128) / 2) as u64
        } else {
            samples[mid]
        };
        let sum: u128 = samples.iter().map(|&t| t as u128).sum();

        Some(Self {
            count,
            min: samples[0],
            max: samples[count - 1],
            avg: (sum / count as u128) as u64,
            median,
        })
    }
}

/// One statistic in raw ticks and microseconds.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Measure {
    pub ticks: u64,
    pub usecs: f64,
}

impl Measure {
    fn new(ticks: u64, clock: &impl Clock) -> Self {
        Self {
            ticks,
            usecs: clock.to_usecs(ticks),
        }
    }
}

/// Run parameters echoed into the report.
#[derive(Debug, Clone, Serialize)]
pub struct RunParams {
    pub server: String,
    pub burst: u32,
    pub nmessages: u32,
    pub req_size: u16,
    pub res_size: u16,
}

/// Final benchmark report.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub started_at: String,
    pub clock: &'static str,
    pub params: RunParams,
    pub avg: Measure,
    pub median: Measure,
    pub min: Measure,
    pub max: Measure,
    pub max_in_flight: u32,
    pub elapsed_secs: f64,
    pub messages_per_sec: f64,
}

impl Report {
    pub fn new(
        started_at: chrono::DateTime<chrono::Local>,
        params: RunParams,
        stats: &LatencyStats,
        max_in_flight: u32,
        elapsed: Duration,
        clock: &impl Clock,
    ) -> Self {
        let elapsed_secs = elapsed.as_secs_f64();
        let messages_per_sec = if elapsed_secs > 0.0 {
            stats.count as f64 / elapsed_secs
        } else {
            0.0
        };

        Self {
            started_at: started_at.to_rfc3339(),
            clock: clock.name(),
            params,
            avg: Measure::new(stats.avg, clock),
            median: Measure::new(stats.median, clock),
            min: Measure::new(stats.min, clock),
            max: Measure::new(stats.max, clock),
            max_in_flight,
            elapsed_secs,
            messages_per_sec,
        }
    }

    pub fn render_text(&self) -> String {
        format!(
            "TICKS: avg:{} ({:.6} usecs) med:{} ({:.6} usecs) min:{} ({:.6} usecs) max:{} ({:.6} usecs)\n\
             messages:{} elapsed:{:.6}s rate:{:.1} msg/s max_in_flight:{}",
            self.avg.ticks,
            self.avg.usecs,
            self.median.ticks,
            self.median.usecs,
            self.min.ticks,
            self.min.usecs,
            self.max.ticks,
            self.max.usecs,
            self.params.nmessages,
            self.elapsed_secs,
            self.messages_per_sec,
            self.max_in_flight,
        )
    }

    pub fn render_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
