//! Per-operation measurement and the final benchmark result.

use hdrhistogram::Histogram;
use serde::Serialize;
use tracing::info;

/// Unit label distinguishing the two probes in the result object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Pub,
    Sub,
}

/// Final report, written to stdout exactly once per successful run.
#[derive(Clone, Debug, Serialize)]
pub struct BenchmarkResult {
    pub ops: u64,
    pub ns: u64,
    pub unit: Unit,
    pub bytes: u64,
}

/// Accumulator for one probe run. Owned exclusively by the control loop:
/// the delivery side hands observations over via channels and never touches
/// these counters.
#[derive(Debug)]
pub struct Recorder {
    ops: u64,
    elapsed_ns: u64,
    bytes: u64,
    latency_hist: Histogram<u64>,
}

impl Recorder {
    pub fn new() -> Self {
        Self {
            ops: 0,
            elapsed_ns: 0,
            bytes: 0,
            // 1ns to 60s range, 3 significant digits
            latency_hist: Histogram::new_with_bounds(1, 60_000_000_000, 3).unwrap(),
        }
    }

    /// Record one accepted operation.
    pub fn record(&mut self, latency_ns: u64, bytes: u64) {
        self.ops += 1;
        self.elapsed_ns += latency_ns;
        self.bytes += bytes;
        let _ = self.latency_hist.record(latency_ns);
    }

    pub fn ops(&self) -> u64 {
        self.ops
    }

    /// Freeze the run into its immutable result, logging latency percentiles
    /// on the way out.
    pub fn finish(self, unit: Unit) -> BenchmarkResult {
        let hist = &self.latency_hist;
        info!(
            ops = self.ops,
            p50_ms = format!("{:.3}", hist.value_at_quantile(0.5) as f64 / 1_000_000.0),
            p95_ms = format!("{:.3}", hist.value_at_quantile(0.95) as f64 / 1_000_000.0),
            p99_ms = format!("{:.3}", hist.value_at_quantile(0.99) as f64 / 1_000_000.0),
            "Final probe statistics"
        );
        BenchmarkResult {
            ops: self.ops,
            ns: self.elapsed_ns,
            unit,
            bytes: self.bytes,
        }
    }
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}
