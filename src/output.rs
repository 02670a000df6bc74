//! Process stdout protocol: one readiness line, then one JSON result.
//!
//! stdout is reserved for the harness orchestrating the probes; everything
//! else the probes say goes to stderr via tracing.

use std::io::{self, Write};

use crate::stats::BenchmarkResult;

/// Sentinel consumed by the external harness to synchronize probe startup.
pub const READY: &[u8] = b"READY\n";

/// Write the readiness sentinel. Called exactly once per run, after the
/// session (and, for the subscriber, the subscription acknowledgement) is
/// fully established and before any timed work.
pub fn signal_ready() -> io::Result<()> {
    let mut out = io::stdout();
    out.write_all(READY)?;
    out.flush()
}

/// Write the single result object. Called exactly once, at the end of a
/// successful run; failed runs emit nothing here.
pub fn write_result(result: &BenchmarkResult) -> io::Result<()> {
    let mut out = io::stdout();
    serde_json::to_writer(&mut out, result)?;
    out.write_all(b"\n")?;
    out.flush()
}
