//! Wall-clock nanoseconds since the Unix epoch.
//!
//! Latency is the subscriber's wall clock minus the publisher's embedded
//! timestamp. The two probes may run on different hosts; any clock skew
//! between them lands in the result.

use std::time::{SystemTime, UNIX_EPOCH};

pub fn now_unix_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
