//! mqtt-bench library crate exposing modules for reuse and testing.

pub mod clock;
pub mod error;
pub mod logging;
pub mod options;
pub mod output;
pub mod payload;
pub mod roles;
pub mod session;
pub mod stats;
pub mod wire;

// Optional re-exports for convenience in downstream code/tests
pub use error::ProbeError;
pub use options::ClientOptions;
pub use stats::{BenchmarkResult, Recorder, Unit};
