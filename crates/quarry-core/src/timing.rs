//! Execution-time logging for expensive calls.

use std::time::Instant;
use tracing::debug;

/// Run `f`, logging how long it took under `label`.
pub fn timed<T>(label: &str, f: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let out = f();
    debug!(
        op = label,
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        "Timed call finished"
    );
    out
}
