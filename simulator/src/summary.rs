//! Console summary of a finished sweep.

use std::fmt::Write;

use queuesim::sweep::LevelAggregate;
use queuesim::SweepResult;

const HEADER: [&str; 8] = [
    "level", "rate", "runs", "failed", "unstable", "mean", "p99", "throughput",
];

/// Renders one row per load level, followed by every failed run.
pub fn format_summary(result: &SweepResult) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>5} {:>9} {:>5} {:>6} {:>8} {:>10} {:>10} {:>10}",
        HEADER[0], HEADER[1], HEADER[2], HEADER[3], HEADER[4], HEADER[5], HEADER[6], HEADER[7]
    );
    for level in &result.levels {
        let _ = writeln!(out, "{}", format_level(level));
    }
    let failures: Vec<_> = result.failures().collect();
    if !failures.is_empty() {
        let _ = writeln!(out, "\n{} failed run(s):", failures.len());
        for failure in failures {
            let _ = writeln!(out, "  {failure}");
        }
    }
    out
}

fn format_level(level: &LevelAggregate) -> String {
    format!(
        "{:>5} {:>9.4} {:>5} {:>6} {:>8} {:>10.4} {:>10.4} {:>10.4}",
        level.level_index,
        level.load_level,
        level.runs,
        level.failed,
        level.unstable,
        level.mean_latency,
        level.mean_p99,
        level.mean_throughput
    )
}
