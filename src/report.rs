//! Timing results and correctness validation.

use crate::topology::Topology;
use hdrhistogram::Histogram;
use std::time::Duration;

/// Outcome of one topology × concurrency-degree benchmark.
#[derive(Clone)]
pub struct BenchmarkResult {
    pub topology: Topology,
    /// Effective concurrency degree (after clamping).
    pub degree: usize,
    /// Elements per work unit.
    pub elements: usize,
    /// Trials run; the reported time is the minimum across them.
    pub repeats: u32,
    /// Best (minimum) Submit+WaitAll wall-clock time across trials.
    pub best: Duration,
    /// Full per-trial latency distribution, in nanoseconds.
    pub trials: Histogram<u64>,
    /// `Some(true)` if output validation passed, `Some(false)` if it
    /// found mismatches, `None` when the workload has no reference.
    pub verified: Option<bool>,
    /// Total mismatching elements across all outputs.
    pub mismatches: usize,
}

impl BenchmarkResult {
    /// Elements completed per second at the best observed time.
    pub fn throughput(&self) -> f64 {
        let secs = self.best.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        (self.elements * self.degree) as f64 / secs
    }

    /// Median trial time, for spotting noisy runs.
    pub fn median(&self) -> Duration {
        Duration::from_nanos(self.trials.value_at_quantile(0.5))
    }
}

impl std::fmt::Debug for BenchmarkResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BenchmarkResult")
            .field("topology", &self.topology)
            .field("degree", &self.degree)
            .field("best", &self.best)
            .field("verified", &self.verified)
            .finish()
    }
}

/// Collects results and renders the line-oriented report.
#[derive(Debug, Default)]
pub struct Reporter {
    results: Vec<BenchmarkResult>,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, result: BenchmarkResult) {
        self.results.push(result);
    }

    pub fn results(&self) -> &[BenchmarkResult] {
        &self.results
    }

    /// One stdout line per topology × degree: label, degree, best
    /// seconds, throughput, and a check mark where validation ran.
    pub fn print_table(&self) {
        for r in &self.results {
            let check = match r.verified {
                Some(true) => "ok",
                Some(false) => "MISMATCH",
                None => "-",
            };
            println!(
                "{:>36} (n={:>3}): best {:.6} s  median {:.6} s  {:>12.2} elem/s  [{}]",
                r.topology.label(),
                r.degree,
                r.best.as_secs_f64(),
                r.median().as_secs_f64(),
                r.throughput(),
                check,
            );
        }
    }
}

/// First mismatching element of a failed comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mismatch {
    pub index: usize,
    pub got: u32,
    pub want: u32,
}

/// Result of a full element-wise scan.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyCheck {
    pub mismatches: usize,
    pub first: Option<Mismatch>,
}

impl CopyCheck {
    pub fn passed(&self) -> bool {
        self.mismatches == 0
    }

    /// Fixed-format diagnostics on stderr; never halts anything.
    pub fn emit(&self, label: &str, total: usize) {
        if let Some(m) = self.first {
            eprintln!(
                "MisMatch! {}: dst[{}] == {}, want {}",
                label, m.index, m.got, m.want
            );
            eprintln!(
                "Error: found {} mismatches / {} values in {}",
                self.mismatches, total, label
            );
        }
    }
}

/// Element-wise comparison of an output against its reference.
///
/// Scans the whole range rather than aborting at the first difference,
/// so the total mismatch count can be reported.
pub fn validate_copy(output: &[u32], reference: &[u32]) -> CopyCheck {
    let mut check = CopyCheck::default();
    for (i, (&got, &want)) in output.iter().zip(reference.iter()).enumerate() {
        if got != want {
            if check.first.is_none() {
                check.first = Some(Mismatch {
                    index: i,
                    got,
                    want,
                });
            }
            check.mismatches += 1;
        }
    }
    check
}

/// Exact integer aggregate comparison for reduction outputs.
///
/// Wrapping sums on both sides, so the comparison is exact with no
/// floating tolerance.
pub fn validate_reduce(output: &[u32], reference: &[u32]) -> bool {
    let out_sum = output.iter().fold(0u32, |a, &v| a.wrapping_add(v));
    let ref_sum = reference.iter().fold(0u32, |a, &v| a.wrapping_add(v));
    out_sum == ref_sum
}

/// First element exceeding the relative-error tolerance, with both
/// values, for float workloads.
pub fn validate_relative(
    output: &[f32],
    reference: &[f32],
    tolerance: f64,
) -> Option<(usize, f32, f32)> {
    for (i, (&got, &want)) in output.iter().zip(reference.iter()).enumerate() {
        let denom = want.abs().max(f32::MIN_POSITIVE) as f64;
        let rel = ((got - want).abs() as f64) / denom;
        if rel > tolerance {
            return Some((i, got, want));
        }
    }
    None
}
