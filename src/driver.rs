//! Benchmark driver: the prime/submit/wait/measure state machine.
//!
//! One driver instance owns nothing shared: it borrows a device and a
//! resource pool, builds the streams a topology calls for, and reduces
//! per-trial times with a min fold. Multiple drivers may run on
//! independent host threads against one shared device; the only
//! synchronization between them is whatever the device imposes.

use crate::config::{Config, Workload};
use crate::device::Device;
use crate::error::{Error, Result};
use crate::exec::{Stream, Token};
use crate::pool::{Buffer, ResourcePool};
use crate::report::{validate_copy, validate_reduce, BenchmarkResult, Reporter};
use crate::topology::{DepMode, Topology};
use crate::work::WorkUnit;
use hdrhistogram::Histogram;
use std::sync::Arc;
use std::time::Instant;

// Streams plus the buffers their tasks write, one entry per task.
// For the context-isolation topology each slot also owns its pool, so
// dropping the trial set tears the isolated contexts down.
struct TrialSet {
    streams: Vec<Stream>,
    destinations: Vec<Buffer>,
    source: Option<Buffer>,
    isolated_pools: Vec<ResourcePool>,
}

impl TrialSet {
    fn stream_for(&self, task: usize) -> &Stream {
        if self.streams.len() == 1 {
            &self.streams[0]
        } else {
            &self.streams[task]
        }
    }

    fn wait_all(&self) {
        for stream in &self.streams {
            stream.wait_all();
        }
    }
}

/// Issues work units into an execution-context topology and records
/// best-of-N wall-clock time.
pub struct Driver {
    device: Arc<dyn Device>,
    config: Config,
}

impl Driver {
    pub fn new(device: Arc<dyn Device>, config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self { device, config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    // The shared-source topology is defined by its data sharing, so it
    // always runs copy units; context isolation has no cross-context
    // source, so it always runs delay units. Everything else runs the
    // configured workload.
    fn effective_workload(&self, topology: Topology) -> Workload {
        match topology {
            Topology::OutOfOrderSharedSource => Workload::Copy,
            Topology::MultiContext => Workload::Delay,
            _ => self.config.workload,
        }
    }

    /// Run one topology at the requested concurrency degree.
    ///
    /// Degrees beyond the configured maximum are clamped and reported,
    /// never rejected; the effective degree is in the returned result.
    pub fn run(
        &self,
        pool: &ResourcePool,
        topology: Topology,
        requested_degree: usize,
    ) -> Result<BenchmarkResult> {
        let (degree, clamped) = self.config.clamp_degree(requested_degree);
        if clamped {
            tracing::warn!(
                requested = requested_degree,
                max = self.config.max_degree,
                "concurrency degree clamped"
            );
        }

        let workload = self.effective_workload(topology);
        let set = self.build_trial_set(pool, topology, degree, workload)?;
        let units = self.build_units(&set, degree, workload)?;

        let mut hist = Histogram::<u64>::new_with_max(3_600_000_000_000, 3)
            .map_err(|e| Error::Other(format!("histogram: {}", e)))?;
        let mut best: Option<u64> = None;

        for _ in 0..self.config.repeats {
            self.prime(&set, degree);

            let start = Instant::now();
            self.submit_trial(&set, &units, topology.dep_mode());
            set.wait_all();
            let elapsed = start.elapsed();

            let nanos = elapsed.as_nanos() as u64;
            hist.record(nanos.max(1)).ok();
            best = Some(best.map_or(nanos, |b| b.min(nanos)));
        }

        let (verified, mismatches) = self.validate(&set, workload);

        let result = BenchmarkResult {
            topology,
            degree,
            elements: self.config.elements,
            repeats: self.config.repeats,
            best: std::time::Duration::from_nanos(best.unwrap_or(0)),
            trials: hist,
            verified,
            mismatches,
        };

        self.release(pool, set);
        Ok(result)
    }

    /// Drive topology × degree combinations, recording into `reporter`.
    ///
    /// A topology the device cannot support (missing residency class,
    /// exhausted memory) is reported and skipped; the remaining
    /// combinations still run. Other errors abort the sweep.
    pub fn run_sweep(
        &self,
        pool: &ResourcePool,
        topologies: &[Topology],
        degrees: &[usize],
        reporter: &mut Reporter,
    ) -> Result<()> {
        for &topology in topologies {
            for &degree in degrees {
                match self.run(pool, topology, degree) {
                    Ok(result) => reporter.record(result),
                    Err(e) if e.is_skippable() => {
                        tracing::warn!(topology = topology.label(), error = %e, "skipping topology");
                        eprintln!("skipping {}: {}", topology.label(), e);
                        break;
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(())
    }

    fn build_trial_set(
        &self,
        pool: &ResourcePool,
        topology: Topology,
        degree: usize,
        workload: Workload,
    ) -> Result<TrialSet> {
        let elements = self.config.elements;
        let residency = self.config.residency;

        if topology.isolated_contexts() {
            let mut streams = Vec::with_capacity(degree);
            let mut destinations = Vec::with_capacity(degree);
            let mut pools = Vec::with_capacity(degree);

            for _ in 0..degree {
                let device = self.device.isolated()?;
                let ctx_pool = ResourcePool::new(device.clone());
                let dst = ctx_pool.allocate_one(elements, residency)?;
                streams.push(Stream::new(device, topology.ordering()));
                destinations.push(dst);
                pools.push(ctx_pool);
            }

            return Ok(TrialSet {
                streams,
                destinations,
                source: None,
                isolated_pools: pools,
            });
        }

        let dst_elements = match workload {
            Workload::Reduce => {
                if elements % self.config.reduce_group != 0 {
                    return Err(Error::config(format!(
                        "elements ({}) not divisible by reduce group ({})",
                        elements, self.config.reduce_group
                    )));
                }
                elements / self.config.reduce_group
            }
            _ => elements,
        };

        let destinations = pool.allocate(degree, dst_elements, residency)?;

        let source = if workload == Workload::Delay {
            None
        } else {
            let src = pool.allocate_one(elements, residency)?;
            // Deterministic pattern, uploaded once; the analog of a
            // blocking memcpy before the timed region.
            let pattern: Vec<u32> = (0..elements as u32).collect();
            src.write_from(&pattern);
            Some(src)
        };

        let stream_count = topology.stream_count(degree);
        let streams = (0..stream_count)
            .map(|_| Stream::new(self.device.clone(), topology.ordering()))
            .collect();

        Ok(TrialSet {
            streams,
            destinations,
            source,
            isolated_pools: Vec::new(),
        })
    }

    fn build_units(
        &self,
        set: &TrialSet,
        degree: usize,
        workload: Workload,
    ) -> Result<Vec<WorkUnit>> {
        let mut units = Vec::with_capacity(degree);
        for task in 0..degree {
            let dst = set.destinations[task].clone();
            let unit = match workload {
                Workload::Delay => WorkUnit::delay(dst, self.config.iterations),
                Workload::Copy => {
                    let src = set.source.as_ref().ok_or_else(|| {
                        Error::work("copy workload requires a source buffer")
                    })?;
                    WorkUnit::copy(src.clone(), dst)?
                }
                Workload::Reduce => {
                    let src = set.source.as_ref().ok_or_else(|| {
                        Error::work("reduce workload requires a source buffer")
                    })?;
                    WorkUnit::reduce(src.clone(), dst, self.config.reduce_group)?
                }
            };
            units.push(unit);
        }
        Ok(units)
    }

    // Zero every destination through the stream that will later write
    // it, then wait. Same execution path as the timed region, outside
    // the timed region.
    fn prime(&self, set: &TrialSet, degree: usize) {
        for task in 0..degree {
            let dst = set.destinations[task].clone();
            set.stream_for(task).submit(WorkUnit::fill(dst, 0), &[]);
        }
        set.wait_all();
    }

    fn submit_trial(&self, set: &TrialSet, units: &[WorkUnit], dep_mode: DepMode) {
        match dep_mode {
            DepMode::None | DepMode::SharedSource => {
                // Shared-source tasks declare no inter-task dependency;
                // concurrent reads of the one input are permitted.
                for (task, unit) in units.iter().enumerate() {
                    set.stream_for(task).submit(unit.clone(), &[]);
                }
            }
            DepMode::Chained => {
                let mut prev: Option<Token> = None;
                for (task, unit) in units.iter().enumerate() {
                    let deps: Vec<Token> = prev.iter().cloned().collect();
                    prev = Some(set.stream_for(task).submit(unit.clone(), &deps));
                }
            }
        }
    }

    // Untimed, after the last trial. Mismatches are counted and
    // reported, never fatal: the comparative timing data is the point
    // of the run even when one topology misbehaves.
    fn validate(&self, set: &TrialSet, workload: Workload) -> (Option<bool>, usize) {
        let source = match (&set.source, workload) {
            (Some(src), Workload::Copy) | (Some(src), Workload::Reduce) => src,
            _ => return (None, 0),
        };

        let reference = source.snapshot();
        let mut total_mismatches = 0usize;
        let mut ok = true;

        for (task, dst) in set.destinations.iter().enumerate() {
            let output = dst.snapshot();
            match workload {
                Workload::Copy => {
                    let check = validate_copy(&output, &reference);
                    if !check.passed() {
                        ok = false;
                        total_mismatches += check.mismatches;
                        check.emit(&format!("task {}", task), output.len());
                    }
                }
                Workload::Reduce => {
                    if !validate_reduce(&output, &reference) {
                        ok = false;
                        total_mismatches += 1;
                        eprintln!(
                            "MisMatch! task {}: reduction aggregate differs from source",
                            task
                        );
                    }
                }
                Workload::Delay => {}
            }
        }

        (Some(ok), total_mismatches)
    }

    fn release(&self, pool: &ResourcePool, set: TrialSet) {
        // Isolated pools free themselves on drop; shared-pool buffers
        // go back explicitly so the pool can be reused by the next run.
        if set.isolated_pools.is_empty() {
            for dst in set.destinations {
                pool.release(dst);
            }
            if let Some(src) = set.source {
                pool.release(src);
            }
        }
    }
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("device", &self.device.name())
            .field("config", &self.config)
            .finish()
    }
}
