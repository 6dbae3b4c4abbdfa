// host execution backend: a small engine pool over work-stealing deques

use super::{Device, DeviceInfo, Job};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::pool::Residency;
use crossbeam_deque::{Injector, Stealer, Worker as EngineQueue};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[cfg(target_os = "linux")]
fn pin_thread_to_core(core_id: usize) {
    unsafe {
        let mut cpuset: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_SET(core_id, &mut cpuset);
        let result = libc::sched_setaffinity(
            0, // current thread
            std::mem::size_of::<libc::cpu_set_t>(),
            &cpuset,
        );
        if result != 0 {
            tracing::warn!(core_id, "failed to pin engine thread");
        }
    }
}

struct EngineHandle {
    thread: Option<JoinHandle<()>>,
    unparker: thread::Thread,
}

struct Shared {
    injector: Injector<Job>,
    shutdown: AtomicBool,
}

/// Host-thread execution backend.
///
/// Engines pull ready jobs from a global injector, falling back to
/// stealing from each other. Submission is lock-free and safe from any
/// number of host threads. One `HostDevice` models one device-side
/// scheduler; [`Device::isolated`] builds another with its own engines
/// and memory budget.
pub struct HostDevice {
    info: DeviceInfo,
    config: Config,
    shared: Arc<Shared>,
    engines: Vec<EngineHandle>,
    next_wake: AtomicUsize,
    mem_free: AtomicU64,
    residencies: Vec<Residency>,
}

struct Engine {
    id: usize,
    local_queue: EngineQueue<Job>,
}

impl Engine {
    fn new(id: usize) -> Self {
        Self {
            id,
            local_queue: EngineQueue::new_fifo(),
        }
    }

    // main loop
    fn run(&self, stealers: Vec<Stealer<Job>>, shared: Arc<Shared>) {
        let mut backoff_cnt = 0u32;

        loop {
            if shared.shutdown.load(Ordering::Acquire) {
                break;
            }

            if let Some(job) = self.find_job(&stealers, &shared.injector) {
                backoff_cnt = 0;
                job();
            } else {
                self.backoff(&mut backoff_cnt);
            }
        }
    }

    fn find_job(&self, stealers: &[Stealer<Job>], injector: &Injector<Job>) -> Option<Job> {
        // 1. Local queue first (best cache locality)
        if let Some(job) = self.local_queue.pop() {
            return Some(job);
        }

        // 2. Global injector
        loop {
            match injector.steal_batch_and_pop(&self.local_queue) {
                crossbeam_deque::Steal::Success(job) => return Some(job),
                crossbeam_deque::Steal::Empty => break,
                crossbeam_deque::Steal::Retry => continue,
            }
        }

        // 3. Steal from sibling engines
        self.try_steal_from_engines(stealers)
    }

    fn try_steal_from_engines(&self, stealers: &[Stealer<Job>]) -> Option<Job> {
        use rand::seq::SliceRandom;
        use rand::thread_rng;

        if stealers.is_empty() {
            return None;
        }

        let mut indices: Vec<usize> = (0..stealers.len()).collect();
        indices.shuffle(&mut thread_rng());

        for &idx in &indices {
            if idx == self.id {
                continue;
            }

            loop {
                match stealers[idx].steal_batch_and_pop(&self.local_queue) {
                    crossbeam_deque::Steal::Success(job) => return Some(job),
                    crossbeam_deque::Steal::Empty => break,
                    crossbeam_deque::Steal::Retry => continue,
                }
            }
        }

        None
    }

    fn backoff(&self, count: &mut u32) {
        const MAX_SPINS: u32 = 10;
        const MAX_YIELDS: u32 = 20;

        *count += 1;

        if *count <= MAX_SPINS {
            let spins = (*count).min(6);
            for _ in 0..(1 << spins) {
                std::hint::spin_loop();
            }
        } else if *count <= MAX_YIELDS {
            thread::yield_now();
        } else {
            thread::park_timeout(Duration::from_micros(100));
        }
    }
}

impl HostDevice {
    /// Build a device supporting every residency class, with an
    /// effectively unbounded memory budget.
    pub fn new(config: &Config) -> Result<Arc<Self>> {
        Self::build(config, Residency::ALL.to_vec(), u64::MAX / 2)
    }

    /// Build a device that only supports the given residency classes.
    pub fn with_residencies(config: &Config, residencies: &[Residency]) -> Result<Arc<Self>> {
        Self::build(config, residencies.to_vec(), u64::MAX / 2)
    }

    /// Build a device with a bounded memory budget in bytes.
    pub fn with_memory(config: &Config, global_mem: u64) -> Result<Arc<Self>> {
        Self::build(config, Residency::ALL.to_vec(), global_mem)
    }

    fn build(config: &Config, residencies: Vec<Residency>, global_mem: u64) -> Result<Arc<Self>> {
        config.validate()?;

        let engine_count = config.engine_count();
        if residencies.is_empty() {
            return Err(Error::device("device must support at least one residency class"));
        }

        let shared = Arc::new(Shared {
            injector: Injector::new(),
            shutdown: AtomicBool::new(false),
        });

        let mut engines = Vec::with_capacity(engine_count);
        let mut stealers = Vec::with_capacity(engine_count);

        for id in 0..engine_count {
            let engine = Engine::new(id);
            stealers.push(engine.local_queue.stealer());
            engines.push(engine);
        }

        let mut handles = Vec::with_capacity(engine_count);
        let pin_engines = config.pin_engines;

        for engine in engines {
            let id = engine.id;
            let stealers_clone = stealers.clone();
            let shared_clone = shared.clone();

            let thread = thread::Builder::new()
                .name(format!("qsweep-engine-{}", id))
                .spawn(move || {
                    #[cfg(target_os = "linux")]
                    if pin_engines {
                        pin_thread_to_core(id);
                    }
                    #[cfg(not(target_os = "linux"))]
                    let _ = pin_engines;

                    engine.run(stealers_clone, shared_clone);
                })
                .map_err(|e| Error::device(format!("engine spawn failed: {}", e)))?;

            let unparker = thread.thread().clone();

            handles.push(EngineHandle {
                thread: Some(thread),
                unparker,
            });
        }

        let info = DeviceInfo {
            platform: "qsweep host".to_string(),
            name: format!("host ({} engines)", engine_count),
            engines: engine_count,
            global_mem,
        };

        tracing::debug!(engines = engine_count, "host device up");

        Ok(Arc::new(Self {
            info,
            config: config.clone(),
            shared,
            engines: handles,
            next_wake: AtomicUsize::new(0),
            mem_free: AtomicU64::new(global_mem),
            residencies,
        }))
    }

    fn shutdown(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);

        // wake everyone up to check the shutdown flag
        for engine in &self.engines {
            engine.unparker.unpark();
        }

        for engine in &mut self.engines {
            if let Some(thread) = engine.thread.take() {
                let _ = thread.join();
            }
        }
    }
}

impl Device for HostDevice {
    fn name(&self) -> &str {
        &self.info.name
    }

    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn supports(&self, residency: Residency) -> bool {
        self.residencies.contains(&residency)
    }

    fn max_concurrency(&self) -> usize {
        self.info.engines
    }

    fn reserve(&self, bytes: u64) -> bool {
        let mut free = self.mem_free.load(Ordering::Relaxed);
        loop {
            if free < bytes {
                return false;
            }
            match self.mem_free.compare_exchange_weak(
                free,
                free - bytes,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(current) => free = current,
            }
        }
    }

    fn unreserve(&self, bytes: u64) {
        self.mem_free.fetch_add(bytes, Ordering::Relaxed);
    }

    fn dispatch(&self, job: Job) {
        self.shared.injector.push(job);

        let n = self.engines.len();
        let idx = self.next_wake.fetch_add(1, Ordering::Relaxed) % n;
        self.engines[idx].unparker.unpark();
    }

    fn isolated(&self) -> Result<Arc<dyn Device>> {
        let device = HostDevice::new(&self.config)?;
        Ok(device)
    }
}

impl Drop for HostDevice {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for HostDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostDevice")
            .field("info", &self.info)
            .field("mem_free", &self.mem_free.load(Ordering::Relaxed))
            .finish()
    }
}
