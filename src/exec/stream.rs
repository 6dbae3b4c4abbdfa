//! Command streams: the ordering and dependency domain of a submission.

use super::event::{Event, Token};
use crate::device::Device;
use crate::work::WorkUnit;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

/// Ordering discipline of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOrder {
    /// FIFO: every submission implicitly depends on the previous one.
    InOrder,
    /// Unordered: only explicitly declared dependencies constrain
    /// execution. Tasks touching overlapping memory with no declared
    /// dependency have undefined completion order.
    OutOfOrder,
}

// A submission whose dependencies have not all fired yet. The last
// dependency to fire dispatches the held job.
struct Pending {
    remaining: AtomicUsize,
    job: Mutex<Option<crate::device::Job>>,
    device: Arc<dyn Device>,
}

impl Pending {
    fn arm(self: Arc<Self>, deps: &[Token]) {
        for dep in deps {
            let pending = Arc::clone(&self);
            dep.event().on_fire(Box::new(move || {
                if pending.remaining.fetch_sub(1, AtomicOrdering::AcqRel) == 1 {
                    if let Some(job) = pending.job.lock().take() {
                        pending.device.dispatch(job);
                    }
                }
            }));
        }
    }
}

/// One command stream bound to a device.
///
/// `submit` never blocks: ready work is handed to the device
/// immediately, work with unmet dependencies is parked until its last
/// dependency fires. Engines therefore never wait on one another, and a
/// dependency chain longer than the engine count cannot deadlock.
///
/// Streams are safe for concurrent submission from multiple host
/// threads; ordering between concurrent submitters on one in-order
/// stream is whatever the interleaving of their `submit` calls yields.
pub struct Stream {
    device: Arc<dyn Device>,
    order: StreamOrder,
    last: Mutex<Option<Token>>,
    outstanding: Mutex<Vec<Token>>,
}

impl Stream {
    pub fn new(device: Arc<dyn Device>, order: StreamOrder) -> Self {
        Self {
            device,
            order,
            last: Mutex::new(None),
            outstanding: Mutex::new(Vec::new()),
        }
    }

    pub fn order(&self) -> StreamOrder {
        self.order
    }

    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    /// Submit a work unit with explicit dependencies.
    ///
    /// Returns a completion token for chaining or host-side waits. For
    /// in-order streams the previous submission is added as an implicit
    /// dependency, which is what makes the stream FIFO.
    pub fn submit(&self, unit: WorkUnit, deps: &[Token]) -> Token {
        let event = Event::new();
        let token = Token::new(event.clone());

        let mut all_deps: Vec<Token> = deps.to_vec();
        if self.order == StreamOrder::InOrder {
            let mut last = self.last.lock();
            if let Some(prev) = last.as_ref() {
                all_deps.push(prev.clone());
            }
            *last = Some(token.clone());
        }

        self.outstanding.lock().push(token.clone());

        let job: crate::device::Job = Box::new(move || {
            unit.execute();
            event.fire();
        });

        if all_deps.is_empty() {
            self.device.dispatch(job);
        } else {
            let pending = Arc::new(Pending {
                remaining: AtomicUsize::new(all_deps.len()),
                job: Mutex::new(Some(job)),
                device: self.device.clone(),
            });
            pending.arm(&all_deps);
        }

        token
    }

    /// Block until every submission on this stream (and, transitively,
    /// everything it depends on) has completed. This is the only
    /// blocking call in the harness and the point where results become
    /// observable to the host.
    pub fn wait_all(&self) {
        let tokens: Vec<Token> = self.outstanding.lock().drain(..).collect();
        for token in tokens {
            token.wait();
        }
    }

    /// Submissions not yet drained by `wait_all`.
    pub fn outstanding(&self) -> usize {
        self.outstanding.lock().len()
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("order", &self.order)
            .field("device", &self.device.name())
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::device::HostDevice;
    use crate::pool::{Residency, ResourcePool};

    fn setup(engines: usize) -> (Arc<HostDevice>, ResourcePool) {
        let config = Config::builder().engines(engines).build().unwrap();
        let device = HostDevice::new(&config).unwrap();
        let pool = ResourcePool::new(device.clone());
        (device, pool)
    }

    #[test]
    fn in_order_preserves_submission_order() {
        let (device, pool) = setup(4);
        let buffers = pool.allocate(1, 256, Residency::DeviceLocal).unwrap();
        let stream = Stream::new(device, StreamOrder::InOrder);

        // Later fills must overwrite earlier ones, even with 4 engines.
        for value in 1..=8u32 {
            stream.submit(WorkUnit::fill(buffers[0].clone(), value), &[]);
        }
        stream.wait_all();

        assert!(buffers[0].snapshot().iter().all(|&v| v == 8));
    }

    #[test]
    fn explicit_chain_orders_out_of_order_stream() {
        let (device, pool) = setup(4);
        let buffers = pool.allocate(1, 256, Residency::DeviceLocal).unwrap();
        let stream = Stream::new(device, StreamOrder::OutOfOrder);

        let mut prev: Option<Token> = None;
        for value in 1..=8u32 {
            let deps: Vec<Token> = prev.iter().cloned().collect();
            let token = stream.submit(WorkUnit::fill(buffers[0].clone(), value), &deps);
            prev = Some(token);
        }
        stream.wait_all();

        assert!(buffers[0].snapshot().iter().all(|&v| v == 8));
    }

    #[test]
    fn chain_longer_than_engine_count_completes() {
        // One engine, chain of 32. Blocking dependency waits inside
        // engines would deadlock here; callback dispatch must not.
        let (device, pool) = setup(1);
        let buffers = pool.allocate(1, 16, Residency::DeviceLocal).unwrap();
        let stream = Stream::new(device, StreamOrder::OutOfOrder);

        let mut prev: Option<Token> = None;
        for value in 1..=32u32 {
            let deps: Vec<Token> = prev.iter().cloned().collect();
            prev = Some(stream.submit(WorkUnit::fill(buffers[0].clone(), value), &deps));
        }
        stream.wait_all();

        assert!(buffers[0].snapshot().iter().all(|&v| v == 32));
    }

    #[test]
    fn wait_all_drains_outstanding() {
        let (device, pool) = setup(2);
        let buffers = pool.allocate(1, 16, Residency::DeviceLocal).unwrap();
        let stream = Stream::new(device, StreamOrder::InOrder);

        stream.submit(WorkUnit::fill(buffers[0].clone(), 1), &[]);
        stream.submit(WorkUnit::fill(buffers[0].clone(), 2), &[]);
        stream.wait_all();
        assert_eq!(stream.outstanding(), 0);
    }

    #[test]
    fn tokens_report_completion() {
        let (device, pool) = setup(2);
        let buffers = pool.allocate(1, 16, Residency::DeviceLocal).unwrap();
        let stream = Stream::new(device, StreamOrder::InOrder);

        let token = stream.submit(WorkUnit::fill(buffers[0].clone(), 5), &[]);
        token.wait();
        assert!(token.is_complete());
    }
}
