//! Resource pool: pre-allocated, reusable buffers.
//!
//! Benchmarks allocate their working set once, reuse it across every trial
//! and topology, and free it at teardown. Allocation failure is fatal to
//! the requesting topology; there are no retries.

mod buffer;

pub use buffer::{Buffer, Residency};

use crate::device::Device;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::sync::Arc;

/// Owns every buffer handed to benchmark runs on one device.
///
/// Streams and work units borrow cloned handles for the duration of a
/// submission; the pool retains the owning reference and releases the
/// device's memory reservation when a buffer is returned or the pool is
/// dropped.
pub struct ResourcePool {
    device: Arc<dyn Device>,
    owned: Mutex<Vec<Buffer>>,
}

impl ResourcePool {
    pub fn new(device: Arc<dyn Device>) -> Self {
        Self {
            device,
            owned: Mutex::new(Vec::new()),
        }
    }

    /// Allocate `n` equally-sized buffers of `elements` cells each.
    ///
    /// Fails fast if the device lacks the residency class or its memory
    /// budget is exhausted; a partial allocation is rolled back so a
    /// failed topology leaves the pool unchanged.
    pub fn allocate(
        &self,
        n: usize,
        elements: usize,
        residency: Residency,
    ) -> Result<Vec<Buffer>> {
        if !self.device.supports(residency) {
            return Err(Error::Unsupported(residency));
        }

        let bytes = elements as u64 * std::mem::size_of::<u32>() as u64;
        let mut buffers: Vec<Buffer> = Vec::with_capacity(n);

        for _ in 0..n {
            if !self.device.reserve(bytes) {
                for buffer in &buffers {
                    self.device.unreserve(buffer.size_bytes());
                }
                return Err(Error::Allocation { bytes, residency });
            }
            buffers.push(Buffer::new(elements, residency));
        }

        self.owned.lock().extend(buffers.iter().cloned());
        Ok(buffers)
    }

    /// Allocate a single buffer.
    pub fn allocate_one(&self, elements: usize, residency: Residency) -> Result<Buffer> {
        if !self.device.supports(residency) {
            return Err(Error::Unsupported(residency));
        }

        let bytes = elements as u64 * std::mem::size_of::<u32>() as u64;
        if !self.device.reserve(bytes) {
            return Err(Error::Allocation { bytes, residency });
        }

        let buffer = Buffer::new(elements, residency);
        self.owned.lock().push(buffer.clone());
        Ok(buffer)
    }

    /// Return a buffer to a known state.
    pub fn reset(&self, buffer: &Buffer, value: u32) {
        buffer.fill(value);
    }

    /// Return a buffer to the pool and release its reservation.
    pub fn release(&self, buffer: Buffer) {
        let mut owned = self.owned.lock();
        if let Some(pos) = owned.iter().position(|b| b.aliases(&buffer)) {
            owned.swap_remove(pos);
            self.device.unreserve(buffer.size_bytes());
        }
    }

    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    /// Buffers currently owned by the pool.
    pub fn allocated(&self) -> usize {
        self.owned.lock().len()
    }
}

impl Drop for ResourcePool {
    fn drop(&mut self) {
        let owned = self.owned.get_mut();
        for buffer in owned.drain(..) {
            self.device.unreserve(buffer.size_bytes());
        }
    }
}

impl std::fmt::Debug for ResourcePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourcePool")
            .field("device", &self.device.name())
            .field("allocated", &self.allocated())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::device::HostDevice;

    fn device() -> Arc<HostDevice> {
        HostDevice::new(&Config::builder().engines(2).build().unwrap()).unwrap()
    }

    #[test]
    fn allocate_and_release() {
        let pool = ResourcePool::new(device());
        let buffers = pool.allocate(4, 64, Residency::SharedCoherent).unwrap();
        assert_eq!(buffers.len(), 4);
        assert!(buffers.iter().all(|b| b.len() == 64));
        assert_eq!(pool.allocated(), 4);

        for buffer in buffers {
            pool.release(buffer);
        }
        assert_eq!(pool.allocated(), 0);
    }

    #[test]
    fn unsupported_residency_is_reported() {
        let config = Config::builder().engines(2).build().unwrap();
        let device =
            HostDevice::with_residencies(&config, &[Residency::HostVisible]).unwrap();
        let pool = ResourcePool::new(device);

        let result = pool.allocate(1, 16, Residency::DeviceLocal);
        assert!(matches!(result, Err(Error::Unsupported(_))));
        assert_eq!(pool.allocated(), 0);
    }

    #[test]
    fn exhaustion_rolls_back_partial_allocation() {
        let config = Config::builder().engines(2).build().unwrap();
        // Budget for three 64-element buffers, asked for four.
        let device = HostDevice::with_memory(&config, 3 * 64 * 4).unwrap();
        let pool = ResourcePool::new(device);

        let result = pool.allocate(4, 64, Residency::DeviceLocal);
        assert!(matches!(result, Err(Error::Allocation { .. })));
        assert_eq!(pool.allocated(), 0);

        // The rollback must leave the full budget available again.
        let buffers = pool.allocate(3, 64, Residency::DeviceLocal).unwrap();
        assert_eq!(buffers.len(), 3);
    }

    #[test]
    fn reset_restores_known_state() {
        let pool = ResourcePool::new(device());
        let buffers = pool.allocate(1, 8, Residency::DeviceLocal).unwrap();
        buffers[0].fill(42);
        pool.reset(&buffers[0], 0);
        assert!(buffers[0].snapshot().iter().all(|&v| v == 0));
    }
}
