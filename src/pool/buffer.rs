//! Buffer handles and their backing storage.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Memory placement class of an allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Residency {
    /// Exclusive to the device; the host reads results back after a wait.
    DeviceLocal,
    /// Host-resident but device-accessible.
    HostVisible,
    /// Coherently shared between host and device.
    SharedCoherent,
}

impl Residency {
    pub const ALL: [Residency; 3] = [
        Residency::DeviceLocal,
        Residency::HostVisible,
        Residency::SharedCoherent,
    ];
}

impl fmt::Display for Residency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Residency::DeviceLocal => write!(f, "device"),
            Residency::HostVisible => write!(f, "host"),
            Residency::SharedCoherent => write!(f, "shared"),
        }
    }
}

pub(crate) struct Storage {
    cells: Box<[AtomicU32]>,
    residency: Residency,
}

/// Handle to a pool-owned allocation.
///
/// The handle is cheap to clone; all clones address the same storage.
/// Cells are relaxed atomics so that the intentionally racy topologies
/// (overlapping writes with no declared dependency) stay defined at the
/// memory level: per-cell last-writer-wins, no torn values. The happens-
/// before edge for non-racing reads comes from `Stream::wait_all`.
#[derive(Clone)]
pub struct Buffer {
    storage: Arc<Storage>,
}

impl Buffer {
    pub(crate) fn new(elements: usize, residency: Residency) -> Self {
        let cells = (0..elements).map(|_| AtomicU32::new(0)).collect();
        Buffer {
            storage: Arc::new(Storage { cells, residency }),
        }
    }

    pub fn len(&self) -> usize {
        self.storage.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.cells.is_empty()
    }

    pub fn residency(&self) -> Residency {
        self.storage.residency
    }

    pub fn size_bytes(&self) -> u64 {
        self.len() as u64 * std::mem::size_of::<u32>() as u64
    }

    /// True if `other` addresses the same storage (an alias).
    pub fn aliases(&self, other: &Buffer) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }

    pub fn load(&self, index: usize) -> u32 {
        self.storage.cells[index].load(Ordering::Relaxed)
    }

    pub fn store(&self, index: usize, value: u32) {
        self.storage.cells[index].store(value, Ordering::Relaxed);
    }

    /// Host-side fill, outside any stream.
    pub fn fill(&self, value: u32) {
        for cell in self.storage.cells.iter() {
            cell.store(value, Ordering::Relaxed);
        }
    }

    /// Host-side upload, the analog of a blocking memcpy to the device.
    pub fn write_from(&self, data: &[u32]) {
        for (cell, &value) in self.storage.cells.iter().zip(data) {
            cell.store(value, Ordering::Relaxed);
        }
    }

    /// Host-side readback of the full contents.
    pub fn snapshot(&self) -> Vec<u32> {
        self.storage
            .cells
            .iter()
            .map(|cell| cell.load(Ordering::Relaxed))
            .collect()
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("elements", &self.len())
            .field("residency", &self.residency())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_and_snapshot() {
        let buffer = Buffer::new(16, Residency::SharedCoherent);
        buffer.fill(7);
        assert!(buffer.snapshot().iter().all(|&v| v == 7));
    }

    #[test]
    fn clones_alias_storage() {
        let buffer = Buffer::new(4, Residency::DeviceLocal);
        let alias = buffer.clone();
        alias.store(2, 99);
        assert_eq!(buffer.load(2), 99);
        assert!(buffer.aliases(&alias));
    }

    #[test]
    fn distinct_buffers_do_not_alias() {
        let a = Buffer::new(4, Residency::DeviceLocal);
        let b = Buffer::new(4, Residency::DeviceLocal);
        assert!(!a.aliases(&b));
    }

    #[test]
    fn write_from_slice() {
        let buffer = Buffer::new(4, Residency::HostVisible);
        buffer.write_from(&[1, 2, 3, 4]);
        assert_eq!(buffer.snapshot(), vec![1, 2, 3, 4]);
    }
}
