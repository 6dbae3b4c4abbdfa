//! Device abstraction.
//!
//! The harness never talks to a concrete compute API. It is handed a
//! [`Device`]: an opaque execution backend with capability queries, a
//! memory budget, and a `dispatch` entry point that runs ready jobs on
//! its engines. The in-tree backend is [`HostDevice`], which executes
//! work units on a pool of host threads; a real accelerator backend
//! would implement the same trait.

mod host;

pub use host::HostDevice;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::pool::Residency;
use std::sync::Arc;

/// A job ready to run on a device engine. Jobs never block on other
/// jobs; dependency tracking happens before dispatch.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Static facts about a device, surfaced at selection time.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub platform: String,
    pub name: String,
    pub engines: usize,
    pub global_mem: u64,
}

/// An execution backend the harness submits ready jobs to.
///
/// Implementations must be safe for concurrent submission from multiple
/// host threads; the harness deliberately adds no locking of its own
/// around `dispatch`.
pub trait Device: Send + Sync {
    fn name(&self) -> &str;

    fn info(&self) -> &DeviceInfo;

    /// Capability query for a residency class.
    fn supports(&self, residency: Residency) -> bool;

    /// Upper bound on usefully concurrent work units.
    fn max_concurrency(&self) -> usize;

    /// Claim `bytes` from the device's memory budget.
    fn reserve(&self, bytes: u64) -> bool;

    /// Return `bytes` to the device's memory budget.
    fn unreserve(&self, bytes: u64);

    /// Execute a ready job as soon as an engine is free.
    fn dispatch(&self, job: Job);

    /// Manufacture a fully separate scheduling context on the same
    /// physical device, for the context-isolation topology.
    fn isolated(&self) -> Result<Arc<dyn Device>>;
}

/// Enumerate the platforms visible to this process.
///
/// The host backend exposes a single platform with a single device,
/// mirroring how samples enumerate and then index into the list.
pub fn platforms() -> Vec<String> {
    vec!["qsweep host".to_string()]
}

/// Select a device by platform and device enumeration index.
///
/// Out-of-range indices are a fatal configuration error, reported to the
/// caller rather than clamped.
pub fn select(platform_index: usize, device_index: usize, config: &Config) -> Result<Arc<dyn Device>> {
    let platforms = platforms();
    if platform_index >= platforms.len() {
        return Err(Error::config(format!(
            "platform index {} is unavailable, only {} platforms found",
            platform_index,
            platforms.len()
        )));
    }
    if device_index >= 1 {
        return Err(Error::config(format!(
            "device index {} is unavailable, only 1 device found",
            device_index
        )));
    }
    let device = HostDevice::new(config)?;
    Ok(device)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_default_indices() {
        let config = Config::builder().engines(1).build().unwrap();
        let device = select(0, 0, &config).unwrap();
        assert_eq!(device.info().engines, 1);
    }

    #[test]
    fn out_of_range_platform_is_fatal() {
        let config = Config::default();
        assert!(select(3, 0, &config).is_err());
    }

    #[test]
    fn out_of_range_device_is_fatal() {
        let config = Config::default();
        assert!(select(0, 2, &config).is_err());
    }
}
