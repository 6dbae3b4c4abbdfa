use crate::error::{Error, Result};
use crate::pool::Residency;

/// Workload shape a benchmark run submits through its streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workload {
    /// Busy-loop kernels with an externally controlled duration knob.
    Delay,
    /// Element-wise copy from a shared source, verifiable byte-for-byte.
    Copy,
    /// Grouped integer reduction, verifiable by aggregate sum.
    Reduce,
}

impl Default for Workload {
    fn default() -> Self {
        Workload::Delay
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Elements addressed by each work unit.
    pub elements: usize,
    /// Busy-loop iterations per element for the delay workload.
    pub iterations: u32,
    /// Trials per topology; the reported time is the minimum across them.
    pub repeats: u32,
    /// Hard cap on concurrency degree. Requests beyond it are clamped,
    /// never rejected.
    pub max_degree: usize,
    /// Group width for the reduce workload.
    pub reduce_group: usize,
    /// Device engines (execution threads for the host backend).
    /// `None` derives a count from the machine.
    pub engines: Option<usize>,
    /// Pin engines to cores (Linux only).
    pub pin_engines: bool,
    /// Residency class for benchmark buffers.
    pub residency: Residency,
    /// Workload shape submitted by the driver.
    pub workload: Workload,
    /// Relative-error tolerance for float validation.
    pub tolerance: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            elements: 1,
            iterations: 1,
            repeats: 32,
            max_degree: 64,
            reduce_group: 16,
            engines: None,
            pin_engines: false,
            residency: Residency::DeviceLocal,
            workload: Workload::Delay,
            tolerance: 0.01,
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn validate(&self) -> Result<()> {
        if self.elements == 0 {
            return Err(Error::config("elements must be > 0"));
        }
        if self.repeats == 0 {
            return Err(Error::config("repeats must be > 0"));
        }
        if self.max_degree == 0 || self.max_degree > 256 {
            return Err(Error::config("max_degree must be in 1..=256"));
        }
        if self.reduce_group == 0 {
            return Err(Error::config("reduce_group must be > 0"));
        }
        if let Some(n) = self.engines {
            if n == 0 {
                return Err(Error::config("engines must be > 0"));
            }
            if n > 1024 {
                return Err(Error::config("engines too large (max 1024)"));
            }
        }
        if self.tolerance <= 0.0 || self.tolerance >= 1.0 {
            return Err(Error::config("tolerance must be in (0, 1)"));
        }
        Ok(())
    }

    pub fn engine_count(&self) -> usize {
        self.engines.unwrap_or_else(|| num_cpus::get().clamp(1, 16))
    }

    /// Bound a requested concurrency degree against `max_degree`.
    ///
    /// The degree is bounds-checked with `>=` against the cap, so the
    /// effective degree is `min(requested, max_degree)`. Returns the
    /// effective degree and whether truncation occurred.
    pub fn clamp_degree(&self, requested: usize) -> (usize, bool) {
        if requested >= self.max_degree {
            (self.max_degree, requested > self.max_degree)
        } else {
            (requested, false)
        }
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn elements(mut self, n: usize) -> Self {
        self.config.elements = n;
        self
    }

    pub fn iterations(mut self, n: u32) -> Self {
        self.config.iterations = n;
        self
    }

    pub fn repeats(mut self, n: u32) -> Self {
        self.config.repeats = n;
        self
    }

    pub fn max_degree(mut self, n: usize) -> Self {
        self.config.max_degree = n;
        self
    }

    pub fn reduce_group(mut self, n: usize) -> Self {
        self.config.reduce_group = n;
        self
    }

    pub fn engines(mut self, n: usize) -> Self {
        self.config.engines = Some(n);
        self
    }

    pub fn pin_engines(mut self, pin: bool) -> Self {
        self.config.pin_engines = pin;
        self
    }

    pub fn residency(mut self, residency: Residency) -> Self {
        self.config.residency = residency;
        self
    }

    pub fn workload(mut self, workload: Workload) -> Self {
        self.config.workload = workload;
        self
    }

    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.config.tolerance = tolerance;
        self
    }

    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_elements() {
        let result = Config::builder().elements(0).build();
        assert!(result.is_err());
    }

    #[test]
    fn rejects_oversized_cap() {
        let result = Config::builder().max_degree(1000).build();
        assert!(result.is_err());
    }

    #[test]
    fn clamp_is_min_of_requested_and_cap() {
        let config = Config::builder().max_degree(64).build().unwrap();

        assert_eq!(config.clamp_degree(8), (8, false));
        assert_eq!(config.clamp_degree(64), (64, false));
        assert_eq!(config.clamp_degree(65), (64, true));
        assert_eq!(config.clamp_degree(1_000_000), (64, true));
    }
}
