//! Work units: one schedulable task with a declared memory footprint.

use crate::error::{Error, Result};
use crate::pool::Buffer;

/// Compute shape of a work unit.
///
/// A closed set of shapes rather than arbitrary closures, so the data
/// model stays inspectable and the footprint of every submission is
/// declared up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Write `value` into every destination element. Used for priming.
    Fill { value: u32 },
    /// `dst[i] = src[i]`; verifiable byte-for-byte against the source.
    Copy,
    /// `dst[g]` = wrapping sum of `group` consecutive source elements;
    /// verifiable by comparing aggregates.
    Reduce { group: usize },
    /// Busy-loop with an externally controlled iteration count, used to
    /// produce a repeatable duration so queue overhead can be measured
    /// independent of real work size. Accumulates into the destination,
    /// so each timed trial starts from a primed buffer.
    Delay,
}

/// One schedulable computational task.
///
/// Holds its buffer handles, an iteration knob, and a shape. Stateless
/// between submissions; executing it writes a defined value into every
/// element of its declared destination footprint and touches nothing
/// else. Bounds are validated at construction, not at runtime.
#[derive(Debug, Clone)]
pub struct WorkUnit {
    shape: Shape,
    dst: Buffer,
    src: Option<Buffer>,
    iterations: u32,
}

impl WorkUnit {
    pub fn fill(dst: Buffer, value: u32) -> Self {
        Self {
            shape: Shape::Fill { value },
            dst,
            src: None,
            iterations: 0,
        }
    }

    pub fn copy(src: Buffer, dst: Buffer) -> Result<Self> {
        if src.len() != dst.len() {
            return Err(Error::work(format!(
                "copy footprint mismatch: src has {} elements, dst has {}",
                src.len(),
                dst.len()
            )));
        }
        Ok(Self {
            shape: Shape::Copy,
            dst,
            src: Some(src),
            iterations: 0,
        })
    }

    pub fn reduce(src: Buffer, dst: Buffer, group: usize) -> Result<Self> {
        if group == 0 {
            return Err(Error::work("reduce group must be > 0"));
        }
        if dst.len().checked_mul(group) != Some(src.len()) {
            return Err(Error::work(format!(
                "reduce footprint mismatch: {} groups of {} need {} source elements, have {}",
                dst.len(),
                group,
                dst.len() * group,
                src.len()
            )));
        }
        Ok(Self {
            shape: Shape::Reduce { group },
            dst,
            src: Some(src),
            iterations: 0,
        })
    }

    pub fn delay(dst: Buffer, iterations: u32) -> Self {
        Self {
            shape: Shape::Delay,
            dst,
            src: None,
            iterations,
        }
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// Problem size: elements addressed in the destination.
    pub fn elements(&self) -> usize {
        self.dst.len()
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Run the task to completion on the calling engine.
    pub(crate) fn execute(&self) {
        match self.shape {
            Shape::Fill { value } => {
                for i in 0..self.dst.len() {
                    self.dst.store(i, value);
                }
            }
            Shape::Copy => {
                // A source is guaranteed by construction.
                let Some(src) = self.src.as_ref() else { return };
                for i in 0..self.dst.len() {
                    self.dst.store(i, src.load(i));
                }
            }
            Shape::Reduce { group } => {
                let Some(src) = self.src.as_ref() else { return };
                for g in 0..self.dst.len() {
                    let mut sum = 0u32;
                    for i in 0..group {
                        sum = sum.wrapping_add(src.load(g * group + i));
                    }
                    self.dst.store(g, sum);
                }
            }
            Shape::Delay => {
                for i in 0..self.dst.len() {
                    let mut result = 0.0f32;
                    for _ in 0..self.iterations {
                        result = 0.0;
                        while result < 1.0 {
                            // keep the accumulation opaque to the optimizer
                            result = std::hint::black_box(result) + 1e-6;
                        }
                    }
                    let prev = f32::from_bits(self.dst.load(i));
                    self.dst.store(i, (prev + result).to_bits());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Residency;

    fn buffer(elements: usize) -> Buffer {
        Buffer::new(elements, Residency::SharedCoherent)
    }

    #[test]
    fn copy_writes_source_values() {
        let src = buffer(64);
        let dst = buffer(64);
        src.write_from(&(0..64u32).collect::<Vec<_>>());

        WorkUnit::copy(src.clone(), dst.clone()).unwrap().execute();
        assert_eq!(dst.snapshot(), src.snapshot());
    }

    #[test]
    fn copy_rejects_mismatched_lengths() {
        assert!(WorkUnit::copy(buffer(64), buffer(32)).is_err());
    }

    #[test]
    fn reduce_preserves_aggregate() {
        let src = buffer(64);
        let dst = buffer(4);
        src.write_from(&(1..=64u32).collect::<Vec<_>>());

        WorkUnit::reduce(src.clone(), dst.clone(), 16).unwrap().execute();

        let src_sum: u32 = src.snapshot().iter().fold(0, |a, &v| a.wrapping_add(v));
        let dst_sum: u32 = dst.snapshot().iter().fold(0, |a, &v| a.wrapping_add(v));
        assert_eq!(src_sum, dst_sum);
    }

    #[test]
    fn reduce_rejects_partial_groups() {
        assert!(WorkUnit::reduce(buffer(60), buffer(4), 16).is_err());
        assert!(WorkUnit::reduce(buffer(64), buffer(4), 0).is_err());
    }

    #[test]
    fn delay_zero_iterations_leaves_primed_value() {
        let dst = buffer(8);
        dst.fill(0);
        WorkUnit::delay(dst.clone(), 0).execute();
        assert!(dst.snapshot().iter().all(|&v| f32::from_bits(v) == 0.0));
    }

    #[test]
    fn delay_is_repeatable_from_primed_state() {
        let dst = buffer(4);

        dst.fill(0);
        WorkUnit::delay(dst.clone(), 2).execute();
        let first = dst.snapshot();

        dst.fill(0);
        WorkUnit::delay(dst.clone(), 2).execute();
        assert_eq!(dst.snapshot(), first);
    }
}
