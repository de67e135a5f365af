//! Sources of values for observable instruments.
//!
//! A [`Sampler`] is invoked on the collecting thread, once per collection,
//! for every observable instrument it backs. It should only read
//! instantaneous state; a slow sampler delays the whole collection cycle.
use std::fmt;
use std::sync::Mutex;

use sysinfo::{MemoryRefreshKind, RefreshKind, System};

/// Produces the current value of an observable instrument.
///
/// Closures are samplers too:
///
/// ```
/// use telepipe_sdk::metrics::Sampler;
///
/// let queue_depth = || 7_i64;
/// assert_eq!(queue_depth.sample(), 7);
/// ```
pub trait Sampler<T>: Send + Sync + 'static {
    /// Reads the current value.
    fn sample(&self) -> T;
}

impl<T, F> Sampler<T> for F
where
    F: Fn() -> T + Send + Sync + 'static,
{
    fn sample(&self) -> T {
        self()
    }
}

/// Global CPU utilization as a ratio in `[0, 1]`.
///
/// The first sample after creation reads zero, since utilization is measured
/// between two refreshes.
pub struct CpuUtilizationSampler {
    system: Mutex<System>,
}

impl CpuUtilizationSampler {
    /// Creates a sampler and takes the baseline CPU reading.
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        CpuUtilizationSampler {
            system: Mutex::new(system),
        }
    }
}

impl Default for CpuUtilizationSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CpuUtilizationSampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CpuUtilizationSampler")
    }
}

impl Sampler<f64> for CpuUtilizationSampler {
    fn sample(&self) -> f64 {
        match self.system.lock() {
            Ok(mut system) => {
                system.refresh_cpu_usage();
                f64::from(system.global_cpu_usage()) / 100.0
            }
            Err(_) => 0.0,
        }
    }
}

/// Memory in use on the host, in bytes.
pub struct MemoryUsageSampler {
    system: Mutex<System>,
}

impl MemoryUsageSampler {
    /// Creates a sampler.
    pub fn new() -> Self {
        let system = System::new_with_specifics(
            RefreshKind::new().with_memory(MemoryRefreshKind::new().with_ram()),
        );
        MemoryUsageSampler {
            system: Mutex::new(system),
        }
    }
}

impl Default for MemoryUsageSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryUsageSampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MemoryUsageSampler")
    }
}

impl Sampler<i64> for MemoryUsageSampler {
    fn sample(&self) -> i64 {
        match self.system.lock() {
            Ok(mut system) => {
                system.refresh_memory();
                i64::try_from(system.used_memory()).unwrap_or(i64::MAX)
            }
            Err(_) => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_ratio_in_range() {
        let sampler = CpuUtilizationSampler::new();
        for _ in 0..2 {
            let value = sampler.sample();
            assert!((0.0..=1.0).contains(&value), "{value}");
        }
    }

    #[test]
    fn memory_is_not_negative() {
        assert!(MemoryUsageSampler::new().sample() >= 0);
    }

    #[test]
    fn closure_sampler() {
        let sampler: Box<dyn Sampler<u64>> = Box::new(|| 3);
        assert_eq!(sampler.sample(), 3);
    }
}
