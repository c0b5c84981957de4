//! The measured region: the only code whose cost ends up in a sample.

use std::collections::BTreeSet;
use std::hint::black_box;
use std::time::Duration;

use tracing::warn;

use crate::error::{HarnessError, HarnessResult};
use crate::metrics::{
    counter_delta, AllocCounts, AllocationCounter, Metric, MetricsSource, Observation, Sample,
    Timer, TimerStamp,
};

struct OpenRegion {
    syscalls: Option<u64>,
    timer: TimerStamp,
    allocs: Option<AllocCounts>,
}

/// Brackets exactly one workload invocation.
///
/// Readings are taken outermost-first on `begin` and innermost-first on
/// `end`, with the allocation counters closest to the workload, so the
/// sampling itself stays out of the allocation window.
pub struct MeasuredRegion<'a> {
    source: &'a dyn MetricsSource,
    metrics: &'a BTreeSet<Metric>,
    open: Option<OpenRegion>,
}

impl<'a> MeasuredRegion<'a> {
    pub fn new(source: &'a dyn MetricsSource, metrics: &'a BTreeSet<Metric>) -> Self {
        Self {
            source,
            metrics,
            open: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    pub fn begin(&mut self) -> HarnessResult<()> {
        if self.open.is_some() {
            return Err(HarnessError::RegionMismatch {
                detail: "begin() called twice without end()",
            });
        }
        let syscalls = if self.metrics.contains(&Metric::SyscallCount) {
            self.source.syscall_count()
        } else {
            None
        };
        let timer = Timer::new(self.source).start()?;
        let allocs = AllocationCounter::new(self.source).snapshot();
        self.open = Some(OpenRegion {
            syscalls,
            timer,
            allocs,
        });
        Ok(())
    }

    /// Close the region and build the sample for the configured metrics.
    pub fn end(&mut self) -> HarnessResult<Sample> {
        let Some(open) = self.open.take() else {
            return Err(HarnessError::RegionMismatch {
                detail: "end() called without begin()",
            });
        };
        let allocs = AllocationCounter::new(self.source).snapshot();
        let elapsed = Timer::new(self.source).stop(&open.timer)?;
        let syscalls = if self.metrics.contains(&Metric::SyscallCount) {
            self.source.syscall_count()
        } else {
            None
        };

        let alloc = AllocationCounter::delta(open.allocs, allocs);
        if alloc.is_anomalous() {
            warn!(
                before = ?open.allocs,
                after = ?allocs,
                "allocation counter went backwards; excluding from statistics"
            );
        }
        let syscall = match (open.syscalls, syscalls) {
            (Some(before), Some(after)) => counter_delta(before, after),
            _ => Observation::Unavailable,
        };
        if syscall == Observation::Anomalous {
            warn!(
                before = ?open.syscalls,
                after = ?syscalls,
                "syscall counter went backwards; excluding from statistics"
            );
        }

        Ok(self
            .metrics
            .iter()
            .map(|metric| {
                let obs = match metric {
                    Metric::WallClockMs => Observation::Value(millis(elapsed.wall)),
                    Metric::CpuMs => Observation::Value(millis(elapsed.cpu)),
                    Metric::MallocSmall => alloc.small,
                    Metric::MallocLarge => alloc.large,
                    Metric::MallocTotal => alloc.total,
                    Metric::SyscallCount => syscall,
                };
                (*metric, obs)
            })
            .collect())
    }
}

/// One iteration's view of the region, handed to a benchmark body.
///
/// Holds the sample produced by `end` until the driver collects it.
pub struct RegionScope<'r, 'a> {
    region: &'r mut MeasuredRegion<'a>,
    sample: Option<Sample>,
}

impl<'r, 'a> RegionScope<'r, 'a> {
    pub fn new(region: &'r mut MeasuredRegion<'a>) -> Self {
        Self {
            region,
            sample: None,
        }
    }

    pub fn begin(&mut self) -> HarnessResult<()> {
        if self.sample.is_some() {
            return Err(HarnessError::RegionMismatch {
                detail: "region entered twice in one iteration",
            });
        }
        self.region.begin()
    }

    pub fn end(&mut self) -> HarnessResult<()> {
        let sample = self.region.end()?;
        self.sample = Some(sample);
        Ok(())
    }

    /// The iteration's sample; fails unless the region was opened and
    /// closed exactly once.
    pub fn finish(self) -> HarnessResult<Sample> {
        if self.region.is_open() {
            return Err(HarnessError::RegionMismatch {
                detail: "iteration finished with the region still open",
            });
        }
        self.sample.ok_or(HarnessError::RegionMismatch {
            detail: "iteration never entered the measured region",
        })
    }
}

fn millis(d: Duration) -> f64 {
    d.as_nanos() as f64 / 1e6
}

/// Force the optimizer to treat a workload result as used.
pub fn observe<T: AsRef<str>>(value: T) -> usize {
    let value = black_box(value);
    black_box(value.as_ref().len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::ManualSource;

    fn all_metrics() -> BTreeSet<Metric> {
        Metric::ALL.into_iter().collect()
    }

    #[test]
    fn test_region_records_deltas() {
        let source = ManualSource::new();
        let metrics = all_metrics();
        let mut region = MeasuredRegion::new(&source, &metrics);

        region.begin().unwrap();
        assert!(region.is_open());
        source.advance(Duration::from_millis(4));
        source.allocate(10, 1);
        source.add_syscalls(3);
        let sample = region.end().unwrap();
        assert!(!region.is_open());

        assert_eq!(sample.get(Metric::WallClockMs), Some(Observation::Value(4.0)));
        assert_eq!(sample.get(Metric::CpuMs), Some(Observation::Value(4.0)));
        assert_eq!(sample.get(Metric::MallocSmall), Some(Observation::Value(10.0)));
        assert_eq!(sample.get(Metric::MallocLarge), Some(Observation::Value(1.0)));
        assert_eq!(sample.get(Metric::MallocTotal), Some(Observation::Value(11.0)));
        assert_eq!(sample.get(Metric::SyscallCount), Some(Observation::Value(3.0)));
    }

    #[test]
    fn test_region_only_configured_metrics() {
        let source = ManualSource::new();
        let metrics: BTreeSet<Metric> = [Metric::CpuMs].into_iter().collect();
        let mut region = MeasuredRegion::new(&source, &metrics);

        region.begin().unwrap();
        let sample = region.end().unwrap();
        assert_eq!(sample.len(), 1);
        assert!(sample.get(Metric::WallClockMs).is_none());
    }

    #[test]
    fn test_end_without_begin() {
        let source = ManualSource::new();
        let metrics = all_metrics();
        let mut region = MeasuredRegion::new(&source, &metrics);
        assert!(matches!(
            region.end(),
            Err(HarnessError::RegionMismatch { .. })
        ));
    }

    #[test]
    fn test_double_begin() {
        let source = ManualSource::new();
        let metrics = all_metrics();
        let mut region = MeasuredRegion::new(&source, &metrics);
        region.begin().unwrap();
        assert!(matches!(
            region.begin(),
            Err(HarnessError::RegionMismatch { .. })
        ));
    }

    #[test]
    fn test_wraparound_only_marks_allocation_fields() {
        let source = ManualSource::new();
        source.set_allocs(Some(AllocCounts {
            small: 1_000,
            large: 5,
        }));
        let metrics = all_metrics();
        let mut region = MeasuredRegion::new(&source, &metrics);

        region.begin().unwrap();
        source.advance(Duration::from_millis(2));
        source.set_allocs(Some(AllocCounts { small: 3, large: 6 }));
        let sample = region.end().unwrap();

        assert_eq!(sample.get(Metric::MallocSmall), Some(Observation::Anomalous));
        assert_eq!(sample.get(Metric::MallocTotal), Some(Observation::Anomalous));
        assert_eq!(sample.get(Metric::MallocLarge), Some(Observation::Value(1.0)));
        assert_eq!(sample.get(Metric::WallClockMs), Some(Observation::Value(2.0)));
    }

    #[test]
    fn test_unavailable_allocs() {
        let source = ManualSource::new();
        source.set_allocs(None);
        source.set_syscalls(None);
        let metrics = all_metrics();
        let mut region = MeasuredRegion::new(&source, &metrics);

        region.begin().unwrap();
        let sample = region.end().unwrap();
        assert_eq!(sample.get(Metric::MallocSmall), Some(Observation::Unavailable));
        assert_eq!(sample.get(Metric::SyscallCount), Some(Observation::Unavailable));
    }

    #[test]
    fn test_scope_requires_exactly_one_bracket() {
        let source = ManualSource::new();
        let metrics = all_metrics();
        let mut region = MeasuredRegion::new(&source, &metrics);

        let scope = RegionScope::new(&mut region);
        assert!(matches!(
            scope.finish(),
            Err(HarnessError::RegionMismatch { .. })
        ));

        let mut scope = RegionScope::new(&mut region);
        scope.begin().unwrap();
        scope.end().unwrap();
        assert!(scope.begin().is_err());
    }

    #[test]
    fn test_scope_open_at_finish() {
        let source = ManualSource::new();
        let metrics = all_metrics();
        let mut region = MeasuredRegion::new(&source, &metrics);

        let mut scope = RegionScope::new(&mut region);
        scope.begin().unwrap();
        assert!(matches!(
            scope.finish(),
            Err(HarnessError::RegionMismatch { .. })
        ));
    }

    #[test]
    fn test_observe_reports_length() {
        assert_eq!(observe(String::from("0\n1\n")), 4);
    }
}
