//! Metric sources, the timer and the allocation counter.
//!
//! Everything that reads ambient process state goes through
//! [`MetricsSource`], so the harness can be driven by [`ManualSource`] in
//! tests and by [`ProcessSource`] for real runs.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use clap::ValueEnum;
use cpu_time::ProcessTime;
use serde::{Deserialize, Serialize};

pub use crate::alloc::AllocCounts;
use crate::error::{HarnessError, HarnessResult};

/// A quantity recorded for every measured iteration.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum, Serialize, Deserialize,
)]
pub enum Metric {
    #[value(name = "wall-clock-ms")]
    #[serde(rename = "wall-clock-ms")]
    WallClockMs,
    #[value(name = "cpu-ms")]
    #[serde(rename = "cpu-ms")]
    CpuMs,
    #[value(name = "malloc-small-count")]
    #[serde(rename = "malloc-small-count")]
    MallocSmall,
    #[value(name = "malloc-large-count")]
    #[serde(rename = "malloc-large-count")]
    MallocLarge,
    #[value(name = "malloc-total-count")]
    #[serde(rename = "malloc-total-count")]
    MallocTotal,
    /// Read/write syscalls as reported by `/proc/self/io`.
    #[value(name = "syscall-count")]
    #[serde(rename = "syscall-count")]
    SyscallCount,
}

impl Metric {
    pub const ALL: [Metric; 6] = [
        Metric::WallClockMs,
        Metric::CpuMs,
        Metric::MallocSmall,
        Metric::MallocLarge,
        Metric::MallocTotal,
        Metric::SyscallCount,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::WallClockMs => "wall-clock-ms",
            Metric::CpuMs => "cpu-ms",
            Metric::MallocSmall => "malloc-small-count",
            Metric::MallocLarge => "malloc-large-count",
            Metric::MallocTotal => "malloc-total-count",
            Metric::SyscallCount => "syscall-count",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Metric::WallClockMs | Metric::CpuMs => "ms",
            _ => "count",
        }
    }

    /// Whether the value is known to be inexact.
    ///
    /// The syscall counter only sees read/write calls and includes the reads
    /// of `/proc/self/io` done to sample it.
    pub fn approximate(&self) -> bool {
        matches!(self, Metric::SyscallCount)
    }

    pub fn is_allocation(&self) -> bool {
        matches!(
            self,
            Metric::MallocSmall | Metric::MallocLarge | Metric::MallocTotal
        )
    }

    /// Row label in the text report; approximate metrics carry a `*`.
    pub fn label(&self) -> String {
        if self.approximate() {
            format!("{}*", self.as_str())
        } else {
            self.as_str().to_string()
        }
    }
}

/// One metric's reading for one measured iteration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Observation {
    Value(f64),
    /// The cumulative counter went backwards across the iteration.
    Anomalous,
    /// The source does not expose this counter.
    Unavailable,
}

impl Observation {
    pub fn value(&self) -> Option<f64> {
        match self {
            Observation::Value(v) => Some(*v),
            _ => None,
        }
    }
}

/// One measured iteration. Immutable once built.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Sample {
    values: BTreeMap<Metric, Observation>,
}

impl Sample {
    pub fn get(&self, metric: Metric) -> Option<Observation> {
        self.values.get(&metric).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Metric, Observation)> + '_ {
        self.values.iter().map(|(m, o)| (*m, *o))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(Metric, Observation)> for Sample {
    fn from_iter<I: IntoIterator<Item = (Metric, Observation)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Capability object for every clock and counter the harness reads.
pub trait MetricsSource {
    /// Monotonic wall-clock reading relative to an arbitrary origin.
    fn wall_clock(&self) -> HarnessResult<Duration>;

    /// CPU time consumed by the process so far.
    fn cpu_time(&self) -> HarnessResult<Duration>;

    /// Cumulative allocation counters, if the allocator exposes them.
    fn alloc_counts(&self) -> Option<AllocCounts>;

    /// Cumulative syscall counter, if available.
    fn syscall_count(&self) -> Option<u64>;
}

/// Reads the real process: `Instant`, process CPU clock, jemalloc's
/// counters and `/proc/self/io`.
#[derive(Debug, Clone, Copy)]
pub struct ProcessSource {
    origin: Instant,
}

impl ProcessSource {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for ProcessSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSource for ProcessSource {
    fn wall_clock(&self) -> HarnessResult<Duration> {
        Ok(self.origin.elapsed())
    }

    fn cpu_time(&self) -> HarnessResult<Duration> {
        process_cpu_time()
    }

    fn alloc_counts(&self) -> Option<AllocCounts> {
        crate::alloc::snapshot()
    }

    fn syscall_count(&self) -> Option<u64> {
        read_syscall_count()
    }
}

fn process_cpu_time() -> HarnessResult<Duration> {
    ProcessTime::try_now()
        .map(|t| t.as_duration())
        .map_err(|_| HarnessError::ClockUnavailable { clock: "cpu" })
}

#[cfg(target_os = "linux")]
fn read_syscall_count() -> Option<u64> {
    use std::io::Read;

    // Fixed buffer: the file is ~100 bytes and heap use here would show up
    // in the allocation counters.
    let mut buf = [0u8; 512];
    let mut file = std::fs::File::open("/proc/self/io").ok()?;
    let n = file.read(&mut buf).ok()?;
    parse_proc_io(std::str::from_utf8(&buf[..n]).ok()?)
}

#[cfg(not(target_os = "linux"))]
fn read_syscall_count() -> Option<u64> {
    None
}

/// Sum of `syscr` and `syscw` from a `/proc/<pid>/io` listing.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_proc_io(text: &str) -> Option<u64> {
    let mut reads = None;
    let mut writes = None;
    for line in text.lines() {
        if let Some(v) = line.strip_prefix("syscr:") {
            reads = v.trim().parse::<u64>().ok();
        } else if let Some(v) = line.strip_prefix("syscw:") {
            writes = v.trim().parse::<u64>().ok();
        }
    }
    Some(reads?.saturating_add(writes?))
}

/// Deterministic source whose readings only change when told to.
///
/// Single-threaded by construction (interior `Cell`s), like the harness.
#[derive(Debug)]
pub struct ManualSource {
    wall: Cell<Duration>,
    cpu: Cell<Duration>,
    wall_step: Cell<Duration>,
    allocs: Cell<Option<AllocCounts>>,
    syscalls: Cell<Option<u64>>,
    clock_broken: Cell<bool>,
}

impl ManualSource {
    /// Zeroed clocks, zeroed allocation and syscall counters.
    pub fn new() -> Self {
        Self {
            wall: Cell::new(Duration::ZERO),
            cpu: Cell::new(Duration::ZERO),
            wall_step: Cell::new(Duration::ZERO),
            allocs: Cell::new(Some(AllocCounts::default())),
            syscalls: Cell::new(Some(0)),
            clock_broken: Cell::new(false),
        }
    }

    /// Advance both wall and CPU clocks.
    pub fn advance(&self, by: Duration) {
        self.advance_wall(by);
        self.advance_cpu(by);
    }

    pub fn advance_wall(&self, by: Duration) {
        self.wall.set(self.wall.get() + by);
    }

    pub fn advance_cpu(&self, by: Duration) {
        self.cpu.set(self.cpu.get() + by);
    }

    /// Advance the wall clock by `step` on every `wall_clock` read.
    pub fn set_wall_step(&self, step: Duration) {
        self.wall_step.set(step);
    }

    pub fn allocate(&self, small: u64, large: u64) {
        if let Some(c) = self.allocs.get() {
            self.allocs.set(Some(AllocCounts {
                small: c.small + small,
                large: c.large + large,
            }));
        }
    }

    /// Overwrite the cumulative counters, e.g. to simulate a wraparound.
    pub fn set_allocs(&self, counts: Option<AllocCounts>) {
        self.allocs.set(counts);
    }

    pub fn add_syscalls(&self, n: u64) {
        if let Some(c) = self.syscalls.get() {
            self.syscalls.set(Some(c + n));
        }
    }

    pub fn set_syscalls(&self, count: Option<u64>) {
        self.syscalls.set(count);
    }

    /// Make every clock read fail with `ClockUnavailable`.
    pub fn break_clock(&self) {
        self.clock_broken.set(true);
    }
}

impl Default for ManualSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSource for ManualSource {
    fn wall_clock(&self) -> HarnessResult<Duration> {
        if self.clock_broken.get() {
            return Err(HarnessError::ClockUnavailable { clock: "wall" });
        }
        let now = self.wall.get();
        self.wall.set(now + self.wall_step.get());
        Ok(now)
    }

    fn cpu_time(&self) -> HarnessResult<Duration> {
        if self.clock_broken.get() {
            return Err(HarnessError::ClockUnavailable { clock: "cpu" });
        }
        Ok(self.cpu.get())
    }

    fn alloc_counts(&self) -> Option<AllocCounts> {
        self.allocs.get()
    }

    fn syscall_count(&self) -> Option<u64> {
        self.syscalls.get()
    }
}

/// Opaque wall + CPU reading taken by [`Timer::start`].
#[derive(Clone, Copy, Debug)]
pub struct TimerStamp {
    wall: Duration,
    cpu: Duration,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Elapsed {
    pub wall: Duration,
    pub cpu: Duration,
}

pub struct Timer<'a> {
    source: &'a dyn MetricsSource,
}

impl<'a> Timer<'a> {
    pub fn new(source: &'a dyn MetricsSource) -> Self {
        Self { source }
    }

    pub fn start(&self) -> HarnessResult<TimerStamp> {
        let wall = self.source.wall_clock()?;
        let cpu = self.source.cpu_time()?;
        Ok(TimerStamp { wall, cpu })
    }

    /// Elapsed time since `start`; never negative.
    pub fn stop(&self, start: &TimerStamp) -> HarnessResult<Elapsed> {
        let cpu = self.source.cpu_time()?;
        let wall = self.source.wall_clock()?;
        Ok(Elapsed {
            wall: wall.saturating_sub(start.wall),
            cpu: cpu.saturating_sub(start.cpu),
        })
    }
}

/// Per-category allocation deltas for one iteration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AllocDelta {
    pub small: Observation,
    pub large: Observation,
    pub total: Observation,
}

impl AllocDelta {
    pub fn is_anomalous(&self) -> bool {
        [self.small, self.large, self.total].contains(&Observation::Anomalous)
    }
}

pub struct AllocationCounter<'a> {
    source: &'a dyn MetricsSource,
}

impl<'a> AllocationCounter<'a> {
    pub fn new(source: &'a dyn MetricsSource) -> Self {
        Self { source }
    }

    pub fn snapshot(&self) -> Option<AllocCounts> {
        self.source.alloc_counts()
    }

    /// `after - before` per category; a category that went backwards is
    /// anomalous, and so is the total whenever either category is.
    pub fn delta(before: Option<AllocCounts>, after: Option<AllocCounts>) -> AllocDelta {
        let (Some(before), Some(after)) = (before, after) else {
            return AllocDelta {
                small: Observation::Unavailable,
                large: Observation::Unavailable,
                total: Observation::Unavailable,
            };
        };
        let small = counter_delta(before.small, after.small);
        let large = counter_delta(before.large, after.large);
        let total = match (small.value(), large.value()) {
            (Some(s), Some(l)) => Observation::Value(s + l),
            _ => Observation::Anomalous,
        };
        AllocDelta {
            small,
            large,
            total,
        }
    }
}

/// Difference of two readings of a cumulative counter.
pub fn counter_delta(before: u64, after: u64) -> Observation {
    match after.checked_sub(before) {
        Some(d) => Observation::Value(d as f64),
        None => Observation::Anomalous,
    }
}
