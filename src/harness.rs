use std::collections::BTreeSet;
use std::time::Duration;

use tracing::debug;

use crate::error::{HarnessError, HarnessResult};
use crate::metrics::{Metric, MetricsSource, Sample};
use crate::region::{observe, MeasuredRegion, RegionScope};
use crate::stats::PercentileReport;

#[derive(Clone, Copy, Debug)]
pub enum Profile {
    Quick,
    Full,
}

impl Profile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Quick => "quick",
            Profile::Full => "full",
        }
    }
}

/// Command-line level configuration. Unset fields fall back to the
/// profile's defaults.
#[derive(Clone, Debug)]
pub struct BenchConfig {
    pub profile: Profile,
    pub size: Option<usize>,
    pub warmup: Option<u64>,
    pub max_iterations: Option<u64>,
    pub max_duration: Option<Duration>,
    pub scale: f64,
    /// Empty means every metric.
    pub metrics: Vec<Metric>,
}

impl BenchConfig {
    pub fn new(profile: Profile) -> Self {
        Self {
            profile,
            size: None,
            warmup: None,
            max_iterations: None,
            max_duration: None,
            scale: 1.0,
            metrics: Vec::new(),
        }
    }

    /// Length of the `0..N` input sequence.
    pub fn input_size(&self) -> usize {
        self.size.unwrap_or(match self.profile {
            Profile::Quick => 100_000,
            Profile::Full => 1_000_000,
        })
    }

    pub fn warmup_iters(&self) -> u64 {
        self.warmup.unwrap_or(match self.profile {
            Profile::Quick => 2,
            Profile::Full => 10,
        })
    }

    pub fn iters(&self) -> u64 {
        self.max_iterations.unwrap_or(match self.profile {
            Profile::Quick => 20,
            Profile::Full => 200,
        })
    }

    pub fn duration_budget(&self) -> Duration {
        self.max_duration.unwrap_or(match self.profile {
            Profile::Quick => Duration::from_secs(5),
            Profile::Full => Duration::from_secs(60),
        })
    }

    pub fn run_config(&self) -> HarnessResult<RunConfig> {
        let mut config = RunConfig::new(self.warmup_iters(), self.iters(), self.duration_budget())
            .with_scale(self.scale);
        if !self.metrics.is_empty() {
            config = config.with_metrics(self.metrics.iter().copied());
        }
        config.validate()?;
        Ok(config)
    }
}

/// Immutable parameters of one run.
#[derive(Clone, Debug, PartialEq)]
pub struct RunConfig {
    warmup_iterations: u64,
    max_iterations: u64,
    max_duration: Duration,
    scale: f64,
    metrics: BTreeSet<Metric>,
}

impl RunConfig {
    /// Scale 1.0, every metric.
    pub fn new(warmup_iterations: u64, max_iterations: u64, max_duration: Duration) -> Self {
        Self {
            warmup_iterations,
            max_iterations,
            max_duration,
            scale: 1.0,
            metrics: Metric::ALL.into_iter().collect(),
        }
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_metrics(mut self, metrics: impl IntoIterator<Item = Metric>) -> Self {
        self.metrics = metrics.into_iter().collect();
        self
    }

    pub fn validate(&self) -> HarnessResult<()> {
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(HarnessError::InvalidConfig(format!(
                "scale must be a positive number, got {}",
                self.scale
            )));
        }
        if self.max_iterations == 0 {
            return Err(HarnessError::InvalidConfig(
                "max iterations must be at least 1".to_string(),
            ));
        }
        if self.metrics.is_empty() {
            return Err(HarnessError::InvalidConfig(
                "at least one metric must be selected".to_string(),
            ));
        }
        Ok(())
    }

    /// Warmup iterations after scaling, rounded up.
    pub fn warmup_iterations(&self) -> u64 {
        scaled(self.warmup_iterations, self.scale)
    }

    /// Measured iteration cap after scaling, rounded up, at least 1.
    pub fn max_iterations(&self) -> u64 {
        scaled(self.max_iterations, self.scale).max(1)
    }

    pub fn max_duration(&self) -> Duration {
        self.max_duration
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn metrics(&self) -> &BTreeSet<Metric> {
        &self.metrics
    }
}

fn scaled(n: u64, scale: f64) -> u64 {
    (n as f64 * scale).ceil() as u64
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Warmup,
    Measuring,
    Done,
}

/// Samples of a finished run, with the configuration that produced them.
#[derive(Clone, Debug)]
pub struct RunResult {
    config: RunConfig,
    samples: Vec<Sample>,
    warmup_iterations: u64,
    elapsed: Duration,
}

impl RunResult {
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Warmup iterations actually executed (their samples are discarded).
    pub fn warmup_iterations(&self) -> u64 {
        self.warmup_iterations
    }

    /// Wall time from run start to the end of the last iteration.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn report(&self, name: &str) -> PercentileReport {
        PercentileReport::from_samples(name, &self.config.metrics, &self.samples)
    }
}

/// Runs warmup then measured iterations of one workload.
///
/// The duration budget is counted from the start of the run, warmup
/// included, and checked only between iterations: an iteration that has
/// started always completes and is recorded.
pub struct Driver<'a> {
    source: &'a dyn MetricsSource,
    config: RunConfig,
    phase: Phase,
}

impl<'a> Driver<'a> {
    pub fn new(source: &'a dyn MetricsSource, config: RunConfig) -> HarnessResult<Self> {
        config.validate()?;
        Ok(Self {
            source,
            config,
            phase: Phase::Idle,
        })
    }

    /// `Done` after a successful run; a failed run stays in the phase it
    /// failed in.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Run `workload` once per iteration inside the measured region; its
    /// result is observed after the region closes.
    pub fn run<F>(&mut self, mut workload: F) -> HarnessResult<RunResult>
    where
        F: FnMut() -> String,
    {
        self.run_scoped(|scope| {
            scope.begin()?;
            let out = workload();
            scope.end()?;
            observe(out);
            Ok(())
        })
    }

    /// Run `body` once per iteration. The body must open and close the
    /// measured region exactly once.
    pub fn run_scoped<F>(&mut self, mut body: F) -> HarnessResult<RunResult>
    where
        F: FnMut(&mut RegionScope<'_, '_>) -> HarnessResult<()>,
    {
        let source = self.source;
        let start = source.wall_clock()?;
        source.cpu_time()?;

        let mut region = MeasuredRegion::new(source, &self.config.metrics);

        let warmup = self.config.warmup_iterations();
        self.phase = Phase::Warmup;
        debug!(warmup, "warmup");
        for _ in 0..warmup {
            iterate(&mut region, &mut body)?;
        }

        let max_iterations = self.config.max_iterations();
        let max_duration = self.config.max_duration;
        self.phase = Phase::Measuring;
        debug!(max_iterations, ?max_duration, "measuring");

        let mut samples = Vec::with_capacity(max_iterations.min(4096) as usize);
        let mut elapsed = source.wall_clock()?.saturating_sub(start);
        while (samples.len() as u64) < max_iterations && elapsed < max_duration {
            samples.push(iterate(&mut region, &mut body)?);
            elapsed = source.wall_clock()?.saturating_sub(start);
        }

        self.phase = Phase::Done;
        debug!(samples = samples.len(), ?elapsed, "done");
        Ok(RunResult {
            config: self.config.clone(),
            samples,
            warmup_iterations: warmup,
            elapsed,
        })
    }
}

fn iterate<F>(region: &mut MeasuredRegion<'_>, body: &mut F) -> HarnessResult<Sample>
where
    F: FnMut(&mut RegionScope<'_, '_>) -> HarnessResult<()>,
{
    let mut scope = RegionScope::new(region);
    body(&mut scope)?;
    scope.finish()
}
