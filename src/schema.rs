use serde::{Deserialize, Serialize};

use crate::benches::strings::BenchOutcome;
use crate::metrics::Metric;
use crate::stats::{MetricRow, MetricSummary, PercentileReport};

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMeta {
    pub schema_version: u32,
    pub bench_version: String,
    pub profile: String,
    pub input_size: usize,
    pub timestamp_utc: String,
    pub git_sha: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Percentiles {
    pub p0: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p99: f64,
    pub p100: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricEntry {
    pub metric: Metric,
    pub unit: String,
    pub approximate: bool,
    pub samples: usize,
    pub anomalous: usize,

    /// `None` when the metric has no usable samples.
    pub percentiles: Option<Percentiles>,
}

impl From<&MetricRow> for MetricEntry {
    fn from(row: &MetricRow) -> Self {
        let percentiles = match &row.summary {
            MetricSummary::Percentiles { values, .. } => Some(Percentiles {
                p0: values[0],
                p25: values[1],
                p50: values[2],
                p75: values[3],
                p90: values[4],
                p99: values[5],
                p100: values[6],
            }),
            MetricSummary::NoSamples => None,
        };
        Self {
            metric: row.metric,
            unit: row.metric.unit().to_string(),
            approximate: row.metric.approximate(),
            samples: row.summary.samples(),
            anomalous: row.anomalous,
            percentiles,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Ok,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkEntry {
    pub name: String,
    pub status: Status,
    pub error: Option<String>,

    pub samples: usize,
    pub allocation_unavailable: bool,
    pub metrics: Vec<MetricEntry>,
}

impl BenchmarkEntry {
    pub fn from_report(report: &PercentileReport) -> Self {
        Self {
            name: report.name.clone(),
            status: Status::Ok,
            error: None,
            samples: report.samples,
            allocation_unavailable: report.allocation_unavailable,
            metrics: report.rows.iter().map(MetricEntry::from).collect(),
        }
    }

    pub fn failed(name: &str, error: String) -> Self {
        Self {
            name: name.to_string(),
            status: Status::Failed,
            error: Some(error),
            samples: 0,
            allocation_unavailable: false,
            metrics: Vec::new(),
        }
    }
}

impl From<&BenchOutcome> for BenchmarkEntry {
    fn from(outcome: &BenchOutcome) -> Self {
        match &outcome.result {
            Ok(report) => BenchmarkEntry::from_report(report),
            Err(e) => BenchmarkEntry::failed(outcome.variant.as_str(), e.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    pub run: RunMeta,
    pub benchmarks: Vec<BenchmarkEntry>,
}

impl SuiteReport {
    pub fn any_failed(&self) -> bool {
        self.benchmarks.iter().any(|b| b.status == Status::Failed)
    }
}
