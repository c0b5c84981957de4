//! Nearest-rank percentile aggregation and the fixed-width text report.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use crate::metrics::{Metric, Observation, Sample};

/// Percentiles reported for every metric, in column order.
pub const PERCENTILES: [u32; 7] = [0, 25, 50, 75, 90, 99, 100];

const LABEL_WIDTH: usize = 22;
const VALUE_WIDTH: usize = 12;

/// Zero-based index of the `p`th percentile among `n` sorted values:
/// `ceil(p/100 * n) - 1`, clamped to `[0, n-1]`.
pub fn nearest_rank(n: usize, p: u32) -> usize {
    let rank = (p as usize * n).div_ceil(100);
    rank.saturating_sub(1).min(n.saturating_sub(1))
}

#[derive(Clone, Debug, PartialEq)]
pub enum MetricSummary {
    Percentiles {
        /// One value per entry of [`PERCENTILES`].
        values: [f64; PERCENTILES.len()],
        samples: usize,
    },
    NoSamples,
}

impl MetricSummary {
    /// Summarize one metric's values; input order does not matter.
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return MetricSummary::NoSamples;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        let n = sorted.len();
        MetricSummary::Percentiles {
            values: PERCENTILES.map(|p| sorted[nearest_rank(n, p)]),
            samples: n,
        }
    }

    pub fn percentile(&self, p: u32) -> Option<f64> {
        let MetricSummary::Percentiles { values, .. } = self else {
            return None;
        };
        PERCENTILES
            .iter()
            .position(|q| *q == p)
            .map(|idx| values[idx])
    }

    pub fn samples(&self) -> usize {
        match self {
            MetricSummary::Percentiles { samples, .. } => *samples,
            MetricSummary::NoSamples => 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MetricRow {
    pub metric: Metric,
    pub summary: MetricSummary,
    /// Samples left out because the counter went backwards.
    pub anomalous: usize,
}

/// Read-only percentile view over one benchmark's samples.
#[derive(Clone, Debug, PartialEq)]
pub struct PercentileReport {
    pub name: String,
    pub samples: usize,
    pub rows: Vec<MetricRow>,
    pub allocation_unavailable: bool,
}

impl PercentileReport {
    pub fn from_samples(name: &str, metrics: &BTreeSet<Metric>, samples: &[Sample]) -> Self {
        let mut allocation_unavailable = false;
        let rows = metrics
            .iter()
            .map(|&metric| {
                let mut values = Vec::with_capacity(samples.len());
                let mut anomalous = 0;
                for sample in samples {
                    match sample.get(metric) {
                        Some(Observation::Value(v)) => values.push(v),
                        Some(Observation::Anomalous) => anomalous += 1,
                        Some(Observation::Unavailable) if metric.is_allocation() => {
                            allocation_unavailable = true;
                        }
                        Some(Observation::Unavailable) | None => {}
                    }
                }
                MetricRow {
                    metric,
                    summary: MetricSummary::from_values(&values),
                    anomalous,
                }
            })
            .collect();

        Self {
            name: name.to_string(),
            samples: samples.len(),
            rows,
            allocation_unavailable,
        }
    }

    /// True when the run recorded no measured iterations.
    pub fn no_samples(&self) -> bool {
        self.samples == 0
    }

    pub fn row(&self, metric: Metric) -> Option<&MetricRow> {
        self.rows.iter().find(|r| r.metric == metric)
    }

    /// Fixed-width table, one row per metric.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{} ({} samples)", self.name, self.samples);

        let _ = write!(out, "{:<LABEL_WIDTH$}", "Metric");
        for p in PERCENTILES {
            let _ = write!(out, "{:>VALUE_WIDTH$}", format!("p{p}"));
        }
        let _ = writeln!(out, "{:>VALUE_WIDTH$}", "Samples");
        let _ = writeln!(
            out,
            "{}",
            "-".repeat(LABEL_WIDTH + VALUE_WIDTH * (PERCENTILES.len() + 1))
        );

        for row in &self.rows {
            let _ = write!(out, "{:<LABEL_WIDTH$}", row.metric.label());
            match &row.summary {
                MetricSummary::Percentiles { values, samples } => {
                    for v in values {
                        let _ = write!(out, "{:>VALUE_WIDTH$}", format_value(row.metric, *v));
                    }
                    let _ = writeln!(out, "{:>VALUE_WIDTH$}", samples);
                }
                MetricSummary::NoSamples => {
                    let width = VALUE_WIDTH * PERCENTILES.len();
                    let _ = writeln!(out, "{:>width$}{:>VALUE_WIDTH$}", "no data", 0);
                }
            }
        }

        for row in self.rows.iter().filter(|r| r.anomalous > 0) {
            let _ = writeln!(
                out,
                "  note: {} anomalous sample(s) excluded from {}",
                row.anomalous,
                row.metric.as_str()
            );
        }
        if self.allocation_unavailable {
            let _ = writeln!(out, "  note: allocation data unavailable");
        }
        if self.no_samples() {
            let _ = writeln!(out, "  note: no samples recorded");
        }
        out
    }
}

fn format_value(metric: Metric, v: f64) -> String {
    match metric.unit() {
        "ms" => format!("{v:.3}"),
        _ => format!("{v:.0}"),
    }
}
