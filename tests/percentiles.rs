//! Percentile aggregation properties over seeded random inputs.

use std::collections::BTreeSet;

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use string_build_bench::metrics::{Metric, Observation, Sample};
use string_build_bench::stats::{MetricSummary, PercentileReport, PERCENTILES};

fn random_values(rng: &mut ChaCha8Rng) -> Vec<f64> {
    let n = rng.gen_range(1..=500);
    (0..n).map(|_| rng.gen_range(0.0..1_000.0)).collect()
}

fn samples_from(wall: &[f64], small: &[f64]) -> Vec<Sample> {
    wall.iter()
        .zip(small)
        .map(|(w, s)| {
            [
                (Metric::WallClockMs, Observation::Value(*w)),
                (Metric::MallocSmall, Observation::Value(*s)),
            ]
            .into_iter()
            .collect()
        })
        .collect()
}

#[test]
fn extremes_match_min_and_max() {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    for _ in 0..200 {
        let values = random_values(&mut rng);
        let summary = MetricSummary::from_values(&values);
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(summary.percentile(0), Some(min));
        assert_eq!(summary.percentile(100), Some(max));
        assert_eq!(summary.samples(), values.len());
    }
}

#[test]
fn percentiles_are_monotonic() {
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    for _ in 0..200 {
        let values = random_values(&mut rng);
        let summary = MetricSummary::from_values(&values);
        let row: Vec<f64> = PERCENTILES
            .iter()
            .map(|p| summary.percentile(*p).unwrap())
            .collect();
        assert!(row.windows(2).all(|w| w[0] <= w[1]), "{row:?}");
    }
}

#[test]
fn percentiles_are_actual_data_points() {
    let mut rng = ChaCha8Rng::seed_from_u64(13);
    for _ in 0..50 {
        let values = random_values(&mut rng);
        let summary = MetricSummary::from_values(&values);
        for p in PERCENTILES {
            let v = summary.percentile(p).unwrap();
            assert!(values.contains(&v));
        }
    }
}

#[test]
fn report_ignores_sample_order() {
    let mut rng = ChaCha8Rng::seed_from_u64(17);
    let metrics: BTreeSet<Metric> = [Metric::WallClockMs, Metric::MallocSmall]
        .into_iter()
        .collect();

    for _ in 0..50 {
        let wall = random_values(&mut rng);
        let small: Vec<f64> = wall.iter().map(|w| (w * 3.0).floor()).collect();
        let mut samples = samples_from(&wall, &small);

        let before = PercentileReport::from_samples("lazy-join", &metrics, &samples);
        samples.shuffle(&mut rng);
        let after = PercentileReport::from_samples("lazy-join", &metrics, &samples);

        assert_eq!(before, after);
        assert_eq!(before.render(), after.render());
    }
}

#[test]
fn recomputed_report_is_identical() {
    let mut rng = ChaCha8Rng::seed_from_u64(19);
    let metrics: BTreeSet<Metric> = Metric::ALL.into_iter().collect();
    let wall = random_values(&mut rng);
    let samples = samples_from(&wall, &wall);

    let first = PercentileReport::from_samples("piecewise", &metrics, &samples).render();
    let second = PercentileReport::from_samples("piecewise", &metrics, &samples).render();
    assert_eq!(first.as_bytes(), second.as_bytes());
}

#[test]
fn single_sample_fills_every_column() {
    let summary = MetricSummary::from_values(&[42.0]);
    for p in PERCENTILES {
        assert_eq!(summary.percentile(p), Some(42.0));
    }
}
