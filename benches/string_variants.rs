//! String-building variants under criterion
//!
//! Cross-checks the harness timings with criterion's own statistics:
//! - All six variants over the same `0..N` input
//! - Input sizes spanning three orders of magnitude

use criterion::{
    black_box, criterion_group, criterion_main, AxisScale, BenchmarkId, Criterion,
    PlotConfiguration, Throughput,
};
use string_build_bench::benches::strings::input;
use string_build_bench::Variant;

fn bench_variants(c: &mut Criterion) {
    let mut group = c.benchmark_group("string_variants");
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));

    for size in [1_000usize, 10_000, 100_000] {
        let data = input(size);
        group.throughput(Throughput::Elements(size as u64));

        for variant in Variant::ALL {
            let workload = variant.workload();
            group.bench_with_input(
                BenchmarkId::new(variant.as_str(), size),
                &data,
                |bencher, data| bencher.iter(|| black_box(workload(black_box(data)))),
            );
        }
    }

    group.finish();
}

criterion_group!(benches, bench_variants);
criterion_main!(benches);
