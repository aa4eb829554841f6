//! Performance benchmarks for the core container and hierarchy queries

use bsp_core::{Experiment, TimeSeriesBuffer};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn ramp(samples: usize, channels: usize) -> TimeSeriesBuffer {
    let values = (0..samples * channels).map(|i| (i as f32 * 0.1).sin()).collect();
    TimeSeriesBuffer::from_vec(values, channels, 2000.0, None).unwrap()
}

/// Benchmark time-range views versus column copies
fn bench_slicing(c: &mut Criterion) {
    let mut group = c.benchmark_group("slicing");
    let buffer = ramp(20_000, 8);
    let columns = vec!["ch1".to_string(), "ch5".to_string()];

    group.bench_function("time_view", |b| {
        b.iter(|| {
            let view = buffer.slice(black_box(1.0), black_box(9.0), None).unwrap();
            black_box(view)
        });
    });

    group.bench_function("column_copy", |b| {
        b.iter(|| {
            let copy = buffer.slice(black_box(1.0), black_box(9.0), Some(&columns)).unwrap();
            black_box(copy)
        });
    });

    group.finish();
}

/// Benchmark experiment-wide retrieval for growing trial counts
fn bench_hierarchy_get_data(c: &mut Criterion) {
    let mut group = c.benchmark_group("hierarchy_get_data");

    for &trials in &[10usize, 100, 1000] {
        let mut experiment = Experiment::new("bench");
        let subject = experiment.put_subject("p01").unwrap();
        let setup = experiment.put_setup("arm").unwrap();
        let emg = experiment.put_modality(setup, "emg", 2000.0).unwrap();
        experiment.put_channels(emg, &["c0", "c1", "c2", "c3"]).unwrap();
        let session = experiment.put_session("s1", setup, subject).unwrap();
        let recording = experiment
            .put_recording(session, "r1", emg, TimeSeriesBuffer::zeros(trials * 200, 4, 2000.0, None).unwrap())
            .unwrap();
        experiment.put_trials_every(recording, 0.1, None).unwrap();

        group.bench_with_input(BenchmarkId::new("trials", trials), &experiment, |b, experiment| {
            b.iter(|| black_box(experiment.get_data("emg", None, None).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_slicing, bench_hierarchy_get_data);
criterion_main!(benches);
