//! Scan pipeline benchmarks

use std::f64::consts::PI;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use clickmend::{BurgPredictor, Channel, NullReporter, Predictor, ProcessingSettings};

fn sine(length: usize) -> Vec<f64> {
    (0..length)
        .map(|i| 1000.0 * (2.0 * PI * 0.011 * i as f64).sin())
        .collect()
}

fn bench_predictor(c: &mut Criterion) {
    let predictor = BurgPredictor::new(4, 512);
    let window = sine(512);

    c.bench_function("burg_predict_forward_512", |b| {
        b.iter(|| predictor.predict_forward(black_box(&window)).unwrap())
    });
}

fn bench_scan(c: &mut Criterion) {
    let settings = ProcessingSettings {
        history_length_samples: 64,
        coefficients_number: 4,
        threshold_for_detection: 7.0,
        max_length_of_correction: 20,
        sample_rate: -1,
    };

    let mut samples = sine(5000);
    for position in [900, 2400, 3900] {
        samples[position] = 40_000.0;
    }

    c.bench_function("scan_5k_samples_three_clicks", |b| {
        b.iter(|| {
            let mut channel =
                Channel::new(black_box(samples.clone()), settings.clone()).unwrap();
            channel.scan(&NullReporter).unwrap();
            black_box(channel.patch_count())
        })
    });
}

criterion_group!(benches, bench_predictor, bench_scan);
criterion_main!(benches);
