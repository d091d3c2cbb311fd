use {
    criterion::{criterion_group, criterion_main, Criterion},
    fourier_operator::{
        fno::{Fno1d, SpectralConv1d},
        parameters::Model,
    },
    ndarray::Array3,
    rand::{rngs::StdRng, SeedableRng},
};

pub fn criterion_benchmark(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0);

    let conv = SpectralConv1d::new(64, 64, 16, &mut rng);
    let x = Array3::from_shape_fn((20, 64, 1024), |(b, c, i)| ((b + c * i) as f64 * 1.0E-3).sin());
    c.bench_function("spectral_conv_forward", |b| {
        b.iter(|| conv.forward(x.view()).unwrap())
    });
    c.bench_function("spectral_conv_backward", |b| {
        b.iter(|| conv.backward(x.view(), x.view()).unwrap())
    });

    let fno = Fno1d::new(&Model::default(), &mut rng).unwrap();
    let a = Array3::from_shape_fn((20, 1024, 1), |(b, i, _)| ((b * i) as f64 * 1.0E-3).cos());
    c.bench_function("fno_forward", |b| b.iter(|| fno.forward(a.view()).unwrap()));
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = criterion_benchmark
}
criterion_main!(benches);
