use criterion::*;
use dji_thermal::raster::{recover_dimensions, Dimensions, ThermalRaster};

pub struct Samples<T>(Vec<T>);
impl<T> Samples<T> {
    pub fn sampler<'a>(&'a self) -> impl FnMut() -> &'a T {
        let mut curr = 0;
        move || {
            let ret = curr;
            curr += 1;
            curr %= self.0.len();
            &self.0[ret]
        }
    }
}

/// Sample counts seen on DJI payloads, plus a prime to
/// force the longest search.
fn buffer_lengths() -> Samples<usize> {
    Samples(vec![640 * 512, 1280 * 1024, 640 * 480, 160 * 120, 7919])
}

fn recovery(c: &mut Criterion) {
    let visible = Dimensions::new(4000, 3000);

    c.bench_function("recover_dimensions", |b| {
        let samples = buffer_lengths();
        let mut next = samples.sampler();
        b.iter(|| recover_dimensions(black_box(*next()), visible, None).unwrap())
    });

    c.bench_function("reshape_640x512", |b| {
        let raw: Vec<i16> = (0..640 * 512).map(|i| (i % 600) as i16).collect();
        b.iter(|| ThermalRaster::from_samples(black_box(&raw), Dimensions::new(640, 512)).unwrap())
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = recovery
}

criterion_main!(benches);
