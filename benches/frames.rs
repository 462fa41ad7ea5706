use bytes::BytesMut;
use criterion::{criterion_group, criterion_main, Criterion};
use rand::prelude::*;

use lumen::{
    artnet::{encode_into, PortAddress, HEADER_LEN},
    models::{Universe, CHANNEL_COUNT},
    transition::{interpolate, Easing},
};

fn random_universe(rng: &mut impl Rng) -> Universe {
    let mut data = vec![0u8; CHANNEL_COUNT];
    rng.fill_bytes(&mut data);
    Universe::from_values(data)
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let mut rng = rand::rng();
    let from = random_universe(&mut rng);
    let to = random_universe(&mut rng);
    let address = PortAddress::new(0, 0, 1);

    c.bench_function("encode ArtDmx packet", |b| {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + CHANNEL_COUNT);

        b.iter(|| {
            buf.clear();
            encode_into(&mut buf, address, &to, 1);
        })
    });

    c.bench_function("interpolate frame", |b| {
        let mut progress = 0.;

        b.iter(|| {
            progress = (progress + 0.01) % 1.;
            interpolate(&from, &to, Easing::InOutCubic.apply(progress))
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
