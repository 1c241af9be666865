use super::random_index;
use commonware_index::full::{Config, FullIndex, Index};
use criterion::{black_box, criterion_group, Criterion};

fn bench_marshal(c: &mut Criterion) {
    for entries in [100, 10_000, 100_000] {
        let index = random_index(0, entries);
        c.bench_function(
            &format!("{}/op=marshal entries={}", module_path!(), entries),
            |b| {
                b.iter(|| {
                    let mut buf = Vec::with_capacity(index.encoded_len());
                    index.marshal(&mut buf).unwrap();
                    black_box(buf);
                });
            },
        );

        let mut buf = Vec::new();
        index.marshal(&mut buf).unwrap();
        let cfg = Config::default();
        c.bench_function(
            &format!("{}/op=unmarshal entries={}", module_path!(), entries),
            |b| {
                b.iter(|| {
                    let restored = Index::unmarshal(&mut buf.as_slice(), &cfg).unwrap();
                    black_box(restored);
                });
            },
        );
    }
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = bench_marshal
}
