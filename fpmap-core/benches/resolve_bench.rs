use criterion::{black_box, criterion_group, criterion_main, Criterion};
use fpmap_core::archive::{ArchiveConfig, DiskArchive};
use fpmap_core::{Fingerprint, FingerprintMapper, MemorySeries, Metric, SeriesMap};
use std::sync::Arc;
use tempfile::TempDir;

fn setup(dir: &TempDir) -> FingerprintMapper<Arc<SeriesMap>, Arc<DiskArchive>> {
    let sm = Arc::new(SeriesMap::new());
    let archive = Arc::new(DiskArchive::open(ArchiveConfig::new(dir.path())).unwrap());

    for i in 0..10_000u64 {
        let metric = Metric::new()
            .with_label("job", "api")
            .with_label("instance", format!("host-{}", i));
        sm.put(metric.fingerprint(), MemorySeries::new(metric));
    }

    FingerprintMapper::new(sm, archive).unwrap()
}

fn bench_resolve_live(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let mapper = setup(&dir);
    let metric = Metric::new()
        .with_label("job", "api")
        .with_label("instance", "host-4242");
    let fp = metric.fingerprint();

    c.bench_function("resolve_live_series", |b| {
        b.iter(|| mapper.resolve(black_box(fp), black_box(&metric)).unwrap())
    });
}

fn bench_resolve_new(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let mapper = setup(&dir);
    let metric = Metric::new()
        .with_label("job", "worker")
        .with_label("instance", "host-1");
    let fp = metric.fingerprint();

    c.bench_function("resolve_unseen_series", |b| {
        b.iter(|| mapper.resolve(black_box(fp), black_box(&metric)).unwrap())
    });
}

fn bench_resolve_mapped(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let mapper = setup(&dir);
    let owner = Metric::new()
        .with_label("job", "api")
        .with_label("instance", "host-7");
    let fp = owner.fingerprint();
    let colliding = Metric::new().with_label("job", "collider");
    mapper.resolve(fp, &colliding).unwrap();

    c.bench_function("resolve_mapped_series", |b| {
        b.iter(|| mapper.resolve(black_box(fp), black_box(&colliding)).unwrap())
    });
}

fn bench_fingerprint(c: &mut Criterion) {
    let metric = Metric::new()
        .with_label("__name__", "http_requests_total")
        .with_label("job", "api")
        .with_label("instance", "host-1:9090")
        .with_label("method", "GET");

    c.bench_function("metric_fingerprint", |b| b.iter(|| black_box(&metric).fingerprint()));
}

criterion_group!(
    benches,
    bench_resolve_live,
    bench_resolve_new,
    bench_resolve_mapped,
    bench_fingerprint
);
criterion_main!(benches);
