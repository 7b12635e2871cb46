use criterion::{Criterion, black_box, criterion_group, criterion_main};
use ironlog::{
    CacheStorage, MemoryKeyValueStore, Request, Response, ServiceWorker, SessionContext,
    SessionStore, StaticFetcher, WorkerConfig, cache::MemoryCacheStorage,
};
use std::time::Duration;

fn create_sample_context(sets: usize) -> SessionContext {
    let mut ctx = SessionContext::begin("full-body").unwrap();
    for i in 0..sets {
        let exercise = ["Squats", "Bench Press", "Deadlift", "Rows"][i % 4];
        ctx.record_set(exercise, 60.0 + i as f64, 8).unwrap();
    }
    ctx
}

fn bench_session_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("session_store");
    let kv = MemoryKeyValueStore::new();
    let store = SessionStore::new(&kv);

    for sets in [10, 100] {
        let ctx = create_sample_context(sets);

        group.bench_function(format!("autosave_{sets}_sets"), |b| {
            b.iter(|| black_box(ctx.autosave(&store).unwrap()));
        });

        ctx.autosave(&store).unwrap();
        group.bench_function(format!("load_{sets}_sets"), |b| {
            b.iter(|| black_box(store.load()));
        });
    }

    group.finish();
}

fn bench_cache_fetch(c: &mut Criterion) {
    let mut group = c.benchmark_group("offline_cache");
    group.measurement_time(Duration::from_secs(5));

    let cache = MemoryCacheStorage::new();
    let mut net = StaticFetcher::new();
    let mut precache = Vec::new();
    for i in 0..50 {
        let url = format!("/assets/{i}.js");
        net = net.route(&url, Response::ok(url.as_str(), vec![b'x'; 4096]));
        precache.push(url);
    }
    let config = WorkerConfig {
        version: "1.0.0".to_string(),
        precache,
        bypass_hosts: vec!["firestore.googleapis.com".to_string()],
    };

    let mut worker = ServiceWorker::new(config, &cache, &net);
    worker.install().unwrap();
    worker.activate().unwrap();

    let hit = Request::get("/assets/25.js");
    group.bench_function("cache_hit", |b| {
        b.iter(|| black_box(worker.handle_fetch(&hit).unwrap()));
    });

    let bypass = Request::get("https://firestore.googleapis.com/v1/x");
    group.bench_function("bypass_check", |b| {
        b.iter(|| black_box(worker.is_bypassed(&bypass)));
    });

    group.bench_function("bucket_listing", |b| {
        b.iter(|| black_box(cache.bucket_names().unwrap()));
    });

    group.finish();
}

criterion_group!(benches, bench_session_store, bench_cache_fetch);
criterion_main!(benches);
