//! Storage backend and segment store benchmarks.

use criterion::measurement::WallTime;
use criterion::{
    black_box, criterion_group, criterion_main, BenchmarkGroup, BenchmarkId, Criterion, Throughput,
};
use std::io::Write;
use tempfile::TempDir;
use txlog_bench::random_data;
use txlog_storage::{
    DirectorySegmentStore, FileBackend, InMemorySegmentStore, SegmentStore, StorageBackend,
};

fn bench_segment_append(
    group: &mut BenchmarkGroup<'_, WallTime>,
    name: &str,
    store: &dyn SegmentStore,
) {
    for size in [64, 1024, 4096].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::new(name, size), size, |b, &size| {
            let mut writer = store.open_writer(size as i64).unwrap();
            let data = random_data(size);

            b.iter(|| black_box(writer.append(black_box(&data)).unwrap()));
        });
    }
}

/// Benchmark appends through segment writers, the appender's write path.
fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("segment_append");
    group.sample_size(50);

    let memory = InMemorySegmentStore::new();
    bench_segment_append(&mut group, "inmemory", &memory);

    let temp_dir = TempDir::new().unwrap();
    let directory = DirectorySegmentStore::open(temp_dir.path()).unwrap();
    bench_segment_append(&mut group, "directory", &directory);

    group.finish();
}

/// Benchmark positional reads, the access pattern of read-ahead refills.
fn bench_file_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_read");
    group.sample_size(50);

    for size in [4096, 65536].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let temp_dir = TempDir::new().unwrap();
            let path = temp_dir.path().join("bench.dat");
            let mut file = std::fs::File::create(&path).unwrap();
            file.write_all(&random_data(size)).unwrap();
            file.sync_all().unwrap();
            drop(file);

            let backend = FileBackend::open_read_only(&path).unwrap();

            b.iter(|| {
                let result = backend.read_at(black_box(0), black_box(size)).unwrap();
                black_box(result);
            });
        });
    }

    group.finish();
}

/// Benchmark append followed by sync, the cost of a forced flush.
fn bench_file_sync(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_sync");
    group.sample_size(20);

    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("bench.dat");
    std::fs::File::create(&path).unwrap();
    let mut backend = FileBackend::open(&path).unwrap();
    let data = random_data(1024);

    group.bench_function("after_1kb_write", |b| {
        b.iter(|| {
            backend.append(&data).unwrap();
            backend.sync().unwrap();
        });
    });

    group.finish();
}

/// Benchmark creating and removing segments.
fn bench_segment_lifecycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("segment_lifecycle");
    group.sample_size(20);
    let data = random_data(256);

    group.bench_function("inmemory", |b| {
        let store = InMemorySegmentStore::new();
        let mut version = 0;
        b.iter(|| {
            let mut writer = store.open_writer(version).unwrap();
            writer.append(&data).unwrap();
            store.remove(version).unwrap();
            version += 1;
        });
    });

    group.bench_function("directory", |b| {
        let temp_dir = TempDir::new().unwrap();
        let store = DirectorySegmentStore::open(temp_dir.path()).unwrap();
        let mut version = 0;
        b.iter(|| {
            let mut writer = store.open_writer(version).unwrap();
            writer.append(&data).unwrap();
            writer.flush().unwrap();
            drop(writer);
            store.remove(version).unwrap();
            version += 1;
        });
    });

    group.finish();
}

/// Benchmark listing a directory of segments.
fn bench_list_versions(c: &mut Criterion) {
    let temp_dir = TempDir::new().unwrap();
    let store = DirectorySegmentStore::open(temp_dir.path()).unwrap();
    for version in 0..256 {
        store.open_writer(version).unwrap();
    }

    c.bench_function("list_256_segments", |b| {
        b.iter(|| black_box(store.versions().unwrap()));
    });
}

criterion_group!(
    benches,
    bench_append,
    bench_file_read,
    bench_file_sync,
    bench_segment_lifecycle,
    bench_list_versions,
);

criterion_main!(benches);
