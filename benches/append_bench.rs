use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::io::Cursor;
use tempfile::NamedTempFile;
use zip_append::ZipAppender;

fn generate_compressible_data(size: usize) -> Vec<u8> {
    // Pattern that compresses well
    let pattern = b"The quick brown fox jumps over the lazy dog. ";
    let mut data = Vec::with_capacity(size);
    while data.len() < size {
        data.extend_from_slice(pattern);
    }
    data.truncate(size);
    data
}

fn bench_single_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("append_single_entry");

    for size in [1024usize, 64 * 1024, 1024 * 1024] {
        let data = generate_compressible_data(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter(|| {
                let temp = NamedTempFile::new().unwrap();
                let file = temp.reopen().unwrap();
                let mut appender = ZipAppender::new(file).unwrap();
                appender.append("entry.bin", black_box(data)).unwrap();
                appender.close().unwrap();
            });
        });
    }

    group.finish();
}

fn bench_growing_directory(c: &mut Criterion) {
    // cost of re-emitting the directory as the archive grows
    let data = generate_compressible_data(4096);
    let mut group = c.benchmark_group("append_growing_directory");

    for count in [10usize, 100] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                let mut appender = ZipAppender::new(Cursor::new(Vec::new())).unwrap();
                for i in 0..count {
                    appender
                        .append(&format!("samples/{}.json", i), black_box(&data))
                        .unwrap();
                }
                appender.close().unwrap();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_single_append, bench_growing_directory);
criterion_main!(benches);
