// Write and read throughput benchmarks for blocklog

use blocklog::{CompressionType, LogOptions, LogReader, LogWriter};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;

fn build_log(records: usize, options: LogOptions) -> Vec<u8> {
    let mut writer = LogWriter::new(Vec::new(), options).unwrap();
    writer.init().unwrap();
    for i in 0..records {
        let record = format!("record payload number {:08}", i);
        writer.add_record(record.as_bytes()).unwrap();
    }
    writer.into_sink().unwrap()
}

fn benchmark_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("write");

    for size in [1_000, 10_000, 100_000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let log = build_log(
                    size,
                    LogOptions::default().compression(CompressionType::None),
                );
                black_box(log);
            });
        });
    }

    group.finish();
}

#[cfg(feature = "snappy")]
fn benchmark_write_compressed(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_compressed");

    for size in [1_000, 10_000, 100_000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let log = build_log(
                    size,
                    LogOptions::default().compression(CompressionType::Snappy),
                );
                black_box(log);
            });
        });
    }

    group.finish();
}

fn benchmark_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("read");

    for size in [1_000, 10_000, 100_000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        let log = build_log(
            *size,
            LogOptions::default().compression(CompressionType::None),
        );
        group.bench_with_input(BenchmarkId::from_parameter(size), &log, |b, log| {
            b.iter(|| {
                let mut reader = LogReader::new(log.as_slice(), true, None).unwrap();
                let mut count = 0usize;
                while let Some(record) = reader.read_record() {
                    count += record.len();
                }
                black_box(count);
            });
        });
    }

    group.finish();
}

#[cfg(feature = "snappy")]
criterion_group!(
    benches,
    benchmark_write,
    benchmark_write_compressed,
    benchmark_read
);
#[cfg(not(feature = "snappy"))]
criterion_group!(benches, benchmark_write, benchmark_read);
criterion_main!(benches);
