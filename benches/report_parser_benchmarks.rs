use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use streamer_worker::report::{ReportBuilder, ReportParser, DEFAULT_REPORT_MAX_LENGTH};

fn report_with(readings: u32) -> bytes::Bytes {
    let mut builder = ReportBuilder::new(0x0a1b, 0x5fff).report_id(readings + 1);
    for id in 1..=readings {
        builder = builder.reading(0x5001, id, id * 10, id);
    }
    builder.build()
}

fn benchmark_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("report_parse");
    for readings in [16u32, 1024, 12_000] {
        let report = report_with(readings);
        group.throughput(Throughput::Bytes(report.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(readings), &report, |b, report| {
            b.iter(|| ReportParser::parse(black_box(report), DEFAULT_REPORT_MAX_LENGTH))
        });
    }
    group.finish();
}

fn benchmark_hash_check(c: &mut Criterion) {
    let report = report_with(1024);
    c.bench_function("report_hash_check", |b| {
        b.iter(|| ReportParser::new(black_box(&report)).check_report_hash())
    });
}

criterion_group!(benches, benchmark_parse, benchmark_hash_check);
criterion_main!(benches);
