/// Decoder and RateEngine Benchmarks using Criterion
///
/// Run with: cargo bench --bench decoder_benchmark
///
/// Benchmarks cover:
/// - Decoder throughput across chunk sizes (1 byte up to whole-buffer)
/// - RateEngine observe cost per snapshot
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rill_core::{CounterSnapshot, DecoderConfig, FrameDecoder, RateConfig, RateEngine};

fn make_stream(frames: usize) -> Vec<u8> {
    let mut out = String::new();
    for i in 0..frames {
        out.push_str("event: token\n");
        out.push_str(&format!("data: {{\"token\":\"word{} \",\"index\":{}}}\n\n", i, i));
    }
    out.push_str("event: complete\ndata: {\"status\":\"success\"}\n");
    out.into_bytes()
}

fn decoder() -> FrameDecoder {
    FrameDecoder::new(DecoderConfig {
        max_line_bytes: 1024 * 1024,
        default_kind: None,
    })
}

/// Benchmark: Decode a 1k-frame stream delivered in fixed-size chunks
fn bench_decoder_chunk_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("decoder_chunk_size");
    let stream = make_stream(1_000);
    group.throughput(Throughput::Bytes(stream.len() as u64));

    for chunk_size in [1usize, 16, 256, 4096, stream.len()].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(chunk_size),
            chunk_size,
            |b, &size| {
                b.iter(|| {
                    let mut d = decoder();
                    let mut count = 0;
                    for chunk in stream.chunks(size) {
                        count += d.feed(black_box(chunk)).map(|f| f.len()).unwrap_or(0);
                    }
                    black_box(count)
                });
            },
        );
    }

    group.finish();
}

/// Benchmark: Single oversized payload arriving in small pieces
fn bench_decoder_long_line(c: &mut Criterion) {
    let mut group = c.benchmark_group("decoder_long_line");
    let payload = format!("{{\"text\":\"{}\"}}", "x".repeat(256 * 1024));
    let line = format!("event: token\ndata: {}\n", payload).into_bytes();
    group.throughput(Throughput::Bytes(line.len() as u64));

    group.bench_function("256k_in_1k_chunks", |b| {
        b.iter(|| {
            let mut d = decoder();
            let mut count = 0;
            for chunk in line.chunks(1024) {
                count += d.feed(black_box(chunk)).map(|f| f.len()).unwrap_or(0);
            }
            black_box(count)
        });
    });

    group.finish();
}

/// Benchmark: Derive rates from a stream of snapshots
fn bench_rate_engine(c: &mut Criterion) {
    let mut group = c.benchmark_group("rate_engine_observe");

    for counters in [8usize, 64].iter() {
        group.throughput(Throughput::Elements(1_000));
        group.bench_with_input(
            BenchmarkId::from_parameter(counters),
            counters,
            |b, &n| {
                let snapshots: Vec<CounterSnapshot> = (0..1_000)
                    .map(|t| {
                        let mut snap = CounterSnapshot::new(t as f64);
                        for k in 0..n {
                            snap = snap.with(format!("counter_{}", k), (t * (k + 1)) as f64);
                        }
                        snap.with("blks_hit", (t * 40) as f64)
                            .with("blks_read", (t * 2) as f64)
                    })
                    .collect();

                b.iter(|| {
                    let mut engine = RateEngine::new(RateConfig::default());
                    let mut points = 0;
                    for snap in &snapshots {
                        if engine.observe(black_box(snap.clone())).is_some() {
                            points += 1;
                        }
                    }
                    black_box(points)
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_decoder_chunk_sizes,
    bench_decoder_long_line,
    bench_rate_engine
);
criterion_main!(benches);
