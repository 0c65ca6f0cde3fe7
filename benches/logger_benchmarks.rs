//! Criterion benchmarks for log_hood

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use log_hood::prelude::*;
use log_hood::RegexFilter;
use std::sync::Arc;

/// Output that discards everything
struct NullOutput;

#[async_trait]
impl Output for NullOutput {
    async fn write(&self, entry: &LogEntry) -> Result<()> {
        black_box(entry);
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "null"
    }
}

fn sample_entry() -> LogEntry {
    LogEntry::new(LogLevel::Warning, "request to /api/v1/orders took too long")
        .with_logger_name("Net")
        .with_field("status", 200)
        .with_field("latencyMs", 1250)
        .with_field("path", "/api/v1/orders")
        .with_user_id("user-42")
        .with_session_id("session-7")
        .with_tags(["network", "slow"])
}

// ============================================================================
// Logging Performance Benchmarks
// ============================================================================

fn bench_logging(c: &mut Criterion) {
    let mut group = c.benchmark_group("logging");
    group.throughput(Throughput::Elements(1));

    let logger = Logger::builder("Bench")
        .output(NullOutput)
        .build()
        .expect("Failed to build logger");

    group.bench_function("info", |b| {
        b.iter(|| logger.info(black_box("Info message")));
    });

    group.bench_function("with_options", |b| {
        b.iter(|| {
            logger.log_with(
                LogLevel::Warning,
                black_box("slow response"),
                LogOptions::new().with_field("latencyMs", 950).with_tag("network"),
            )
        });
    });

    logger.set_min_level(LogLevel::Error);
    group.bench_function("below_min_level", |b| {
        b.iter(|| logger.debug(black_box("Filtered message")));
    });

    group.finish();
}

fn bench_concurrent_logging(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_logging");
    let threads = 4;
    let per_thread = 250;
    group.throughput(Throughput::Elements((threads * per_thread) as u64));

    let logger = Arc::new(
        Logger::builder("Concurrent")
            .output(NullOutput)
            .build()
            .expect("Failed to build logger"),
    );

    group.bench_function("4_threads", |b| {
        b.iter(|| {
            let handles: Vec<_> = (0..threads)
                .map(|t| {
                    let logger = Arc::clone(&logger);
                    std::thread::spawn(move || {
                        for i in 0..per_thread {
                            logger.info(format!("thread {} message {}", t, i));
                        }
                    })
                })
                .collect();
            for handle in handles {
                let _ = handle.join();
            }
        });
    });

    group.finish();
}

// ============================================================================
// Entry and Formatter Benchmarks
// ============================================================================

fn bench_entry_creation(c: &mut Criterion) {
    let mut group = c.benchmark_group("entry_creation");
    group.throughput(Throughput::Elements(1));

    group.bench_function("simple", |b| {
        b.iter(|| LogEntry::new(LogLevel::Info, black_box("message")));
    });

    group.bench_function("populated", |b| {
        b.iter(|| black_box(sample_entry()));
    });

    group.finish();
}

fn bench_formatters(c: &mut Criterion) {
    let mut group = c.benchmark_group("formatters");
    group.throughput(Throughput::Elements(1));

    let entry = sample_entry();
    let formatters: Vec<(&str, Box<dyn LogFormatter>)> = vec![
        ("simple", Box::new(SimpleFormatter::new())),
        ("csv", Box::new(CsvFormatter::new())),
        ("json", Box::new(JsonFormatter::new())),
        ("detailed", Box::new(DetailedFormatter::new())),
    ];

    for (name, formatter) in &formatters {
        group.bench_function(*name, |b| {
            b.iter(|| formatter.format(black_box(&entry)));
        });
    }

    group.bench_function("json_roundtrip", |b| {
        b.iter(|| {
            let json = entry.to_json().unwrap();
            LogEntry::from_json(black_box(&json)).unwrap()
        });
    });

    group.finish();
}

// ============================================================================
// Filter Benchmarks
// ============================================================================

fn bench_filters(c: &mut Criterion) {
    let mut group = c.benchmark_group("filters");
    group.throughput(Throughput::Elements(1));

    let entry = sample_entry();
    let level = LevelFilter::new(LogLevel::Info);
    let tags = TagFilter::allow(["network"]);
    let regex = RegexFilter::new(r"/api/v\d+/", true).expect("valid pattern");
    let composite = CompositeFilter::all(vec![
        Arc::new(LevelFilter::new(LogLevel::Info)),
        Arc::new(TagFilter::exclude(["debug"])),
    ]);

    group.bench_function("level", |b| b.iter(|| level.should_log(black_box(&entry))));
    group.bench_function("tag", |b| b.iter(|| tags.should_log(black_box(&entry))));
    group.bench_function("regex", |b| b.iter(|| regex.should_log(black_box(&entry))));
    group.bench_function("composite", |b| {
        b.iter(|| composite.should_log(black_box(&entry)))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_logging,
    bench_concurrent_logging,
    bench_entry_creation,
    bench_formatters,
    bench_filters,
);

criterion_main!(benches);
