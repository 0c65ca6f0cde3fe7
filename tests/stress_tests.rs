//! Stress tests for concurrent logging
//!
//! These tests verify:
//! - No entry is lost or duplicated when many threads log at once
//! - Per-thread ordering survives the output worker
//! - A full queue drops entries and counts them instead of blocking

mod common;

use async_trait::async_trait;
use common::MockOutput;
use log_hood::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_logging_loses_nothing() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 500;

    let sink = MockOutput::new("mock");
    let logger = Arc::new(
        Logger::builder("Stress")
            .shared_output(sink.clone())
            .queue_capacity(THREADS * PER_THREAD)
            .build()
            .expect("Failed to build logger"),
    );

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let logger = Arc::clone(&logger);
            std::thread::spawn(move || {
                for i in 0..PER_THREAD {
                    logger.log_with(
                        LogLevel::Info,
                        format!("{}:{}", t, i),
                        LogOptions::new().with_field("thread", t as u64),
                    );
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("logging thread panicked");
    }
    logger.flush().await;

    let messages = sink.messages();
    assert_eq!(messages.len(), THREADS * PER_THREAD);
    assert_eq!(logger.metrics().dropped_count(), 0);

    let mut last_seen: HashMap<usize, usize> = HashMap::new();
    for message in messages {
        let (t, i) = message.split_once(':').unwrap();
        let (t, i): (usize, usize) = (t.parse().unwrap(), i.parse().unwrap());
        if let Some(previous) = last_seen.insert(t, i) {
            assert!(i > previous, "thread {} out of order: {} after {}", t, i, previous);
        }
    }
    assert_eq!(last_seen.len(), THREADS);
}

struct SlowOutput;

#[async_trait]
impl Output for SlowOutput {
    async fn write(&self, _entry: &LogEntry) -> Result<()> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "slow"
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slow_output_never_blocks_caller() {
    let fast = MockOutput::new("fast");
    let logger = Logger::builder("Backpressure")
        .output(SlowOutput)
        .shared_output(fast.clone())
        .queue_capacity(16)
        .build()
        .expect("Failed to build logger");

    let started = std::time::Instant::now();
    for i in 0..200 {
        logger.info(format!("burst {}", i));
    }
    assert!(started.elapsed() < Duration::from_secs(2));

    assert!(logger.metrics().dropped_count() > 0);
    assert_eq!(logger.metrics().dispatched_count(), 200);
}
