//! In-process ingest benchmark for tracewell
//!
//! Usage: cargo run --release --bin benchmark -- [spans_per_batch] [num_batches]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracewell::{Host, IngestionSink, ProducerSpan, SpanWriter, Spans, TraceStore};

const SERVICES: &[&str] = &["checkout", "inventory", "payments", "gateway", "search"];
const OPERATIONS: &[&str] = &["GET /", "POST /orders", "GET /items", "charge", "lookup"];
const EVENTS: &[&str] = &["cs", "sr", "ss", "cr"];
const TAG_KEYS: &[&str] = &["http.path", "http.status_code", "thread", "lc"];

/// Share of spans named after the inbound channel, dropped by the cycle guard
const CYCLE_RATIO: f64 = 0.05;
/// Share of spans reported with two parents
const MULTI_PARENT_RATIO: f64 = 0.02;

fn generate_batch(rng: &mut StdRng, spans_per_batch: usize, batch_num: usize) -> Spans {
    let service = SERVICES[rng.gen_range(0..SERVICES.len())];
    let host = Host::new(
        service,
        Ipv4Addr::new(10, 0, rng.gen(), rng.gen()),
        rng.gen_range(8000..9000),
    );
    let base_ms = 1_700_000_000_000i64 + (batch_num as i64) * 1000;
    let trace_id = format!("trace-{}-{}", batch_num, rng.gen::<u32>());

    let spans = (0..spans_per_batch)
        .map(|i| {
            let name = if rng.gen_bool(CYCLE_RATIO) {
                "message/sleuth"
            } else {
                OPERATIONS[rng.gen_range(0..OPERATIONS.len())]
            };

            let mut span = ProducerSpan::new(trace_id.as_str(), format!("span-{}-{}", batch_num, i), name);
            if i > 0 {
                span = span.with_parent(format!("span-{}-{}", batch_num, i - 1));
                if rng.gen_bool(MULTI_PARENT_RATIO) {
                    span = span.with_parent(format!("span-{}-0", batch_num));
                }
            }

            for _ in 0..rng.gen_range(1..=EVENTS.len()) {
                let event = EVENTS[rng.gen_range(0..EVENTS.len())];
                span = span.with_timeline_annotation(event, base_ms + rng.gen_range(0..1000));
            }
            for _ in 0..rng.gen_range(0..=TAG_KEYS.len()) {
                let key = TAG_KEYS[rng.gen_range(0..TAG_KEYS.len())];
                span = span.with_tag(key, rng.gen_range(100..600).to_string());
            }
            span
        })
        .collect();

    Spans::new(host, spans)
}

struct BenchmarkStats {
    total_spans: usize,
    total_duration: Duration,
    batch_latencies: Vec<Duration>,
}

impl BenchmarkStats {
    fn spans_per_sec(&self) -> f64 {
        self.total_spans as f64 / self.total_duration.as_secs_f64()
    }

    fn percentile(&self, p: usize) -> Duration {
        let mut sorted = self.batch_latencies.clone();
        sorted.sort();
        sorted
            .get((sorted.len() * p / 100).min(sorted.len().saturating_sub(1)))
            .copied()
            .unwrap_or_default()
    }

    fn avg_latency(&self) -> Duration {
        if self.batch_latencies.is_empty() {
            return Duration::ZERO;
        }
        let sum: Duration = self.batch_latencies.iter().sum();
        sum / self.batch_latencies.len() as u32
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    let spans_per_batch: usize = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(100);
    let num_batches: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(1000);

    println!("Tracewell Ingest Benchmark");
    println!("==========================");
    println!("Spans per batch: {}", spans_per_batch);
    println!("Batches:         {}", num_batches);
    println!("Total spans:     {}", spans_per_batch * num_batches);
    println!();

    let store = Arc::new(TraceStore::new());
    let sink = IngestionSink::new(SpanWriter::new(Arc::clone(&store)), "sleuth");
    let mut rng = StdRng::seed_from_u64(12345);

    // Generation is kept out of the timed section
    let batches: Vec<Spans> = (0..num_batches)
        .map(|n| generate_batch(&mut rng, spans_per_batch, n))
        .collect();

    let mut batch_latencies = Vec::with_capacity(num_batches);
    let mut accepted = 0;
    let mut dropped = 0;
    let start = Instant::now();

    for batch in batches {
        let batch_start = Instant::now();
        let report = sink.sink(batch)?;
        batch_latencies.push(batch_start.elapsed());
        accepted += report.accepted;
        dropped += report.dropped;
    }

    let stats = BenchmarkStats {
        total_spans: spans_per_batch * num_batches,
        total_duration: start.elapsed(),
        batch_latencies,
    };

    println!("Spans/sec:    {:.0}", stats.spans_per_sec());
    println!("Total time:   {:?}", stats.total_duration);
    println!("Accepted:     {} (dropped {} cycle spans)", accepted, dropped);
    println!(
        "Latency:      avg={:?} p50={:?} p99={:?}",
        stats.avg_latency(),
        stats.percentile(50),
        stats.percentile(99)
    );
    println!();

    println!("Table Statistics:");
    for t in store.table_stats() {
        println!("  {}: {} rows", t.name, t.row_count);
    }
    let memory = store.memory_stats();
    println!(
        "Memory: {:.2} MB (peak {:.2} MB)",
        memory.current_bytes as f64 / 1024.0 / 1024.0,
        memory.peak_bytes as f64 / 1024.0 / 1024.0
    );

    Ok(())
}
