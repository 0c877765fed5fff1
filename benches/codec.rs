//! Codec and command-path benchmark suite.
//!
//! Benchmarks frame encoding, reply decoding, and a full `set_all` through
//! the manager over an in-memory link.
//!
//! Run with: cargo bench --bench codec
//! Results saved to: target/criterion/

use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use tokio::runtime::Runtime;
use tokio::sync::Mutex;

use hud_link::protocol::{decode_battery_response, encode_fade, encode_set};
use hud_link::{ConnectionManager, MemoryEndpoint, QueueDiscovery};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const INTENSITIES: &[f64] = &[0.0, 0.5, 1.0];
const REPLIES: &[&str] = &["VAL:700", "BATT VAL:1023 OK", "garbage"];

// ============================================================================
// Benchmark: Encoding
// ============================================================================

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    for &intensity in INTENSITIES {
        group.bench_with_input(BenchmarkId::new("set", intensity), &intensity, |b, &i| {
            b.iter(|| encode_set(black_box(2), black_box(i)));
        });
        group.bench_with_input(BenchmarkId::new("fade", intensity), &intensity, |b, &i| {
            b.iter(|| encode_fade(black_box(4), black_box(1500), black_box(i)));
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Decoding
// ============================================================================

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    for &reply in REPLIES {
        group.bench_with_input(BenchmarkId::new("battery", reply), &reply, |b, &line| {
            b.iter(|| decode_battery_response(black_box(Some(line))));
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Broadcast Over Memory Link
// ============================================================================

fn bench_set_all(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let (manager, peer) = rt.block_on(async {
        let (provider, feed) = QueueDiscovery::new();
        let (endpoint, peer) = MemoryEndpoint::pair("bench");
        feed.push(endpoint);

        let manager = ConnectionManager::builder()
            .provider(provider)
            .build()
            .unwrap();
        manager.connect("HUD").await.unwrap();
        manager
            .wait_connected(Duration::from_secs(5))
            .await
            .unwrap();
        (manager, Arc::new(Mutex::new(peer)))
    });

    c.bench_function("set_all", |b| {
        b.to_async(&rt).iter(|| {
            let manager = manager.clone();
            let peer = Arc::clone(&peer);
            async move {
                manager.set_all(black_box(0.5)).await.unwrap();
                let mut peer = peer.lock().await;
                for _ in 0..5 {
                    peer.read_frame().await.unwrap();
                }
            }
        });
    });

    rt.block_on(manager.shutdown()).unwrap();
}

// ============================================================================
// Criterion Setup
// ============================================================================

criterion_group!(benches, bench_encode, bench_decode, bench_set_all);
criterion_main!(benches);
