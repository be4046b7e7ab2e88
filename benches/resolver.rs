//! Dependency Resolver and Dispatch Benchmarks
//!
//! Run with: cargo bench --bench resolver

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use semver::{Version, VersionReq};
use serde_json::json;
use tokio::runtime::Runtime;

use hyper_cmd::commands::{handler_fn, CommandDescriptor, CommandRegistry};
use hyper_cmd::plugins::{resolve, PluginManifest};

/// `n` plugins in layers of ten, each depending on two plugins of the layer below.
fn layered(n: usize) -> Vec<PluginManifest> {
    let any = VersionReq::parse(">=1.0").unwrap();
    (0..n)
        .map(|i| {
            let mut m = PluginManifest::new(
                format!("plugin-{:05}", i),
                Version::new(1, 0, 0),
                "shell",
            );
            if i >= 10 {
                let below = (i / 10 - 1) * 10;
                m = m
                    .depends_on(format!("plugin-{:05}", below + i % 10), any.clone())
                    .depends_on(format!("plugin-{:05}", below + (i + 3) % 10), any.clone());
            }
            m
        })
        .rev()
        .collect()
}

fn benchmark_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");

    for size in [10usize, 100, 1000].iter() {
        let manifests = layered(*size);
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &manifests, |b, m| {
            b.iter(|| resolve(black_box(m)).unwrap());
        });
    }

    group.finish();
}

fn benchmark_dispatch(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut registry = CommandRegistry::new();
    for i in 0..100 {
        registry
            .register(
                "bench",
                CommandDescriptor::new(
                    format!("cmd-{}", i),
                    "bench command",
                    json!({
                        "type": "object",
                        "properties": { "value": { "type": "integer" } },
                        "required": ["value"]
                    }),
                    handler_fn(Ok),
                ),
            )
            .unwrap();
    }

    c.bench_function("dispatch_validated", |b| {
        b.to_async(&rt).iter(|| async {
            registry
                .dispatch(black_box("cmd-42"), json!({ "value": 7 }))
                .await
                .unwrap()
        });
    });
}

criterion_group!(benches, benchmark_resolve, benchmark_dispatch);
criterion_main!(benches);
