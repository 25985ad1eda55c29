//! Benchmarks for expression compilation, accessor calls and digests.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use vigil_core::{compile, Comparison, Scope, Value};

const PATH: &str = "order.customer.address['zip']";

/// Compiling from text versus calling an already compiled accessor
fn bench_expressions(c: &mut Criterion) {
    let mut group = c.benchmark_group("expression");
    let context = Value::from(json!({
        "order": {"customer": {"address": {"zip": "53703"}}}
    }));

    group.bench_function("compile", |b| {
        b.iter(|| compile(black_box(PATH)));
    });

    let accessor = compile(PATH).expect("benchmark expression compiles");
    group.bench_function("call", |b| {
        b.iter(|| accessor.eval(black_box(&context)));
    });

    group.finish();
}

/// Digest with all watchers clean (steady state) and with one dirty watcher
fn bench_digest(c: &mut Criterion) {
    let mut group = c.benchmark_group("digest");

    for n in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("clean", n), &n, |b, &n| {
            let scope = watched_scope(n);
            scope.digest().expect("initial digest converges");
            b.iter(|| scope.digest());
        });

        group.bench_with_input(BenchmarkId::new("one_dirty", n), &n, |b, &n| {
            let scope = watched_scope(n);
            scope.digest().expect("initial digest converges");
            let mut tick = 0;
            b.iter(|| {
                tick += 1;
                scope.set("item0", tick);
                scope.digest()
            });
        });
    }

    group.finish();
}

fn watched_scope(n: i32) -> Scope {
    let scope = Scope::new();
    for i in 0..n {
        let key = format!("item{i}");
        scope.set(key.clone(), i);
        scope
            .watch_expr(&key, |_, _, _| {}, Comparison::Reference)
            .expect("watch expression compiles");
    }
    scope
}

criterion_group!(benches, bench_expressions, bench_digest);
criterion_main!(benches);
