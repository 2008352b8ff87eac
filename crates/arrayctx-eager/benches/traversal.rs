//! Benchmarks for container traversal over the eager backend
//!
//! Measures per-leaf dispatch overhead against flat and nested container
//! shapes of varying fan-out.

use arrayctx_core::{map_scalar, ArrayContext, BinaryOp, Value, ValueMap, ValueSeq};
use arrayctx_eager::EagerContext;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::{ArrayD, IxDyn};

fn leaf(ctx: &EagerContext, len: usize) -> Value {
    let data: Vec<f64> = (0..len).map(|i| i as f64).collect();
    let host = ArrayD::from_shape_vec(IxDyn(&[len]), data).unwrap();
    Value::Array(ctx.from_host(host).unwrap())
}

fn flat_seq(ctx: &EagerContext, leaves: usize, len: usize) -> Value {
    Value::container((0..leaves).map(|_| leaf(ctx, len)).collect::<ValueSeq>())
}

fn nested_map(ctx: &EagerContext, branches: usize, len: usize) -> Value {
    let mut outer = ValueMap::new();
    for b in 0..branches {
        let mut inner = ValueMap::new();
        inner.insert("pos", leaf(ctx, len));
        inner.insert("vel", leaf(ctx, len));
        outer.insert(format!("branch{b}"), Value::container(inner));
    }
    Value::container(outer)
}

fn bench_map_scalar(c: &mut Criterion) {
    let ctx = EagerContext::new();
    let mut group = c.benchmark_group("map_scalar");

    for leaves in [4usize, 64, 256] {
        let container = flat_seq(&ctx, leaves, 1024);
        group.bench_with_input(
            BenchmarkId::new("flat_seq", leaves),
            &container,
            |bench, container| {
                bench.iter(|| {
                    black_box(map_scalar(&ctx, BinaryOp::Mul, container, 2.0).unwrap())
                });
            },
        );
    }

    for branches in [2usize, 16, 64] {
        let container = nested_map(&ctx, branches, 1024);
        group.bench_with_input(
            BenchmarkId::new("nested_map", branches),
            &container,
            |bench, container| {
                bench.iter(|| {
                    black_box(map_scalar(&ctx, BinaryOp::Mul, container, 2.0).unwrap())
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_map_scalar);
criterion_main!(benches);
