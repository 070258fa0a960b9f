use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use midge::builder::{build, BuilderConfig};
use midge::canonicalize::canonicalize;
use midge::dce::eliminate_dead_nodes;
use midge::graph::Graph;
use midge::installer::{CompilerStorage, SnippetInstaller};
use midge::node::{BinOp, ConstValue, Node};
use midge::registry::{MethodRegistry, TypeTable};
use midge::stamp::Stamp;

/// A foldable chain: ((1 + 1) + 1) + ... with `n` additions.
fn constant_chain(n: usize) -> Graph {
    let mut g = Graph::new("chain");
    let mut acc = g.add(Node::constant(ConstValue::Int(1))).unwrap();
    for _ in 0..n {
        let one = g.add(Node::constant(ConstValue::Int(1))).unwrap();
        acc = g
            .add(Node::binary(BinOp::Add, acc, one, Stamp::int()))
            .unwrap();
    }
    g.add(Node::ret(Some(acc))).unwrap();
    g
}

/// A chain rooted at a parameter: nothing folds, stamps stay fixed. The
/// worst case for the worklist, every node is visited and rejected.
fn opaque_chain(n: usize) -> Graph {
    let mut g = Graph::new("opaque");
    let mut acc = g.add(Node::param(0, Stamp::int())).unwrap();
    for _ in 0..n {
        let one = g.add(Node::constant(ConstValue::Int(1))).unwrap();
        acc = g
            .add(Node::binary(BinOp::Add, acc, one, Stamp::int()))
            .unwrap();
    }
    g.add(Node::ret(Some(acc))).unwrap();
    g
}

fn bench_canonicalize(c: &mut Criterion) {
    let types = TypeTable::default();

    let mut group = c.benchmark_group("canonicalize/constant_chain");
    for n in [64_usize, 512, 4096] {
        let graph = constant_chain(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &graph, |b, graph| {
            b.iter_batched(
                || graph.clone(),
                |mut g| {
                    canonicalize(&mut g, &types).unwrap();
                    black_box(g.live_count());
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();

    let mut group = c.benchmark_group("canonicalize/opaque_chain");
    for n in [64_usize, 512, 4096] {
        let graph = opaque_chain(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &graph, |b, graph| {
            b.iter_batched(
                || graph.clone(),
                |mut g| {
                    canonicalize(&mut g, &types).unwrap();
                    black_box(g.live_count());
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_dce(c: &mut Criterion) {
    let mut group = c.benchmark_group("dce/folded_chain");
    let types = TypeTable::default();
    for n in [512_usize, 4096] {
        let mut graph = constant_chain(n);
        canonicalize(&mut graph, &types).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(n), &graph, |b, graph| {
            b.iter_batched(
                || graph.clone(),
                |mut g| {
                    black_box(eliminate_dead_nodes(&mut g).unwrap());
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn registry_with_snippet(calls: usize) -> MethodRegistry {
    use std::fmt::Write;

    let mut callee_ops = String::new();
    callee_ops.push_str(r#"{ "op": "param", "index": 0 },"#);
    callee_ops.push_str(r#"{ "op": "const", "value": { "Int": 1 } },"#);
    callee_ops.push_str(r#"{ "op": "binary", "bin": "Add", "lhs": 0, "rhs": 1 },"#);
    callee_ops.push_str(r#"{ "op": "return", "value": 2 }"#);

    let mut snippet_ops = String::new();
    snippet_ops.push_str(r#"{ "op": "param", "index": 0 }"#);
    for i in 0..calls {
        let _ = write!(
            snippet_ops,
            r#", {{ "op": "call", "kind": "Static", "class": "rt.C", "name": "inc", "args": [{}] }}"#,
            i
        );
    }
    let _ = write!(snippet_ops, r#", {{ "op": "return", "value": {} }}"#, calls);

    let doc = format!(
        r#"{{
        "classes": [{{
            "name": "rt.C",
            "methods": [
                {{
                    "name": "inc", "static": true,
                    "params": [ {{ "kind": "Int" }} ], "return": {{ "kind": "Int" }},
                    "body": {{ "ops": [{callee_ops}] }}
                }},
                {{
                    "name": "snippet", "static": true,
                    "params": [ {{ "kind": "Int" }} ], "return": {{ "kind": "Int" }},
                    "snippet": {{}},
                    "body": {{ "ops": [{snippet_ops}] }}
                }}
            ]
        }}]
    }}"#
    );
    let mut reg = MethodRegistry::new();
    reg.load_json(&doc).unwrap();
    reg
}

fn bench_install(c: &mut Criterion) {
    let mut group = c.benchmark_group("install/snippet");
    for calls in [4_usize, 16, 64] {
        let reg = registry_with_snippet(calls);
        let class = reg.lookup_class("rt.C").unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(calls), &reg, |b, reg| {
            b.iter(|| {
                let storage = CompilerStorage::new();
                SnippetInstaller::new(reg, &storage)
                    .install_snippets(class)
                    .unwrap();
                black_box(storage);
            });
        });
    }
    group.finish();
}

fn bench_build(c: &mut Criterion) {
    let reg = registry_with_snippet(64);
    let m = reg.lookup_qualified("rt.C", "snippet").unwrap();
    c.bench_function("build/snippet_64_calls", |b| {
        b.iter(|| {
            let g = build(&reg, m, &BuilderConfig::snippet_default()).unwrap();
            black_box(g.live_count());
        });
    });
}

criterion_group!(
    benches,
    bench_canonicalize,
    bench_dce,
    bench_install,
    bench_build
);
criterion_main!(benches);
