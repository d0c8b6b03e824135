//! # Engine Benchmarks
//!
//! Performance benchmarks for quintet-core writes, queries and computations.
//!
//! Run with: `cargo bench -p quintet-core`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use quintet_core::{
    Engine, Mutation, QueryMode, ReadOptions, Statement, Subject, SubscriptionSpec, Term, Value,
    vocab,
};
use std::hint::black_box;

fn sym(name: &str) -> Subject {
    Subject::symbol(name)
}

/// N people, every other one tagged `kind = a`, all with a `team`.
fn create_people(size: usize) -> Engine {
    let mut engine = Engine::new();
    let statements = (0..size)
        .flat_map(|i| {
            let person = sym(&format!("p{i}"));
            [
                Statement::assign(
                    person.clone(),
                    sym("kind"),
                    sym(if i % 2 == 0 { "a" } else { "b" }),
                ),
                Statement::assign(person, sym("team"), sym(&format!("t{}", i % 10))),
            ]
        })
        .collect::<Vec<_>>();
    for chunk in statements.chunks(1000) {
        engine.assert_batch(chunk.to_vec()).expect("batch");
    }
    engine
        .assert_batch(vec![
            Statement::require(sym("kindA"), sym("kind"), sym("a")),
            Statement::require(sym("byTeam"), sym("kind"), sym("a")),
            Statement::require(sym("byTeam"), sym("team"), Value::variable("team")),
        ])
        .expect("queries");
    engine
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_assert(c: &mut Criterion) {
    let mut group = c.benchmark_group("assert");

    for size in [100, 1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let mut engine = Engine::new();
                for i in 0..size {
                    let _ = engine.assert(Statement::assign(
                        sym("counter"),
                        sym("value"),
                        Subject::int(i as i64),
                    ));
                }
                black_box(engine)
            });
        });
    }

    group.finish();
}

fn bench_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate");

    for size in [100, 1000, 5000].iter() {
        let engine = create_people(*size);
        group.bench_with_input(BenchmarkId::new("single", size), size, |b, _| {
            b.iter(|| black_box(engine.evaluate(&sym("kindA"), ReadOptions::new())));
        });
        group.bench_with_input(BenchmarkId::new("join", size), size, |b, _| {
            b.iter(|| black_box(engine.evaluate(&sym("byTeam"), ReadOptions::new())));
        });
    }

    group.finish();
}

fn bench_literal(c: &mut Criterion) {
    let mut group = c.benchmark_group("literal");

    for history in [10, 100, 1000].iter() {
        let mut engine = Engine::new();
        for i in 0..*history {
            let _ = engine.assert(Statement::assign(sym("a"), sym("p"), Subject::int(i)));
        }
        group.bench_with_input(BenchmarkId::from_parameter(history), history, |b, _| {
            b.iter(|| black_box(engine.query(&sym("a"), QueryMode::Literal, ReadOptions::new())));
        });
    }

    group.finish();
}

fn bench_computation_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("computation_chain");

    for depth in [1, 10, 50].iter() {
        let mut engine = Engine::new();
        let _ = engine.assert(Statement::assign(sym("n0"), sym("v"), Subject::int(0)));
        for i in 1..=*depth {
            let calc = sym(&format!("inc{i}"));
            let _ = engine.assert_batch(vec![
                Statement::assign(calc.clone(), sym(vocab::OPERATION), sym(vocab::ADD)),
                Statement::assign(
                    calc.clone(),
                    Subject::int(0),
                    Value::path(sym(&format!("n{}", i - 1)), sym("v")),
                ),
                Statement::assign(calc.clone(), Subject::int(1), Subject::int(1)),
                Statement::assign(sym(&format!("n{i}")), sym("v"), calc),
            ]);
        }
        let last = sym(&format!("n{depth}"));
        group.bench_with_input(BenchmarkId::from_parameter(depth), depth, |b, _| {
            b.iter(|| black_box(engine.read(&last, &sym("v"), ReadOptions::new())));
        });
    }

    group.finish();
}

fn bench_trigger_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("trigger_fanout");

    for size in [10, 100, 500].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let mut engine = Engine::new();
                let _ = engine.assert(Statement::require(sym("ready"), sym("status"), sym("ready")));
                let _ = engine.subscribe(SubscriptionSpec::truthy(
                    sym("ready"),
                    vec![Mutation::assign(Term::this(), "done", Subject::bool(true))],
                ));
                for i in 0..size {
                    let _ = engine.assert(Statement::assign(
                        sym(&format!("t{i}")),
                        sym("status"),
                        sym("ready"),
                    ));
                }
                black_box(engine.take_firings())
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_assert,
    bench_evaluate,
    bench_literal,
    bench_computation_chain,
    bench_trigger_fanout
);
criterion_main!(benches);
