use criterion::{Criterion, criterion_group, criterion_main};
use sift_core::{Condition, Production, ReteNetwork, Triple, Variable};
use std::hint::black_box;

fn v(name: &str) -> Variable {
    Variable::new(name)
}

fn chain_rule() -> Condition {
    Condition::pattern(v("x"), "on", v("y"))
        & Condition::pattern(v("y"), "on", v("z"))
        & Condition::negated(v("z"), "color", "red")
}

fn bench_bulk_add(c: &mut Criterion) {
    c.bench_function("add_1000_wmes_three_clause_rule", |b| {
        b.iter(|| {
            let mut net: ReteNetwork = ReteNetwork::new();
            net.add_production(Production::new("chain", chain_rule())).unwrap();
            for i in 0..1000u32 {
                net.add_wme(Triple::new(format!("b{i}"), "on", format!("b{}", i + 1)))
                    .unwrap();
            }
            black_box(net.matches().len())
        })
    });
}

fn bench_add_retract_cycle(c: &mut Criterion) {
    let mut net: ReteNetwork = ReteNetwork::new();
    net.add_production(Production::new("chain", chain_rule())).unwrap();
    for i in 0..1000u32 {
        net.add_wme(Triple::new(format!("b{i}"), "on", format!("b{}", i + 1))).unwrap();
    }
    c.bench_function("retract_and_reassert_one_wme", |b| {
        b.iter(|| {
            net.remove_wme(&Triple::new("b500", "on", "b501")).unwrap();
            net.add_wme(Triple::new("b500", "on", "b501")).unwrap();
            black_box(net.stats().token_count)
        })
    });
}

fn bench_rule_churn(c: &mut Criterion) {
    let mut net: ReteNetwork = ReteNetwork::new();
    for i in 0..200u32 {
        net.add_wme(Triple::new(format!("b{i}"), "on", format!("b{}", i + 1))).unwrap();
        net.add_wme(Triple::new(format!("b{i}"), "color", "blue")).unwrap();
    }
    c.bench_function("add_and_remove_production_over_live_memory", |b| {
        b.iter(|| {
            let rule = net.add_production(Production::new("churn", chain_rule())).unwrap();
            let count = net.activations(rule).len();
            net.remove_production(rule).unwrap();
            black_box(count)
        })
    });
}

criterion_group!(benches, bench_bulk_add, bench_add_retract_cycle, bench_rule_churn);
criterion_main!(benches);
