use criterion::{criterion_group, criterion_main, Criterion};
use std::collections::BTreeMap;
use std::hint::black_box;

use switchboard_core::{
    Allocation, CallerContext, ConfigSnapshot, FlagDefinition, VariantDefinition,
};
use switchboard_flags::{bucket, DefaultTargetingResolver, TargetingResolver, VariantEvaluator};

fn bench_snapshot() -> ConfigSnapshot {
    let variant = |name: &str, id: &str| {
        VariantDefinition::new(
            name,
            BTreeMap::from([("agent_id".to_string(), id.to_string())]),
        )
    };
    let pinned: Vec<String> = (0..500).map(|i| format!("pinned-{i}")).collect();
    let flag = FlagDefinition {
        name: "Agent".to_string(),
        enabled: true,
        variants: vec![
            variant("oldAgent", "asst_1"),
            variant("newAgent", "asst_123"),
            variant("canary", "asst_9"),
        ],
        allocation: vec![
            Allocation::users("newAgent", pinned),
            Allocation::weight("oldAgent", 0.6),
            Allocation::weight("newAgent", 0.3),
            Allocation::weight("canary", 0.1),
        ],
    };
    ConfigSnapshot::new(1, BTreeMap::new(), vec![flag]).expect("valid bench snapshot")
}

fn bench_evaluation(c: &mut Criterion) {
    let snapshot = bench_snapshot();
    let evaluator = VariantEvaluator::new();
    let resolver = DefaultTargetingResolver;
    let weighted = resolver.resolve(&CallerContext::authenticated("user-7f3a"));
    let pinned = resolver.resolve(&CallerContext::authenticated("pinned-499"));

    c.bench_function("flags/bucket", |b| {
        b.iter(|| black_box(bucket(black_box("Agent"), black_box("user-7f3a"))));
    });

    c.bench_function("flags/evaluate_weighted", |b| {
        b.iter(|| {
            let evaluation = evaluator.evaluate_detailed("Agent", &snapshot, black_box(&weighted));
            black_box(evaluation.reason);
        });
    });

    c.bench_function("flags/evaluate_user_targeted", |b| {
        b.iter(|| {
            let evaluation = evaluator.evaluate_detailed("Agent", &snapshot, black_box(&pinned));
            black_box(evaluation.reason);
        });
    });
}

criterion_group!(benches, bench_evaluation);
criterion_main!(benches);
