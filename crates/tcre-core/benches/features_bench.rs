use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tcre_core::{
    assemble_datasets, Candidate, CandidateClass, EntityMention, EntitySelection, FeatureBuilder,
    FieldSpec, MarkerConfig, Splits,
};

const SENTENCE: &[&str] = &[
    "Naive", "CD4+", "T", "cells", "differentiate", "into", "Th17", "cells", "when", "exposed",
    "to", "IL-6", "and", "TGF-beta", "in", "the", "presence", "of", "IL-23", ".",
];

fn candidates(n: i64) -> Vec<Candidate> {
    (0..n)
        .map(|id| Candidate {
            id,
            words: SENTENCE.iter().map(|w| w.to_string()).collect(),
            entities: vec![
                EntityMention::new("immune_cell_type", 0, 4, false),
                EntityMention::new("immune_cell_type", 6, 8, true),
                EntityMention::new("cytokine", 11, 12, true),
                EntityMention::new("cytokine", 13, 14, false),
                EntityMention::new("cytokine", 18, 19, false),
            ],
            label: (id % 2) as f32,
        })
        .collect()
}

fn bench_features(c: &mut Criterion) {
    let class = CandidateClass::from_relation_class("inducing_cytokine").unwrap();
    let config = MarkerConfig::build("mult_01", true, &class.entity_types, true).unwrap();
    let builder = FeatureBuilder::new(&config, &class.entity_types, true, EntitySelection::AllOfTypes);
    let cands = candidates(1000);

    c.bench_function("build_features_1000", |b| {
        b.iter(|| builder.build(black_box(&cands)).unwrap())
    });

    let table = builder.build(&cands).unwrap();
    let splits: Splits = [
        ("train".to_string(), (0..800).collect()),
        ("val".to_string(), (800..900).collect()),
        ("test".to_string(), (900..1000).collect()),
    ]
    .into_iter()
    .collect();

    c.bench_function("assemble_datasets_1000", |b| {
        b.iter(|| assemble_datasets(black_box(&table), &splits, &FieldSpec::default()).unwrap())
    });
}

criterion_group!(benches, bench_features);
criterion_main!(benches);
