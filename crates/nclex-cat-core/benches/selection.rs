use std::collections::{BTreeMap, BTreeSet};

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use nclex_cat_core::bank::{InMemoryItemBank, ItemBank};
use nclex_cat_core::config::CatConfig;
use nclex_cat_core::model::{CategoryTally, ItemId};
use nclex_cat_core::selection::{most_informative, ItemSelector};

/// A session 60 items in: every third item used, tallies spread over the
/// categories of the used items.
fn session_state(bank: &InMemoryItemBank) -> (BTreeSet<ItemId>, BTreeMap<String, CategoryTally>) {
    let mut administered = BTreeSet::new();
    let mut tally: BTreeMap<String, CategoryTally> = BTreeMap::new();
    for item in bank.items().iter().step_by(3).take(60) {
        administered.insert(item.id);
        tally
            .entry(item.category.clone())
            .or_default()
            .record(item.params.b < 0.0);
    }
    (administered, tally)
}

fn bench_select_next(c: &mut Criterion) {
    let mut group = c.benchmark_group("select_next");
    let config = CatConfig::default();

    for size in [500, 2000, 10000] {
        let bank = InMemoryItemBank::synthetic(size, 3);
        let selector = ItemSelector::new(&config, &bank);
        let (administered, tally) = session_state(&bank);

        group.bench_function(format!("{size}_items"), |b| {
            b.iter(|| {
                selector.select_next(
                    black_box(0.4),
                    black_box(&administered),
                    black_box(&tally),
                    &bank,
                )
            })
        });
    }

    group.finish();
}

fn bench_most_informative(c: &mut Criterion) {
    let bank = InMemoryItemBank::synthetic(2000, 3);
    c.bench_function("most_informative_top_10", |b| {
        b.iter(|| most_informative(&bank, black_box(-0.8), 10))
    });
}

criterion_group!(benches, bench_select_next, bench_most_informative);
criterion_main!(benches);
